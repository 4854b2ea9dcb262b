use std::path::Path;

use colored::Colorize;
use tracing::info;

use nftower_config::{Projects, Settings};
use nftower_core::error::Result;
use nftower_core::{tower_error_with_details, tower_println, tower_success, tower_warning};
use nftower_gateway::{resolve_api_endpoint, token_from_env, AwsCli, EndpointSource, TowerClient};
use nftower_messages::{msg, MESSAGES};
use nftower_reconcile::{Engine, RunReport};

/// Reconcile every project against the live Tower API and AWS account.
pub fn handle_reconcile(projects_dir: &Path, settings: &Settings) -> Result<i32> {
    let projects = Projects::load(projects_dir, settings)?;
    if projects.is_empty() {
        tower_warning!(
            "{}",
            msg!(MESSAGES.config.no_projects, dir = projects_dir.display().to_string())
        );
        return Ok(0);
    }

    let token = token_from_env()?;
    let aws = AwsCli::new(settings.region.as_str())?;
    let endpoint = resolve_api_endpoint(
        &EndpointSource {
            configured: settings.api_endpoint.as_deref(),
            route53_stack: &settings.route53_stack_name,
            route53_output: &settings.route53_output,
        },
        &aws,
    )?;
    info!("Using Tower API at {}", endpoint);
    let tower = TowerClient::new(&endpoint, token)?.with_page_size(settings.page_size);

    let report = Engine::new(&tower, &aws, &aws, settings).run(&projects);
    print_report(&report);
    Ok(report.exit_code())
}

fn print_report(report: &RunReport) {
    let totals = report.totals();
    tower_println!(
        "{}",
        msg!(
            MESSAGES.run.summary,
            created = totals.created.to_string(),
            updated = totals.updated.to_string(),
            removed = totals.removed.to_string(),
            skipped = totals.skipped.to_string()
        )
    );

    if report.is_success() {
        tower_success!("{}", MESSAGES.run.all_succeeded.green());
        return;
    }

    if let Some(error) = &report.organization_error {
        tower_error_with_details!(
            format!("Organization '{}' could not be reconciled", report.organization),
            [error.to_string()]
        );
    }
    let failures: Vec<String> = report
        .failures()
        .map(|p| match &p.error {
            Some(error) => format!("{}: {}", p.name, error),
            None => p.name.clone(),
        })
        .collect();
    if !failures.is_empty() {
        tower_error_with_details!(
            msg!(MESSAGES.run.failures_header, count = failures.len().to_string()),
            &failures
        );
    }
    if report.halted() {
        tower_warning!(
            "Run stopped before: {}",
            report.not_attempted.join(", ").yellow()
        );
    }
}
