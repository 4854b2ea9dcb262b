use std::path::Path;

use nftower_config::{Projects, Settings};
use nftower_core::error::Result;
use nftower_core::{tower_println, tower_warning};
use nftower_messages::{msg, MESSAGES};

/// Validate every project file and list them on stdout.
///
/// Nothing is sent to Tower or AWS. Any invalid file fails the whole run.
pub fn handle_dry_run(projects_dir: &Path, settings: &Settings) -> Result<i32> {
    let projects = Projects::load(projects_dir, settings)?;
    if projects.is_empty() {
        tower_warning!(
            "{}",
            msg!(MESSAGES.config.no_projects, dir = projects_dir.display().to_string())
        );
        return Ok(0);
    }

    tower_println!("{}", MESSAGES.config.dry_run_header);
    for project in &projects {
        let path = project
            .source
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| project.stack_name.clone());
        tower_println!("{}", msg!(MESSAGES.config.dry_run_entry, path = path));
        tower_println!(
            "{}",
            msg!(
                MESSAGES.config.dry_run_summary,
                stack = &project.stack_name,
                users = project.users.len().to_string(),
                tags = project.tags.len().to_string()
            )
        );
    }
    Ok(0)
}
