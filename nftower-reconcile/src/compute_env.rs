//! Compute environment lifecycle inside a workspace.
//!
//! Stale environments (older template version, a current one that failed
//! or is not an AWS Batch environment, or any environment in a workspace
//! nobody can launch from) are deleted first so the AWS Batch
//! limit of 50 environments per account is never reached. Then the SPOT and
//! on-demand environments of the current version are created if missing.

use std::thread;
use std::time::Instant;

use serde_json::json;
use tracing::{debug, info, warn};

use nftower_config::settings::PollSettings;
use nftower_core::error::{Result, TowerError};
use nftower_gateway::{Deletion, Gateway, Method, Outcome};
use nftower_messages::{msg, MESSAGES};

use crate::policy::{ComputeEnvironmentPolicy, EnvironmentInputs, PricingModel, PLATFORM};
use crate::report::Tally;
use crate::wire::{decode_list, expect_success, ComputeEnvDto};
use crate::workspace::Workspace;

const DELETING: &str = "DELETING";

/// Ids of the SPOT and on-demand environments of a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeEnvIds {
    pub spot: String,
    pub on_demand: String,
}

pub fn list(gateway: &dyn Gateway, workspace: &Workspace) -> Result<Vec<ComputeEnvDto>> {
    let response = gateway.request(Method::Get, "/compute-envs", &workspace.query(), None)?;
    decode_list(response, "computeEnvs", "compute environments")
}

/// Delete the workspace's stale environments.
///
/// Current-version environments are kept only while usable, so an ERRORED
/// one is replaced by `ensure_set`. Returns the ids whose deletion is in
/// progress. Environments with active jobs are skipped with a warning and
/// retried on the next run.
pub fn cleanup(
    gateway: &dyn Gateway,
    workspace: &Workspace,
    policy: &ComputeEnvironmentPolicy<'_>,
    launchable: bool,
    tally: &mut Tally,
) -> Result<Vec<String>> {
    let mut pending = Vec::new();
    for env in list(gateway, workspace)? {
        if launchable && policy.is_current(&env.name) && usable(&env) {
            continue;
        }
        if env.status == DELETING {
            pending.push(env.id);
            continue;
        }

        let path = format!("/compute-envs/{}", env.id);
        let response = gateway.request(Method::Delete, &path, &workspace.query(), None)?;
        match Deletion::classify(&response) {
            Deletion::Removed => {
                info!("Deleting compute environment '{}/{}'", workspace.full_name, env.name);
                tally.removed();
                pending.push(env.id);
            }
            Deletion::Busy(reason) => {
                warn!(
                    "{}",
                    msg!(MESSAGES.run.ce_busy, workspace = &workspace.full_name, name = &env.name)
                );
                debug!("Deletion refused: {}", reason);
                tally.skipped();
            }
            Deletion::Refused(reason) => {
                return Err(TowerError::Api(format!(
                    "could not delete compute environment '{}': {}",
                    env.name, reason
                )));
            }
        }
    }
    Ok(pending)
}

/// Poll until none of `ids` is listed any more.
///
/// Returns `false` when the timeout elapsed first; the caller only warns.
pub fn wait_for_deletion(
    gateway: &dyn Gateway,
    workspace: &Workspace,
    ids: &[String],
    poll: &PollSettings,
) -> Result<bool> {
    let started = Instant::now();
    loop {
        let remaining = list(gateway, workspace)?
            .into_iter()
            .filter(|env| ids.contains(&env.id))
            .count();
        if remaining == 0 {
            return Ok(true);
        }
        if started.elapsed() >= poll.timeout() {
            warn!(
                "{}",
                msg!(
                    MESSAGES.run.ce_deletion_timeout,
                    workspace = &workspace.full_name,
                    seconds = poll.timeout_secs.to_string()
                )
            );
            return Ok(false);
        }
        debug!("{} compute environment(s) still deleting", remaining);
        thread::sleep(poll.interval());
    }
}

fn usable(env: &ComputeEnvDto) -> bool {
    env.platform == PLATFORM && matches!(env.status.as_str(), "AVAILABLE" | "CREATING")
}

/// Ensure the SPOT and on-demand environments of the current version exist.
///
/// A newly created SPOT environment is marked as the workspace primary.
pub fn ensure_set(
    gateway: &dyn Gateway,
    workspace: &Workspace,
    policy: &ComputeEnvironmentPolicy<'_>,
    inputs: &EnvironmentInputs<'_>,
    tally: &mut Tally,
) -> Result<ComputeEnvIds> {
    let existing = list(gateway, workspace)?;
    let mut ids = Vec::with_capacity(PricingModel::ALL.len());

    for (index, model) in PricingModel::ALL.into_iter().enumerate() {
        let name = policy.name(inputs.stack_name, model);
        if let Some(env) = existing.iter().find(|env| env.name == name && usable(env)) {
            debug!("Compute environment '{}' exists with id {}", name, env.id);
            ids.push(env.id.clone());
            continue;
        }

        let body = policy.request(inputs, model)?;
        let response =
            gateway.request(Method::Post, "/compute-envs", &workspace.query(), Some(&body))?;
        let id = Outcome::classify(response, "computeEnvId")
            .created(&format!("compute environment '{name}'"))?;
        let id = id.as_str().map(str::to_string).ok_or_else(|| {
            TowerError::UnexpectedResponse(format!("compute environment id is not a string: {id}"))
        })?;
        info!("Created compute environment '{}' (id {})", name, id);
        tally.created();

        if index == 0 {
            set_primary(gateway, workspace, &id)?;
        }
        ids.push(id);
    }

    let mut ids = ids.into_iter();
    match (ids.next(), ids.next()) {
        (Some(spot), Some(on_demand)) => Ok(ComputeEnvIds { spot, on_demand }),
        _ => Err(TowerError::UnexpectedResponse(
            "compute environment set is incomplete".to_string(),
        )),
    }
}

pub fn set_primary(gateway: &dyn Gateway, workspace: &Workspace, compute_env_id: &str) -> Result<()> {
    let path = format!("/compute-envs/{compute_env_id}/primary");
    let response = gateway.request(Method::Post, &path, &workspace.query(), Some(&json!({})))?;
    expect_success(&response, &format!("mark compute environment {compute_env_id} as primary"))?;
    debug!("Compute environment {} is now primary", compute_env_id);
    Ok(())
}
