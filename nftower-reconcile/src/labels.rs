use serde_json::json;
use tracing::{debug, info};

use nftower_core::error::{Result, TowerError};
use nftower_gateway::{Gateway, Method, Outcome};

use crate::report::Tally;
use crate::wire::{decode_pages, LabelDto};
use crate::workspace::Workspace;

fn list_query(workspace: &Workspace) -> [(&'static str, String); 2] {
    [
        ("workspaceId", workspace.id.to_string()),
        ("type", "resource".to_string()),
    ]
}

/// Id of the resource label with this exact name and value, if any.
pub fn find(gateway: &dyn Gateway, workspace: &Workspace, name: &str, value: &str) -> Result<Option<u64>> {
    let labels: Vec<LabelDto> = decode_pages(
        gateway.paged_request(Method::Get, "/labels", &list_query(workspace)),
        "labels",
    )?;
    Ok(labels
        .into_iter()
        .find(|l| l.name == name && l.value.as_deref() == Some(value))
        .map(|l| l.id))
}

/// Ensure a resource label `name=value` exists in the workspace. Returns its id.
pub fn ensure(
    gateway: &dyn Gateway,
    workspace: &Workspace,
    name: &str,
    value: &str,
    tally: &mut Tally,
) -> Result<u64> {
    if let Some(id) = find(gateway, workspace, name, value)? {
        debug!("Label {}={} exists with id {}", name, value, id);
        return Ok(id);
    }

    let body = json!({ "name": name, "value": value, "resource": true });
    let response = gateway.request(Method::Post, "/labels", &workspace.query(), Some(&body))?;
    match Outcome::classify(response, "id") {
        Outcome::Created(id) => {
            let id = id.as_u64().ok_or_else(|| {
                TowerError::UnexpectedResponse(format!("label id is not a number: {id}"))
            })?;
            info!("Created label {}={} (id {})", name, value, id);
            tally.created();
            Ok(id)
        }
        Outcome::AlreadyExists(reason) => find(gateway, workspace, name, value)?.ok_or_else(|| {
            TowerError::UnexpectedResponse(format!(
                "label {name}={value} reported as existing but not listed: {reason}"
            ))
        }),
        Outcome::Conflict(reason) => Err(TowerError::Api(format!(
            "could not create label {name}={value}: {reason}"
        ))),
    }
}
