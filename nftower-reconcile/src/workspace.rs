use serde_json::json;
use tracing::{debug, info};

use nftower_core::error::{Result, TowerError};
use nftower_core::get_valid_name;
use nftower_gateway::{Gateway, Method, Outcome};

use crate::report::Tally;
use crate::wire::{decode, decode_list, WorkspaceDto};

/// A project workspace inside an organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub id: u64,
    pub org_id: u64,
    pub name: String,
    pub full_name: String,
}

impl Workspace {
    fn from_dto(dto: WorkspaceDto, org_id: u64) -> Self {
        let full_name = dto.full_name.unwrap_or_else(|| dto.name.clone());
        Self {
            id: dto.id,
            org_id,
            name: dto.name,
            full_name,
        }
    }

    /// Query parameters scoping workspace-level endpoints.
    pub fn query(&self) -> [(&'static str, String); 1] {
        [("workspaceId", self.id.to_string())]
    }
}

fn path(org_id: u64) -> String {
    format!("/orgs/{org_id}/workspaces")
}

pub fn find(gateway: &dyn Gateway, org_id: u64, full_name: &str) -> Result<Option<Workspace>> {
    let name = get_valid_name(full_name);
    let response = gateway.request(Method::Get, &path(org_id), &[], None)?;
    let workspaces: Vec<WorkspaceDto> = decode_list(response, "workspaces", "workspaces")?;
    Ok(workspaces
        .into_iter()
        .find(|w| w.name == name)
        .map(|w| Workspace::from_dto(w, org_id)))
}

/// Find the private workspace named after the project stack, creating it when absent.
pub fn ensure(gateway: &dyn Gateway, org_id: u64, full_name: &str, tally: &mut Tally) -> Result<Workspace> {
    if let Some(workspace) = find(gateway, org_id, full_name)? {
        debug!("Workspace '{}' exists with id {}", full_name, workspace.id);
        return Ok(workspace);
    }

    let body = json!({
        "workspace": {
            "name": get_valid_name(full_name),
            "fullName": full_name,
            "description": null,
            "visibility": "PRIVATE"
        }
    });
    let response = gateway.request(Method::Post, &path(org_id), &[], Some(&body))?;
    match Outcome::classify(response, "workspace") {
        Outcome::Created(workspace) => {
            let workspace = Workspace::from_dto(decode(workspace, "workspace")?, org_id);
            info!("Created workspace '{}' (id {})", full_name, workspace.id);
            tally.created();
            Ok(workspace)
        }
        Outcome::AlreadyExists(reason) => find(gateway, org_id, full_name)?.ok_or_else(|| {
            TowerError::UnexpectedResponse(format!(
                "workspace '{full_name}' reported as existing but not listed: {reason}"
            ))
        }),
        Outcome::Conflict(reason) => Err(TowerError::Api(format!(
            "could not create workspace '{full_name}': {reason}"
        ))),
    }
}
