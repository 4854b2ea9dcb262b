//! AWS credentials that let Tower's Batch Forge act in the project account.

use serde_json::json;
use tracing::{debug, info};

use nftower_core::error::{Result, ResultExt, TowerError};
use nftower_gateway::{require_output, Gateway, Method, OutputMap, Outcome, SecretStore};

use crate::report::Tally;
use crate::wire::{decode_list, CredentialDto};
use crate::workspace::Workspace;

pub const PROVIDER: &str = "aws";
pub const SECRET_ARN_OUTPUT: &str = "TowerForgeServiceUserAccessKeySecretArn";
pub const SERVICE_ROLE_OUTPUT: &str = "TowerForgeServiceRoleArn";
const ACCESS_KEY_FIELD: &str = "aws_access_key_id";
const SECRET_KEY_FIELD: &str = "aws_secret_access_key";

/// Find a usable credential set by name, refusing entries of the wrong kind.
pub fn find(gateway: &dyn Gateway, workspace: &Workspace, name: &str) -> Result<Option<String>> {
    let response = gateway.request(Method::Get, "/credentials", &workspace.query(), None)?;
    let listed: Vec<CredentialDto> = decode_list(response, "credentials", "credentials")?;
    let Some(existing) = listed.into_iter().find(|c| c.name == name) else {
        return Ok(None);
    };

    if existing.provider != PROVIDER {
        return Err(TowerError::ProviderMismatch(format!(
            "credentials '{}' in workspace '{}' use provider '{}' instead of '{}'",
            name, workspace.full_name, existing.provider, PROVIDER
        )));
    }
    if existing.deleted.is_some() {
        return Err(TowerError::ProviderMismatch(format!(
            "credentials '{}' in workspace '{}' are marked as deleted",
            name, workspace.full_name
        )));
    }
    Ok(Some(existing.id))
}

/// Ensure the workspace holds AWS credentials named after the stack.
///
/// The access key secret is only read when the credentials have to be created.
pub fn ensure(
    gateway: &dyn Gateway,
    secrets: &dyn SecretStore,
    workspace: &Workspace,
    stack_name: &str,
    outputs: &OutputMap,
    tally: &mut Tally,
) -> Result<String> {
    if let Some(id) = find(gateway, workspace, stack_name)? {
        debug!("Credentials '{}' exist with id {}", stack_name, id);
        return Ok(id);
    }

    let secret_arn = require_output(outputs, SECRET_ARN_OUTPUT)?;
    let role_arn = require_output(outputs, SERVICE_ROLE_OUTPUT)?;
    let secret = secrets
        .get_secret(secret_arn)
        .scope("reading the Forge service user secret")?;
    let key = |field: &str| {
        secret.get(field).cloned().ok_or_else(|| {
            TowerError::Secret(format!("secret '{secret_arn}' has no '{field}' field"))
        })
    };

    let body = json!({
        "credentials": {
            "name": stack_name,
            "provider": PROVIDER,
            "keys": {
                "accessKey": key(ACCESS_KEY_FIELD)?,
                "secretKey": key(SECRET_KEY_FIELD)?,
                "assumeRoleArn": role_arn
            },
            "description": format!("Credentials for {stack_name}")
        }
    });
    let response = gateway.request(Method::Post, "/credentials", &workspace.query(), Some(&body))?;
    match Outcome::classify(response, "credentialsId") {
        Outcome::Created(id) => {
            let id = id.as_str().map(str::to_string).ok_or_else(|| {
                TowerError::UnexpectedResponse(format!("credentials id is not a string: {id}"))
            })?;
            info!("Created credentials '{}' (id {})", stack_name, id);
            tally.created();
            Ok(id)
        }
        Outcome::AlreadyExists(reason) => find(gateway, workspace, stack_name)?.ok_or_else(|| {
            TowerError::UnexpectedResponse(format!(
                "credentials '{stack_name}' reported as existing but not listed: {reason}"
            ))
        }),
        Outcome::Conflict(reason) => Err(TowerError::Api(format!(
            "could not create credentials '{stack_name}': {reason}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nftower_gateway::mock::{InMemoryTower, StaticSecrets, StaticStackOutputs};
    use nftower_gateway::StackOutputs;

    fn setup(tower: &InMemoryTower) -> Workspace {
        let org_id = tower.seed_organization("Sage Bionetworks");
        let id = tower.seed_workspace(org_id, "foo-project");
        Workspace {
            id,
            org_id,
            name: "foo-project".into(),
            full_name: "foo-project".into(),
        }
    }

    fn outputs() -> OutputMap {
        StaticStackOutputs::new()
            .with_project("foo-project")
            .get_stack_outputs("foo-project")
            .unwrap()
    }

    #[test]
    fn test_secret_is_read_only_on_create() {
        let tower = InMemoryTower::new();
        let ws = setup(&tower);
        let secrets = StaticSecrets::new();
        let mut tally = Tally::default();

        let first = ensure(&tower, &secrets, &ws, "foo-project", &outputs(), &mut tally).unwrap();
        let second = ensure(&tower, &secrets, &ws, "foo-project", &outputs(), &mut tally).unwrap();

        assert_eq!(first, second);
        assert_eq!(secrets.reads(), 1);
        assert_eq!(tower.created("credentials"), 1);
        let keys = tower.credential_keys(ws.id, "foo-project").unwrap();
        assert_eq!(keys["accessKey"], "AKIAEXAMPLE");
        assert_eq!(
            keys["assumeRoleArn"],
            "arn:aws:iam::035458030717:role/foo-project-forge-service"
        );
    }

    #[test]
    fn test_foreign_provider_is_a_data_integrity_error() {
        let tower = InMemoryTower::new();
        let ws = setup(&tower);
        tower.seed_credential(ws.id, "foo-project", "azure", false);
        let secrets = StaticSecrets::new();

        let err = ensure(&tower, &secrets, &ws, "foo-project", &outputs(), &mut Tally::default())
            .unwrap_err();
        assert!(err.is_data_integrity());
        assert!(err.to_string().contains("azure"));
        assert_eq!(secrets.reads(), 0);
    }

    #[test]
    fn test_deleted_credentials_are_refused() {
        let tower = InMemoryTower::new();
        let ws = setup(&tower);
        tower.seed_credential(ws.id, "foo-project", "aws", true);

        let err = find(&tower, &ws, "foo-project").unwrap_err();
        assert!(matches!(err, TowerError::ProviderMismatch(_)));
    }

    #[test]
    fn test_missing_output_fails_before_any_request() {
        let tower = InMemoryTower::new();
        let ws = setup(&tower);
        let err = ensure(
            &tower,
            &StaticSecrets::new(),
            &ws,
            "foo-project",
            &OutputMap::new(),
            &mut Tally::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TowerError::StackOutputs(_)));
        assert_eq!(tower.created("credentials"), 0);
    }
}
