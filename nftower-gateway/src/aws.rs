//! CloudFormation stack outputs and Secrets Manager values, read through the
//! `aws` CLI so the usual credential chain (profiles, SSO, env vars) applies.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;
use tracing::debug;

use nftower_core::error::{Result, TowerError};

/// Key added to every output map, holding the stack the outputs came from.
pub const STACK_NAME_KEY: &str = "stack_name";

pub type OutputMap = BTreeMap<String, String>;

/// Source of infrastructure-as-code stack outputs.
pub trait StackOutputs {
    /// Outputs of `stack_name` keyed by output key, plus [`STACK_NAME_KEY`].
    fn get_stack_outputs(&self, stack_name: &str) -> Result<OutputMap>;
}

/// Source of decrypted secrets.
pub trait SecretStore {
    fn get_secret(&self, secret_id: &str) -> Result<OutputMap>;
}

/// Look up a required output, naming the stack when it is missing.
pub fn require_output<'a>(outputs: &'a OutputMap, key: &str) -> Result<&'a str> {
    outputs.get(key).map(String::as_str).ok_or_else(|| {
        let stack = outputs
            .get(STACK_NAME_KEY)
            .map(String::as_str)
            .unwrap_or("<unknown stack>");
        TowerError::StackOutputs(format!("stack '{stack}' has no '{key}' output"))
    })
}

/// [`StackOutputs`] and [`SecretStore`] backed by the `aws` CLI.
#[derive(Debug, Clone)]
pub struct AwsCli {
    program: PathBuf,
    region: String,
}

impl AwsCli {
    pub fn new(region: impl Into<String>) -> Result<Self> {
        let program = which::which("aws").map_err(|_| {
            TowerError::Command(
                "The 'aws' CLI was not found on PATH; it is needed to read stack outputs and secrets"
                    .to_string(),
            )
        })?;
        Ok(Self {
            program,
            region: region.into(),
        })
    }

    fn run_json(&self, args: &[&str]) -> Result<Value> {
        let mut full_args: Vec<&str> = args.to_vec();
        full_args.extend(["--region", self.region.as_str(), "--output", "json"]);
        debug!("Running: aws {}", full_args.join(" "));

        let output = duct::cmd(self.program.as_path(), full_args)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|e| TowerError::Command(format!("Failed to run aws {}: {e}", args.join(" "))))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TowerError::Command(format!(
                "aws {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

impl StackOutputs for AwsCli {
    fn get_stack_outputs(&self, stack_name: &str) -> Result<OutputMap> {
        let response = self.run_json(&[
            "cloudformation",
            "describe-stacks",
            "--stack-name",
            stack_name,
        ])?;
        parse_stack_outputs(stack_name, &response)
    }
}

impl SecretStore for AwsCli {
    fn get_secret(&self, secret_id: &str) -> Result<OutputMap> {
        let response = self.run_json(&["secretsmanager", "get-secret-value", "--secret-id", secret_id])?;
        parse_secret(secret_id, &response)
    }
}

/// Outputs of the first stack in a `describe-stacks` response.
pub fn parse_stack_outputs(stack_name: &str, response: &Value) -> Result<OutputMap> {
    let stack = response
        .get("Stacks")
        .and_then(Value::as_array)
        .and_then(|stacks| stacks.first())
        .ok_or_else(|| TowerError::StackOutputs(format!("stack '{stack_name}' was not found")))?;

    let mut outputs: OutputMap = stack
        .get("Outputs")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|output| {
            let key = output.get("OutputKey")?.as_str()?;
            let value = output.get("OutputValue")?.as_str()?;
            Some((key.to_string(), value.to_string()))
        })
        .collect();
    outputs.insert(STACK_NAME_KEY.to_string(), stack_name.to_string());
    Ok(outputs)
}

/// `SecretString` of a `get-secret-value` response, read as a flat JSON object.
pub fn parse_secret(secret_id: &str, response: &Value) -> Result<OutputMap> {
    let secret_string = response
        .get("SecretString")
        .and_then(Value::as_str)
        .ok_or_else(|| TowerError::Secret(format!("secret '{secret_id}' has no SecretString")))?;
    let secret: Value = serde_json::from_str(secret_string)
        .map_err(|_| TowerError::Secret(format!("secret '{secret_id}' is not a JSON object")))?;
    let fields = secret
        .as_object()
        .ok_or_else(|| TowerError::Secret(format!("secret '{secret_id}' is not a JSON object")))?;
    Ok(fields
        .iter()
        .filter_map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_stack_outputs() {
        let response = json!({
            "Stacks": [{
                "StackName": "demo-project",
                "Outputs": [
                    {"OutputKey": "TowerScratch", "OutputValue": "demo-project-tower-scratch"},
                    {"OutputKey": "TowerForgeServiceRoleArn", "OutputValue": "arn:aws:iam::1:role/forge"}
                ]
            }]
        });
        let outputs = parse_stack_outputs("demo-project", &response).unwrap();
        assert_eq!(outputs["TowerScratch"], "demo-project-tower-scratch");
        assert_eq!(outputs[STACK_NAME_KEY], "demo-project");
        assert_eq!(outputs.len(), 3);
    }

    #[test]
    fn test_parse_stack_without_outputs() {
        let outputs = parse_stack_outputs("bare", &json!({"Stacks": [{}]})).unwrap();
        assert_eq!(outputs.len(), 1);
        assert!(parse_stack_outputs("gone", &json!({"Stacks": []})).is_err());
    }

    #[test]
    fn test_require_output_names_stack() {
        let outputs = parse_stack_outputs("demo-project", &json!({"Stacks": [{}]})).unwrap();
        let err = require_output(&outputs, "TowerScratch").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Stack output error: stack 'demo-project' has no 'TowerScratch' output"
        );
    }

    #[test]
    fn test_parse_secret() {
        let response = json!({
            "Name": "forge-user",
            "SecretString": "{\"aws_access_key_id\": \"AKIA\", \"aws_secret_access_key\": \"shh\"}"
        });
        let secret = parse_secret("forge-user", &response).unwrap();
        assert_eq!(secret["aws_access_key_id"], "AKIA");
        assert_eq!(secret["aws_secret_access_key"], "shh");
    }

    #[test]
    fn test_parse_secret_rejects_plain_string() {
        let response = json!({"SecretString": "hunter2"});
        assert!(matches!(
            parse_secret("plain", &response),
            Err(TowerError::Secret(_))
        ));
        assert!(parse_secret("binary", &json!({"SecretBinary": "AA=="})).is_err());
    }
}
