//! Raw per-project descriptor as written in `*-project.yaml` files.
//!
//! Only the keys the provisioner reads are modelled; every other Sceptre key
//! (`dependencies`, `hooks`, `sceptre_user_data`, ...) is ignored.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_yaml_ng::Value;
use tracing::warn;

use nftower_core::error::{Result, TowerError};
use nftower_messages::{msg, MESSAGES};

use crate::identity::{extract_identities, ArnPolicy};
use crate::users::{Bucket, Users};

/// Template every Tower project stack must be rendered from.
pub const TOWER_PROJECT_TEMPLATE: &str = "tower-project.j2";
pub const READ_WRITE_PARAMETER: &str = "S3ReadWriteAccessArns";
pub const READ_ONLY_PARAMETER: &str = "S3ReadOnlyAccessArns";

/// A list of ARNs that tolerates the shapes found in real descriptors:
/// a sequence, a single string, an empty string or null.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArnList(pub Vec<String>);

impl ArnList {
    pub fn from_value(value: Option<&Value>) -> Self {
        let arns = match value {
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(|item| item.as_str())
                .map(str::trim)
                .filter(|arn| !arn.is_empty())
                .map(String::from)
                .collect(),
            Some(Value::String(arn)) if !arn.trim().is_empty() => vec![arn.trim().to_string()],
            _ => Vec::new(),
        };
        ArnList(arns)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for ArnList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(ArnList::from_value(Some(&value)))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateRef {
    pub path: Option<String>,
}

/// Explicit five-bucket user lists.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TowerUsers {
    pub owners: ArnList,
    pub admins: ArnList,
    pub maintainers: ArnList,
    pub launchers: ArnList,
    pub viewers: ArnList,
}

impl TowerUsers {
    fn buckets(&self) -> [(Bucket, &ArnList); 5] {
        [
            (Bucket::Owners, &self.owners),
            (Bucket::Admins, &self.admins),
            (Bucket::Maintainers, &self.maintainers),
            (Bucket::Launchers, &self.launchers),
            (Bucket::Viewers, &self.viewers),
        ]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectDescriptor {
    pub stack_name: Option<String>,
    pub template: Option<TemplateRef>,
    pub parameters: Option<IndexMap<String, Value>>,
    #[serde(default)]
    pub stack_tags: IndexMap<String, Value>,
    pub tower_users: Option<TowerUsers>,
}

impl ProjectDescriptor {
    /// Check the descriptor describes a Tower project stack.
    ///
    /// `label` names the descriptor in errors when it has no `stack_name`.
    pub fn validate(&self, label: &str) -> Result<&str> {
        let name = self.stack_name.as_deref().unwrap_or(label);
        let invalid = |reason: &str| {
            TowerError::Config(msg!(
                MESSAGES.config.invalid_descriptor,
                name = name,
                reason = reason
            ))
        };

        let stack_name = self
            .stack_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| invalid("missing 'stack_name'"))?;

        match self.template.as_ref().and_then(|t| t.path.as_deref()) {
            Some(TOWER_PROJECT_TEMPLATE) => {}
            Some(other) => {
                return Err(invalid(&format!(
                    "'template.path' is '{other}', expected '{TOWER_PROJECT_TEMPLATE}'"
                )))
            }
            None => return Err(invalid("missing 'template.path'")),
        }

        let parameters = self
            .parameters
            .as_ref()
            .ok_or_else(|| invalid("missing 'parameters'"))?;
        let has_access_lists = parameters.contains_key(READ_WRITE_PARAMETER)
            || parameters.contains_key(READ_ONLY_PARAMETER);
        if !has_access_lists && self.tower_users.is_none() {
            return Err(invalid(&format!(
                "'parameters' lists neither '{READ_WRITE_PARAMETER}' nor '{READ_ONLY_PARAMETER}' and there is no 'tower_users' block"
            )));
        }

        Ok(stack_name)
    }

    fn parameter_arns(&self, key: &str) -> ArnList {
        ArnList::from_value(self.parameters.as_ref().and_then(|p| p.get(key)))
    }

    /// Resolve the project's users from the access lists and the optional
    /// `tower_users` block.
    pub fn users(&self, policy: ArnPolicy) -> Result<Users> {
        let mut buckets = vec![
            (
                Bucket::Maintainers,
                extract_identities(&self.parameter_arns(READ_WRITE_PARAMETER).0, policy)?,
            ),
            (
                Bucket::Viewers,
                extract_identities(&self.parameter_arns(READ_ONLY_PARAMETER).0, policy)?,
            ),
        ];
        if let Some(tower_users) = &self.tower_users {
            for (bucket, arns) in tower_users.buckets() {
                buckets.push((bucket, extract_identities(&arns.0, policy)?));
            }
        }
        Ok(Users::from_buckets(buckets))
    }

    /// `stack_tags` as strings. Values left null by a resolver are dropped.
    pub fn string_tags(&self) -> IndexMap<String, String> {
        let mut tags = IndexMap::new();
        for (key, value) in &self.stack_tags {
            match scalar_to_string(value) {
                Some(text) => {
                    tags.insert(key.clone(), text);
                }
                None => warn!(tag = %key, "Ignoring stack tag without a literal value"),
            }
        }
        tags
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
