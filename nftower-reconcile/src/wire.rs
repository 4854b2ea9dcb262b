//! Typed views of the Tower API payloads the reconcilers read.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use nftower_config::Role;
use nftower_core::error::{Result, TowerError};
use nftower_gateway::{response_message, Pages};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationDto {
    pub org_id: u64,
    pub name: String,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDto {
    pub member_id: u64,
    pub email: String,
    #[serde(default)]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamDto {
    pub team_id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDto {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDto {
    pub participant_id: u64,
    #[serde(default)]
    pub member_id: Option<u64>,
    #[serde(default)]
    pub team_id: Option<u64>,
    pub wsp_role: Role,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub team_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDto {
    pub id: String,
    pub name: String,
    pub provider: String,
    /// Null unless the entry was soft-deleted.
    #[serde(default)]
    pub deleted: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelDto {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeEnvDto {
    pub id: String,
    pub name: String,
    pub platform: String,
    pub status: String,
}

pub fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| TowerError::UnexpectedResponse(format!("malformed {what}: {e}")))
}

/// Decode the array stored under `key` of a listing response.
pub fn decode_list<T: DeserializeOwned>(mut response: Value, key: &str, what: &str) -> Result<Vec<T>> {
    match response.get_mut(key).map(Value::take) {
        Some(items @ Value::Array(_)) => decode(items, what),
        _ => Err(TowerError::UnexpectedResponse(format!(
            "listing of {what} has no '{key}' array"
        ))),
    }
}

/// Fail when an update call answered with an error `message`.
pub fn expect_success(response: &Value, action: &str) -> Result<()> {
    match response_message(response) {
        Some(reason) => Err(TowerError::Api(format!("could not {action}: {reason}"))),
        None => Ok(()),
    }
}

/// Drain a paginated listing into typed items.
pub fn decode_pages<T: DeserializeOwned>(pages: Pages<'_>, what: &str) -> Result<Vec<T>> {
    pages.map(|item| decode(item?, what)).collect()
}
