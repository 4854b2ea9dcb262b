use std::env;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use nftower_core::error::{Result, TowerError};
use nftower_messages::{msg, MESSAGES};

use crate::gateway::{Gateway, Method, Pages, Query, DEFAULT_PAGE_SIZE};

/// Environment variable holding the Tower API token.
pub const TOKEN_ENV: &str = "NXF_TOWER_TOKEN";
/// Environment variable overriding the Tower API base URL.
pub const ENDPOINT_ENV: &str = "TOWER_API_ENDPOINT";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Object keys whose values never reach the logs.
const SENSITIVE_KEYS: &[&str] = &["keys", "secretKey", "password", "token", "accessToken"];
const REDACTED: &str = "***";

/// Copy of a JSON payload safe to log: every value under a sensitive key is masked.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let value = if SENSITIVE_KEYS.contains(&key.as_str()) {
                        mask(value)
                    } else {
                        redact(value)
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

fn mask(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), mask(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(mask).collect()),
        Value::Null => Value::Null,
        _ => Value::String(REDACTED.to_string()),
    }
}

/// Read the API token once at startup.
pub fn token_from_env() -> Result<String> {
    env::var(TOKEN_ENV)
        .ok()
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| TowerError::Config(msg!(MESSAGES.config.token_missing)))
}

/// Blocking Tower REST client authenticated with a bearer token.
pub struct TowerClient {
    client: Client,
    base_url: String,
    token: String,
    page_size: u32,
}

impl TowerClient {
    pub fn new(endpoint: &str, token: impl Into<String>) -> Result<Self> {
        let parsed = Url::parse(endpoint)
            .map_err(|e| TowerError::Config(format!("Invalid Tower API endpoint '{endpoint}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TowerError::Config(format!(
                "Tower API endpoint '{endpoint}' must use http or https"
            )));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TowerError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            token: token.into(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Build a client whose token comes from `NXF_TOWER_TOKEN`.
    pub fn from_env(endpoint: &str) -> Result<Self> {
        Self::new(endpoint, token_from_env()?)
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn reqwest_method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl Gateway for TowerClient {
    fn request(
        &self,
        method: Method,
        path: &str,
        query: Query<'_>,
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, query = ?query, "Tower API request");

        let mut builder = self
            .client
            .request(Self::reqwest_method(method), &url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .query(query);
        if let Some(body) = body {
            debug!(body = %redact(body), "Request body");
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .map_err(|e| TowerError::Network(format!("{method} {path}: {e}")))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|e| TowerError::Network(format!("{method} {path}: {e}")))?;
        let decoded = serde_json::from_str::<Value>(&text);
        match &decoded {
            Ok(value) => debug!(status = status.as_u16(), body = %redact(value), "Tower API response"),
            Err(_) => debug!(status = status.as_u16(), bytes = text.len(), "Tower API response"),
        }

        if status.is_server_error() {
            return Err(TowerError::Api(format!(
                "{method} {path} returned {status}: {}",
                text.trim()
            )));
        }
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(TowerError::Api(format!(
                "{method} {path} was rejected ({status}); check {TOKEN_ENV}"
            )));
        }

        // Client errors carry their reason in a JSON `message`, which callers
        // classify; anything that is not a JSON object decodes to `{}`.
        match decoded {
            Ok(value @ Value::Object(_)) => Ok(value),
            _ => Ok(Value::Object(Map::new())),
        }
    }

    fn paged_request(&self, method: Method, path: &str, query: Query<'_>) -> Pages<'_> {
        Pages::new(self, method, path, query, self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_rejects_invalid_endpoint() {
        assert!(matches!(
            TowerClient::new("not a url", "token"),
            Err(TowerError::Config(_))
        ));
        assert!(matches!(
            TowerClient::new("ftp://tower.example.org/api", "token"),
            Err(TowerError::Config(_))
        ));
    }

    #[test]
    fn test_redact_masks_credential_keys() {
        let body = serde_json::json!({
            "credentials": {
                "name": "demo-project",
                "provider": "aws",
                "keys": {
                    "accessKey": "AKIAEXAMPLE",
                    "secretKey": "wJalrXUtnFEMI",
                    "assumeRoleArn": "arn:aws:iam::1:role/tower"
                }
            }
        });
        let redacted = redact(&body);
        assert_eq!(redacted["credentials"]["name"], "demo-project");
        assert_eq!(redacted["credentials"]["keys"]["accessKey"], "***");
        assert_eq!(redacted["credentials"]["keys"]["secretKey"], "***");
        assert_eq!(redacted["credentials"]["keys"]["assumeRoleArn"], "***");
        assert_eq!(body["credentials"]["keys"]["secretKey"], "wJalrXUtnFEMI");
    }

    #[test]
    fn test_redact_walks_arrays() {
        let body = serde_json::json!({"items": [{"secretKey": "x"}, {"name": "y"}]});
        let redacted = redact(&body);
        assert_eq!(redacted["items"][0]["secretKey"], "***");
        assert_eq!(redacted["items"][1]["name"], "y");
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = TowerClient::new("https://tower.example.org/api/", "token").unwrap();
        assert_eq!(client.base_url(), "https://tower.example.org/api");
    }

    #[test]
    #[serial]
    fn test_token_from_env() {
        env::remove_var(TOKEN_ENV);
        let err = token_from_env().unwrap_err();
        assert!(err.to_string().contains("NXF_TOWER_TOKEN"));

        env::set_var(TOKEN_ENV, "  ");
        assert!(token_from_env().is_err());

        env::set_var(TOKEN_ENV, "secret-token");
        assert_eq!(token_from_env().unwrap(), "secret-token");
        env::remove_var(TOKEN_ENV);
    }
}
