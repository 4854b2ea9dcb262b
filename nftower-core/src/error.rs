use std::fmt::{self, Display, Formatter};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TowerError {
    Config(String),
    Validation(String),
    Network(String),
    Api(String),
    UnexpectedResponse(String),
    ProviderMismatch(String),
    Secret(String),
    StackOutputs(String),
    Command(String),
    Serialization(String),
    Io(#[from] std::io::Error),
    Scoped {
        scope: String,
        #[source]
        source: Box<TowerError>,
    },
    Other(#[from] anyhow::Error),
}

impl Display for TowerError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            TowerError::Config(s) => write!(f, "Configuration error: {}", s),
            TowerError::Validation(s) => write!(f, "Validation error: {}", s),
            TowerError::Network(s) => write!(f, "Network error: {}", s),
            TowerError::Api(s) => write!(f, "Tower API error: {}", s),
            TowerError::UnexpectedResponse(s) => write!(f, "Unexpected API response: {}", s),
            TowerError::ProviderMismatch(s) => {
                write!(f, "Provider mismatch: {}\n\n", s)?;
                write!(f, "Fix:\n")?;
                write!(f, "  • Inspect the entry in the Tower web interface\n")?;
                write!(f, "  • Delete or rename it before re-running")
            }
            TowerError::Secret(s) => write!(f, "Secret retrieval failed: {}", s),
            TowerError::StackOutputs(s) => write!(f, "Stack output error: {}", s),
            TowerError::Command(s) => write!(f, "Command failed: {}", s),
            TowerError::Serialization(s) => write!(f, "Serialization error: {}", s),
            TowerError::Io(e) => write!(f, "I/O error: {}", e),
            TowerError::Scoped { scope, source } => write!(f, "{}: {}", scope, source),
            TowerError::Other(e) => write!(f, "Other error: {}", e),
        }
    }
}

impl TowerError {
    /// Prefix the error with the entity and operation it happened in,
    /// e.g. `"workspace ensure"`.
    pub fn scoped(self, scope: impl Into<String>) -> Self {
        TowerError::Scoped {
            scope: scope.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error once all scopes are peeled off.
    pub fn root(&self) -> &TowerError {
        match self {
            TowerError::Scoped { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the error must halt the whole run rather than one project.
    pub fn is_data_integrity(&self) -> bool {
        matches!(self.root(), TowerError::ProviderMismatch(_))
    }
}

/// Attach an operation scope to any `Result` carrying a `TowerError`.
pub trait ResultExt<T> {
    fn scope(self, scope: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn scope(self, scope: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.scoped(scope))
    }
}

impl From<serde_yaml_ng::Error> for TowerError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        TowerError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for TowerError {
    fn from(err: serde_json::Error) -> Self {
        TowerError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TowerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_error_message_chains_scopes() {
        let err = TowerError::Api("boom".into())
            .scoped("credential ensure")
            .scoped("project 'foo-project'");
        assert_eq!(
            err.to_string(),
            "project 'foo-project': credential ensure: Tower API error: boom"
        );
        assert!(matches!(err.root(), TowerError::Api(_)));
    }

    #[test]
    fn test_provider_mismatch_is_data_integrity() {
        let err = TowerError::ProviderMismatch("azure".into()).scoped("credential ensure");
        assert!(err.is_data_integrity());
        assert!(!TowerError::Network("timeout".into()).is_data_integrity());
    }

    #[test]
    fn test_result_ext_scope() {
        let result: Result<()> = Err(TowerError::Network("reset".into()));
        let err = result.scope("organization ensure").unwrap_err();
        assert!(err.to_string().starts_with("organization ensure: Network error"));
    }
}
