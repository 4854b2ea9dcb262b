//! Typed decisions over Tower's free-text conflict messages.
//!
//! Tower reports "this already exists" and "this is in use" only through a
//! human-readable `message` field. The helpers here turn those responses into
//! variants the reconcilers can match on.

use serde_json::Value;

use nftower_core::error::{Result, TowerError};

/// Result of a create/add call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Created(T),
    AlreadyExists(String),
    Conflict(String),
}

impl Outcome<Value> {
    /// `response[key]` means the entity was created; otherwise the `message`
    /// decides between an existing entity and a real conflict.
    pub fn classify(mut response: Value, key: &str) -> Self {
        let entity = response
            .as_object_mut()
            .and_then(|fields| fields.remove(key))
            .filter(|entity| !entity.is_null());
        if let Some(entity) = entity {
            return Outcome::Created(entity);
        }
        match response_message(&response) {
            Some(message) if message.to_lowercase().contains("already") => {
                Outcome::AlreadyExists(message.to_string())
            }
            Some(message) => Outcome::Conflict(message.to_string()),
            None => Outcome::Conflict(format!("response has no '{key}' field")),
        }
    }
}

impl<T> Outcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Created(value) => Outcome::Created(f(value)),
            Outcome::AlreadyExists(reason) => Outcome::AlreadyExists(reason),
            Outcome::Conflict(reason) => Outcome::Conflict(reason),
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Outcome::Created(_))
    }

    /// The created entity, treating any other outcome as an API error.
    pub fn created(self, what: &str) -> Result<T> {
        match self {
            Outcome::Created(value) => Ok(value),
            Outcome::AlreadyExists(reason) | Outcome::Conflict(reason) => {
                Err(TowerError::Api(format!("could not create {what}: {reason}")))
            }
        }
    }
}

/// Result of a delete call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deletion {
    Removed,
    /// The entity is in use (e.g. a compute environment with running jobs).
    Busy(String),
    Refused(String),
}

impl Deletion {
    pub fn classify(response: &Value) -> Self {
        match response_message(response) {
            Some(message) if message.contains("active jobs") => Deletion::Busy(message.to_string()),
            Some(message) => Deletion::Refused(message.to_string()),
            None => Deletion::Removed,
        }
    }
}

/// The `message` field of an error body, if any.
pub fn response_message(response: &Value) -> Option<&str> {
    response.get("message").and_then(Value::as_str)
}

/// First single- or double-quoted substring of `message`.
///
/// ```
/// use nftower_gateway::extract_quoted;
///
/// assert_eq!(extract_quoted("User 'jdoe' is already a member"), Some("jdoe"));
/// assert_eq!(extract_quoted("no quotes here"), None);
/// ```
pub fn extract_quoted(message: &str) -> Option<&str> {
    let (start, quote) = message.char_indices().find(|(_, c)| *c == '\'' || *c == '"')?;
    let rest = &message[start + 1..];
    let end = rest.find(quote)?;
    Some(&rest[..end])
}
