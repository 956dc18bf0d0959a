use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::storage::StorageError;

/// A token payload could not be read. Callers treat this exactly like expiry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeFailure {
    #[error("Token has {0} segments, expected 3")]
    MalformedToken(usize),

    #[error("Token payload is not valid base64url")]
    InvalidEncoding,

    #[error("Token payload is not a claims object: {0}")]
    InvalidPayload(String),
}

/// Renewal did not produce a new token pair. Ends the session unless it
/// was already superseded.
///
/// Clone so that one pending renewal can hand the same outcome to every
/// caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenewalFailure {
    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Renewal rejected with status {0}")]
    Rejected(u16),

    #[error("Renewal request failed: {0}")]
    Transport(String),

    #[error("Invalid renewal response: {0}")]
    InvalidResponse(String),

    #[error("Failed to persist renewed tokens: {0}")]
    Storage(String),

    /// The session was cleared or replaced while the exchange was running
    #[error("Session changed during renewal")]
    Superseded,
}

/// Server-declared (or locally detected) problems with submitted fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub message: String,
    /// Per-field messages, keyed by field name
    pub fields: BTreeMap<String, Vec<String>>,
}

impl ValidationFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Build from an error response body.
    ///
    /// Uses `detail` when the server sends one, otherwise collects
    /// `{"field": ["msg", ...]}` entries. Falls back to `fallback` when the
    /// body carries neither.
    pub fn from_body(body: &str, fallback: &str) -> Self {
        let parsed = match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => map,
            _ => return Self::new(fallback),
        };

        let mut fields = BTreeMap::new();
        for (name, value) in &parsed {
            if name == "detail" {
                continue;
            }
            let messages: Vec<String> = match value {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
                _ => continue,
            };
            if !messages.is_empty() {
                fields.insert(name.clone(), messages);
            }
        }

        let message = match parsed.get("detail").and_then(Value::as_str) {
            Some(detail) => detail.to_string(),
            None if !fields.is_empty() => fields
                .iter()
                .map(|(name, msgs)| format!("{}: {}", name, msgs.join(" ")))
                .collect::<Vec<_>>()
                .join("; "),
            None => fallback.to_string(),
        };

        Self { message, fields }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationFailure {}

#[derive(Error, Debug)]
pub enum LoginFailure {
    #[error("{0}")]
    Rejected(ValidationFailure),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid login response: {0}")]
    InvalidResponse(String),

    #[error("Failed to persist session: {0}")]
    Storage(#[from] StorageError),
}
