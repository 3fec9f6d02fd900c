//! Error types for the Mailchimp client core.
//!
//! # Design
//! Callers need to tell "could not reach the service" apart from "the service
//! rejected the request", so transport failures and remote-reported failures
//! are separate variants of `ChimpError`. Partial batch failures are not
//! errors at all; they come back as data in the batch result types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience alias used by every `Connection` operation.
pub type Result<T> = std::result::Result<T, ChimpError>;

/// Errors returned by `Connection` operations.
#[derive(Debug, Error)]
pub enum ChimpError {
    /// The request never produced a usable HTTP response.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The remote API reported a failure for this action.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// A success response did not match the action's result shape.
    #[error("unexpected response for {method}: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// Caller-supplied parameters could not be turned into request fields.
    #[error("failed to encode parameters: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// `list_interest_groups` found no grouping with this id on the list.
    #[error("interest grouping {0} not found")]
    UnknownGrouping(u64),
}

impl ChimpError {
    /// The remote error, if this is an API-reported failure.
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            ChimpError::Api(err) => Some(err),
            _ => None,
        }
    }
}

/// Failures below the API layer: network, TLS, or a non-2xx status whose
/// body is not an API error object.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Network(#[from] ureq::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// A failure reported by the remote API, carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("API error{}: {message}", .code.as_ref().map(|code| format!(" {code}")).unwrap_or_default())]
pub struct ApiError {
    pub code: Option<ErrorCode>,
    pub message: String,
}

/// The remote `code` field, kept exactly as sent. Numbers keep their JSON
/// form, so floats and values beyond `i64` survive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    Number(serde_json::Number),
    Text(String),
    Other(serde_json::Value),
}

impl ErrorCode {
    /// Classify a raw `code` value; `null` counts as no code.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Number(n) => Some(ErrorCode::Number(n.clone())),
            serde_json::Value::String(s) => Some(ErrorCode::Text(s.clone())),
            other => Some(ErrorCode::Other(other.clone())),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ErrorCode::Number(n) => n.as_i64(),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Number(n) => write!(f, "{n}"),
            ErrorCode::Text(s) => f.write_str(s),
            ErrorCode::Other(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ErrorCode {
    fn from(n: i64) -> Self {
        ErrorCode::Number(n.into())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("invalid endpoint {url}: {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },
}
