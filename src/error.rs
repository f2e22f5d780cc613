//! Error types for dashboard-query
//!
//! Errors are layered the same way requests are:
//!
//! ```text
//! RemoteCaller   → RemoteError   (transport / server / timeout)
//! ParameterMapper → MappingError (marshalling, one request only)
//!                        │
//!                        ▼
//!               QueryError { kind, message }   ← the only shape consumers see
//! ```
//!
//! Superseded requests never produce an error value at all: the executor's
//! single-flight slot drops them before they settle.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Failure reported by a [`crate::remote::RemoteCaller`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// Connection, DNS, TLS or body read failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// The remote function ran and returned a structured error
    #[error("remote function failed ({status}): {message}")]
    Server { status: u16, message: String },

    /// The caller-specified timeout elapsed before the call settled
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Failure while turning a request into a named-parameter object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("query descriptor is invalid: {0}")]
    InvalidDescriptor(String),

    #[error("parameter '{param}' is not a calendar date: {value}")]
    InvalidDate { param: String, value: String },
}

/// Coarse classification of a [`QueryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Timeout,
    Server,
    Marshalling,
}

/// Normalized error delivered to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct QueryError {
    pub kind: ErrorKind,
    pub message: String,
}

impl QueryError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Transport and timeout failures are worth retrying; server and
    /// marshalling failures will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ErrorKind::Transport | ErrorKind::Timeout)
    }
}

impl From<RemoteError> for QueryError {
    fn from(err: RemoteError) -> Self {
        let kind = match &err {
            RemoteError::Transport(_) => ErrorKind::Transport,
            RemoteError::Server { .. } => ErrorKind::Server,
            RemoteError::Timeout(_) => ErrorKind::Timeout,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<MappingError> for QueryError {
    fn from(err: MappingError) -> Self {
        Self::new(ErrorKind::Marshalling, err.to_string())
    }
}

/// Errors raised while loading configuration or descriptor files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid descriptor YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("environment variable {name} is invalid: {reason}")]
    Env { name: String, reason: String },

    #[error("duplicate query descriptor '{0}'")]
    DuplicateDescriptor(String),
}
