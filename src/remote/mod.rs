//! Remote procedure boundary
//!
//! The orchestration layer treats remote functions as opaque: a name plus a
//! JSON parameter object in, JSON or an error out. [`RemoteCaller`] is the sole
//! seam; [`HttpRemoteCaller`] talks to a PostgREST-style `/rpc` endpoint and
//! tests plug in scripted callers.

pub mod http;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::RemoteError;

pub use http::HttpRemoteCaller;

/// Invoke a named remote function.
#[async_trait]
pub trait RemoteCaller: Send + Sync {
    /// `Ok` carries whatever the function returned, including `null`.
    /// Any transport, authorization or server failure is an `Err`.
    async fn call(&self, function: &str, params: &Map<String, Value>) -> Result<Value, RemoteError>;
}

/// Tagged classification of a successful call.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    /// Non-empty payload
    Rows(Value),
    /// `null`, `[]` or `{}`, kept as returned
    Empty(Value),
}

impl RemoteOutcome {
    pub fn classify(payload: Value) -> Self {
        let empty = match &payload {
            Value::Null => true,
            Value::Array(rows) => rows.is_empty(),
            Value::Object(fields) => fields.is_empty(),
            _ => false,
        };
        if empty {
            RemoteOutcome::Empty(payload)
        } else {
            RemoteOutcome::Rows(payload)
        }
    }

    /// Row count for continuation: array length, one for any other payload.
    pub fn row_count(&self) -> usize {
        match self {
            RemoteOutcome::Rows(Value::Array(rows)) => rows.len(),
            RemoteOutcome::Rows(_) => 1,
            RemoteOutcome::Empty(_) => 0,
        }
    }
}
