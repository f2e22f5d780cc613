//! Fallback Resolver - live result or substitute dataset.
//!
//! | live outcome | fallback supplied | delivered                    | notice   |
//! |--------------|-------------------|------------------------------|----------|
//! | rows         | any               | live rows                    | none     |
//! | empty        | yes               | fallback, `is_fallback`      | Degraded |
//! | empty        | no                | empty live result            | none     |
//! | error        | yes               | fallback, `is_fallback`      | Offline  |
//! | error        | no                | error, `data = None`         | none     |
//!
//! Empty results are common, so their substitution is quiet. An error hidden
//! behind demo data would mask an outage, so that substitution is logged as a
//! warning and carries the original error message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueryError;
use crate::executor::FetchResult;
use crate::remote::RemoteOutcome;

/// Why substitute data is being shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackNotice {
    /// The live call succeeded but returned nothing
    Degraded,
    /// The live call failed; the page is running on demonstration data
    Offline { reason: String },
}

/// What the consumer should see for one settled request.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub data: Option<Value>,
    pub error: Option<QueryError>,
    pub is_fallback: bool,
    pub notice: Option<FallbackNotice>,
}

impl Resolution {
    fn live(data: Value) -> Self {
        Self {
            data: Some(data),
            error: None,
            is_fallback: false,
            notice: None,
        }
    }

    fn substitute(data: Value, notice: FallbackNotice) -> Self {
        Self {
            data: Some(data),
            error: None,
            is_fallback: true,
            notice: Some(notice),
        }
    }

    fn failed(error: QueryError) -> Self {
        Self {
            data: None,
            error: Some(error),
            is_fallback: false,
            notice: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FallbackResolver {
    fallback: Option<Value>,
}

impl FallbackResolver {
    pub fn new(fallback: Option<Value>) -> Self {
        Self { fallback }
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Front-end-only mode: no remote function configured.
    ///
    /// Surfaces the fallback immediately, or an empty non-error result when
    /// there is nothing to show.
    pub fn without_remote(&self) -> Resolution {
        match &self.fallback {
            Some(data) => Resolution {
                data: Some(data.clone()),
                error: None,
                is_fallback: true,
                notice: None,
            },
            None => Resolution {
                data: None,
                error: None,
                is_fallback: false,
                notice: None,
            },
        }
    }

    pub fn resolve(&self, function: &str, result: FetchResult) -> Resolution {
        match (result, &self.fallback) {
            (Ok(RemoteOutcome::Rows(data)), _) => Resolution::live(data),
            (Ok(RemoteOutcome::Empty(_)), Some(fallback)) => {
                tracing::info!(function, "live result empty, showing fallback data");
                Resolution::substitute(fallback.clone(), FallbackNotice::Degraded)
            }
            (Ok(RemoteOutcome::Empty(payload)), None) => Resolution::live(payload),
            (Err(error), Some(fallback)) => {
                tracing::warn!(function, error = %error, "remote call failed, showing demonstration data");
                Resolution::substitute(
                    fallback.clone(),
                    FallbackNotice::Offline {
                        reason: error.message,
                    },
                )
            }
            (Err(error), None) => Resolution::failed(error),
        }
    }
}
