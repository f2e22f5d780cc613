//! Query Executor - issues remote calls for filter-derived requests.
//!
//! [`QueryExecutor`] is shared and stateless: it prepares a request (parameter
//! mapping plus pagination window) and races the remote call against a
//! timeout. Per-subscriber state lives in [`SingleFlight`] and [`Pagination`],
//! owned by whoever drives the requests (see [`crate::hook`]).

pub mod flight;
pub mod pagination;

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{QueryError, RemoteError};
use crate::filters::FilterState;
use crate::params::ParameterMapper;
use crate::remote::{RemoteCaller, RemoteOutcome};

pub use flight::{FetchMode, FetchResult, Settled, SingleFlight};
pub use pagination::{PageWindow, Pagination, DEFAULT_PAGE_SIZE};

/// Applied when neither the request nor the executor sets a timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One request: a function, a filter snapshot and call-specific overrides.
/// Built fresh for every filter change, retry or continuation.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub function: String,
    pub filters: Arc<FilterState>,
    pub overrides: Map<String, Value>,
    /// Offset/limit sent as the generic `offset`/`limit` keys
    pub window: Option<PageWindow>,
    pub timeout: Option<Duration>,
}

impl QueryRequest {
    pub fn new(function: impl Into<String>, filters: Arc<FilterState>) -> Self {
        Self {
            function: function.into(),
            filters,
            overrides: Map::new(),
            window: None,
            timeout: None,
        }
    }

    pub fn with_overrides(mut self, overrides: Map<String, Value>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_window(mut self, window: PageWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A request with its parameters resolved, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCall {
    pub function: String,
    pub params: Map<String, Value>,
    pub timeout: Duration,
}

impl PreparedCall {
    /// Serialized parameter set; equal fingerprints mean an identical call.
    pub fn fingerprint(&self) -> String {
        format!("{}:{}", self.function, Value::Object(self.params.clone()))
    }
}

#[derive(Clone)]
pub struct QueryExecutor {
    caller: Arc<dyn RemoteCaller>,
    mapper: ParameterMapper,
    default_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(caller: Arc<dyn RemoteCaller>, mapper: ParameterMapper) -> Self {
        Self {
            caller,
            mapper,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn mapper(&self) -> &ParameterMapper {
        &self.mapper
    }

    pub fn caller(&self) -> Arc<dyn RemoteCaller> {
        self.caller.clone()
    }

    /// Resolve parameters. Mapping failures fail this request only.
    pub fn prepare(&self, request: &QueryRequest) -> Result<PreparedCall, QueryError> {
        let mut overrides = request.overrides.clone();
        if let Some(window) = request.window {
            overrides.insert("offset".into(), window.offset.into());
            overrides.insert("limit".into(), window.limit.into());
        }
        let params = self
            .mapper
            .map(&request.function, &request.filters, &overrides)?;
        Ok(PreparedCall {
            function: request.function.clone(),
            params,
            timeout: request.timeout.unwrap_or(self.default_timeout),
        })
    }

    /// Send a prepared call. Whichever of the call and the timer settles
    /// first wins; a lost call is dropped.
    pub async fn execute(&self, call: PreparedCall) -> Result<RemoteOutcome, QueryError> {
        tracing::debug!(function = %call.function, timeout_ms = call.timeout.as_millis() as u64, "calling remote function");
        let started = std::time::Instant::now();

        let result = tokio::time::timeout(
            call.timeout,
            self.caller.call(&call.function, &call.params),
        )
        .await
        .unwrap_or(Err(RemoteError::Timeout(call.timeout)));

        match result {
            Ok(payload) => {
                let outcome = RemoteOutcome::classify(payload);
                tracing::debug!(
                    function = %call.function,
                    rows = outcome.row_count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "remote function returned"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(function = %call.function, error = %e, "remote function failed");
                Err(e.into())
            }
        }
    }

    /// Prepare and execute in one step.
    pub async fn run(&self, request: &QueryRequest) -> Result<RemoteOutcome, QueryError> {
        let call = self.prepare(request)?;
        self.execute(call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::params::{DescriptorRegistry, QueryDescriptor};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records parameters and answers after `delay`.
    struct SlowEcho {
        delay: Duration,
        seen: Mutex<Vec<Map<String, Value>>>,
    }

    #[async_trait]
    impl RemoteCaller for SlowEcho {
        async fn call(&self, _function: &str, params: &Map<String, Value>) -> Result<Value, RemoteError> {
            self.seen.lock().unwrap().push(params.clone());
            tokio::time::sleep(self.delay).await;
            Ok(json!([params.clone()]))
        }
    }

    fn executor(delay: Duration) -> (QueryExecutor, Arc<SlowEcho>) {
        let caller = Arc::new(SlowEcho {
            delay,
            seen: Mutex::new(Vec::new()),
        });
        let mut registry = DescriptorRegistry::new();
        registry
            .register(QueryDescriptor::new(
                "get_client_list",
                ["p_start_date", "p_limit", "p_offset"],
            ))
            .unwrap();
        let mapper = ParameterMapper::new(Arc::new(registry));
        (QueryExecutor::new(caller.clone(), mapper), caller)
    }

    fn filters() -> Arc<FilterState> {
        Arc::new(FilterState::new(NaiveDate::from_ymd_opt(2025, 2, 14).unwrap()))
    }

    #[tokio::test]
    async fn window_is_sent_as_offset_and_limit() {
        let (executor, caller) = executor(Duration::ZERO);
        let request = QueryRequest::new("get_client_list", filters())
            .with_window(PageWindow { offset: 2000, limit: 1000 });

        let outcome = executor.run(&request).await.unwrap();

        assert_eq!(outcome.row_count(), 1);
        let seen = caller.seen.lock().unwrap();
        assert_eq!(seen[0]["p_offset"], json!(2000));
        assert_eq!(seen[0]["p_limit"], json!(1000));
        assert_eq!(seen[0]["p_start_date"], json!("2025-02-01"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let (executor, _) = executor(Duration::from_secs(60));
        let request = QueryRequest::new("get_client_list", filters())
            .with_timeout(Duration::from_millis(250));

        let err = executor.run(&request).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn default_timeout_is_finite() {
        let (executor, _) = executor(DEFAULT_TIMEOUT + Duration::from_secs(1));
        let err = executor
            .run(&QueryRequest::new("get_client_list", filters()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }

    #[test]
    fn fingerprint_tracks_parameter_values() {
        let (executor, _) = executor(Duration::ZERO);
        let a = executor
            .prepare(&QueryRequest::new("get_client_list", filters()))
            .unwrap();
        let b = executor
            .prepare(&QueryRequest::new("get_client_list", filters()))
            .unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = executor
            .prepare(
                &QueryRequest::new("get_client_list", filters())
                    .with_window(PageWindow::first(50)),
            )
            .unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[tokio::test]
    async fn mapping_failure_never_reaches_the_caller() {
        let (executor, caller) = executor(Duration::ZERO);
        let mut overrides = Map::new();
        overrides.insert("start_date".into(), json!("not a date"));
        let request = QueryRequest::new("get_client_list", filters()).with_overrides(overrides);

        let err = executor.run(&request).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Marshalling);
        assert!(caller.seen.lock().unwrap().is_empty());
    }
}
