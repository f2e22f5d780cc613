//! Consumption Hook - the per-page binding views interact with.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  Arc<FilterState>  ┌────────────────────────────────────┐
//! │ FilterStore  │ ─────watch───────▶ │ Driver task (one per QueryHandle)  │
//! └──────────────┘                    │  ParameterMapper → fingerprint     │
//!                                     │  SingleFlight    → QueryExecutor   │
//! ┌──────────────┐  Retry / LoadMore  │  FallbackResolver→ QueryState      │
//! │ QueryHandle  │ ─────mpsc────────▶ │                                    │
//! │              │ ◀────watch──────── │  publish (only while alive)        │
//! └──────────────┘     QueryState     └────────────────────────────────────┘
//! ```
//!
//! ## Trigger policy
//!
//! A request is issued when:
//! 1. the mapped parameter set changes value (serialized comparison) while
//!    the hook is enabled, through a filter change or `set_param()`,
//! 2. `retry()` is called (always offset 0, replaces data),
//! 3. `load_more()` is called while `has_more` is set and nothing is in flight
//!    (next offset, appends data). A debounced filter change still waiting
//!    for its deadline is issued instead, from offset 0.
//!
//! Every new request supersedes the one in flight.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::QueryError;
use crate::executor::{
    FetchMode, PageWindow, Pagination, PreparedCall, QueryExecutor, QueryRequest, Settled,
    SingleFlight, DEFAULT_PAGE_SIZE,
};
use crate::fallback::{FallbackNotice, FallbackResolver, Resolution};
use crate::filters::{FilterState, FilterStore, FilterWatcher};
use crate::remote::RemoteOutcome;

// =============================================================================
// OPTIONS AND STATE
// =============================================================================

/// What a page asks for.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Remote function; `None` runs the page front-end only
    pub function: Option<String>,
    /// Substitute data for empty or failed live results
    pub fallback: Option<Value>,
    pub enabled: bool,
    pub timeout: Option<Duration>,
    /// Offset/limit pagination
    pub paginate: bool,
    /// Page size; the context's size when unset
    pub page_size: Option<usize>,
    /// Call-specific parameters merged over the filter-derived ones
    pub overrides: Map<String, Value>,
    /// Quiet period before a filter change triggers a request
    pub debounce: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            function: None,
            fallback: None,
            enabled: true,
            timeout: None,
            paginate: false,
            page_size: None,
            overrides: Map::new(),
            debounce: None,
        }
    }
}

impl QueryOptions {
    pub fn remote(function: impl Into<String>) -> Self {
        Self {
            function: Some(function.into()),
            ..Self::default()
        }
    }

    /// Front-end-only page: never calls out.
    pub fn local() -> Self {
        Self::default()
    }

    pub fn fallback(mut self, data: Value) -> Self {
        self.fallback = Some(data);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Paginate with the context's page size.
    pub fn paginate(mut self) -> Self {
        self.paginate = true;
        self
    }

    /// Paginate with a fixed page size.
    pub fn page_size(mut self, limit: usize) -> Self {
        self.paginate = true;
        self.page_size = Some(limit);
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overrides.insert(name.into(), value.into());
        self
    }

    pub fn debounce(mut self, quiet: Duration) -> Self {
        self.debounce = Some(quiet);
        self
    }
}

/// What a view renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryState {
    /// Read-only for consumers
    pub data: Option<Value>,
    pub loading: bool,
    pub error: Option<QueryError>,
    /// Data is substitute (demo/offline) data
    pub is_mock: bool,
    pub notice: Option<FallbackNotice>,
    pub pagination: Pagination,
}

impl QueryState {
    fn initial(limit: usize, loading: bool) -> Self {
        Self {
            data: None,
            loading,
            error: None,
            is_mock: false,
            notice: None,
            pagination: Pagination::initial(limit),
        }
    }

    /// Deserialize `data` into a caller type.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.data.clone().map(serde_json::from_value)
    }

    /// Number of accumulated rows (array data), or 0.
    pub fn row_count(&self) -> usize {
        match &self.data {
            Some(Value::Array(rows)) => rows.len(),
            _ => 0,
        }
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Everything a hook needs, passed explicitly instead of living in globals.
#[derive(Clone)]
pub struct QueryContext {
    store: Arc<FilterStore>,
    executor: QueryExecutor,
    page_size: usize,
}

impl QueryContext {
    pub fn new(store: Arc<FilterStore>, executor: QueryExecutor) -> Self {
        Self {
            store,
            executor,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Page size for hooks that call [`QueryOptions::paginate`] without
    /// fixing their own.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn store(&self) -> &Arc<FilterStore> {
        &self.store
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Mount a hook. Must be called inside a tokio runtime.
    ///
    /// The first request (if any) is issued immediately; dropping the handle
    /// unmounts it.
    pub fn bind(&self, options: QueryOptions) -> QueryHandle {
        let id = Uuid::new_v4();
        let resolver = FallbackResolver::new(options.fallback.clone());
        let limit = options.page_size.unwrap_or(self.page_size).max(1);
        let alive = Arc::new(AtomicBool::new(true));

        let Some(function) = options.function.clone() else {
            // front-end-only page: settle right away, never touch the network
            let mut state = QueryState::initial(limit, false);
            apply_resolution(&mut state, resolver.without_remote(), Pagination::initial(limit));
            tracing::debug!(hook = %id, mock = state.is_mock, "front-end-only query bound");
            let (_tx, rx) = watch::channel(state);
            return QueryHandle {
                id,
                state: rx,
                commands: None,
                alive,
                task: None,
            };
        };

        let (tx, rx) = watch::channel(QueryState::initial(limit, options.enabled));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let mut filters = self.store.watch();
        let current_filters = filters.borrow_and_update().clone();

        let span = tracing::debug_span!("query_hook", hook = %id, function = %function);
        let driver = Driver {
            function,
            options,
            limit,
            executor: self.executor.clone(),
            resolver,
            filters,
            current_filters,
            commands: command_rx,
            publisher: Publisher {
                tx,
                alive: alive.clone(),
            },
            flight: SingleFlight::new(),
            state: QueryState::initial(limit, false),
            last_fingerprint: None,
            refresh_at: None,
        };
        let task = tokio::spawn(driver.run().instrument(span));

        QueryHandle {
            id,
            state: rx,
            commands: Some(command_tx),
            alive,
            task: Some(task),
        }
    }
}

// =============================================================================
// HANDLE
// =============================================================================

#[derive(Debug)]
enum Command {
    Retry,
    LoadMore,
    SetEnabled(bool),
    SetParam(String, Value),
}

/// A mounted hook. Dropping it unmounts: no state is published afterwards and
/// any request in flight is abandoned.
pub struct QueryHandle {
    id: Uuid,
    state: watch::Receiver<QueryState>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    alive: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl QueryHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state snapshot.
    pub fn state(&self) -> QueryState {
        self.state.borrow().clone()
    }

    /// Independent receiver for views that render on change.
    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.state.clone()
    }

    /// Wait for the next published state. Returns `false` once the hook can
    /// no longer change.
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }

    /// Wait until `predicate` holds for the published state.
    pub async fn wait_for<F>(&mut self, predicate: F) -> QueryState
    where
        F: Fn(&QueryState) -> bool,
    {
        loop {
            {
                let state = self.state.borrow_and_update();
                if predicate(&state) {
                    return state.clone();
                }
            }
            if self.state.changed().await.is_err() {
                return self.state.borrow().clone();
            }
        }
    }

    /// Wait until nothing is loading.
    pub async fn settled(&mut self) -> QueryState {
        self.wait_for(|state| !state.loading).await
    }

    /// Refetch from offset 0, replacing data.
    pub fn retry(&self) {
        self.send(Command::Retry);
    }

    /// Fetch the next page and append it.
    pub fn load_more(&self) {
        self.send(Command::LoadMore);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.send(Command::SetEnabled(enabled));
    }

    /// Replace one call-specific parameter. Refetches from offset 0 when the
    /// mapped parameters change.
    pub fn set_param(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.send(Command::SetParam(name.into(), value.into()));
    }

    pub fn is_mounted(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Explicit unmount; equivalent to dropping the handle.
    pub fn unmount(self) {}

    fn send(&self, command: Command) {
        if let Some(commands) = &self.commands {
            if commands.send(command).is_err() {
                tracing::debug!(hook = %self.id, "query driver has stopped, command dropped");
            }
        }
    }
}

impl Drop for QueryHandle {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// =============================================================================
// DRIVER
// =============================================================================

struct Publisher {
    tx: watch::Sender<QueryState>,
    alive: Arc<AtomicBool>,
}

impl Publisher {
    fn publish(&self, state: &QueryState) {
        if !self.alive.load(Ordering::SeqCst) {
            tracing::trace!("hook unmounted, dropping state update");
            return;
        }
        self.tx.send_replace(state.clone());
    }
}

struct Driver {
    function: String,
    options: QueryOptions,
    limit: usize,
    executor: QueryExecutor,
    resolver: FallbackResolver,
    filters: FilterWatcher,
    current_filters: Arc<FilterState>,
    commands: mpsc::UnboundedReceiver<Command>,
    publisher: Publisher,
    flight: SingleFlight,
    state: QueryState,
    last_fingerprint: Option<String>,
    refresh_at: Option<Instant>,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl Driver {
    async fn run(mut self) {
        if self.options.enabled {
            self.refresh(false);
        }

        loop {
            tokio::select! {
                changed = self.filters.changed() => {
                    if changed.is_err() {
                        tracing::debug!("filter store dropped, stopping");
                        break;
                    }
                    self.current_filters = self.filters.borrow_and_update().clone();
                    self.on_filters_changed();
                }
                command = self.commands.recv() => match command {
                    Some(Command::Retry) => self.retry(),
                    Some(Command::LoadMore) => self.load_more(),
                    Some(Command::SetEnabled(enabled)) => self.set_enabled(enabled),
                    Some(Command::SetParam(name, value)) => self.set_param(name, value),
                    None => break,
                },
                settled = self.flight.settled() => self.on_settled(settled),
                _ = wait_until(self.refresh_at) => {
                    self.refresh_at = None;
                    self.refresh(false);
                }
            }
        }

        self.flight.cancel();
    }

    fn paginated(&self) -> bool {
        self.options.paginate
    }

    fn request(&self, window: Option<PageWindow>) -> QueryRequest {
        let mut request = QueryRequest::new(self.function.clone(), self.current_filters.clone())
            .with_overrides(self.options.overrides.clone());
        if let Some(window) = window {
            request = request.with_window(window);
        }
        if let Some(timeout) = self.options.timeout {
            request = request.with_timeout(timeout);
        }
        request
    }

    fn first_window(&self) -> Option<PageWindow> {
        self.paginated().then(|| PageWindow::first(self.limit))
    }

    fn on_filters_changed(&mut self) {
        if !self.options.enabled {
            return;
        }
        match self.options.debounce {
            Some(quiet) => self.refresh_at = Some(Instant::now() + quiet),
            None => self.refresh(false),
        }
    }

    /// Issue an offset-0 request. Without `force`, nothing happens when the
    /// parameters are unchanged since the last issued request.
    fn refresh(&mut self, force: bool) {
        let window = self.first_window();
        let prepared = self.executor.prepare(&self.request(window));
        let fingerprint = match &prepared {
            Ok(call) => call.fingerprint(),
            Err(e) => format!("!{e}"),
        };
        if !force && self.last_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            tracing::trace!("parameters unchanged, no request");
            return;
        }
        self.last_fingerprint = Some(fingerprint);
        self.refresh_at = None;

        match prepared {
            Ok(call) => self.launch(FetchMode::Reset, window, call),
            Err(e) => {
                self.flight.cancel();
                tracing::warn!(error = %e, "request could not be prepared");
                let resolution = self.resolver.resolve(&self.function, Err(e));
                apply_resolution(&mut self.state, resolution, Pagination::initial(self.limit));
                self.publisher.publish(&self.state);
            }
        }
    }

    fn retry(&mut self) {
        if !self.options.enabled {
            tracing::debug!("retry ignored while disabled");
            return;
        }
        self.refresh(true);
    }

    fn load_more(&mut self) {
        if !self.paginated() {
            tracing::debug!("load_more ignored, query is not paginated");
            return;
        }
        if self.refresh_at.take().is_some() {
            // a debounced filter change is pending: it restarts at offset 0
            self.refresh(false);
        }
        if !self.options.enabled || !self.state.pagination.has_more || self.flight.is_in_flight() {
            tracing::trace!(
                has_more = self.state.pagination.has_more,
                in_flight = self.flight.is_in_flight(),
                "load_more ignored"
            );
            return;
        }

        let window = self.state.pagination.next_window();
        match self.executor.prepare(&self.request(Some(window))) {
            Ok(call) => self.launch(FetchMode::Append, Some(window), call),
            Err(e) => {
                self.state.error = Some(e);
                self.publisher.publish(&self.state);
            }
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        if self.options.enabled == enabled {
            return;
        }
        self.options.enabled = enabled;
        if enabled {
            self.refresh(false);
        } else {
            self.refresh_at = None;
            if self.flight.cancel() {
                self.state.loading = false;
                self.publisher.publish(&self.state);
            }
            // the abandoned request must be reissued on re-enable
            self.last_fingerprint = None;
        }
    }

    fn set_param(&mut self, name: String, value: Value) {
        self.options.overrides.insert(name, value);
        if self.options.enabled {
            self.refresh(false);
        }
    }

    fn launch(&mut self, mode: FetchMode, window: Option<PageWindow>, call: PreparedCall) {
        let executor = self.executor.clone();
        let generation = self
            .flight
            .launch(mode, window, async move { executor.execute(call).await });
        tracing::debug!(generation, ?mode, ?window, "request issued");

        self.state.loading = true;
        self.state.error = None;
        self.publisher.publish(&self.state);
    }

    fn on_settled(&mut self, settled: Settled) {
        match settled.mode {
            FetchMode::Reset => {
                let pagination = match (&settled.result, settled.window) {
                    (Ok(outcome), Some(window)) => Pagination::after_page(window, outcome.row_count()),
                    _ => Pagination::initial(self.limit),
                };
                let resolution = self.resolver.resolve(&self.function, settled.result);
                // substitute data has no further pages
                let pagination = if resolution.is_fallback {
                    Pagination::initial(self.limit)
                } else {
                    pagination
                };
                apply_resolution(&mut self.state, resolution, pagination);
            }
            FetchMode::Append => {
                let window = settled
                    .window
                    .unwrap_or_else(|| self.state.pagination.next_window());
                match settled.result {
                    Ok(outcome) => {
                        let rows = outcome.row_count();
                        if let RemoteOutcome::Rows(page) = outcome {
                            append_rows(&mut self.state.data, page);
                        }
                        self.state.pagination = Pagination::after_page(window, rows);
                        self.state.error = None;
                    }
                    Err(e) => {
                        // earlier pages stay; only this page failed
                        tracing::warn!(
                            error = %e,
                            offset = window.offset,
                            kept = self.state.row_count(),
                            "next page failed"
                        );
                        self.state.error = Some(e);
                    }
                }
                self.state.loading = false;
            }
        }
        self.publisher.publish(&self.state);
    }
}

fn apply_resolution(state: &mut QueryState, resolution: Resolution, pagination: Pagination) {
    state.data = resolution.data;
    state.error = resolution.error;
    state.is_mock = resolution.is_fallback;
    state.notice = resolution.notice;
    state.pagination = pagination;
    state.loading = false;
}

fn append_rows(data: &mut Option<Value>, page: Value) {
    match data {
        Some(Value::Array(rows)) => match page {
            Value::Array(more) => rows.extend(more),
            other => rows.push(other),
        },
        slot => *slot = Some(page),
    }
}
