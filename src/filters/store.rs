//! FilterStore - process-wide filter state with change notification.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │            FilterStore                                       │
//! │  state: Arc<FilterState>  (replaced, never mutated in place) │
//! │  queue: patches waiting while listeners run                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │  listeners: synchronous callbacks (subscribe)                │
//! │  watch:     Arc<FilterState> snapshots (hook driver tasks)   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! `update_filters` is the only mutation entry point. A listener that calls
//! `update_filters` while being notified does not recurse: its patch is
//! queued and applied by the outer call once the current round of
//! notifications has finished.

use chrono::NaiveDate;
use serde_json::Map;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;

use super::options::FilterOptions;
use super::state::{FilterPatch, FilterState};
use crate::error::QueryError;
use crate::remote::RemoteCaller;

/// Receiver yielding every new filter snapshot.
pub type FilterWatcher = watch::Receiver<Arc<FilterState>>;

type Listener = Arc<dyn Fn(&FilterState) + Send + Sync>;

enum Mutation {
    Patch(FilterPatch),
    Reset(FilterState),
}

struct StoreInner {
    state: Arc<FilterState>,
    version: u64,
    queue: VecDeque<Mutation>,
    notifying: bool,
}

/// Shared filter store. Create once per session and hand it to every hook.
pub struct FilterStore {
    inner: Mutex<StoreInner>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
    sender: watch::Sender<Arc<FilterState>>,
    options: Mutex<FilterOptions>,
    options_error: Mutex<Option<QueryError>>,
    options_requested: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FilterStore {
    pub fn new(initial: FilterState) -> Arc<Self> {
        let state = Arc::new(initial);
        let (sender, _rx) = watch::channel(state.clone());
        Arc::new(Self {
            inner: Mutex::new(StoreInner {
                state,
                version: 0,
                queue: VecDeque::new(),
                notifying: false,
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            sender,
            options: Mutex::new(FilterOptions::default()),
            options_error: Mutex::new(None),
            options_requested: AtomicBool::new(false),
        })
    }

    /// Create a store with the default month-to-date window and run the
    /// one-time options bootstrap.
    ///
    /// A failed bootstrap is logged and kept in [`FilterStore::options_error`];
    /// the store is usable either way.
    pub async fn bootstrap(
        today: NaiveDate,
        caller: &dyn RemoteCaller,
        options_function: &str,
    ) -> Arc<Self> {
        let store = Self::new(FilterState::new(today));
        if let Err(e) = store.load_filter_options(caller, options_function).await {
            tracing::warn!(error = %e, function = options_function, "filter options unavailable");
        }
        store
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<FilterState> {
        lock(&self.inner).state.clone()
    }

    /// Number of applied mutations since creation.
    pub fn version(&self) -> u64 {
        lock(&self.inner).version
    }

    /// Merge `patch` into the current state and notify subscribers.
    pub fn update_filters(&self, patch: FilterPatch) {
        self.mutate(Mutation::Patch(patch));
    }

    /// Replace the state with the default window for `today`, dropping every
    /// selection, the search term and all toggles.
    pub fn reset_filters(&self, today: NaiveDate) {
        self.mutate(Mutation::Reset(FilterState::new(today)));
    }

    fn mutate(&self, mutation: Mutation) {
        {
            let mut inner = lock(&self.inner);
            inner.queue.push_back(mutation);
            if inner.notifying {
                tracing::trace!(queued = inner.queue.len(), "filter update queued during notification");
                return;
            }
            inner.notifying = true;
        }

        let mut guard = NotifyGuard {
            store: self,
            armed: true,
        };

        loop {
            let snapshot = {
                let mut inner = lock(&self.inner);
                let Some(mutation) = inner.queue.pop_front() else {
                    inner.notifying = false;
                    guard.armed = false;
                    break;
                };
                let next = match mutation {
                    Mutation::Patch(patch) => {
                        let mut next = FilterState::clone(&inner.state);
                        next.apply(patch);
                        next
                    }
                    Mutation::Reset(state) => state,
                };
                inner.state = Arc::new(next);
                inner.version += 1;
                tracing::debug!(version = inner.version, range = %inner.state.date_range(), "filters updated");
                inner.state.clone()
            };

            self.sender.send_replace(snapshot.clone());

            let listeners: Vec<Listener> = lock(&self.listeners)
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect();
            for listener in listeners {
                listener(&snapshot);
            }
        }
    }

    /// Register a synchronous listener, called after every applied mutation.
    ///
    /// The listener stays registered until the returned handle is dropped.
    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(&FilterState) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, Arc::new(listener)));
        Subscription {
            store: Arc::downgrade(self),
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Watch channel of snapshots for async consumers.
    pub fn watch(&self) -> FilterWatcher {
        self.sender.subscribe()
    }

    /// Fetch the valid values for each dimension.
    ///
    /// Runs at most once per store; later calls return immediately. On
    /// failure the option lists stay empty, which does not prevent filtering
    /// by values supplied directly.
    pub async fn load_filter_options(
        &self,
        caller: &dyn RemoteCaller,
        function: &str,
    ) -> Result<(), QueryError> {
        if self.options_requested.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        match caller.call(function, &Map::new()).await {
            Ok(payload) => {
                let options = FilterOptions::from_payload(payload);
                tracing::info!(empty = options.is_empty(), "filter options loaded");
                *lock(&self.options) = options;
                Ok(())
            }
            Err(e) => {
                let err = QueryError::from(e);
                *lock(&self.options_error) = Some(err.clone());
                Err(err)
            }
        }
    }

    pub fn options(&self) -> FilterOptions {
        lock(&self.options).clone()
    }

    /// Error from the options bootstrap, if it failed.
    pub fn options_error(&self) -> Option<QueryError> {
        lock(&self.options_error).clone()
    }

    fn unsubscribe(&self, id: u64) {
        lock(&self.listeners).retain(|(listener_id, _)| *listener_id != id);
    }
}

/// Releases the notifying flag if a listener panics mid-round.
struct NotifyGuard<'a> {
    store: &'a FilterStore,
    armed: bool,
}

impl Drop for NotifyGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(&self.store.inner).notifying = false;
        }
    }
}

/// Listener registration; dropping it unsubscribes.
pub struct Subscription {
    store: Weak<FilterStore>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.id);
        }
    }
}
