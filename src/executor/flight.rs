//! Single-flight slot: at most one authoritative request per subscriber.
//!
//! Launching a new flight aborts the previous one and drops its join handle,
//! so a superseded request can never deliver. Aborting only unregisters
//! interest; the underlying transport call may still run to completion.

use std::future::Future;
use tokio::task::JoinHandle;

use super::pagination::PageWindow;
use crate::error::{ErrorKind, QueryError};
use crate::remote::RemoteOutcome;

pub type FetchResult = Result<RemoteOutcome, QueryError>;

/// Whether a settled page replaces or extends the accumulated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Filter change, mount or retry: offset 0, replace
    Reset,
    /// `load_more`: next offset, append
    Append,
}

/// A flight that ran to completion.
#[derive(Debug)]
pub struct Settled {
    pub generation: u64,
    pub mode: FetchMode,
    pub window: Option<PageWindow>,
    pub result: FetchResult,
}

struct Flight {
    generation: u64,
    mode: FetchMode,
    window: Option<PageWindow>,
    handle: JoinHandle<FetchResult>,
}

#[derive(Default)]
pub struct SingleFlight {
    generation: u64,
    current: Option<Flight>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `fetch`, cancelling whatever was in flight. Returns the new
    /// flight's generation.
    pub fn launch<F>(&mut self, mode: FetchMode, window: Option<PageWindow>, fetch: F) -> u64
    where
        F: Future<Output = FetchResult> + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        self.current = Some(Flight {
            generation: self.generation,
            mode,
            window,
            handle: tokio::spawn(fetch),
        });
        self.generation
    }

    /// Abort the in-flight request, if any. Returns whether one was running.
    pub fn cancel(&mut self) -> bool {
        match self.current.take() {
            Some(flight) => {
                tracing::debug!(generation = flight.generation, "superseding in-flight request");
                flight.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.current.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the current flight. Pending forever while idle, so it can sit
    /// in a `select!` next to other triggers. Cancel safe.
    pub async fn settled(&mut self) -> Settled {
        loop {
            let joined = match self.current.as_mut() {
                Some(flight) => (&mut flight.handle).await,
                None => return std::future::pending().await,
            };
            let Some(flight) = self.current.take() else {
                continue;
            };
            let result = match joined {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => {
                    tracing::trace!(generation = flight.generation, "discarding cancelled request");
                    continue;
                }
                Err(e) => Err(QueryError::new(
                    ErrorKind::Marshalling,
                    format!("request task failed: {e}"),
                )),
            };
            return Settled {
                generation: flight.generation,
                mode: flight.mode,
                window: flight.window,
                result,
            };
        }
    }
}

impl Drop for SingleFlight {
    fn drop(&mut self) {
        self.cancel();
    }
}
