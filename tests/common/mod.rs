//! Shared fixtures for the integration tests
//!
//! `ScriptedCaller` answers remote calls from a per-function script. Each
//! step has a delay (run on tokio's clock, so paused-time tests stay
//! deterministic) and a reply. The last step of a script repeats.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashboard_query::{
    DescriptorRegistry, FilterState, FilterStore, ParameterMapper, QueryContext, QueryExecutor,
    RemoteCaller, RemoteError,
};

#[derive(Debug, Clone)]
pub struct Step {
    pub delay: Duration,
    pub reply: Result<Value, RemoteError>,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub function: String,
    pub params: Map<String, Value>,
}

#[derive(Default)]
pub struct ScriptedCaller {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedCaller {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, function: &str, delay_ms: u64, payload: Value) -> &Self {
        self.push(function, delay_ms, Ok(payload))
    }

    pub fn fail(&self, function: &str, delay_ms: u64, error: RemoteError) -> &Self {
        self.push(function, delay_ms, Err(error))
    }

    fn push(&self, function: &str, delay_ms: u64, reply: Result<Value, RemoteError>) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(function.to_string())
            .or_default()
            .push_back(Step {
                delay: Duration::from_millis(delay_ms),
                reply,
            });
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_params(&self) -> Map<String, Value> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .map(|c| c.params.clone())
            .unwrap_or_default()
    }

    fn next_step(&self, function: &str) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(function) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Step {
                delay: Duration::ZERO,
                reply: Err(RemoteError::Server {
                    status: 404,
                    message: format!("function {function} is not scripted"),
                }),
            },
        }
    }
}

#[async_trait]
impl RemoteCaller for ScriptedCaller {
    async fn call(&self, function: &str, params: &Map<String, Value>) -> Result<Value, RemoteError> {
        self.calls.lock().unwrap().push(RecordedCall {
            function: function.to_string(),
            params: params.clone(),
        });
        let step = self.next_step(function);
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.reply
    }
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Mid-February 2025, so the default window is Feb 1..Feb 14.
pub fn today() -> NaiveDate {
    day(2025, 2, 14)
}

/// `n` distinct rows starting at `start`.
pub fn rows(start: usize, n: usize) -> Value {
    Value::Array(
        (start..start + n)
            .map(|i| serde_json::json!({ "id": i }))
            .collect(),
    )
}

/// Store + context over the built-in descriptors.
pub fn context(caller: Arc<ScriptedCaller>) -> (Arc<FilterStore>, QueryContext) {
    let store = FilterStore::new(FilterState::new(today()));
    let mapper = ParameterMapper::new(Arc::new(DescriptorRegistry::builtin()));
    let executor = QueryExecutor::new(caller, mapper);
    (store.clone(), QueryContext::new(store, executor))
}

/// Let spawned tasks run without advancing the paused clock.
pub async fn yield_now() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
