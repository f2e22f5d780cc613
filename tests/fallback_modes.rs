//! Fallback data through the hook
//!
//! These tests verify that:
//! 1. An empty live answer substitutes the fallback quietly (Degraded)
//! 2. A failed live call substitutes it loudly (Offline, with the reason)
//! 3. A page without a remote function settles at once with no calls

mod common;

use serde_json::json;
use std::time::Duration;

use common::{context, ScriptedCaller};
use dashboard_query::{ErrorKind, FallbackNotice, QueryOptions, RemoteError};

fn demo_kpis() -> serde_json::Value {
    json!({"kpis": [{"name": "revenue", "value": 125000}, {"name": "orders", "value": 310}]})
}

#[tokio::test(start_paused = true)]
async fn test_empty_result_substitutes_silently() {
    let caller = ScriptedCaller::new();
    caller.reply("get_sales_kpis", 5, json!([]));
    let (_store, ctx) = context(caller.clone());

    let mut handle = ctx.bind(QueryOptions::remote("get_sales_kpis").fallback(demo_kpis()));
    let state = handle.settled().await;

    assert_eq!(state.data, Some(demo_kpis()));
    assert!(state.is_mock);
    assert_eq!(state.error, None);
    assert_eq!(state.notice, Some(FallbackNotice::Degraded));
}

#[tokio::test(start_paused = true)]
async fn test_error_substitutes_loudly() {
    let caller = ScriptedCaller::new();
    caller.fail(
        "get_sales_kpis",
        5,
        RemoteError::Server {
            status: 401,
            message: "JWT expired".into(),
        },
    );
    let (_store, ctx) = context(caller.clone());

    let mut handle = ctx.bind(QueryOptions::remote("get_sales_kpis").fallback(demo_kpis()));
    let state = handle.settled().await;

    assert_eq!(state.data, Some(demo_kpis()));
    assert!(state.is_mock);
    assert_eq!(state.error, None);
    match state.notice {
        Some(FallbackNotice::Offline { reason }) => assert!(reason.contains("JWT expired")),
        other => panic!("expected offline notice, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_without_fallback_is_an_error() {
    let caller = ScriptedCaller::new();
    caller.reply("get_sales_kpis", 5_000, json!({"revenue": 1}));
    let (_store, ctx) = context(caller.clone());

    let mut handle = ctx.bind(
        QueryOptions::remote("get_sales_kpis").timeout(Duration::from_millis(500)),
    );
    let state = handle.settled().await;

    assert_eq!(state.data, None);
    assert!(!state.is_mock);
    assert_eq!(state.error.map(|e| e.kind), Some(ErrorKind::Timeout));
}

#[tokio::test(start_paused = true)]
async fn test_live_rows_replace_fallback_after_recovery() {
    let caller = ScriptedCaller::new();
    caller
        .fail("get_sales_kpis", 5, RemoteError::Transport("dns error".into()))
        .reply("get_sales_kpis", 5, json!({"kpis": [{"name": "revenue", "value": 9}]}));
    let (_store, ctx) = context(caller.clone());

    let mut handle = ctx.bind(QueryOptions::remote("get_sales_kpis").fallback(demo_kpis()));
    assert!(handle.settled().await.is_mock);

    handle.retry();
    let state = handle.wait_for(|s| !s.loading && !s.is_mock).await;
    assert_eq!(state.notice, None);
    assert_eq!(state.data.unwrap()["kpis"][0]["value"], json!(9));
}

#[tokio::test]
async fn test_front_end_only_page_settles_without_calls() {
    let caller = ScriptedCaller::new();
    let (_store, ctx) = context(caller.clone());

    let handle = ctx.bind(QueryOptions::local().fallback(demo_kpis()));
    let state = handle.state();

    assert_eq!(state.data, Some(demo_kpis()));
    assert!(state.is_mock);
    assert!(!state.loading);
    assert_eq!(state.error, None);
    assert_eq!(caller.call_count(), 0);
}

#[tokio::test]
async fn test_front_end_only_page_without_fallback_is_empty() {
    let caller = ScriptedCaller::new();
    let (_store, ctx) = context(caller.clone());

    let handle = ctx.bind(QueryOptions::local());
    let state = handle.state();

    assert_eq!(state.data, None);
    assert_eq!(state.error, None);
    assert!(!state.loading);
    assert!(!state.is_mock);
    assert_eq!(caller.call_count(), 0);
}
