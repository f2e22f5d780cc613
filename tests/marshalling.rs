//! Requests that cannot be built
//!
//! These tests verify that:
//! 1. A parameter that fails to marshal fails that request only, with kind
//!    `Marshalling` and no remote call
//! 2. With fallback data the page shows it behind an Offline notice
//! 3. The hook keeps running and delivers live data once parameters are valid

mod common;

use serde_json::json;

use common::{context, ScriptedCaller};
use dashboard_query::{ErrorKind, FallbackNotice, QueryOptions};

#[tokio::test(start_paused = true)]
async fn test_bad_date_override_fails_request_not_hook() {
    let caller = ScriptedCaller::new();
    caller.reply("get_sales_by_region", 5, json!([{"region": "north"}]));
    let (_store, ctx) = context(caller.clone());

    let mut handle = ctx.bind(
        QueryOptions::remote("get_sales_by_region").param("start_date", "not a date"),
    );
    let failed = handle.settled().await;

    assert!(!failed.loading);
    assert_eq!(failed.data, None);
    assert!(!failed.is_mock);
    let error = failed.error.expect("marshalling error delivered");
    assert_eq!(error.kind, ErrorKind::Marshalling);
    assert!(error.message.contains("p_start_date"));
    assert_eq!(caller.call_count(), 0);

    handle.set_param("start_date", "2025-02-03");
    let state = handle
        .wait_for(|s| !s.loading && s.data.is_some())
        .await;

    assert_eq!(state.error, None);
    assert_eq!(state.data, Some(json!([{"region": "north"}])));
    assert_eq!(caller.call_count(), 1);
    assert_eq!(caller.last_params()["p_start_date"], json!("2025-02-03"));
}

#[tokio::test(start_paused = true)]
async fn test_bad_date_override_with_fallback_goes_offline() {
    let caller = ScriptedCaller::new();
    caller.reply("get_sales_kpis", 5, json!({"revenue": 42}));
    let (_store, ctx) = context(caller.clone());
    let demo = json!({"kpis": [{"name": "revenue", "value": 1}]});

    let mut handle = ctx.bind(
        QueryOptions::remote("get_sales_kpis")
            .fallback(demo.clone())
            .param("end_date", "31/02/2025"),
    );
    let offline = handle.settled().await;

    assert!(offline.is_mock);
    assert_eq!(offline.data, Some(demo));
    assert_eq!(offline.error, None);
    match &offline.notice {
        Some(FallbackNotice::Offline { reason }) => assert!(reason.contains("p_end_date")),
        other => panic!("expected offline notice, got {other:?}"),
    }
    assert_eq!(caller.call_count(), 0);

    // retrying the same broken parameters fails the same way without a call
    handle.retry();
    common::yield_now().await;
    assert_eq!(caller.call_count(), 0);
    assert!(handle.state().is_mock);

    handle.set_param("end_date", "2025-02-28");
    let live = handle.wait_for(|s| !s.loading && !s.is_mock).await;

    assert_eq!(live.notice, None);
    assert_eq!(live.data, Some(json!({"revenue": 42})));
    assert_eq!(caller.last_params()["p_end_date"], json!("2025-02-28"));
}
