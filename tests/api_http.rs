// tests/api_http.rs
//
// HTTP-level tests for the status router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

mod common;

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt as _; // for `oneshot`

use common::*;
use content_curator::api::{create_router, AppState};
use content_curator::model::SourceSeed;
use content_curator::store::{ContentStore, InMemoryStore};

const BODY_LIMIT: usize = 1024 * 1024;
const FEED: &str = "https://blog.example.com/feed";

async fn test_router(with_source: bool) -> (Router, Arc<MockPlatform>) {
    let mut cfg = test_config();
    cfg.pipeline.max_items_per_source = 5;
    let store = Arc::new(InMemoryStore::new());
    if with_source {
        store
            .upsert_source(&SourceSeed::new("Blog", "https://blog.example.com").with_feed(FEED))
            .await
            .unwrap();
    }
    let fetcher = Arc::new(MockFetcher::new().with_feed(
        FEED,
        vec![
            good_doc("https://blog.example.com/posts/one", "one"),
            good_doc("https://blog.example.com/posts/two", "two"),
        ],
    ));
    let platform = Arc::new(MockPlatform::new());
    let p = pipeline(&cfg, store, fetcher, platform.clone());
    let router = create_router(AppState::new(Arc::new(p), CancellationToken::new()));
    (router, platform)
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

fn json(bytes: &[u8]) -> Json {
    serde_json::from_slice(bytes).expect("valid json")
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _) = test_router(true).await;
    let (status, body) = call(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap(), "ok");
}

#[tokio::test]
async fn status_before_any_run() {
    let (app, _) = test_router(true).await;
    let (status, body) = call(&app, "GET", "/status").await;
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    assert_eq!(v["remaining"], 30);
    assert_eq!(v["quota"]["limit"], 30);
    assert_eq!(v["runs_recorded"], 0);
    assert!(v["last_run"].is_null());
}

#[tokio::test]
async fn post_run_then_inspect_runs_and_submissions() {
    let (app, platform) = test_router(true).await;

    let (status, body) = call(&app, "POST", "/run").await;
    assert_eq!(status, StatusCode::OK);
    let run = json(&body);
    assert_eq!(run["totals"]["submitted"], 2);
    assert_eq!(run["cancelled"], false);
    assert_eq!(platform.calls(), 2);

    let (_, body) = call(&app, "GET", "/runs?n=5").await;
    let runs = json(&body);
    assert_eq!(runs.as_array().unwrap().len(), 1);
    assert_eq!(runs[0]["run_id"], run["run_id"]);

    let (_, body) = call(&app, "GET", "/submissions?limit=1").await;
    let subs = json(&body);
    assert_eq!(subs.as_array().unwrap().len(), 1);
    assert_eq!(subs[0]["status"], "submitted");

    let (_, body) = call(&app, "GET", "/status").await;
    let v = json(&body);
    assert_eq!(v["remaining"], 28);
    assert_eq!(v["runs_recorded"], 1);
    assert_eq!(v["last_run"]["run_id"], run["run_id"]);
}

#[tokio::test]
async fn sources_are_listed() {
    let (app, _) = test_router(true).await;
    let (status, body) = call(&app, "GET", "/sources").await;
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    assert_eq!(v[0]["name"], "Blog");
    assert_eq!(v[0]["feed_url"], FEED);
}

#[tokio::test]
async fn run_without_sources_is_unprocessable() {
    let (app, platform) = test_router(false).await;
    let (status, body) = call(&app, "POST", "/run").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json(&body)["error"].as_str().unwrap().contains("no active sources"));
    assert_eq!(platform.calls(), 0);
}
