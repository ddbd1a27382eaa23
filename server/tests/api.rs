//! End-to-end scenarios from spec §8, driven through the actual HTTP router
//! (not just the Coordinator) so the wire contract in spec §6 is covered too.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use everysearch_core::{Coordinator, ScanConfig};
use everysearch_server::api::{router, AppContext};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

fn test_ctx() -> (AppContext, tempfile::TempDir) {
    let db_dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::open(&db_dir.path().join("index.db"), ScanConfig::default()).unwrap();
    (AppContext { coordinator, start_time: Instant::now() }, db_dir)
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

#[tokio::test]
async fn health_check_reports_ok() {
    let (ctx, _dir) = test_ctx();
    let app = router(ctx);

    let resp =
        app.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "ok");
}

// Scenario 1 (spec §8): basic add_root + search.
#[tokio::test]
async fn basic_add_root_then_search() {
    let (ctx, _db_dir) = test_ctx();
    let coordinator = Arc::clone(&ctx.coordinator);
    let fixture = tempfile::tempdir().unwrap();
    std::fs::write(fixture.path().join("alpha.txt"), b"hi").unwrap();
    std::fs::write(fixture.path().join("beta.md"), b"hi").unwrap();
    std::fs::create_dir(fixture.path().join("gamma")).unwrap();

    let app = router(ctx);
    let resp = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/roots",
            serde_json::json!({ "path": fixture.path().to_string_lossy() }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let found = wait_until(
        || {
            coordinator
                .search(everysearch_core::SearchQuery { query: "al".into(), ..Default::default() })
                .map(|r| r.total_results == 1)
                .unwrap_or(false)
        },
        Duration::from_secs(5),
    );
    assert!(found, "alpha.txt should become searchable after scan completion");

    let resp = app.oneshot(Request::builder().uri("/api/search?search=al").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["totalResults"], 1);
    assert_eq!(body["results"][0]["name"], "alpha.txt");
}

// Scenario 6 (spec §8): nested root rejection leaves the existing root intact.
#[tokio::test]
async fn nested_root_is_rejected() {
    let (ctx, _db_dir) = test_ctx();
    let outer = tempfile::tempdir().unwrap();
    let inner = outer.path().join("inner");
    std::fs::create_dir(&inner).unwrap();

    let app = router(ctx);
    let resp = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/roots",
            serde_json::json!({ "path": outer.path().to_string_lossy() }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/roots",
            serde_json::json!({ "path": inner.to_string_lossy() }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.oneshot(Request::builder().uri("/api/roots").body(Body::empty()).unwrap()).await.unwrap();
    let body = json_body(resp).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn ignore_administration_round_trips_over_http() {
    let (ctx, _db_dir) = test_ctx();
    let app = router(ctx);

    let resp = app.clone().oneshot(Request::builder().method(Method::POST).uri("/api/ignores/defaults").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.clone().oneshot(Request::builder().uri("/api/ignores").body(Body::empty()).unwrap()).await.unwrap();
    let body = json_body(resp).await;
    assert!(body.as_array().unwrap().iter().any(|p| p == "node_modules"));

    let resp = app
        .oneshot(json_request(Method::DELETE, "/api/ignores", serde_json::json!({ "pattern": "node_modules" })))
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["removed"], true);
}

#[tokio::test]
async fn status_reports_not_ready_with_no_roots() {
    let (ctx, _db_dir) = test_ctx();
    let app = router(ctx);
    let resp = app.oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap()).await.unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["ready"], false);
    assert_eq!(body["total_indexed"], 0);
}
