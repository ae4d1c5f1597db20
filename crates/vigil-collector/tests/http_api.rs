#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use bytes::Bytes;
use serde_json::{json, Value};
use tower::ServiceExt;

use vigil_collector::app_state::AppState;
use vigil_collector::config::{self, BatchFailurePolicy, CollectorConfig};
use vigil_collector::router;
use vigil_core::{codec, IntegrityGuard, Snapshot};
use vigil_store::{MemoryStore, MetricStore, StoreError, StoreResult};

fn memory_config() -> CollectorConfig {
    config::load_from_str("storage:\n  file_storage_path: \"\"\n").unwrap()
}

fn memory_state() -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (AppState::new(memory_config(), store.clone()), store)
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).unwrap()
    }
}

async fn send(state: &AppState, req: Request<Body>) -> Reply {
    let resp = router::build_app(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    Reply { status, headers, body }
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder().method(Method::POST).uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn batch_then_read_back_poll_count() {
    let (state, _) = memory_state();
    let batch = json!([
        {"id": "Alloc", "type": "gauge", "value": 1024.0},
        {"id": "PollCount", "type": "counter", "delta": 1}
    ]);

    let r = send(&state, post_json("/updates", &batch)).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.json(), batch);

    let q = json!({"id": "PollCount", "type": "counter"});
    let r = send(&state, post_json("/value", &q)).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.json()["delta"], 1);

    send(&state, post_json("/updates", &batch)).await;
    let r = send(&state, post_json("/value", &q)).await;
    assert_eq!(r.json()["delta"], 2);

    let r = send(&state, get("/value/counter/PollCount")).await;
    assert_eq!(r.text(), "2");
    let r = send(&state, get("/value/gauge/Alloc")).await;
    assert_eq!(r.text(), "1024");
}

#[tokio::test]
async fn invalid_element_rejects_whole_batch() {
    let (state, store) = memory_state();
    let batch = json!([
        {"id": "Alloc", "type": "gauge", "value": 1.0},
        {"id": "PollCount", "type": "counter", "value": 1.0}
    ]);

    let r = send(&state, post_json("/updates", &batch)).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert_eq!(r.json()["error"], "BAD_REQUEST");
    assert_eq!(store.to_snapshot(), Snapshot::default());

    let r = send(&state, post_json("/updates", &json!([]))).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn json_update_and_value_rules() {
    let (state, _) = memory_state();

    let r = send(&state, post_json("/update", &json!({"id": "g", "type": "gauge", "value": 2.5}))).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.json(), json!({"id": "g", "type": "gauge", "value": 2.5}));

    for bad in [
        json!({"id": "", "type": "gauge", "value": 1.0}),
        json!({"id": "g", "type": "gauge"}),
        json!({"id": "g", "type": "gauge", "value": 1.0, "delta": 1}),
        json!({"id": "c", "type": "counter"}),
        json!({"id": "h", "type": "histogram", "value": 1.0}),
    ] {
        let r = send(&state, post_json("/update", &bad)).await;
        assert_eq!(r.status, StatusCode::BAD_REQUEST, "{bad}");
    }

    let r = send(
        &state,
        Request::builder().method(Method::POST).uri("/update").body(Body::from("{not json")).unwrap(),
    )
    .await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert_eq!(r.json()["error"], "BAD_REQUEST");

    let r = send(&state, post_json("/value", &json!({"id": "g"}))).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    let r = send(&state, post_json("/value", &json!({"id": "nope", "type": "gauge"}))).await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
    assert_eq!(r.json()["error"], "NOT_FOUND");
}

#[tokio::test]
async fn legacy_path_protocol() {
    let (state, store) = memory_state();

    assert_eq!(send(&state, post_empty("/update/counter/c/5")).await.status, StatusCode::OK);
    // trailing slash is tolerated
    assert_eq!(send(&state, post_empty("/update/counter/c/5/")).await.status, StatusCode::OK);
    assert_eq!(store.get_counter("c"), Some(10));

    assert_eq!(send(&state, post_empty("/update/Gauge/g/-1.5")).await.status, StatusCode::OK);
    assert_eq!(send(&state, get("/value/gauge/g")).await.text(), "-1.5");

    assert_eq!(send(&state, post_empty("/update/gauge/g/abc")).await.status, StatusCode::BAD_REQUEST);
    for raw in ["inf", "NaN", "-infinity"] {
        let uri = format!("/update/gauge/g/{raw}");
        assert_eq!(send(&state, post_empty(&uri)).await.status, StatusCode::BAD_REQUEST, "{raw}");
    }
    assert_eq!(store.get_gauge("g"), Some(-1.5));
    assert_eq!(send(&state, post_empty("/update/counter/c/1.5")).await.status, StatusCode::BAD_REQUEST);
    assert_eq!(send(&state, post_empty("/update/timer/t/1")).await.status, StatusCode::BAD_REQUEST);
    assert_eq!(send(&state, post_empty("/update/gauge/")).await.status, StatusCode::NOT_FOUND);

    assert_eq!(send(&state, get("/value/timer/t")).await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&state, get("/value/gauge/missing")).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn gzip_request_bodies() {
    let (state, store) = memory_state();
    let body = json!([{"id": "Alloc", "type": "gauge", "value": 7.0}]).to_string();

    let req = Request::builder()
        .method(Method::POST)
        .uri("/updates")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from(codec::gzip(body.as_bytes()).unwrap()))
        .unwrap();
    assert_eq!(send(&state, req).await.status, StatusCode::OK);
    assert_eq!(store.get_gauge("Alloc"), Some(7.0));

    let req = Request::builder()
        .method(Method::POST)
        .uri("/updates")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from(body))
        .unwrap();
    assert_eq!(send(&state, req).await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn responses_are_compressed_when_accepted() {
    let (state, store) = memory_state();
    store.set_gauge("Alloc", 1.5);
    store.add_counter("PollCount", 3);

    let req = Request::builder()
        .uri("/")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::empty())
        .unwrap();
    let r = send(&state, req).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.headers[header::CONTENT_ENCODING], "gzip");

    let html = codec::gunzip(&r.body, 1 << 20).unwrap();
    let html = std::str::from_utf8(&html).unwrap();
    assert!(html.contains("<li><strong>Alloc</strong>: 1.5 (gauge)</li>"));
    assert!(html.contains("<li><strong>PollCount</strong>: 3 (counter)</li>"));
}

fn keyed_state(key: &str) -> (AppState, Arc<MemoryStore>) {
    let mut cfg = memory_config();
    cfg.key = key.to_string();
    let store = Arc::new(MemoryStore::new());
    (AppState::new(cfg, store.clone()), store)
}

#[tokio::test]
async fn signed_requests_are_verified_before_parsing() {
    let (state, store) = keyed_state("secret");
    let guard = IntegrityGuard::from_key("secret").unwrap();

    let wire = codec::gzip(json!([{"id": "PollCount", "type": "counter", "delta": 1}]).to_string().as_bytes()).unwrap();
    let signed = |payload: Bytes, sig: Option<String>| {
        let mut b = Request::builder()
            .method(Method::POST)
            .uri("/updates")
            .header(header::CONTENT_ENCODING, "gzip");
        if let Some(sig) = sig {
            b = b.header("HashSHA256", sig);
        }
        b.body(Body::from(payload)).unwrap()
    };

    let r = send(&state, signed(wire.clone(), Some(guard.sign(&wire)))).await;
    assert_eq!(r.status, StatusCode::OK);
    let resp_sig = r.headers["hashsha256"].to_str().unwrap();
    assert!(guard.verify(&r.body, Some(resp_sig)).is_ok());
    assert_eq!(store.get_counter("PollCount"), Some(1));

    let mut tampered = wire.to_vec();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    let r = send(&state, signed(Bytes::from(tampered), Some(guard.sign(&wire)))).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert_eq!(r.json()["error"], "INTEGRITY");

    let r = send(&state, signed(wire.clone(), None)).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert_eq!(store.get_counter("PollCount"), Some(1));

    // reads need no signature
    assert_eq!(send(&state, get("/value/counter/PollCount")).await.status, StatusCode::OK);
}

#[tokio::test]
async fn ops_endpoints() {
    let (state, _) = memory_state();

    assert_eq!(send(&state, get("/healthz")).await.status, StatusCode::OK);

    let r = send(&state, get("/ping")).await;
    assert_eq!(r.status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(r.json()["error"], "UNSUPPORTED");

    send(&state, post_empty("/update/gauge/g/1")).await;
    let r = send(&state, get("/metrics")).await;
    let text = r.text();
    assert!(text.contains("vigil_http_requests_total"));
    assert!(text.contains("vigil_updates_applied_total{kind=\"gauge\"} 1"));
    assert!(text.contains("vigil_stored_gauges 1"));
}

/// Memory store that refuses writes to metrics named `bad`.
struct PickyStore(MemoryStore);

#[async_trait]
impl MetricStore for PickyStore {
    fn kind(&self) -> &'static str {
        "picky"
    }

    async fn update_gauge(&self, name: &str, value: f64) -> StoreResult<()> {
        if name == "bad" {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.0.update_gauge(name, value).await
    }

    async fn update_counter(&self, name: &str, delta: i64) -> StoreResult<()> {
        self.0.update_counter(name, delta).await
    }

    async fn set_counter(&self, name: &str, value: i64) -> StoreResult<()> {
        self.0.set_counter(name, value).await
    }

    fn gauge(&self, name: &str) -> Option<f64> {
        self.0.gauge(name)
    }

    fn counter(&self, name: &str) -> Option<i64> {
        self.0.counter(name)
    }

    fn snapshot(&self) -> Snapshot {
        self.0.snapshot()
    }
}

async fn run_failing_batch(policy: BatchFailurePolicy, batch: Value) -> (Reply, Snapshot) {
    let mut cfg = memory_config();
    cfg.ingest.batch_failure = policy;
    let store = Arc::new(PickyStore(MemoryStore::new()));
    let state = AppState::new(cfg, store.clone());

    let r = send(&state, post_json("/updates", &batch)).await;
    (r, store.snapshot())
}

fn batch_with_bad_gauge() -> Value {
    json!([
        {"id": "a", "type": "gauge", "value": 1.0},
        {"id": "bad", "type": "gauge", "value": 2.0},
        {"id": "c", "type": "counter", "delta": 3}
    ])
}

#[tokio::test]
async fn partial_batch_continue_reports_the_failed_positions() {
    let (r, snap) = run_failing_batch(BatchFailurePolicy::Continue, batch_with_bad_gauge()).await;
    assert_eq!(r.status, StatusCode::MULTI_STATUS);
    assert_eq!(r.json(), json!({"applied": 2, "failed": [1]}));
    assert_eq!(snap.gauges.get("a"), Some(&1.0));
    assert_eq!(snap.counters.get("c"), Some(&3));
}

#[tokio::test]
async fn partial_batch_abort_reports_everything_after_the_failure() {
    let (r, snap) = run_failing_batch(BatchFailurePolicy::Abort, batch_with_bad_gauge()).await;
    assert_eq!(r.status, StatusCode::MULTI_STATUS);
    assert_eq!(r.json(), json!({"applied": 1, "failed": [1, 2]}));
    assert_eq!(snap.gauges.get("a"), Some(&1.0));
    assert!(snap.counters.is_empty());
}

#[tokio::test]
async fn batch_with_nothing_stored_is_a_server_error() {
    for policy in [BatchFailurePolicy::Continue, BatchFailurePolicy::Abort] {
        let batch = json!([{"id": "bad", "type": "gauge", "value": 2.0}]);
        let (r, snap) = run_failing_batch(policy, batch).await;
        assert_eq!(r.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(r.json()["error"], "INTERNAL");
        assert!(snap.is_empty());
    }
}
