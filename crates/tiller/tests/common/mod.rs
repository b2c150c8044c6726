//! Test utilities and common setup.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::Value;
use tower::ServiceExt;

use tiller::adapter::{Adapter, ScriptedAdapter};
use tiller::api::{self, AppState};
use tiller::config::TillerConfig;
use tiller_protocol::SessionState;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub adapter: Arc<ScriptedAdapter>,
    _tmp: tempfile::TempDir,
}

/// Create a test application backed by a scripted adapter.
pub fn test_app() -> TestApp {
    test_app_with(|_| {})
}

/// Create a test application with config tweaks.
pub fn test_app_with(tweak: impl FnOnce(&mut TillerConfig)) -> TestApp {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = TillerConfig {
        data_dir: tmp.path().to_path_buf(),
        bridge_poll_interval_ms: 5,
        ..TillerConfig::default()
    };
    tweak(&mut config);

    let adapter = Arc::new(ScriptedAdapter::new());
    let state = AppState::new(config, adapter.clone() as Arc<dyn Adapter>);
    let router = api::create_router(state.clone());
    TestApp {
        router,
        state,
        adapter,
        _tmp: tmp,
    }
}

/// Send a request and return the status plus parsed JSON body (Null for
/// empty bodies).
pub async fn send_json(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().uri(uri).method(method);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    send_json(router, Method::GET, uri, None).await
}

pub async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send_json(router, Method::POST, uri, Some(body)).await
}

/// Poll until the session reaches the given state.
pub async fn wait_for_state(app: &TestApp, session_id: &str, state: SessionState) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(record) = app.state.registry.get(session_id) {
            if record.lock().await.session.state == state {
                return;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {state}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
