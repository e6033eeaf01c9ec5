//! Integration tests for the HTTP front door, driven in-process via `tower::ServiceExt::oneshot`
//! against a `RuntimeResolver` backed by `MockLlm` — no network, no provider.

use std::sync::Arc;

use agent_core::{MockLlm, RunDirectory, ToolRegistry};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serve::app::{router, AppState};
use tower::ServiceExt;

struct MockResolver;

#[async_trait]
impl agent_core::RuntimeResolver for MockResolver {
    async fn resolve_llm(
        &self,
        _props: &agent_core::ForwardedProps,
    ) -> Result<Arc<dyn agent_core::LlmClient>, agent_core::AgentError> {
        Ok(Arc::new(MockLlm::fixed_text("OK")))
    }

    async fn resolve_tools(
        &self,
        _props: &agent_core::ForwardedProps,
    ) -> Result<Arc<ToolRegistry>, agent_core::AgentError> {
        Ok(Arc::new(ToolRegistry::new()))
    }
}

fn test_state() -> AppState {
    AppState { resolver: Arc::new(MockResolver), directory: Arc::new(RunDirectory::new()) }
}

#[tokio::test]
async fn run_endpoint_streams_an_sse_run_started_and_run_finished() {
    let app = router(test_state());

    let body = serde_json::json!({
        "thread_id": "t1",
        "messages": [{"id": "m1", "role": "user", "content": "hi"}],
        "forwarded_props": {"agent_type": "react", "model_id": "mock"}
    });

    let request = Request::builder()
        .method("POST")
        .uri("/agent/run")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("event: RUN_STARTED\n"));
    assert!(text.contains("event: RUN_FINISHED\n"));
}

#[tokio::test]
async fn stop_endpoint_reports_false_for_an_unknown_run() {
    let app = router(test_state());

    let request = Request::builder()
        .method("POST")
        .uri("/agent/run/does-not-exist/stop")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["data"]["stopped"], false);
    assert_eq!(value["data"]["run_id"], "does-not-exist");
}

#[tokio::test]
async fn stop_endpoint_reports_true_for_a_registered_run() {
    let state = test_state();
    let (tx, _rx) = tokio::sync::watch::channel(false);
    state.directory.register("r1", tx);
    let app = router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/agent/run/r1/stop")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["data"]["stopped"], true);
}
