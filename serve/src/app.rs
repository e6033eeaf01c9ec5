//! axum wiring for the two external endpoints (spec §6.1/§6.2).

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::error;

use agent_core::{run as run_agent, ForwardedProps, Message, Role, RunDirectory, RunRequest, RuntimeResolver};
use agent_protocol::encoder::{EventEncoder, WireFormat};

use crate::wire::{RunRequestBody, StopResponseBody, StopResponseData};

fn parse_role(role: &str) -> Role {
    match role {
        "assistant" => Role::Assistant,
        "system" => Role::System,
        "tool" => Role::Tool,
        _ => Role::User,
    }
}

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<dyn RuntimeResolver>,
    pub directory: Arc<RunDirectory>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/agent/run", post(post_run))
        .route("/agent/run/:run_id/stop", post(post_stop))
        .with_state(state)
}

/// `Accept: application/octet-stream` selects length-prefixed framing;
/// anything else (including absent) falls back to SSE, the wire default
/// (spec §6.1).
fn negotiate_format(headers: &HeaderMap) -> WireFormat {
    match headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) {
        Some("application/octet-stream") => WireFormat::LengthPrefixed,
        _ => WireFormat::Sse,
    }
}

fn into_run_request(body: RunRequestBody) -> RunRequest {
    let messages = body
        .messages
        .into_iter()
        .map(|m| Message { id: m.id, role: parse_role(&m.role), content: m.content, tool_call_id: None })
        .collect();

    RunRequest {
        thread_id: body.thread_id,
        run_id: body.run_id,
        messages,
        forwarded_props: ForwardedProps {
            agent_type: body.forwarded_props.agent_type,
            model_id: body.forwarded_props.model_id,
            temperature: body.forwarded_props.temperature,
            max_tokens: body.forwarded_props.max_tokens,
            system_prompt: body.forwarded_props.system_prompt,
            knowledge_base_ids: body.forwarded_props.knowledge_base_ids,
            mcp_connection_ids: body.forwarded_props.mcp_connection_ids,
            skill_ids: body.forwarded_props.skill_ids,
        },
    }
}

async fn post_run(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<RunRequestBody>) -> Response {
    let format = negotiate_format(&headers);
    let request = into_run_request(body);

    let (tx, rx) = mpsc::channel(256);
    let resolver = state.resolver.clone();
    let directory = state.directory.clone();
    tokio::spawn(async move {
        run_agent(request, resolver, directory, tx).await;
    });

    let encoder = EventEncoder::new();
    let body_stream = ReceiverStream::new(rx).map(move |event| match encoder.encode(&event, format) {
        Ok(bytes) => Ok::<_, std::io::Error>(bytes),
        Err(e) => {
            error!(error = %e, "failed to encode event");
            Ok(Vec::new())
        }
    });

    let content_type = match format {
        WireFormat::Sse => "text/event-stream",
        WireFormat::LengthPrefixed => "application/octet-stream",
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from_stream(body_stream))
        .expect("building a streaming response cannot fail")
}

async fn post_stop(State(state): State<AppState>, Path(run_id): Path<String>) -> impl IntoResponse {
    let stopped = state.directory.signal_cancel(&run_id);
    Json(StopResponseBody { code: 0, data: StopResponseData { run_id, stopped } })
}
