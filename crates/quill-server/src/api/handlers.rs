//! HTTP handlers.

use std::convert::Infallible;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State, rejection::JsonRejection},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use quill_patch::{apply_patch as apply_unified_patch, create_patch as create_unified_patch};
use quill_protocol::{ChatRequest, StreamResponse, build_conversation};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::relay::{self, Relay};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Answer a chat request, as SSE frames or as a single JSON response.
pub async fn chat(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let request = ChatRequest::from_slice(&body)?;

    let backend = state.backends.resolve(request.model()).ok_or_else(|| {
        ApiError::bad_request(format!(
            "unknown model `{}`",
            request.model().unwrap_or(state.backends.default_model())
        ))
    })?;

    let conversation = build_conversation(&state.config.assistant.system_prompt, &request);
    let streaming = request.is_streaming();
    let relay = relay::start(backend, conversation, request, &state.config.stream);

    if streaming {
        return Ok(sse_response(relay));
    }

    let stream_id = relay.id();
    let machine = relay.finish().await;
    let response = machine
        .summary()
        .unwrap_or_else(|| StreamResponse::error("stream ended without a terminal event"));
    debug!(stream_id = %stream_id, kind = response.kind(), "non-streaming chat answered");
    Ok(Json(response).into_response())
}

/// One `data:` frame per event; the body ends after the terminal frame.
fn sse_response(mut relay: Relay) -> Response {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(32);

    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                _ = tx.closed() => None,
                event = relay.next() => Some(event),
            };
            let Some(event) = next else {
                relay.cancel();
                break;
            };
            let Some(event) = event else {
                break;
            };

            let frame = match serde_json::to_string(&event) {
                Ok(json) => Event::default().data(json),
                Err(err) => {
                    relay.cancel();
                    Event::default().data(
                        serde_json::json!({ "type": "error", "error": err.to_string() }).to_string(),
                    )
                }
            };
            if tx.send(Ok(frame)).await.is_err() {
                info!(stream_id = %relay.id(), "client disconnected");
                relay.cancel();
                break;
            }
        }
    });

    Sse::new(ReceiverStream::new(rx))
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ApplyPatchRequest {
    pub patch: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ApplyPatchResponse {
    pub content: String,
}

/// Apply a unified diff to the given content.
pub async fn apply_patch(
    payload: Result<Json<ApplyPatchRequest>, JsonRejection>,
) -> ApiResult<Json<ApplyPatchResponse>> {
    let Json(request) = payload?;
    let content = apply_unified_patch(&request.patch, &request.content)?;
    Ok(Json(ApplyPatchResponse { content }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePatchRequest {
    pub file_path: String,
    pub original: String,
    pub modified: String,
}

#[derive(Debug, Serialize)]
pub struct CreatePatchResponse {
    pub patch: String,
    pub changed: bool,
}

/// Produce a unified diff turning `original` into `modified`.
pub async fn create_patch(
    payload: Result<Json<CreatePatchRequest>, JsonRejection>,
) -> ApiResult<Json<CreatePatchResponse>> {
    let Json(request) = payload?;
    if request.file_path.trim().is_empty() {
        return Err(ApiError::bad_request("filePath must not be empty"));
    }
    let patch = create_unified_patch(&request.file_path, &request.original, &request.modified);
    Ok(Json(CreatePatchResponse {
        changed: !patch.is_empty(),
        patch,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateEntityRequest {
    pub field: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct UpdateEntityResponse {
    pub success: bool,
}

/// Set one field of one entity.
pub async fn update_entity(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    payload: Result<Json<UpdateEntityRequest>, JsonRejection>,
) -> ApiResult<Json<UpdateEntityResponse>> {
    let Json(request) = payload?;
    let store = state
        .store
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("no entity store configured"))?;

    store
        .update_entity_field(&table, &id, &request.field, &request.value)
        .await?;

    info!(table = %table, id = %id, field = %request.field, "entity updated");
    Ok(Json(UpdateEntityResponse { success: true }))
}

pub async fn not_found() -> ApiError {
    ApiError::not_found("no such route")
}
