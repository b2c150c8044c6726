//! Event stream, poll, and ingest handlers.

use std::time::Duration;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tracing::{info, instrument};

use tiller_protocol::{Event, EventPayload, EventType, OutputKind, SessionState};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

/// Query parameters for the poll endpoint.
#[derive(Debug, Deserialize)]
pub struct PollQuery {
    /// Return events with seq strictly greater than this (0 = from start).
    #[serde(default)]
    pub since_seq: u64,
    /// Comma-separated event type filter.
    pub types: Option<String>,
}

/// Query parameters for the SSE endpoint.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Replay events after this seq before going live. Absent = live only.
    pub resume_from: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub events: Vec<Event>,
}

fn parse_types(types: Option<&str>) -> ApiResult<Option<Vec<EventType>>> {
    let Some(types) = types else {
        return Ok(None);
    };
    let parsed = types
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<EventType>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(if parsed.is_empty() { None } else { Some(parsed) })
}

/// Cursor-based poll: all events after `since_seq`, oldest first.
/// Idempotent; repeating a cursor returns the same batch.
#[instrument(skip(state))]
pub async fn poll_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<PollQuery>,
) -> ApiResult<Json<PollResponse>> {
    let types = parse_types(query.types.as_deref())?;
    let events = state
        .hub
        .poll(&session_id, query.since_seq, types.as_deref())
        .await?;
    Ok(Json(PollResponse { events }))
}

/// Live SSE stream, with optional replay from a resume cursor.
#[instrument(skip(state))]
pub async fn stream_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<SseEvent, axum::Error>>>> {
    let subscription = state.hub.open_push(&session_id, query.resume_from).await?;
    info!(session_id = %session_id, resume_from = ?query.resume_from, "sse subscriber connected");

    let stream = ReceiverStream::new(subscription.rx)
        .map(|event| SseEvent::default().json_data(&event));

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(state.config.sse_keepalive_secs))
            .text("keepalive"),
    ))
}

/// Ingested event bodies for externally-run agents. Seq and timestamp are
/// always assigned server-side.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestEventRequest {
    Output {
        #[serde(default)]
        stream: Option<String>,
        text: String,
        #[serde(default, rename = "final")]
        is_final: bool,
    },
    Status {
        state: SessionState,
    },
    PermissionRequest {
        request_id: String,
        title: String,
        description: String,
        options: Vec<String>,
    },
}

/// Append an event reported by an external agent process.
#[instrument(skip(state, request))]
pub async fn ingest_event(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<IngestEventRequest>,
) -> ApiResult<Json<Event>> {
    let payload = match request {
        IngestEventRequest::Output {
            stream,
            text,
            is_final,
        } => {
            state.registry.get_or_create(&session_id);
            EventPayload::Output {
                stream: stream.unwrap_or_else(|| "combined".to_string()),
                text,
                kind: if is_final {
                    OutputKind::Final
                } else {
                    OutputKind::Step
                },
                is_final,
            }
        }
        IngestEventRequest::Status { state: new_state } => {
            // External agents drive their own lifecycle, but the same
            // transition table applies.
            let record = state.registry.get_or_create(&session_id);
            record.lock().await.transition(new_state)?;
            EventPayload::Status { state: new_state }
        }
        IngestEventRequest::PermissionRequest {
            request_id,
            title,
            description,
            options,
        } => {
            if options.is_empty() {
                return Err(ApiError::validation("options must not be empty"));
            }
            state.registry.get_or_create(&session_id);
            state
                .bridges
                .track_permission_request(&request_id, &session_id);
            EventPayload::PermissionRequest {
                request_id,
                title,
                description,
                options,
            }
        }
    };

    let event = state.log.append(&session_id, payload).await;
    Ok(Json(event))
}

/// Response body for resolving a permission request.
#[derive(Debug, Deserialize)]
pub struct RespondApprovalRequest {
    pub option_selected: String,
    pub username: Option<String>,
}

/// Resolve an open permission request.
#[instrument(skip(state, request))]
pub async fn respond_approval(
    State(state): State<AppState>,
    Path((session_id, request_id)): Path<(String, String)>,
    Json(request): Json<RespondApprovalRequest>,
) -> ApiResult<Json<Event>> {
    if request.option_selected.trim().is_empty() {
        return Err(ApiError::validation("option_selected must not be empty"));
    }
    let event = state
        .bridges
        .handle_permission_response(&session_id, &request_id, request.option_selected, request.username)
        .await?;
    info!(session_id = %session_id, request_id = %request_id, "permission request resolved");
    Ok(Json(event))
}
