//! Session CRUD and turn control handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use tiller_protocol::{ApprovalMode, SessionState};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::scheduler::SubmitOutcome;
use crate::session::Session;

/// Create session request body.
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub name: Option<String>,
    /// Platform key to bind a bridge immediately.
    pub platform: Option<String>,
    pub approval_choice: Option<u8>,
    /// Existing directory to run turns in. Adopted as-is, never deleted.
    pub directory: Option<std::path::PathBuf>,
}

/// Rename request body.
#[derive(Debug, Deserialize)]
pub struct RenameSessionRequest {
    pub name: String,
}

/// Start turn request body.
#[derive(Debug, Deserialize)]
pub struct StartTurnRequest {
    pub prompt: String,
    pub approval_choice: Option<u8>,
}

/// Follow-up input request body.
#[derive(Debug, Deserialize)]
pub struct SendInputRequest {
    pub text: String,
}

/// Bridge binding request body.
#[derive(Debug, Deserialize)]
pub struct BindBridgeRequest {
    pub platform: String,
}

/// Response for submit-style endpoints.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub ok: bool,
    /// True when the input joined the pending queue instead of starting
    /// a turn.
    pub queued: bool,
    pub session: Session,
}

impl SubmitResponse {
    fn new(outcome: SubmitOutcome, session: Session) -> Self {
        Self {
            ok: true,
            queued: outcome == SubmitOutcome::Queued,
            session,
        }
    }
}

fn parse_approval(choice: Option<u8>) -> ApiResult<Option<ApprovalMode>> {
    match choice {
        None => Ok(None),
        Some(n) => ApprovalMode::from_ordinal(n)
            .map(Some)
            .ok_or_else(|| ApiError::validation(format!("invalid approval choice: {n}"))),
    }
}

/// List all sessions.
#[instrument(skip(state))]
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<Session>> {
    Json(state.registry.list().await)
}

/// Create a new session.
#[instrument(skip(state, request))]
pub async fn create_session(
    State(state): State<AppState>,
    request: Option<Json<CreateSessionRequest>>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let approval = parse_approval(request.approval_choice)?;

    if let Some(directory) = &request.directory {
        if !directory.is_dir() {
            return Err(ApiError::validation(format!(
                "directory does not exist: {}",
                directory.display()
            )));
        }
    }

    let record = state.registry.create();
    let session = {
        let mut rec = record.lock().await;
        if let Some(name) = request.name {
            rec.session.name = Some(name);
        }
        if let Some(mode) = approval {
            rec.session.approval_mode = mode;
        }
        if let Some(directory) = request.directory {
            state.workdirs.adopt(&rec.session.id, directory.clone());
            rec.session.directory = Some(directory);
        }
        rec.session.clone()
    };

    if let Some(platform) = request.platform {
        state.bridges.subscribe(&session.id, &platform).await?;
    }

    info!(session_id = %session.id, "created session");
    Ok((StatusCode::CREATED, Json(session)))
}

/// Get a session by id.
#[instrument(skip(state))]
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Session>> {
    let record = state
        .registry
        .get(&session_id)
        .ok_or_else(|| ApiError::not_found(format!("session {session_id} not found")))?;
    let session = record.lock().await.session.clone();
    Ok(Json(session))
}

/// Delete a session. Sessions with an active turn must be stopped first.
#[instrument(skip(state))]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    let record = state
        .registry
        .get(&session_id)
        .ok_or_else(|| ApiError::not_found(format!("session {session_id} not found")))?;

    let state_now = record.lock().await.session.state;
    if matches!(
        state_now,
        SessionState::Running | SessionState::Interrupting
    ) {
        return Err(ApiError::InvalidTransition(format!(
            "session {session_id} has an active turn, stop it first"
        )));
    }

    state.bridges.unsubscribe(&session_id);
    state.registry.remove(&session_id);
    state.log.remove_session(&session_id);
    state.workdirs.release(&session_id);

    info!(session_id = %session_id, "deleted session");
    Ok(StatusCode::NO_CONTENT)
}

/// Rename a session.
#[instrument(skip(state, request))]
pub async fn rename_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<RenameSessionRequest>,
) -> ApiResult<Json<Session>> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("name must not be empty"));
    }
    let record = state
        .registry
        .get(&session_id)
        .ok_or_else(|| ApiError::not_found(format!("session {session_id} not found")))?;
    let session = {
        let mut rec = record.lock().await;
        rec.session.name = Some(name.to_string());
        rec.touch();
        rec.session.clone()
    };
    Ok(Json(session))
}

/// Start a turn (or queue the prompt if one is already running).
/// Creates the session on first use.
#[instrument(skip(state, request))]
pub async fn start_turn(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<StartTurnRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    if request.prompt.trim().is_empty() {
        return Err(ApiError::validation("prompt must not be empty"));
    }
    let approval = parse_approval(request.approval_choice)?;

    let (outcome, session) = state
        .scheduler
        .submit(&session_id, request.prompt, approval)
        .await?;
    info!(session_id = %session_id, queued = outcome == SubmitOutcome::Queued, "submitted turn");
    Ok(Json(SubmitResponse::new(outcome, session)))
}

/// Send follow-up input to an existing session.
#[instrument(skip(state, request))]
pub async fn send_input(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SendInputRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    if request.text.trim().is_empty() {
        return Err(ApiError::validation("text must not be empty"));
    }
    if state.registry.get(&session_id).is_none() {
        return Err(ApiError::not_found(format!(
            "session {session_id} not found"
        )));
    }

    let (outcome, session) = state.scheduler.submit(&session_id, request.text, None).await?;
    Ok(Json(SubmitResponse::new(outcome, session)))
}

/// Stop a session, cancelling its active turn if any.
#[instrument(skip(state))]
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Session>> {
    let session = state.scheduler.stop(&session_id).await?;
    info!(session_id = %session_id, state = %session.state, "stop requested");
    Ok(Json(session))
}

/// Bind a session to a registered bridge platform.
#[instrument(skip(state, request))]
pub async fn bind_bridge(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<BindBridgeRequest>,
) -> ApiResult<StatusCode> {
    if state.registry.get(&session_id).is_none() {
        return Err(ApiError::not_found(format!(
            "session {session_id} not found"
        )));
    }
    state.bridges.subscribe(&session_id, &request.platform).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Unbind a session from its bridge.
#[instrument(skip(state))]
pub async fn unbind_bridge(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    state.bridges.unsubscribe(&session_id);
    StatusCode::NO_CONTENT
}
