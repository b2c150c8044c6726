//! Bridge router.
//!
//! One poll task per subscribed session reads the log with a persisted
//! cursor and dispatches matching events to that session's bridge. The
//! cursor survives restarts (a JSON file per session/platform pair), so a
//! bridge resumes where it left off instead of replaying the whole log.
//! Inbound traffic (human replies, permission responses) flows the other
//! way: appended to the log, then handed to the scheduler.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;

use tiller_protocol::{Event, EventPayload, EventType};

use crate::events::{EventLog, LogError};
use crate::scheduler::{SchedulerError, SubmitOutcome, TurnScheduler};
use crate::session::{Session, SessionRegistry};

use super::{Bridge, PermissionRequest};

/// Event types a bridge cares about. Everything else stays server-side.
const BRIDGE_EVENT_TYPES: [EventType; 3] = [
    EventType::Output,
    EventType::Status,
    EventType::PermissionRequest,
];

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no bridge registered for platform {0}")]
    UnknownPlatform(String),

    #[error("unknown permission request {0}")]
    UnknownRequest(String),
}

/// Persisted poll position for one session/platform pair.
#[derive(Debug, Serialize, Deserialize)]
struct Cursor {
    last_seq: u64,
}

pub struct BridgeRouter {
    bridges: DashMap<String, Arc<dyn Bridge>>,
    registry: Arc<SessionRegistry>,
    log: Arc<EventLog>,
    scheduler: Arc<TurnScheduler>,
    cursor_dir: PathBuf,
    poll_interval: Duration,
    /// One poll task per subscribed session.
    tasks: DashMap<String, JoinHandle<()>>,
    /// Open permission requests: request id to session id.
    pending_permissions: DashMap<String, String>,
}

impl BridgeRouter {
    pub fn new(
        registry: Arc<SessionRegistry>,
        log: Arc<EventLog>,
        scheduler: Arc<TurnScheduler>,
        data_dir: &std::path::Path,
        poll_interval: Duration,
    ) -> Self {
        let cursor_dir = data_dir.join("bridge_cursors");
        if let Err(err) = std::fs::create_dir_all(&cursor_dir) {
            warn!(
                "cannot create bridge cursor dir {}: {err}",
                cursor_dir.display()
            );
        }
        Self {
            bridges: DashMap::new(),
            registry,
            log,
            scheduler,
            cursor_dir,
            poll_interval,
            tasks: DashMap::new(),
            pending_permissions: DashMap::new(),
        }
    }

    pub fn register_bridge(&self, bridge: Arc<dyn Bridge>) {
        debug!("registering bridge for platform {}", bridge.platform());
        self.bridges.insert(bridge.platform().to_string(), bridge);
    }

    /// Bind a session to a platform bridge and start its poll task.
    /// Resubscribing replaces any previous task for the session.
    pub async fn subscribe(&self, session_id: &str, platform: &str) -> Result<(), RouterError> {
        let bridge = self
            .bridges
            .get(platform)
            .map(|b| b.clone())
            .ok_or_else(|| RouterError::UnknownPlatform(platform.to_string()))?;

        let record = self.registry.get_or_create(session_id);
        record.lock().await.session.platform = Some(platform.to_string());

        let cursor_path = self.cursor_dir.join(format!("{session_id}.{platform}.json"));
        let task = tokio::spawn(poll_loop(
            bridge,
            self.log.clone(),
            session_id.to_string(),
            cursor_path,
            self.poll_interval,
        ));
        if let Some(old) = self.tasks.insert(session_id.to_string(), task) {
            old.abort();
        }
        Ok(())
    }

    /// Stop routing for a session. The persisted cursor is kept, so a later
    /// subscribe resumes without duplicates.
    pub fn unsubscribe(&self, session_id: &str) {
        if let Some((_, task)) = self.tasks.remove(session_id) {
            task.abort();
        }
    }

    /// Remember which session an open permission request belongs to.
    pub fn track_permission_request(&self, request_id: &str, session_id: &str) {
        self.pending_permissions
            .insert(request_id.to_string(), session_id.to_string());
    }

    /// Relay a human message into the session: record it as an event, then
    /// submit it as turn input (starting or queueing per scheduler rules).
    /// Blank messages are rejected before anything is recorded.
    pub async fn handle_human_input(
        &self,
        session_id: &str,
        text: String,
        username: Option<String>,
    ) -> Result<(SubmitOutcome, Session), SchedulerError> {
        if text.trim().is_empty() {
            return Err(SchedulerError::EmptyInput(session_id.to_string()));
        }
        self.log
            .append(
                session_id,
                EventPayload::HumanInput {
                    text: text.clone(),
                    username,
                },
            )
            .await;
        self.scheduler.submit(session_id, text, None).await
    }

    /// Resolve an open permission request with the human's choice. The
    /// request only resolves through the session it was raised on.
    pub async fn handle_permission_response(
        &self,
        session_id: &str,
        request_id: &str,
        option_selected: String,
        username: Option<String>,
    ) -> Result<Event, RouterError> {
        self.pending_permissions
            .remove_if(request_id, |_, tracked| tracked.as_str() == session_id)
            .ok_or_else(|| RouterError::UnknownRequest(request_id.to_string()))?;
        let event = self
            .log
            .append(
                session_id,
                EventPayload::PermissionResponse {
                    request_id: request_id.to_string(),
                    option_selected,
                    username,
                },
            )
            .await;
        Ok(event)
    }

    pub fn shutdown(&self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
        self.tasks.clear();
    }
}

/// Poll task body for one session/bridge pair.
async fn poll_loop(
    bridge: Arc<dyn Bridge>,
    log: Arc<EventLog>,
    session_id: String,
    cursor_path: PathBuf,
    poll_interval: Duration,
) {
    let mut cursor = load_cursor(&cursor_path);

    loop {
        let events = match log
            .query(&session_id, cursor, Some(&BRIDGE_EVENT_TYPES))
            .await
        {
            Ok(events) => events,
            Err(LogError::StaleCursor { oldest, .. }) => {
                warn!(
                    "bridge cursor for {session_id} fell behind retention, skipping to {oldest}"
                );
                cursor = oldest.saturating_sub(1);
                continue;
            }
        };

        if events.is_empty() {
            tokio::time::sleep(poll_interval).await;
            continue;
        }

        for event in events {
            if let Err(err) = dispatch(bridge.as_ref(), &event).await {
                warn!(
                    "bridge {} delivery failed for {session_id} seq {}: {err}",
                    bridge.platform(),
                    event.seq
                );
            }
            cursor = event.seq;
        }
        store_cursor(&cursor_path, cursor);
    }
}

async fn dispatch(bridge: &dyn Bridge, event: &Event) -> anyhow::Result<()> {
    match &event.payload {
        // Steps and final answers both reach the bridge; rendering is the
        // bridge's call.
        EventPayload::Output { text, .. } => bridge.on_output(&event.session_id, text).await,
        EventPayload::Status { state } => bridge.on_status(&event.session_id, *state).await,
        EventPayload::PermissionRequest {
            request_id,
            title,
            description,
            options,
        } => {
            let request = PermissionRequest {
                request_id: request_id.clone(),
                title: title.clone(),
                description: description.clone(),
                options: options.clone(),
            };
            bridge
                .on_permission_request(&event.session_id, &request)
                .await
        }
        _ => Ok(()),
    }
}

fn load_cursor(path: &PathBuf) -> u64 {
    let Ok(bytes) = std::fs::read(path) else {
        return 0;
    };
    match serde_json::from_slice::<Cursor>(&bytes) {
        Ok(cursor) => cursor.last_seq,
        Err(err) => {
            warn!("ignoring corrupt bridge cursor {}: {err}", path.display());
            0
        }
    }
}

fn store_cursor(path: &PathBuf, last_seq: u64) {
    match serde_json::to_vec(&Cursor { last_seq }) {
        Ok(bytes) => {
            if let Err(err) = std::fs::write(path, bytes) {
                warn!("cannot persist bridge cursor {}: {err}", path.display());
            }
        }
        Err(err) => warn!("cannot serialize bridge cursor: {err}"),
    }
}
