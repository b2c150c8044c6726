//! Turn scheduler.
//!
//! At most one turn runs per session. A submit against an idle session
//! starts a turn task; a submit against a busy session queues the input.
//! Every turn, however it ends, goes through one teardown path: heartbeat
//! ticker stopped, a single `done: true` heartbeat, a duration metadata
//! event, then the state transition and its status event. Queued inputs
//! drain in FIFO order after a completed turn; a failed or stopped turn
//! discards them.

mod heartbeat;
mod translate;

pub use heartbeat::{HeartbeatHandle, HeartbeatMonitor};
pub use translate::translate_item;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, error, warn};
use serde_json::json;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use tiller_protocol::{ApprovalMode, EventPayload, InvalidTransition, SessionState, TurnItem};

use crate::adapter::{Adapter, TurnRequest};
use crate::events::EventLog;
use crate::session::{RegistryError, Session, SessionRegistry};
use crate::workdir::WorkdirManager;

/// What a submit did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new turn was started.
    Started,
    /// A turn was already active; the input joined the pending queue.
    Queued,
}

/// Errors surfaced to submit/stop callers. Turn execution itself never
/// returns errors; failures inside a turn become error events.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("pending input queue full for session {0}")]
    QueueFull(String),

    #[error("empty input for session {0}")]
    EmptyInput(String),
}

impl From<RegistryError> for SchedulerError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => Self::NotFound(id),
            RegistryError::InvalidTransition(e) => Self::InvalidTransition(e),
            RegistryError::QueueFull(id) => Self::QueueFull(id),
        }
    }
}

/// How a turn ended, for the teardown transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnEnd {
    Completed,
    Failed,
    Cancelled,
}

pub struct TurnScheduler {
    inner: Arc<SchedulerInner>,
}

/// Bookkeeping for a session's active turn task. The generation lets the
/// task clean up only its own map entry: a successor turn registered in the
/// same slot keeps its token.
struct ActiveTurn {
    generation: u64,
    cancel: CancellationToken,
}

struct SchedulerInner {
    registry: Arc<SessionRegistry>,
    log: Arc<EventLog>,
    adapter: Arc<dyn Adapter>,
    workdirs: Arc<WorkdirManager>,
    heartbeat: HeartbeatMonitor,
    /// Active turn task per session.
    turns: DashMap<String, ActiveTurn>,
    turn_generation: AtomicU64,
}

impl TurnScheduler {
    pub fn new(
        registry: Arc<SessionRegistry>,
        log: Arc<EventLog>,
        adapter: Arc<dyn Adapter>,
        workdirs: Arc<WorkdirManager>,
        heartbeat_period: Duration,
    ) -> Self {
        let heartbeat = HeartbeatMonitor::new(log.clone(), heartbeat_period);
        Self {
            inner: Arc::new(SchedulerInner {
                registry,
                log,
                adapter,
                workdirs,
                heartbeat,
                turns: DashMap::new(),
                turn_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Submit input to a session, creating it if needed.
    ///
    /// Idle session: starts a turn and returns `Started`. Busy session:
    /// queues the input (subject to the pending cap) and returns `Queued`.
    /// Blank input is rejected before any state change. The submit/stop
    /// race is resolved under the record lock; exactly one caller wins
    /// each transition.
    pub async fn submit(
        &self,
        session_id: &str,
        input: String,
        approval: Option<ApprovalMode>,
    ) -> Result<(SubmitOutcome, Session), SchedulerError> {
        if input.trim().is_empty() {
            return Err(SchedulerError::EmptyInput(session_id.to_string()));
        }
        let record = self.inner.registry.get_or_create(session_id);
        let mut rec = record.lock().await;

        match rec.session.state {
            SessionState::Running | SessionState::Interrupting => {
                self.inner.registry.push_pending(&mut rec, input)?;
                rec.touch();
                debug!(
                    "queued input for {session_id} ({} pending)",
                    rec.pending_inputs.len()
                );
                Ok((SubmitOutcome::Queued, rec.session.clone()))
            }
            _ => {
                if let Some(mode) = approval {
                    rec.session.approval_mode = mode;
                }
                rec.maybe_set_name(&input);
                rec.transition(SessionState::Running)?;
                let session = rec.session.clone();

                // Register the token before the record lock drops so a stop
                // racing this submit always finds something to cancel.
                let cancel = CancellationToken::new();
                let generation = self.inner.turn_generation.fetch_add(1, Ordering::Relaxed);
                self.inner.turns.insert(
                    session_id.to_string(),
                    ActiveTurn {
                        generation,
                        cancel: cancel.clone(),
                    },
                );
                drop(rec);

                self.inner
                    .emit_status(session_id, SessionState::Running)
                    .await;

                let inner = self.inner.clone();
                let sid = session_id.to_string();
                tokio::spawn(async move {
                    inner.run_session_turns(sid, input, cancel, generation).await;
                });

                Ok((SubmitOutcome::Started, session))
            }
        }
    }

    /// Request the session stop.
    ///
    /// A running session moves to INTERRUPTING and its turn is cancelled;
    /// the turn task finishes teardown and lands in STOPPED. An idle
    /// session moves straight to STOPPED. Pending inputs are discarded and
    /// the working directory is released whenever the session lands in
    /// STOPPED. Stopping an already stopped or errored session is a no-op,
    /// not an error.
    pub async fn stop(&self, session_id: &str) -> Result<Session, SchedulerError> {
        let record = self
            .inner
            .registry
            .get(session_id)
            .ok_or_else(|| SchedulerError::NotFound(session_id.to_string()))?;
        let mut rec = record.lock().await;
        rec.pending_inputs.clear();

        match rec.session.state {
            SessionState::Running => {
                rec.transition(SessionState::Interrupting)?;
                let session = rec.session.clone();
                drop(rec);
                self.inner
                    .emit_status(session_id, SessionState::Interrupting)
                    .await;
                if let Some(active) = self.inner.turns.get(session_id) {
                    active.cancel.cancel();
                }
                Ok(session)
            }
            SessionState::Created | SessionState::AwaitingInput => {
                rec.transition(SessionState::Stopped)?;
                let session = rec.session.clone();
                drop(rec);
                self.inner
                    .emit_status(session_id, SessionState::Stopped)
                    .await;
                self.inner.workdirs.release(session_id);
                Ok(session)
            }
            // Already interrupting, stopped, or errored.
            _ => Ok(rec.session.clone()),
        }
    }
}

impl SchedulerInner {
    async fn emit_status(&self, session_id: &str, state: SessionState) {
        self.log
            .append(session_id, EventPayload::Status { state })
            .await;
    }

    /// Turn task body: run the submitted turn, then drain queued inputs
    /// for as long as turns complete normally.
    async fn run_session_turns(
        self: Arc<Self>,
        session_id: String,
        first_input: String,
        cancel: CancellationToken,
        generation: u64,
    ) {
        let mut input = first_input;
        loop {
            let end = self.run_turn(&session_id, &input, cancel.clone()).await;

            if end != TurnEnd::Completed {
                if let Some(record) = self.registry.get(&session_id) {
                    record.lock().await.pending_inputs.clear();
                }
                break;
            }

            let next = {
                let Some(record) = self.registry.get(&session_id) else {
                    break;
                };
                let mut rec = record.lock().await;
                if rec.session.state != SessionState::AwaitingInput {
                    rec.pending_inputs.clear();
                    None
                } else {
                    match rec.pending_inputs.pop_front() {
                        Some(next) => match rec.transition(SessionState::Running) {
                            Ok(()) => Some(next),
                            Err(err) => {
                                warn!("cannot resume queued turn for {session_id}: {err}");
                                None
                            }
                        },
                        None => None,
                    }
                }
            };

            match next {
                Some(next) => {
                    self.emit_status(&session_id, SessionState::Running).await;
                    input = next;
                }
                None => break,
            }
        }
        // A reactivating submit may already own the slot; leave its token.
        self.turns
            .remove_if(&session_id, |_, active| active.generation == generation);
    }

    /// Execute one turn end to end, including the single teardown path.
    async fn run_turn(&self, session_id: &str, input: &str, cancel: CancellationToken) -> TurnEnd {
        let started = Instant::now();
        let record = self.registry.get_or_create(session_id);

        let workdir = match self.workdirs.acquire(session_id) {
            Ok(path) => {
                record.lock().await.session.directory = Some(path.clone());
                Some(path)
            }
            Err(err) => {
                warn!("workdir unavailable for {session_id}, running without: {err}");
                None
            }
        };
        let approval_mode = record.lock().await.session.approval_mode;

        let beat = self.heartbeat.start(session_id);

        let request = TurnRequest {
            session_id: session_id.to_string(),
            input: input.to_string(),
            workdir,
            approval_mode,
            cancel: cancel.clone(),
        };

        let mut end = TurnEnd::Completed;
        match self.adapter.start_turn(request).await {
            Err(err) => {
                error!("adapter failed to start turn for {session_id}: {err}");
                self.log
                    .append(
                        session_id,
                        EventPayload::Error {
                            code: "INTERNAL_ERROR".to_string(),
                            message: err.to_string(),
                        },
                    )
                    .await;
                end = TurnEnd::Failed;
            }
            Ok(mut stream) => loop {
                let item = tokio::select! {
                    _ = cancel.cancelled() => {
                        end = TurnEnd::Cancelled;
                        break;
                    }
                    item = stream.next() => item,
                };
                match item {
                    None => {
                        if cancel.is_cancelled() {
                            end = TurnEnd::Cancelled;
                        }
                        break;
                    }
                    Some(Ok(item)) => {
                        let fatal = matches!(item, TurnItem::Fatal { .. });
                        for payload in translate_item(item) {
                            self.log.append(session_id, payload).await;
                        }
                        if fatal {
                            end = TurnEnd::Failed;
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        error!("adapter stream error for {session_id}: {err}");
                        self.log
                            .append(
                                session_id,
                                EventPayload::Error {
                                    code: "INTERNAL_ERROR".to_string(),
                                    message: err.to_string(),
                                },
                            )
                            .await;
                        end = TurnEnd::Failed;
                        break;
                    }
                }
            },
        }

        // Teardown. Stop ticking before the final heartbeat so no
        // non-final tick can land after it.
        drop(beat);
        self.log
            .append(
                session_id,
                EventPayload::Heartbeat {
                    elapsed_s: started.elapsed().as_secs_f64(),
                    done: true,
                },
            )
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;
        self.log
            .append(
                session_id,
                EventPayload::Metadata {
                    key: "duration_ms".to_string(),
                    value: json!(duration_ms),
                    raw: format!("{duration_ms} ms"),
                },
            )
            .await;

        let mut new_state = None;
        {
            let mut rec = record.lock().await;
            let target = match (end, rec.session.state) {
                // A stop landed during the turn; honor it even if the
                // stream finished or failed on its own in the meantime.
                (_, SessionState::Interrupting) => SessionState::Stopped,
                (TurnEnd::Cancelled, _) => SessionState::Stopped,
                (TurnEnd::Failed, _) => SessionState::Error,
                (TurnEnd::Completed, _) => SessionState::AwaitingInput,
            };
            match rec.transition(target) {
                Ok(()) => new_state = Some(target),
                Err(err) => warn!("teardown transition failed for {session_id}: {err}"),
            }
        }
        if let Some(state) = new_state {
            self.emit_status(session_id, state).await;
            if state == SessionState::Stopped {
                self.workdirs.release(session_id);
            }
        }

        end
    }
}
