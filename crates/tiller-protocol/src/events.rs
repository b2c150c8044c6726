//! Canonical event types.
//!
//! Events are the immutable, ordered records appended to a session's log.
//! Every consumer -- the live SSE stream, poll clients, messaging bridges --
//! sees the same envelope: a session id, a strictly increasing per-session
//! sequence number, a timestamp, and a typed payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::SessionState;

// ============================================================================
// Event envelope
// ============================================================================

/// An event with routing metadata.
///
/// `seq` is session-scoped, starts at 1, and has no gaps from the log's
/// perspective. Consumers resume by remembering the last `seq` they saw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Which session this event belongs to.
    pub session_id: String,

    /// Per-session ordering key (1-based, gapless).
    pub seq: u64,

    /// Unix ms timestamp.
    pub ts: i64,

    /// The event payload.
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    /// The coarse type of this event, used for filtered queries.
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

// ============================================================================
// Event payloads
// ============================================================================

/// All event payloads, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Adapter announced itself (banner/model info) at turn start.
    Header { text: String },

    /// A chunk of agent output.
    Output {
        /// Logical stream the text came from (adapters emit "combined").
        stream: String,
        text: String,
        kind: OutputKind,
        /// True for the turn's terminal answer.
        #[serde(rename = "final")]
        is_final: bool,
    },

    /// A key/value fact about the turn (token usage, cost, duration).
    Metadata {
        key: String,
        value: Value,
        /// Human-readable rendering of `value`.
        raw: String,
    },

    /// Liveness signal. Emitted periodically while a turn runs; exactly one
    /// heartbeat with `done: true` closes every turn.
    Heartbeat { elapsed_s: f64, done: bool },

    /// The turn failed. At most one per turn.
    Error { code: String, message: String },

    /// Session lifecycle transition.
    Status { state: SessionState },

    /// An agent asked a human for permission to proceed.
    PermissionRequest {
        request_id: String,
        title: String,
        description: String,
        options: Vec<String>,
    },

    /// A human reply relayed from a bridge or the UI.
    HumanInput {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },

    /// A human resolved a permission request.
    PermissionResponse {
        request_id: String,
        option_selected: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Header { .. } => EventType::Header,
            Self::Output { .. } => EventType::Output,
            Self::Metadata { .. } => EventType::Metadata,
            Self::Heartbeat { .. } => EventType::Heartbeat,
            Self::Error { .. } => EventType::Error,
            Self::Status { .. } => EventType::Status,
            Self::PermissionRequest { .. } => EventType::PermissionRequest,
            Self::HumanInput { .. } => EventType::HumanInput,
            Self::PermissionResponse { .. } => EventType::PermissionResponse,
        }
    }
}

/// Whether an output chunk is an intermediate step or the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Step,
    Final,
}

// ============================================================================
// Event type filter
// ============================================================================

/// Coarse event kind, used in `query`/`poll` type filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Header,
    Output,
    Metadata,
    Heartbeat,
    Error,
    Status,
    PermissionRequest,
    HumanInput,
    PermissionResponse,
}

impl std::str::FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "header" => Ok(Self::Header),
            "output" => Ok(Self::Output),
            "metadata" => Ok(Self::Metadata),
            "heartbeat" => Ok(Self::Heartbeat),
            "error" => Ok(Self::Error),
            "status" => Ok(Self::Status),
            "permission_request" => Ok(Self::PermissionRequest),
            "human_input" => Ok(Self::HumanInput),
            "permission_response" => Ok(Self::PermissionResponse),
            other => Err(UnknownEventType(other.to_string())),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Header => "header",
            Self::Output => "output",
            Self::Metadata => "metadata",
            Self::Heartbeat => "heartbeat",
            Self::Error => "error",
            Self::Status => "status",
            Self::PermissionRequest => "permission_request",
            Self::HumanInput => "human_input",
            Self::PermissionResponse => "permission_response",
        };
        write!(f, "{s}")
    }
}

/// Error for unrecognized event type strings in filters.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);
