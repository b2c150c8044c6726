//! Canonical protocol types for Tiller.
//!
//! These types form the shared vocabulary between the server, LLM adapters,
//! and messaging bridges: the per-session event log entries, the raw items an
//! adapter yields during a turn, and the session lifecycle state machine.

pub mod events;
pub mod session;
pub mod turn;

pub use events::{Event, EventPayload, EventType, OutputKind, UnknownEventType};
pub use session::{InvalidTransition, SessionState};
pub use turn::{ApprovalMode, TurnItem};
