//! Session lifecycle state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle states for a supervised session.
///
/// Valid edges:
///
/// ```text
/// CREATED → RUNNING → {AWAITING_INPUT, ERROR, STOPPED}
/// RUNNING → INTERRUPTING → STOPPED
/// AWAITING_INPUT → RUNNING        (new submitted input)
/// ERROR | STOPPED → RUNNING       (fresh submit starts a new logical run)
/// any non-terminal → STOPPED      (explicit stop)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Created,
    Running,
    AwaitingInput,
    Interrupting,
    Error,
    Stopped,
}

impl SessionState {
    /// Terminal states stay put until a fresh submit reactivates the session.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Stopped)
    }

    /// Whether the edge `self → next` is in the transition table.
    pub fn can_transition(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Created, Running) => true,
            (Running, AwaitingInput | Error | Interrupting | Stopped) => true,
            (Interrupting, Stopped) => true,
            (AwaitingInput, Running) => true,
            // Reactivation: a submit against a terminal session starts a new
            // logical run on the same id.
            (Error | Stopped, Running) => true,
            // Explicit stop from any non-terminal state.
            (Created | AwaitingInput, Stopped) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::Running => "RUNNING",
            Self::AwaitingInput => "AWAITING_INPUT",
            Self::Interrupting => "INTERRUPTING",
            Self::Error => "ERROR",
            Self::Stopped => "STOPPED",
        };
        write!(f, "{s}")
    }
}

/// Rejected state machine edge. Callers treat this as a programming-error
/// signal, not a user-recoverable condition.
#[derive(Debug, Clone, Error)]
#[error("invalid transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_edges() {
        use SessionState::*;
        assert!(Created.can_transition(Running));
        assert!(Running.can_transition(AwaitingInput));
        assert!(AwaitingInput.can_transition(Running));
        assert!(Running.can_transition(Interrupting));
        assert!(Interrupting.can_transition(Stopped));
    }

    #[test]
    fn test_rejected_edges() {
        use SessionState::*;
        assert!(!Created.can_transition(AwaitingInput));
        assert!(!Stopped.can_transition(AwaitingInput));
        assert!(!Error.can_transition(Stopped));
        assert!(!Interrupting.can_transition(Running));
        assert!(!AwaitingInput.can_transition(Error));
    }

    #[test]
    fn test_terminal_reactivation() {
        use SessionState::*;
        assert!(Error.can_transition(Running));
        assert!(Stopped.can_transition(Running));
        assert!(Error.is_terminal());
        assert!(Stopped.is_terminal());
        assert!(!Interrupting.is_terminal());
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&SessionState::AwaitingInput).unwrap();
        assert_eq!(json, "\"AWAITING_INPUT\"");
        let state: SessionState = serde_json::from_str("\"RUNNING\"").unwrap();
        assert_eq!(state, SessionState::Running);
    }
}
