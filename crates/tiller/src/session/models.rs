//! Session metadata and the per-session mutable record.

use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use tiller_protocol::{ApprovalMode, InvalidTransition, SessionState};

/// Maximum length of a derived session display name.
const MAX_NAME_LEN: usize = 80;

/// Server-side session metadata exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub state: SessionState,
    /// Display name, derived from the first prompt unless renamed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Opaque messaging platform binding, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub approval_mode: ApprovalMode,
    /// Working directory, once acquired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Unix ms.
    pub created_at: i64,
    /// Unix ms.
    pub last_activity_at: i64,
}

/// Mutable per-session record, owned by the registry behind a lock.
///
/// All state mutation goes through here; the scheduler locks the record for
/// the duration of each decision so submit/stop races resolve to a single
/// winner.
#[derive(Debug)]
pub struct SessionRecord {
    pub session: Session,
    /// FIFO queue of follow-up inputs waiting for the current turn to end.
    pub pending_inputs: VecDeque<String>,
}

impl SessionRecord {
    pub fn new(id: String) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            session: Session {
                id,
                state: SessionState::Created,
                name: None,
                platform: None,
                approval_mode: ApprovalMode::default(),
                directory: None,
                created_at: now,
                last_activity_at: now,
            },
            pending_inputs: VecDeque::new(),
        }
    }

    /// Apply a state machine edge, or fail with `InvalidTransition`.
    pub fn transition(&mut self, to: SessionState) -> Result<(), InvalidTransition> {
        let from = self.session.state;
        if !from.can_transition(to) {
            return Err(InvalidTransition { from, to });
        }
        self.session.state = to;
        self.touch();
        Ok(())
    }

    /// Update the activity timestamp.
    pub fn touch(&mut self) {
        self.session.last_activity_at = Utc::now().timestamp_millis();
    }

    /// Derive a display name from the first prompt. Set-once; later prompts
    /// and explicit renames win over this.
    pub fn maybe_set_name(&mut self, prompt: &str) {
        if self.session.name.is_some() {
            return;
        }
        let cleaned: String = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
        if cleaned.is_empty() {
            return;
        }
        let name: String = cleaned.chars().take(MAX_NAME_LEN).collect();
        self.session.name = Some(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_updates_state() {
        let mut record = SessionRecord::new("sess_a".to_string());
        record.transition(SessionState::Running).unwrap();
        assert_eq!(record.session.state, SessionState::Running);
    }

    #[test]
    fn test_transition_rejects_bad_edge() {
        let mut record = SessionRecord::new("sess_a".to_string());
        let err = record.transition(SessionState::AwaitingInput).unwrap_err();
        assert_eq!(err.from, SessionState::Created);
        assert_eq!(record.session.state, SessionState::Created);
    }

    #[test]
    fn test_name_derived_once() {
        let mut record = SessionRecord::new("sess_a".to_string());
        record.maybe_set_name("  fix   the \n parser  ");
        assert_eq!(record.session.name.as_deref(), Some("fix the parser"));
        record.maybe_set_name("something else");
        assert_eq!(record.session.name.as_deref(), Some("fix the parser"));
    }

    #[test]
    fn test_name_capped() {
        let mut record = SessionRecord::new("sess_a".to_string());
        record.maybe_set_name(&"x".repeat(300));
        assert_eq!(record.session.name.as_ref().unwrap().len(), 80);
    }
}
