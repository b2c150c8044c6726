//! Session registry.
//!
//! Owns every session record for the lifetime of the process. Constructed
//! once at startup and shared by reference with the scheduler, hub, and API
//! layer; there are no module-level singletons.

use std::sync::Arc;

use dashmap::DashMap;
use log::debug;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use tiller_protocol::InvalidTransition;

use super::models::{Session, SessionRecord};

/// A shared, lockable session record.
pub type SharedRecord = Arc<Mutex<SessionRecord>>;

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("pending input queue full for session {0}")]
    QueueFull(String),
}

/// Registry of all sessions, keyed by session id.
pub struct SessionRegistry {
    sessions: DashMap<String, SharedRecord>,
    pending_limit: usize,
}

impl SessionRegistry {
    pub fn new(pending_limit: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            pending_limit,
        }
    }

    /// Return the existing session or create one in CREATED state.
    ///
    /// No side effects beyond bookkeeping; turn execution is the
    /// scheduler's job.
    pub fn get_or_create(&self, id: &str) -> SharedRecord {
        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!("creating session {id}");
                Arc::new(Mutex::new(SessionRecord::new(id.to_string())))
            })
            .clone()
    }

    /// Create a session with a generated `sess_<hex>` id.
    pub fn create(&self) -> SharedRecord {
        let id = format!("sess_{}", &Uuid::new_v4().simple().to_string()[..12]);
        self.get_or_create(&id)
    }

    pub fn get(&self, id: &str) -> Option<SharedRecord> {
        self.sessions.get(id).map(|r| r.clone())
    }

    /// Remove a session record. Returns false if it did not exist.
    pub fn remove(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Snapshot all session metadata.
    pub async fn list(&self) -> Vec<Session> {
        let records: Vec<SharedRecord> = self.sessions.iter().map(|r| r.clone()).collect();
        let mut sessions = Vec::with_capacity(records.len());
        for record in records {
            sessions.push(record.lock().await.session.clone());
        }
        sessions
    }

    /// Queue a follow-up input, enforcing the pending cap.
    pub fn push_pending(&self, record: &mut SessionRecord, input: String) -> Result<(), RegistryError> {
        if record.pending_inputs.len() >= self.pending_limit {
            return Err(RegistryError::QueueFull(record.session.id.clone()));
        }
        record.pending_inputs.push_back(input);
        Ok(())
    }
}
