//! Append-only per-session event log.
//!
//! The log is the single ordering authority: `seq` allocation, the append
//! itself, and the live broadcast all happen under one per-session lock, so
//! no consumer can observe event N+1 without N having been appended first.
//! Heartbeat ticks and adapter-driven output append from different tasks;
//! the lock serializes them.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};

use tiller_protocol::{Event, EventPayload, EventType};

/// Capacity of the per-session live broadcast channel. A push subscriber
/// that falls this far behind is dropped rather than given a gap.
const BROADCAST_BUFFER_SIZE: usize = 256;

/// Errors from log operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// The caller's cursor points before the retention window; replaying
    /// from it would silently skip evicted events.
    #[error("stale cursor {since_seq} for session {session_id}: oldest available seq is {oldest}")]
    StaleCursor {
        session_id: String,
        since_seq: u64,
        oldest: u64,
    },
}

/// Per-session log state, guarded by one lock.
struct SessionLog {
    /// Next seq to allocate (starts at 1).
    next_seq: u64,
    /// Highest seq evicted by retention (0 if none yet).
    evicted_through: u64,
    events: VecDeque<Event>,
    tx: broadcast::Sender<Event>,
}

impl SessionLog {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_BUFFER_SIZE);
        Self {
            next_seq: 1,
            evicted_through: 0,
            events: VecDeque::new(),
            tx,
        }
    }

    fn range(
        &self,
        session_id: &str,
        since_seq: u64,
        types: Option<&[EventType]>,
    ) -> Result<Vec<Event>, LogError> {
        if since_seq < self.evicted_through {
            return Err(LogError::StaleCursor {
                session_id: session_id.to_string(),
                since_seq,
                oldest: self.evicted_through + 1,
            });
        }
        Ok(self
            .events
            .iter()
            .filter(|e| e.seq > since_seq)
            .filter(|e| types.is_none_or(|t| t.contains(&e.event_type())))
            .cloned()
            .collect())
    }
}

/// Ordered event log for all sessions.
pub struct EventLog {
    sessions: DashMap<String, Arc<Mutex<SessionLog>>>,
    max_events: usize,
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_events,
        }
    }

    fn session_log(&self, session_id: &str) -> Arc<Mutex<SessionLog>> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionLog::new())))
            .clone()
    }

    /// Allocate the next seq for the session and append atomically.
    ///
    /// The returned event has already been offered to live subscribers.
    pub async fn append(&self, session_id: &str, payload: EventPayload) -> Event {
        let log = self.session_log(session_id);
        let mut log = log.lock().await;

        let event = Event {
            session_id: session_id.to_string(),
            seq: log.next_seq,
            ts: Utc::now().timestamp_millis(),
            payload,
        };
        log.next_seq += 1;
        log.events.push_back(event.clone());

        while log.events.len() > self.max_events {
            if let Some(evicted) = log.events.pop_front() {
                log.evicted_through = evicted.seq;
            }
        }

        // No live subscribers is fine; poll consumers read the log directly.
        let _ = log.tx.send(event.clone());
        event
    }

    /// All events with `seq > since_seq`, in seq order, optionally filtered
    /// by type. Serves both poll consumers and SSE replay-on-reconnect.
    pub async fn query(
        &self,
        session_id: &str,
        since_seq: u64,
        types: Option<&[EventType]>,
    ) -> Result<Vec<Event>, LogError> {
        let log = self.session_log(session_id);
        let log = log.lock().await;
        log.range(session_id, since_seq, types)
    }

    /// Replay plus a live receiver, taken under one lock acquisition so the
    /// replay→live splice has no gap and no duplicate seq.
    ///
    /// `since_seq: None` skips replay and tails from now.
    pub async fn subscribe_with_replay(
        &self,
        session_id: &str,
        since_seq: Option<u64>,
    ) -> Result<(Vec<Event>, broadcast::Receiver<Event>), LogError> {
        let log = self.session_log(session_id);
        let log = log.lock().await;
        let replay = match since_seq {
            Some(since) => log.range(session_id, since, None)?,
            None => Vec::new(),
        };
        Ok((replay, log.tx.subscribe()))
    }

    /// Last allocated seq for the session (0 if nothing appended).
    pub async fn last_seq(&self, session_id: &str) -> u64 {
        let log = self.session_log(session_id);
        let log = log.lock().await;
        log.next_seq - 1
    }

    /// Drop a session's log (on session delete).
    pub fn remove_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiller_protocol::OutputKind;

    fn step(text: &str) -> EventPayload {
        EventPayload::Output {
            stream: "combined".to_string(),
            text: text.to_string(),
            kind: OutputKind::Step,
            is_final: false,
        }
    }

    #[tokio::test]
    async fn test_seq_starts_at_one_and_is_gapless() {
        let log = EventLog::new(100);
        for i in 1..=5u64 {
            let event = log.append("s", step("x")).await;
            assert_eq!(event.seq, i);
        }
        let events = log.query("s", 0, None).await.unwrap();
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_query_since_and_type_filter() {
        let log = EventLog::new(100);
        log.append("s", step("a")).await;
        log.append(
            "s",
            EventPayload::Heartbeat {
                elapsed_s: 1.0,
                done: false,
            },
        )
        .await;
        log.append("s", step("b")).await;

        let events = log.query("s", 1, None).await.unwrap();
        assert_eq!(events.len(), 2);

        let outputs = log
            .query("s", 0, Some(&[EventType::Output]))
            .await
            .unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[1].seq, 3);
    }

    #[tokio::test]
    async fn test_query_is_idempotent() {
        let log = EventLog::new(100);
        for _ in 0..4 {
            log.append("s", step("x")).await;
        }
        let first = log.query("s", 2, None).await.unwrap();
        let second = log.query("s", 2, None).await.unwrap();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.seq, b.seq);
        }
    }

    #[tokio::test]
    async fn test_retention_evicts_and_staleness_detected() {
        let log = EventLog::new(3);
        for _ in 0..6 {
            log.append("s", step("x")).await;
        }
        // Window now holds seqs 4..=6.
        let events = log.query("s", 3, None).await.unwrap();
        assert_eq!(events.first().unwrap().seq, 4);

        let err = log.query("s", 1, None).await.unwrap_err();
        match err {
            LogError::StaleCursor { oldest, .. } => assert_eq!(oldest, 4),
        }
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let log = EventLog::new(100);
        log.append("a", step("x")).await;
        let event = log.append("b", step("y")).await;
        assert_eq!(event.seq, 1);
        assert_eq!(log.last_seq("a").await, 1);
    }

    #[tokio::test]
    async fn test_subscribe_with_replay_splice() {
        let log = EventLog::new(100);
        log.append("s", step("one")).await;
        log.append("s", step("two")).await;

        let (replay, mut rx) = log.subscribe_with_replay("s", Some(1)).await.unwrap();
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].seq, 2);

        log.append("s", step("three")).await;
        let live = rx.recv().await.unwrap();
        assert_eq!(live.seq, 3);
    }

    #[tokio::test]
    async fn test_concurrent_appends_allocate_unique_seqs() {
        let log = Arc::new(EventLog::new(1000));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    log.append("s", step("x")).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let events = log.query("s", 0, None).await.unwrap();
        assert_eq!(events.len(), 200);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.seq, i as u64 + 1);
        }
    }
}
