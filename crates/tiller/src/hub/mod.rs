//! Subscriber hub: fan-out of log events to push and poll consumers.
//!
//! Both delivery modes sit on the same range-query primitive. Push is
//! "replay then tail" over the log's broadcast channel; poll is "replay
//! once" with a caller-held cursor. Cross-consumer ordering is inherited
//! from the log: every consumer observes events in non-decreasing seq order.

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::{broadcast, mpsc};

use tiller_protocol::{Event, EventType};

use crate::events::{EventLog, LogError};

/// Size of the per-connection push buffer.
const PUSH_BUFFER_SIZE: usize = 64;

/// A live push subscription. Dropping the receiver disconnects the
/// subscriber; nothing is redelivered after that (at-most-once).
pub struct PushSubscription {
    pub rx: mpsc::Receiver<Event>,
}

/// Fan-out layer over the event log.
pub struct SubscriberHub {
    log: Arc<EventLog>,
}

impl SubscriberHub {
    pub fn new(log: Arc<EventLog>) -> Self {
        Self { log }
    }

    /// Open a live push stream for a session.
    ///
    /// With `resume_from`, all events with `seq > resume_from` are replayed
    /// first, then the stream switches to live tailing. Seq order is
    /// preserved across the splice: no duplicate, no gap. A subscriber that
    /// lags past the broadcast buffer is disconnected instead of receiving
    /// a gapped stream.
    pub async fn open_push(
        &self,
        session_id: &str,
        resume_from: Option<u64>,
    ) -> Result<PushSubscription, LogError> {
        let (replay, live_rx) = self
            .log
            .subscribe_with_replay(session_id, resume_from)
            .await?;

        let (tx, rx) = mpsc::channel(PUSH_BUFFER_SIZE);
        let session_id = session_id.to_string();
        tokio::spawn(forward_events(session_id, replay, live_rx, tx, resume_from));

        Ok(PushSubscription { rx })
    }

    /// Stateless pull: all events with `seq > since_seq`, optionally
    /// filtered by type. Repeating the same cursor returns the same batch.
    pub async fn poll(
        &self,
        session_id: &str,
        since_seq: u64,
        types: Option<&[EventType]>,
    ) -> Result<Vec<Event>, LogError> {
        self.log.query(session_id, since_seq, types).await
    }
}

/// Forwarder task: replay, then tail, deduplicating at the splice point.
async fn forward_events(
    session_id: String,
    replay: Vec<Event>,
    mut live_rx: broadcast::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    resume_from: Option<u64>,
) {
    let mut last_seq = replay.last().map(|e| e.seq).or(resume_from).unwrap_or(0);

    for event in replay {
        if tx.send(event).await.is_err() {
            return;
        }
    }

    loop {
        match live_rx.recv().await {
            Ok(event) => {
                // Events appended between subscribe and the first recv can
                // overlap the replay batch; skip anything already delivered.
                if event.seq <= last_seq {
                    continue;
                }
                last_seq = event.seq;
                if tx.send(event).await.is_err() {
                    debug!("push subscriber for {session_id} disconnected");
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("push subscriber for {session_id} lagged by {missed} events, dropping");
                return;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiller_protocol::{EventPayload, OutputKind};

    fn step(text: &str) -> EventPayload {
        EventPayload::Output {
            stream: "combined".to_string(),
            text: text.to_string(),
            kind: OutputKind::Step,
            is_final: false,
        }
    }

    #[tokio::test]
    async fn test_push_replays_then_tails_without_gap() {
        let log = Arc::new(EventLog::new(100));
        let hub = SubscriberHub::new(log.clone());

        log.append("s", step("a")).await;
        log.append("s", step("b")).await;
        log.append("s", step("c")).await;

        let mut sub = hub.open_push("s", Some(1)).await.unwrap();
        log.append("s", step("d")).await;

        let mut seqs = Vec::new();
        for _ in 0..3 {
            seqs.push(sub.rx.recv().await.unwrap().seq);
        }
        assert_eq!(seqs, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_push_without_resume_is_live_only() {
        let log = Arc::new(EventLog::new(100));
        let hub = SubscriberHub::new(log.clone());

        log.append("s", step("old")).await;
        let mut sub = hub.open_push("s", None).await.unwrap();
        log.append("s", step("new")).await;

        let event = sub.rx.recv().await.unwrap();
        assert_eq!(event.seq, 2);
    }

    #[tokio::test]
    async fn test_poll_is_idempotent() {
        let log = Arc::new(EventLog::new(100));
        let hub = SubscriberHub::new(log.clone());
        for _ in 0..4 {
            log.append("s", step("x")).await;
        }

        let first = hub.poll("s", 3, None).await.unwrap();
        let second = hub.poll("s", 3, None).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].seq, second[0].seq);
    }

    #[tokio::test]
    async fn test_stale_cursor_rejected_not_gapped() {
        let log = Arc::new(EventLog::new(2));
        let hub = SubscriberHub::new(log.clone());
        for _ in 0..5 {
            log.append("s", step("x")).await;
        }

        assert!(matches!(
            hub.poll("s", 0, None).await,
            Err(LogError::StaleCursor { .. })
        ));
        assert!(matches!(
            hub.open_push("s", Some(0)).await,
            Err(LogError::StaleCursor { .. })
        ));
    }
}
