//! Heartbeat ticker for active turns.
//!
//! While a turn runs, a background task appends a non-final heartbeat event
//! every period. The scheduler owns the handle; dropping it stops the ticker
//! before the single `done: true` heartbeat is appended on the teardown
//! path, so ticks never interleave past the end of a turn.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

use tiller_protocol::EventPayload;

use crate::events::EventLog;

/// Spawns per-turn heartbeat tickers.
pub struct HeartbeatMonitor {
    log: Arc<EventLog>,
    period: Duration,
}

impl HeartbeatMonitor {
    pub fn new(log: Arc<EventLog>, period: Duration) -> Self {
        Self { log, period }
    }

    /// Start ticking for a turn. The first tick fires one period after the
    /// turn starts, not immediately.
    pub fn start(&self, session_id: &str) -> HeartbeatHandle {
        let log = self.log.clone();
        let session_id = session_id.to_string();
        let period = self.period;
        let started = Instant::now();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(started + period, period);
            loop {
                ticker.tick().await;
                log.append(
                    &session_id,
                    EventPayload::Heartbeat {
                        elapsed_s: started.elapsed().as_secs_f64(),
                        done: false,
                    },
                )
                .await;
            }
        });

        HeartbeatHandle { task }
    }
}

/// Guard for one turn's ticker. Aborts the task on drop.
pub struct HeartbeatHandle {
    task: JoinHandle<()>,
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
