//! Scripted adapter for tests.
//!
//! Each `start_turn` consumes the next script from the queue, falling back
//! to a minimal header/final script when the queue is empty. Steps can
//! insert delays (to hold a turn open while a test issues concurrent
//! submits or a stop) or fail the stream.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use tiller_protocol::TurnItem;

use super::{Adapter, AdapterError, TurnRequest, TurnStream};

/// One step of a scripted turn.
pub enum ScriptStep {
    /// Yield this item.
    Item(TurnItem),
    /// Sleep before the next item; returns early (stream ends) on cancel.
    Delay(Duration),
    /// Fail the stream with an adapter error.
    Fail(String),
}

/// Adapter that replays pre-recorded turn scripts.
pub struct ScriptedAdapter {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue a script for the next turn.
    pub async fn push_script(&self, steps: Vec<ScriptStep>) {
        self.scripts.lock().await.push_back(steps);
    }

    /// The standard successful turn: header, one step, final, usage.
    pub fn simple_turn(answer: &str) -> Vec<ScriptStep> {
        vec![
            ScriptStep::Item(TurnItem::Header {
                title: "Scripted Agent".to_string(),
                model: Some("test-model".to_string()),
                provider: None,
            }),
            ScriptStep::Item(TurnItem::Step {
                stream: "combined".to_string(),
                text: "[tool: think]\n".to_string(),
            }),
            ScriptStep::Item(TurnItem::Final {
                text: answer.to_string(),
            }),
            ScriptStep::Item(TurnItem::Usage {
                input_tokens: 10,
                output_tokens: 20,
                cost_usd: Some(0.0123),
            }),
        ]
    }
}

impl Default for ScriptedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start_turn(&self, req: TurnRequest) -> Result<Box<dyn TurnStream>, AdapterError> {
        let steps = self
            .scripts
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Self::simple_turn(&format!("done: {}", req.input)));
        Ok(Box::new(ScriptedStream {
            steps: VecDeque::from(steps),
            cancel: req.cancel,
        }))
    }
}

struct ScriptedStream {
    steps: VecDeque<ScriptStep>,
    cancel: CancellationToken,
}

#[async_trait]
impl TurnStream for ScriptedStream {
    async fn next(&mut self) -> Option<Result<TurnItem, AdapterError>> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            match self.steps.pop_front()? {
                ScriptStep::Item(item) => return Some(Ok(item)),
                ScriptStep::Delay(duration) => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => return None,
                        _ = tokio::time::sleep(duration) => {}
                    }
                }
                ScriptStep::Fail(message) => {
                    self.steps.clear();
                    return Some(Err(AdapterError::Stream(message)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(cancel: CancellationToken) -> TurnRequest {
        TurnRequest {
            session_id: "sess_t".to_string(),
            input: "go".to_string(),
            workdir: None,
            approval_mode: Default::default(),
            cancel,
        }
    }

    #[tokio::test]
    async fn test_scripts_are_consumed_in_order() {
        let adapter = ScriptedAdapter::new();
        adapter
            .push_script(vec![ScriptStep::Item(TurnItem::Final {
                text: "first".to_string(),
            })])
            .await;

        let mut stream = adapter
            .start_turn(request(CancellationToken::new()))
            .await
            .unwrap();
        match stream.next().await.unwrap().unwrap() {
            TurnItem::Final { text } => assert_eq!(text, "first"),
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_delay_step_honors_cancel() {
        let adapter = ScriptedAdapter::new();
        adapter
            .push_script(vec![
                ScriptStep::Delay(Duration::from_secs(60)),
                ScriptStep::Item(TurnItem::Final {
                    text: "never".to_string(),
                }),
            ])
            .await;

        let cancel = CancellationToken::new();
        let mut stream = adapter.start_turn(request(cancel.clone())).await.unwrap();

        let pull = tokio::spawn(async move { stream.next().await.is_none() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        assert!(pull.await.unwrap());
    }

    #[tokio::test]
    async fn test_fail_step_errors_then_ends() {
        let adapter = ScriptedAdapter::new();
        adapter
            .push_script(vec![ScriptStep::Fail("boom".to_string())])
            .await;

        let mut stream = adapter
            .start_turn(request(CancellationToken::new()))
            .await
            .unwrap();
        assert!(matches!(
            stream.next().await,
            Some(Err(AdapterError::Stream(_)))
        ));
        assert!(stream.next().await.is_none());
    }
}
