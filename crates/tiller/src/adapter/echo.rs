//! Built-in echo adapter.
//!
//! Default adapter for a server with nothing else wired up: each turn
//! produces a header, one step, a final answer echoing the input, and a
//! usage summary. Useful for demos and for exercising the full event path
//! without an LLM behind it.

use std::collections::VecDeque;

use async_trait::async_trait;

use tiller_protocol::TurnItem;

use super::{Adapter, AdapterError, TurnRequest, TurnStream};

pub struct EchoAdapter;

#[async_trait]
impl Adapter for EchoAdapter {
    fn name(&self) -> &str {
        "echo"
    }

    async fn start_turn(&self, req: TurnRequest) -> Result<Box<dyn TurnStream>, AdapterError> {
        let items = VecDeque::from(vec![
            TurnItem::Header {
                title: "Echo Adapter".to_string(),
                model: None,
                provider: None,
            },
            TurnItem::Step {
                stream: "combined".to_string(),
                text: format!("processing {} bytes of input\n", req.input.len()),
            },
            TurnItem::Final {
                text: req.input.clone(),
            },
            TurnItem::Usage {
                input_tokens: req.input.split_whitespace().count() as u64,
                output_tokens: req.input.split_whitespace().count() as u64,
                cost_usd: None,
            },
        ]);
        Ok(Box::new(EchoStream {
            items,
            cancel: req.cancel,
        }))
    }
}

struct EchoStream {
    items: VecDeque<TurnItem>,
    cancel: tokio_util::sync::CancellationToken,
}

#[async_trait]
impl TurnStream for EchoStream {
    async fn next(&mut self) -> Option<Result<TurnItem, AdapterError>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.items.pop_front().map(Ok)
    }
}
