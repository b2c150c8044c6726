//! Adapter contract.
//!
//! The adapter is the external component that actually runs the agent. The
//! scheduler hands it one turn's input plus a cancellation token and pulls a
//! lazy sequence of raw items back. Adapters must stop yielding within a
//! bounded time after cancellation and must not buffer unboundedly.

mod echo;
mod scripted;

pub use echo::EchoAdapter;
pub use scripted::{ScriptStep, ScriptedAdapter};

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use tiller_protocol::{ApprovalMode, TurnItem};

/// Everything an adapter needs to execute one turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_id: String,
    pub input: String,
    pub workdir: Option<PathBuf>,
    pub approval_mode: ApprovalMode,
    /// Cooperative cancellation; the adapter must honor this promptly.
    pub cancel: CancellationToken,
}

/// Adapter failures. Anything surfacing from here is caught at the turn
/// boundary and converted into a single error event; it never propagates
/// past the scheduler.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("adapter failed to start turn: {0}")]
    Startup(String),

    #[error("adapter stream error: {0}")]
    Stream(String),
}

/// The external agent runner.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    /// Begin one turn and return its item stream.
    async fn start_turn(&self, req: TurnRequest) -> Result<Box<dyn TurnStream>, AdapterError>;
}

/// Cancellable pull-based iterator over one turn's raw items.
#[async_trait]
pub trait TurnStream: Send {
    /// Pull the next item; `None` means the turn is exhausted. Awaiting
    /// this is the only suspension point of a turn.
    async fn next(&mut self) -> Option<Result<TurnItem, AdapterError>>;
}
