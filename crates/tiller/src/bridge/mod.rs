//! Messaging platform bridges.
//!
//! A bridge connects a session to an external chat surface: agent output
//! and lifecycle changes flow out through the bridge, and human replies
//! come back in through the router as ordinary events plus a turn submit.
//! Bridges never write to the log directly.

mod recording;
mod router;

pub use recording::RecordingBridge;
pub use router::{BridgeRouter, RouterError};

use async_trait::async_trait;

use tiller_protocol::SessionState;

/// A permission request surfaced to a human through a bridge.
#[derive(Debug, Clone)]
pub struct PermissionRequest {
    pub request_id: String,
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
}

/// Outbound side of a messaging platform integration.
///
/// Delivery failures are the bridge's problem; the router logs them and
/// keeps going. A broken bridge must not stall the event log.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Platform key this bridge serves ("telegram", "slack", ...).
    fn platform(&self) -> &str;

    /// Deliver a final agent answer.
    async fn on_output(&self, session_id: &str, text: &str) -> anyhow::Result<()>;

    /// Deliver a session lifecycle change.
    async fn on_status(&self, session_id: &str, state: SessionState) -> anyhow::Result<()>;

    /// Surface a permission request to the human.
    async fn on_permission_request(
        &self,
        session_id: &str,
        request: &PermissionRequest,
    ) -> anyhow::Result<()>;
}
