//! In-memory bridge that records everything it is handed. Used in tests
//! and as the reference implementation of the trait contract.

use async_trait::async_trait;
use tokio::sync::Mutex;

use tiller_protocol::SessionState;

use super::{Bridge, PermissionRequest};

#[derive(Default)]
pub struct RecordingBridge {
    platform: String,
    outputs: Mutex<Vec<(String, String)>>,
    statuses: Mutex<Vec<(String, SessionState)>>,
    permissions: Mutex<Vec<(String, PermissionRequest)>>,
}

impl RecordingBridge {
    pub fn new(platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
            ..Default::default()
        }
    }

    pub async fn outputs(&self) -> Vec<(String, String)> {
        self.outputs.lock().await.clone()
    }

    pub async fn statuses(&self) -> Vec<(String, SessionState)> {
        self.statuses.lock().await.clone()
    }

    pub async fn permissions(&self) -> Vec<(String, PermissionRequest)> {
        self.permissions.lock().await.clone()
    }
}

#[async_trait]
impl Bridge for RecordingBridge {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn on_output(&self, session_id: &str, text: &str) -> anyhow::Result<()> {
        self.outputs
            .lock()
            .await
            .push((session_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn on_status(&self, session_id: &str, state: SessionState) -> anyhow::Result<()> {
        self.statuses
            .lock()
            .await
            .push((session_id.to_string(), state));
        Ok(())
    }

    async fn on_permission_request(
        &self,
        session_id: &str,
        request: &PermissionRequest,
    ) -> anyhow::Result<()> {
        self.permissions
            .lock()
            .await
            .push((session_id.to_string(), request.clone()));
        Ok(())
    }
}
