//! Application state shared across handlers.

use std::sync::Arc;

use crate::adapter::Adapter;
use crate::bridge::BridgeRouter;
use crate::config::TillerConfig;
use crate::events::EventLog;
use crate::hub::SubscriberHub;
use crate::scheduler::TurnScheduler;
use crate::session::SessionRegistry;
use crate::workdir::WorkdirManager;

/// Shared handles for the API layer. Cheap to clone; everything inside is
/// reference-counted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<TillerConfig>,
    pub registry: Arc<SessionRegistry>,
    pub log: Arc<EventLog>,
    pub hub: Arc<SubscriberHub>,
    pub scheduler: Arc<TurnScheduler>,
    pub bridges: Arc<BridgeRouter>,
    pub workdirs: Arc<WorkdirManager>,
}

impl AppState {
    /// Wire up all components from a config and an adapter.
    pub fn new(config: TillerConfig, adapter: Arc<dyn Adapter>) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.pending_input_limit));
        let log = Arc::new(EventLog::new(config.max_events_per_session));
        let hub = Arc::new(SubscriberHub::new(log.clone()));
        let workdirs = Arc::new(WorkdirManager::new(&config.data_dir));
        let scheduler = Arc::new(TurnScheduler::new(
            registry.clone(),
            log.clone(),
            adapter,
            workdirs.clone(),
            config.heartbeat_period(),
        ));
        let bridges = Arc::new(BridgeRouter::new(
            registry.clone(),
            log.clone(),
            scheduler.clone(),
            &config.data_dir,
            config.bridge_poll_interval(),
        ));
        Self {
            config: Arc::new(config),
            registry,
            log,
            hub,
            scheduler,
            bridges,
            workdirs,
        }
    }
}
