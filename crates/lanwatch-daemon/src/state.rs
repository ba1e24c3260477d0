//! Application state management

use anyhow::Result;
use lanwatch_core::{DeviceRegistry, Event, MemoryRegistry};
use lanwatch_discovery::{PresenceMonitor, ScanOrchestrator, VendorDb};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::config::Config;

/// Shared application state
pub struct AppState {
    /// Device registry shared by scanner and monitor
    pub registry: Arc<MemoryRegistry>,
    /// Scan orchestrator
    pub orchestrator: Arc<ScanOrchestrator>,
    /// Presence monitor
    pub monitor: Arc<PresenceMonitor>,
    /// Event broadcast for downstream sinks
    pub events: broadcast::Sender<Event>,
    /// Configuration
    pub config: Config,
}

impl AppState {
    /// Create new application state and wire the workers together
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let vendor_db = Arc::new(VendorDb::load(Path::new(&config.cache.dir)).await);
        let registry = Arc::new(MemoryRegistry::new());
        let (events, _) = broadcast::channel(256);

        let orchestrator = Arc::new(ScanOrchestrator::new(
            registry.clone() as Arc<dyn DeviceRegistry>,
            vendor_db,
            config.discovery.fallback_ranges.clone(),
            events.clone(),
        ));

        let monitor = PresenceMonitor::new(
            registry.clone() as Arc<dyn DeviceRegistry>,
            events.clone(),
            Duration::from_secs(config.daemon.poll_interval_secs),
        );

        Ok(Arc::new(Self {
            registry,
            orchestrator,
            monitor,
            events,
            config,
        }))
    }

    /// Subscribe to all scan and monitor events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}
