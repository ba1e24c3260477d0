//! Presence monitoring: periodic status ticks, diffing, and change events

use anyhow::Result;
use chrono::{DateTime, Utc};
use lanwatch_core::{Device, DeviceRegistry, Event, SnapshotEntry, StatusChange, StatusCounts};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Nominal gap between status ticks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
/// Gap used for the single cycle after a failed tick
const BACKOFF_INTERVAL: Duration = Duration::from_secs(30);
/// How far back a device's first-seen may lie to count as newly discovered
const NEW_DEVICE_LOOKBACK_SECS: i64 = 60;

/// On-demand statistics without touching the monitor's retained snapshot
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringStats {
    pub status_counts: StatusCounts,
    pub total_devices: usize,
    pub devices_discovered_24h: usize,
    pub monitoring_active: bool,
}

/// Long-lived background loop that classifies every device on a fixed
/// interval, diffs against the previous tick, and emits change events.
///
/// The previous snapshot is owned exclusively by the loop itself; nothing
/// else reads or writes it.
pub struct PresenceMonitor {
    registry: Arc<dyn DeviceRegistry>,
    event_tx: broadcast::Sender<Event>,
    running: Arc<AtomicBool>,
    // Bumped on every start; a loop whose generation is behind must exit
    // even if a restart has set `running` back to true while it slept.
    generation: AtomicU64,
    poll_interval: Duration,
}

impl PresenceMonitor {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        event_tx: broadcast::Sender<Event>,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
            generation: AtomicU64::new(0),
            poll_interval,
        })
    }

    /// Start the monitoring loop. Idempotent: a second call while running
    /// is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Presence monitor already running");
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let monitor = self.clone();
        tokio::spawn(async move {
            monitor.run_loop(generation).await;
        });
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Presence monitoring started"
        );
    }

    /// Stop the loop; takes effect before the next tick, not mid-tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the loop spawned for `generation` should keep ticking
    fn loop_active(&self, generation: u64) -> bool {
        self.is_running() && self.generation.load(Ordering::SeqCst) == generation
    }

    async fn run_loop(&self, generation: u64) {
        let mut previous: HashMap<i64, SnapshotEntry> = HashMap::new();

        while self.loop_active(generation) {
            // A failed tick stretches only the next sleep, then the normal
            // cadence resumes. The loop itself never dies.
            let delay = match self.tick(&mut previous) {
                Ok(()) => self.poll_interval,
                Err(e) => {
                    warn!(error = %e, "Monitor tick failed, backing off");
                    BACKOFF_INTERVAL
                }
            };
            tokio::time::sleep(delay).await;
        }

        info!("Presence monitoring stopped");
    }

    /// One status tick plus the new-device check
    fn tick(&self, previous: &mut HashMap<i64, SnapshotEntry>) -> Result<()> {
        let now = Utc::now();
        self.status_tick(previous, now)?;
        self.announce_new_devices(now)?;
        Ok(())
    }

    fn status_tick(
        &self,
        previous: &mut HashMap<i64, SnapshotEntry>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let devices = self.registry.list_all()?;
        let (current, changes, counts) = compute_tick(&devices, previous, now);

        if !changes.is_empty() {
            debug!(changes = changes.len(), "Device status transitions");
            self.emit(Event::DeviceStatusChanges {
                changes,
                timestamp: now,
            });
        }
        self.emit(Event::status_counts(counts));

        *previous = current;
        Ok(())
    }

    fn announce_new_devices(&self, now: DateTime<Utc>) -> Result<()> {
        let recent: Vec<Device> = self
            .registry
            .list_created_since(chrono::Duration::seconds(NEW_DEVICE_LOOKBACK_SECS))?
            .into_iter()
            .filter(|d| !d.is_ignored)
            .collect();

        if !recent.is_empty() {
            info!(count = recent.len(), "Announcing newly discovered devices");
            self.emit(Event::NewDevicesDiscovered {
                count: recent.len(),
                devices: recent,
                timestamp: now,
            });
        }
        Ok(())
    }

    /// Current aggregate counts, computed on demand
    pub fn status_counts(&self) -> Result<StatusCounts> {
        let now = Utc::now();
        let mut counts = StatusCounts::default();
        for device in self.registry.list_all()? {
            counts.record(device.status(now));
        }
        Ok(counts)
    }

    /// Monitoring statistics for status endpoints
    pub fn monitoring_stats(&self) -> Result<MonitoringStats> {
        let counts = self.status_counts()?;
        let discovered_24h = self
            .registry
            .list_created_since(chrono::Duration::hours(24))?
            .len();
        Ok(MonitoringStats {
            total_devices: counts.total(),
            status_counts: counts,
            devices_discovered_24h: discovered_24h,
            monitoring_active: self.is_running(),
        })
    }

    fn emit(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }
}

/// Classify every device, diff against the previous snapshot, and count.
///
/// Devices absent from the previous snapshot produce no change entry; they
/// only join the new snapshot and the counts.
fn compute_tick(
    devices: &[Device],
    previous: &HashMap<i64, SnapshotEntry>,
    now: DateTime<Utc>,
) -> (
    HashMap<i64, SnapshotEntry>,
    Vec<StatusChange>,
    StatusCounts,
) {
    let mut current = HashMap::with_capacity(devices.len());
    let mut changes = Vec::new();
    let mut counts = StatusCounts::default();

    for device in devices {
        let status = device.status(now);
        counts.record(status);

        let entry = SnapshotEntry {
            status,
            last_seen: device.last_seen,
            ip_address: device.ip_address,
            hostname: device.hostname.clone(),
            vendor: device.vendor.clone(),
        };

        if let Some(old) = previous.get(&device.id) {
            if old.status != status {
                changes.push(StatusChange {
                    device_id: device.id,
                    old_status: old.status,
                    new_status: status,
                    device_info: entry.clone(),
                    timestamp: now,
                });
            }
        }

        current.insert(device.id, entry);
    }

    (current, changes, counts)
}
