//! Scan orchestration: range iteration, enrichment, persistence, events

use anyhow::{Context, Result};
use chrono::Utc;
use lanwatch_core::{Device, DeviceRegistry, DiscoveredHost, Event};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::hostname;
use crate::range::{self, ScanRange};
use crate::sweep::SweepStrategy;
use crate::vendor::VendorDb;

/// Coordinates one full scan across all resolved ranges.
///
/// Exactly one scan may run at a time system-wide; a second request while
/// one is running is rejected with a `scan_error` event and has no other
/// effect. All outcomes arrive asynchronously on the event channel.
pub struct ScanOrchestrator {
    registry: Arc<dyn DeviceRegistry>,
    vendor_db: Arc<VendorDb>,
    fallback_ranges: Vec<ScanRange>,
    event_tx: broadcast::Sender<Event>,
    scan_in_progress: Arc<AtomicBool>,
}

/// Clears the in-progress flag on every exit path, panics included
struct ScanGuard(Arc<AtomicBool>);

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ScanOrchestrator {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        vendor_db: Arc<VendorDb>,
        fallback_ranges: Vec<ScanRange>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            registry,
            vendor_db,
            fallback_ranges,
            event_tx,
            scan_in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to scan events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    pub fn is_scan_in_progress(&self) -> bool {
        self.scan_in_progress.load(Ordering::SeqCst)
    }

    /// Run one full scan, or reject if one is already running.
    ///
    /// Results are delivered as events; the call itself only reports
    /// progress through the channel and always leaves the orchestrator idle.
    pub async fn run_scan(&self) {
        if self
            .scan_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Scan request rejected, one is already running");
            self.emit(Event::ScanError {
                message: "Scan already in progress".to_string(),
            });
            return;
        }
        let _guard = ScanGuard(self.scan_in_progress.clone());

        self.emit(Event::ScanStarted {
            timestamp: Utc::now(),
        });

        match self.scan_all_ranges().await {
            Ok(devices) => {
                info!(found = devices.len(), "Scan complete");
                self.emit(Event::ScanComplete {
                    devices_found: devices.len(),
                    devices,
                });
            }
            Err(e) => {
                warn!(error = %e, "Scan failed");
                self.emit(Event::ScanError {
                    message: format!("Scan failed: {e:#}"),
                });
            }
        }
    }

    async fn scan_all_ranges(&self) -> Result<Vec<Device>> {
        let ranges = range::resolve_ranges(&self.fallback_ranges)?;
        let strategy = SweepStrategy::select();
        info!(?strategy, ranges = ranges.len(), "Starting network scan");

        let mut all_devices = Vec::new();
        let total = ranges.len();
        for (index, scan_range) in ranges.iter().enumerate() {
            self.emit(Event::ScanProgress {
                progress: (index * 100 / total) as u8,
                current_range: scan_range.to_string(),
                index,
                total,
            });

            // A failed range comes back empty; the scan moves on
            let hosts = strategy.discover(scan_range).await;
            self.ingest_range(scan_range, hosts, &mut all_devices)
                .await?;
        }

        Ok(all_devices)
    }

    /// Enrich, persist, and announce the hosts one range produced.
    ///
    /// Hosts without a MAC are alive but unidentifiable and are dropped
    /// here. Enrichment only fills what the strategy left unresolved.
    async fn ingest_range(
        &self,
        scan_range: &ScanRange,
        hosts: Vec<DiscoveredHost>,
        all_devices: &mut Vec<Device>,
    ) -> Result<()> {
        let mut range_devices = Vec::new();

        for host in hosts {
            let Some(mac) = host.mac else {
                debug!(ip = %host.ip, "Host alive but no MAC resolved, dropping");
                continue;
            };

            let vendor = match host.vendor {
                Some(v) => Some(v),
                None => self.vendor_db.lookup(&mac),
            };
            let hostname = match host.hostname {
                Some(h) => Some(h),
                None => hostname::resolve_hostname(IpAddr::V4(host.ip)).await,
            };

            self.registry.upsert_by_mac(
                &mac,
                IpAddr::V4(host.ip),
                hostname.as_deref(),
                vendor.as_deref(),
            )?;
            let device = self
                .registry
                .get_by_mac(&mac)?
                .context("device vanished between upsert and read")?;

            all_devices.push(device.clone());
            self.emit(Event::DeviceDiscovered {
                device: device.clone(),
                total_found: all_devices.len(),
            });
            range_devices.push(device);
        }

        if !range_devices.is_empty() {
            self.emit(Event::ScanDevicesFound {
                range: scan_range.to_string(),
                count: range_devices.len(),
                devices: range_devices,
            });
        }

        Ok(())
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanwatch_core::MemoryRegistry;
    use std::net::Ipv4Addr;

    fn orchestrator() -> (ScanOrchestrator, broadcast::Receiver<Event>) {
        let (event_tx, event_rx) = broadcast::channel(64);
        let orchestrator = ScanOrchestrator::new(
            Arc::new(MemoryRegistry::new()),
            Arc::new(VendorDb::builtin()),
            vec!["192.168.1.0/24".parse().unwrap()],
            event_tx,
        );
        (orchestrator, event_rx)
    }

    fn host(last: u8, mac: Option<&str>) -> DiscoveredHost {
        DiscoveredHost {
            ip: Ipv4Addr::new(192, 168, 1, last),
            mac: mac.map(|m| m.to_string()),
            hostname: Some(format!("host-{last}")),
            vendor: None,
        }
    }

    #[tokio::test]
    async fn test_ingest_emits_per_device_and_per_range_events() {
        let (orchestrator, mut rx) = orchestrator();
        let range: ScanRange = "192.168.1.0/24".parse().unwrap();

        // Three live hosts, two of which resolved a MAC
        let hosts = vec![
            host(10, Some("b8:27:eb:00:00:01")),
            host(11, None),
            host(12, Some("00:50:56:00:00:02")),
        ];

        let mut all = Vec::new();
        orchestrator
            .ingest_range(&range, hosts, &mut all)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        match rx.try_recv().unwrap() {
            Event::DeviceDiscovered { device, total_found } => {
                assert_eq!(device.mac_address, "b8:27:eb:00:00:01");
                assert_eq!(device.vendor.as_deref(), Some("Raspberry Pi Foundation"));
                assert_eq!(device.hostname.as_deref(), Some("host-10"));
                assert_eq!(total_found, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.try_recv().unwrap() {
            Event::DeviceDiscovered { device, total_found } => {
                assert_eq!(device.vendor.as_deref(), Some("VMware"));
                assert_eq!(total_found, 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.try_recv().unwrap() {
            Event::ScanDevicesFound { range, devices, count } => {
                assert_eq!(range, "192.168.1.0/24");
                assert_eq!(count, 2);
                assert_eq!(devices.len(), 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rediscovery_does_not_duplicate() {
        let (orchestrator, _rx) = orchestrator();
        let range: ScanRange = "192.168.1.0/24".parse().unwrap();

        let mut all = Vec::new();
        orchestrator
            .ingest_range(&range, vec![host(10, Some("b8:27:eb:00:00:01"))], &mut all)
            .await
            .unwrap();
        orchestrator
            .ingest_range(&range, vec![host(20, Some("b8:27:eb:00:00:01"))], &mut all)
            .await
            .unwrap();

        let devices = orchestrator.registry.list_all().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(
            devices[0].ip_address,
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))
        );
    }

    #[tokio::test]
    async fn test_concurrent_scan_is_rejected() {
        let (orchestrator, mut rx) = orchestrator();

        // Simulate a scan already holding the flag
        orchestrator.scan_in_progress.store(true, Ordering::SeqCst);
        orchestrator.run_scan().await;

        match rx.try_recv().unwrap() {
            Event::ScanError { message } => {
                assert_eq!(message, "Scan already in progress");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        // The rejection must not clear the running scan's flag
        assert!(orchestrator.is_scan_in_progress());
    }

    #[test]
    fn test_guard_clears_flag() {
        let flag = Arc::new(AtomicBool::new(true));
        {
            let _guard = ScanGuard(flag.clone());
        }
        assert!(!flag.load(Ordering::SeqCst));
    }
}
