//! Device registry contract and in-memory implementation

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::device::Device;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// Persistence boundary for discovered devices.
///
/// Implementations must guarantee atomic upsert-by-MAC under concurrent
/// writers: the scan orchestrator and any manual registration path may write
/// at the same time, and exactly one record per MAC must ever exist.
pub trait DeviceRegistry: Send + Sync {
    /// Insert a device or refresh an existing one, returning its id.
    ///
    /// An existing record keeps its id and first-seen timestamp; only the
    /// IP, hostname, vendor, and last-seen timestamp are replaced.
    fn upsert_by_mac(
        &self,
        mac: &str,
        ip: IpAddr,
        hostname: Option<&str>,
        vendor: Option<&str>,
    ) -> Result<i64, RegistryError>;

    /// Snapshot of a single device by its MAC address
    fn get_by_mac(&self, mac: &str) -> Result<Option<Device>, RegistryError>;

    /// All known devices, in no particular order
    fn list_all(&self) -> Result<Vec<Device>, RegistryError>;

    /// Devices first seen within the given window, newest first
    fn list_created_since(&self, window: Duration) -> Result<Vec<Device>, RegistryError>;
}

/// In-memory registry keyed by lower-cased MAC address
#[derive(Default)]
pub struct MemoryRegistry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    devices: HashMap<String, Device>,
    next_id: i64,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of devices currently tracked
    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.devices.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeviceRegistry for MemoryRegistry {
    fn upsert_by_mac(
        &self,
        mac: &str,
        ip: IpAddr,
        hostname: Option<&str>,
        vendor: Option<&str>,
    ) -> Result<i64, RegistryError> {
        let mac = mac.to_lowercase();
        let mut inner = self
            .inner
            .write()
            .map_err(|e| RegistryError::Storage(e.to_string()))?;

        let now = Utc::now();
        if let Some(device) = inner.devices.get_mut(&mac) {
            device.ip_address = ip;
            device.hostname = hostname.map(|s| s.to_string());
            device.vendor = vendor.map(|s| s.to_string());
            device.last_seen = Some(now);
            debug!(mac = %mac, ip = %ip, "Refreshed known device");
            return Ok(device.id);
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.devices.insert(
            mac.clone(),
            Device {
                id,
                mac_address: mac.clone(),
                ip_address: ip,
                hostname: hostname.map(|s| s.to_string()),
                vendor: vendor.map(|s| s.to_string()),
                first_seen: now,
                last_seen: Some(now),
                is_ignored: false,
                is_monitored: true,
                notes: None,
            },
        );
        debug!(mac = %mac, ip = %ip, id, "Registered new device");
        Ok(id)
    }

    fn get_by_mac(&self, mac: &str) -> Result<Option<Device>, RegistryError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| RegistryError::Storage(e.to_string()))?;
        Ok(inner.devices.get(&mac.to_lowercase()).cloned())
    }

    fn list_all(&self) -> Result<Vec<Device>, RegistryError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| RegistryError::Storage(e.to_string()))?;
        Ok(inner.devices.values().cloned().collect())
    }

    fn list_created_since(&self, window: Duration) -> Result<Vec<Device>, RegistryError> {
        let cutoff = Utc::now() - window;
        let inner = self
            .inner
            .read()
            .map_err(|e| RegistryError::Storage(e.to_string()))?;
        let mut recent: Vec<Device> = inner
            .devices
            .values()
            .filter(|d| d.first_seen > cutoff)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.first_seen.cmp(&a.first_seen));
        Ok(recent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    #[test]
    fn test_upsert_is_idempotent_by_mac() {
        let registry = MemoryRegistry::new();

        let first = registry
            .upsert_by_mac("AA:BB:CC:DD:EE:FF", ip(10), Some("printer"), Some("Canon"))
            .unwrap();
        let devices = registry.list_all().unwrap();
        let first_seen = devices[0].first_seen;

        // Same MAC, different IP: one row, refreshed attributes
        let second = registry
            .upsert_by_mac("aa:bb:cc:dd:ee:ff", ip(20), None, Some("Canon"))
            .unwrap();

        assert_eq!(first, second);
        let devices = registry.list_all().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].ip_address, ip(20));
        assert_eq!(devices[0].hostname, None);
        assert_eq!(devices[0].first_seen, first_seen);
        assert!(devices[0].last_seen.unwrap() >= first_seen);
    }

    #[test]
    fn test_distinct_macs_get_distinct_ids() {
        let registry = MemoryRegistry::new();
        let a = registry
            .upsert_by_mac("aa:aa:aa:aa:aa:aa", ip(1), None, None)
            .unwrap();
        let b = registry
            .upsert_by_mac("bb:bb:bb:bb:bb:bb", ip(2), None, None)
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_list_created_since() {
        let registry = MemoryRegistry::new();
        registry
            .upsert_by_mac("aa:aa:aa:aa:aa:aa", ip(1), None, None)
            .unwrap();

        let recent = registry.list_created_since(Duration::seconds(60)).unwrap();
        assert_eq!(recent.len(), 1);

        let none = registry.list_created_since(Duration::seconds(0)).unwrap();
        assert!(none.is_empty());
    }
}
