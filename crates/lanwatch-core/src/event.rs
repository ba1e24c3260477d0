//! Outbound events pushed to the application's event sink
//!
//! The discovery and monitoring workers publish these on a broadcast channel;
//! whatever transport the surrounding application uses (WebSocket, push
//! notifications, a log) subscribes there and forwards them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::device::{Device, DeviceStatus};

/// One device's view at a single monitor tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub status: DeviceStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub ip_address: IpAddr,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
}

/// A device whose status differed between two consecutive monitor ticks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub device_id: i64,
    pub old_status: DeviceStatus,
    pub new_status: DeviceStatus,
    pub device_info: SnapshotEntry,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate presence counts across all tracked devices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub online: usize,
    pub offline: usize,
    pub unknown: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: DeviceStatus) {
        match status {
            DeviceStatus::Online => self.online += 1,
            DeviceStatus::Offline => self.offline += 1,
            DeviceStatus::Unknown => self.unknown += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.online + self.offline + self.unknown
    }
}

/// Events emitted by the scan orchestrator and presence monitor
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ScanStarted {
        timestamp: DateTime<Utc>,
    },
    ScanProgress {
        /// Percent of ranges already handled
        progress: u8,
        current_range: String,
        index: usize,
        total: usize,
    },
    DeviceDiscovered {
        device: Device,
        total_found: usize,
    },
    ScanDevicesFound {
        range: String,
        devices: Vec<Device>,
        count: usize,
    },
    ScanComplete {
        devices: Vec<Device>,
        devices_found: usize,
    },
    ScanError {
        message: String,
    },
    DeviceStatusChanges {
        changes: Vec<StatusChange>,
        timestamp: DateTime<Utc>,
    },
    DeviceStatusCounts {
        online: usize,
        offline: usize,
        unknown: usize,
    },
    NewDevicesDiscovered {
        devices: Vec<Device>,
        count: usize,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn status_counts(counts: StatusCounts) -> Self {
        Self::DeviceStatusCounts {
            online: counts.online,
            offline: counts.offline,
            unknown: counts.unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_tagged_by_name() {
        let event = Event::ScanError {
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "scan_error");
        assert_eq!(json["message"], "boom");
    }

    #[test]
    fn test_counts_event_shape() {
        let mut counts = StatusCounts::default();
        counts.record(DeviceStatus::Online);
        counts.record(DeviceStatus::Online);
        counts.record(DeviceStatus::Offline);

        let json = serde_json::to_value(Event::status_counts(counts)).unwrap();
        assert_eq!(json["type"], "device_status_counts");
        assert_eq!(json["online"], 2);
        assert_eq!(json["offline"], 1);
        assert_eq!(json["unknown"], 0);
    }
}
