//! Device types for tracking observed network endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A device goes `Unknown` once it has been silent for this long.
pub const ONLINE_WINDOW_SECS: i64 = 3600;
/// A device goes `Offline` once it has been silent for this long.
pub const UNKNOWN_WINDOW_SECS: i64 = 86400;

/// Presence classification of a device, derived from its last-seen timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Seen within the last hour
    Online,
    /// Silent for between one hour and one day
    Unknown,
    /// Silent for a day or more
    Offline,
}

impl DeviceStatus {
    /// Classify a device from the gap between `now` and its last-seen time.
    ///
    /// A device with no last-seen value counts as seen right now, so it
    /// classifies as `Online`. The boundaries are strict: a gap of exactly
    /// 3600s is already `Unknown` and exactly 86400s is already `Offline`.
    pub fn from_last_seen(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let seen = last_seen.unwrap_or(now);
        let gap = (now - seen).num_seconds();
        if gap < ONLINE_WINDOW_SECS {
            Self::Online
        } else if gap < UNKNOWN_WINDOW_SECS {
            Self::Unknown
        } else {
            Self::Offline
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Unknown => write!(f, "unknown"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// A network endpoint the system has ever observed.
///
/// The MAC address is the identity: re-discovery refreshes the IP, hostname,
/// vendor, and last-seen timestamp of the existing record, never creating a
/// second one. Records are never physically deleted by the discovery
/// subsystem; the ignored flag only suppresses new-device reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Registry-assigned numeric id
    pub id: i64,
    /// MAC address, lower-cased, the unique immutable key
    pub mac_address: String,
    /// Most recently observed IP address
    pub ip_address: IpAddr,
    /// Resolved hostname, if any method succeeded
    pub hostname: Option<String>,
    /// Vendor name resolved from the MAC prefix
    pub vendor: Option<String>,
    /// When the device was first discovered
    pub first_seen: DateTime<Utc>,
    /// When the device last responded to a scan
    pub last_seen: Option<DateTime<Utc>>,
    /// Suppressed from new-device reporting
    pub is_ignored: bool,
    /// Included in presence monitoring
    pub is_monitored: bool,
    /// Free-text operator notes
    pub notes: Option<String>,
}

impl Device {
    /// Current presence status of this device
    pub fn status(&self, now: DateTime<Utc>) -> DeviceStatus {
        DeviceStatus::from_last_seen(self.last_seen, now)
    }
}

/// A scan-local candidate produced by a discovery strategy.
///
/// Only hosts that resolved a MAC address are persisted; the rest are alive
/// but unidentifiable and get dropped before the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredHost {
    pub ip: std::net::Ipv4Addr,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
}

impl DiscoveredHost {
    pub fn new(ip: std::net::Ipv4Addr) -> Self {
        Self {
            ip,
            mac: None,
            hostname: None,
            vendor: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_thresholds() {
        let now = Utc::now();
        let seen = |secs: i64| Some(now - Duration::seconds(secs));

        // 30 minutes ago -> online
        assert_eq!(
            DeviceStatus::from_last_seen(seen(1800), now),
            DeviceStatus::Online
        );
        // 5 hours ago -> unknown
        assert_eq!(
            DeviceStatus::from_last_seen(seen(5 * 3600), now),
            DeviceStatus::Unknown
        );
        // 2 days ago -> offline
        assert_eq!(
            DeviceStatus::from_last_seen(seen(2 * 86400), now),
            DeviceStatus::Offline
        );
    }

    #[test]
    fn test_status_boundaries_are_strict() {
        let now = Utc::now();
        let seen = |secs: i64| Some(now - Duration::seconds(secs));

        assert_eq!(
            DeviceStatus::from_last_seen(seen(3599), now),
            DeviceStatus::Online
        );
        assert_eq!(
            DeviceStatus::from_last_seen(seen(3600), now),
            DeviceStatus::Unknown
        );
        assert_eq!(
            DeviceStatus::from_last_seen(seen(86399), now),
            DeviceStatus::Unknown
        );
        assert_eq!(
            DeviceStatus::from_last_seen(seen(86400), now),
            DeviceStatus::Offline
        );
    }

    #[test]
    fn test_missing_last_seen_is_online() {
        let now = Utc::now();
        assert_eq!(
            DeviceStatus::from_last_seen(None, now),
            DeviceStatus::Online
        );
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DeviceStatus::Online).unwrap(),
            "\"online\""
        );
        assert_eq!(
            serde_json::to_string(&DeviceStatus::Offline).unwrap(),
            "\"offline\""
        );
    }
}
