//! Lanwatch Discovery - Network discovery and presence tracking
//!
//! This crate provides the discovery and monitoring workers:
//! - Host-alive sweeps with environment-dependent fallback strategies
//! - Neighbor-table (ARP) access for MAC resolution
//! - MAC-prefix vendor lookup backed by a cached OUI registry dump
//! - Multi-method reverse hostname resolution
//! - The scan orchestrator and the presence-monitoring loop

pub mod hostname;
pub mod monitor;
pub mod neigh;
pub mod range;
pub mod scanner;
pub mod sweep;
pub mod vendor;

pub use monitor::{MonitoringStats, PresenceMonitor};
pub use range::{resolve_ranges, RangeError, ScanRange};
pub use scanner::ScanOrchestrator;
pub use sweep::SweepStrategy;
pub use vendor::VendorDb;
