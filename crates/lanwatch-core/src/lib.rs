//! Lanwatch Core - Device model, registry, and event types
//!
//! This crate provides the foundational types for the lanwatch system:
//! - Device records keyed by MAC address, with presence status classification
//! - The `DeviceRegistry` persistence contract and an in-memory implementation
//! - The outbound `Event` enum pushed to downstream sinks

pub mod device;
pub mod event;
pub mod registry;

pub use device::{Device, DeviceStatus, DiscoveredHost};
pub use event::{Event, SnapshotEntry, StatusChange, StatusCounts};
pub use registry::{DeviceRegistry, MemoryRegistry, RegistryError};
