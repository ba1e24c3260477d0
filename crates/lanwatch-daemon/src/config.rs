//! Configuration loading and validation

use anyhow::Result;
use lanwatch_discovery::ScanRange;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Presence monitor tick interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Gap between scheduled discovery scans in seconds
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Run the first scan immediately on startup
    #[serde(default = "default_true")]
    pub scan_on_start: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            scan_interval_secs: default_scan_interval(),
            scan_on_start: true,
        }
    }
}

fn default_poll_interval() -> u64 {
    15
}

fn default_scan_interval() -> u64 {
    300 // 5 minutes
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Ranges to scan when gateway auto-detection fails
    #[serde(default = "default_ranges")]
    pub fallback_ranges: Vec<ScanRange>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            fallback_ranges: default_ranges(),
        }
    }
}

fn default_ranges() -> Vec<ScanRange> {
    vec!["192.168.1.0/24".parse().expect("valid default range")]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory for the vendor registry cache
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> String {
    "data".to_string()
}

/// Load configuration from file, falling back to defaults when absent
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Write the default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.daemon.poll_interval_secs, 15);
        assert_eq!(config.daemon.scan_interval_secs, 300);
        assert!(config.daemon.scan_on_start);
        assert_eq!(config.discovery.fallback_ranges.len(), 1);
        assert_eq!(config.cache.dir, "data");
    }

    #[test]
    fn test_parse_multiple_ranges() {
        let config: Config = toml::from_str(
            "[discovery]\nfallback_ranges = [\"10.0.0.0/24\", \"192.168.50.0/24\"]\n",
        )
        .unwrap();
        assert_eq!(config.discovery.fallback_ranges.len(), 2);
        assert_eq!(
            config.discovery.fallback_ranges[1].to_string(),
            "192.168.50.0/24"
        );
    }

    #[test]
    fn test_invalid_range_is_rejected() {
        let result: Result<Config, _> =
            toml::from_str("[discovery]\nfallback_ranges = [\"not-a-range\"]\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_round_trip() {
        let content = toml::to_string_pretty(&Config::default()).unwrap();
        let config: Config = toml::from_str(&content).unwrap();
        assert_eq!(config.daemon.scan_interval_secs, 300);
    }
}
