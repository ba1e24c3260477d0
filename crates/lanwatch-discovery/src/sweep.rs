//! Host-alive sweep strategies with environment-dependent fallback
//!
//! Three variants share one `discover(range)` contract. Which one runs is
//! decided by probing the environment, not by configuration: nested kernels
//! (WSL2 and friends) isolate the neighbor table from the physical LAN, and
//! the primary sweep tool may simply be absent.

use lanwatch_core::DiscoveredHost;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::process::Command;
use std::str::FromStr;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::neigh;
use crate::range::ScanRange;

/// Per-host timeout handed to the sweep tool
const SWEEP_HOST_TIMEOUT: &str = "2s";

/// How a range gets swept, selected once per scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepStrategy {
    /// `nmap -sn` sweep, MAC from the pre-populated neighbor table first
    Standard,
    /// `nmap -sn` sweep, MAC always via active probe then table re-read
    Constrained,
    /// `arp-scan` sweep, MACs taken from the tool's own output
    ToolFallback,
}

impl SweepStrategy {
    /// Probe the environment and pick the applicable variant
    pub fn select() -> Self {
        if !tool_available("nmap") {
            info!("nmap not found, falling back to arp-scan sweep");
            return Self::ToolFallback;
        }
        if nested_kernel() {
            info!("Nested kernel detected, neighbor table is isolated; using constrained sweep");
            return Self::Constrained;
        }
        Self::Standard
    }

    /// Sweep one range for responding hosts with best-effort MAC addresses.
    ///
    /// Failures never escape: a host that cannot be probed is dropped and a
    /// range that cannot be swept at all yields an empty list, so the
    /// orchestrator can continue with the remaining ranges. Vendor and
    /// hostname stay unresolved here.
    pub async fn discover(&self, range: &ScanRange) -> Vec<DiscoveredHost> {
        let result = match self {
            Self::Standard => self.sweep_with_nmap(range, false).await,
            Self::Constrained => self.sweep_with_nmap(range, true).await,
            Self::ToolFallback => sweep_with_arp_scan(range).await,
        };

        match result {
            Ok(hosts) => {
                debug!(range = %range, hosts = hosts.len(), "Range sweep finished");
                hosts
            }
            Err(e) => {
                warn!(range = %range, error = %e, "Range sweep failed, skipping range");
                Vec::new()
            }
        }
    }

    async fn sweep_with_nmap(
        &self,
        range: &ScanRange,
        force_probe: bool,
    ) -> anyhow::Result<Vec<DiscoveredHost>> {
        let live = nmap_live_hosts(range).await?;
        debug!(range = %range, live = live.len(), "Sweep found live hosts");

        // Resolve MACs in parallel, then restore discovery order
        let mut tasks = JoinSet::new();
        for &ip in &live {
            tasks.spawn(async move {
                let mac = if force_probe {
                    neigh::probe_then_lookup(ip).await
                } else {
                    match neigh::mac_from_proc(ip) {
                        Some(mac) => Some(mac),
                        None => neigh::probe_then_lookup(ip).await,
                    }
                };
                (ip, mac)
            });
        }

        let mut macs: HashMap<Ipv4Addr, Option<String>> = HashMap::new();
        while let Some(result) = tasks.join_next().await {
            if let Ok((ip, mac)) = result {
                macs.insert(ip, mac);
            }
        }

        Ok(live
            .into_iter()
            .map(|ip| DiscoveredHost {
                ip,
                mac: macs.get(&ip).cloned().flatten(),
                hostname: None,
                vendor: None,
            })
            .collect())
    }
}

/// Run the `nmap -sn` sweep and collect the live addresses
async fn nmap_live_hosts(range: &ScanRange) -> anyhow::Result<Vec<Ipv4Addr>> {
    let output = tokio::process::Command::new("nmap")
        .args(["-sn", "--host-timeout", SWEEP_HOST_TIMEOUT, &range.to_string()])
        .output()
        .await?;

    if !output.status.success() {
        anyhow::bail!(
            "nmap sweep failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    Ok(parse_nmap_report(&String::from_utf8_lossy(&output.stdout)))
}

/// Extract live IPs from `Nmap scan report for ...` lines
fn parse_nmap_report(stdout: &str) -> Vec<Ipv4Addr> {
    let mut hosts = Vec::new();
    for line in stdout.lines() {
        let Some(rest) = line.strip_prefix("Nmap scan report for ") else {
            continue;
        };
        // Either "192.168.1.5" or "hostname (192.168.1.5)"
        let addr = match rest.rsplit_once('(') {
            Some((_, tail)) => tail.trim_end_matches(')'),
            None => rest.trim(),
        };
        if let Ok(ip) = Ipv4Addr::from_str(addr) {
            hosts.push(ip);
        }
    }
    hosts
}

/// Sweep with `arp-scan`, trusting its self-reported IP/MAC pairs
async fn sweep_with_arp_scan(range: &ScanRange) -> anyhow::Result<Vec<DiscoveredHost>> {
    let output = tokio::process::Command::new("arp-scan")
        .args(["--retry", "1", &range.to_string()])
        .output()
        .await?;

    if !output.status.success() {
        anyhow::bail!(
            "arp-scan sweep failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    Ok(parse_arp_scan(&String::from_utf8_lossy(&output.stdout)))
}

/// Extract IP/MAC pairs from `arp-scan` output lines
fn parse_arp_scan(stdout: &str) -> Vec<DiscoveredHost> {
    let mut hosts = Vec::new();
    for line in stdout.lines() {
        let mut parts = line.split_whitespace();
        let (Some(addr), Some(mac)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(ip) = Ipv4Addr::from_str(addr) else {
            continue;
        };
        let mac = mac.to_lowercase();
        if neigh::is_valid_mac(&mac) {
            hosts.push(DiscoveredHost {
                ip,
                mac: Some(mac),
                hostname: None,
                vendor: None,
            });
        }
    }
    hosts
}

/// Whether the kernel reports itself as nested/virtualised (WSL2 and
/// similar), which isolates the neighbor table from the physical LAN
pub fn nested_kernel() -> bool {
    std::fs::read_to_string("/proc/version")
        .map(|v| version_is_nested(&v))
        .unwrap_or(false)
}

fn version_is_nested(version: &str) -> bool {
    version.to_lowercase().contains("microsoft")
}

/// Check tool availability via `which`
fn tool_available(tool: &str) -> bool {
    Command::new("which")
        .arg(tool)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
