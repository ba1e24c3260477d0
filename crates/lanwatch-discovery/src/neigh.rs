//! Kernel neighbor table (ARP) access for MAC address resolution

use anyhow::Result;
use std::net::Ipv4Addr;
use std::process::Command;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, trace};

/// Wait for a probe ping before giving up, in seconds
const PROBE_WAIT_SECS: u64 = 1;
/// Upper bound on a single probe-plus-lookup attempt
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Neighbor table entry
#[derive(Debug, Clone)]
pub struct NeighborEntry {
    pub ip: Ipv4Addr,
    pub mac: String,
    pub interface: String,
    pub state: NeighborState,
}

/// Neighbor entry state as reported by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    Reachable,
    Stale,
    Delay,
    Probe,
    Failed,
    Incomplete,
    Permanent,
    Unknown,
}

impl NeighborEntry {
    /// Whether this entry carries a usable MAC address
    pub fn has_valid_mac(&self) -> bool {
        is_valid_mac(&self.mac) && !matches!(self.state, NeighborState::Failed | NeighborState::Incomplete)
    }
}

/// A plausible unicast MAC string: 17 chars, colon-separated, not all zeros
pub fn is_valid_mac(mac: &str) -> bool {
    mac.len() == 17 && mac.contains(':') && mac != "00:00:00:00:00:00"
}

/// Read the live neighbor table via `ip neigh show`
pub fn neighbor_table() -> Result<Vec<NeighborEntry>> {
    let output = Command::new("ip").args(["neigh", "show"]).output()?;

    if !output.status.success() {
        anyhow::bail!(
            "failed to read neighbor table: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut entries = Vec::new();
    for line in stdout.lines() {
        if let Some(entry) = parse_ip_neigh_line(line) {
            entries.push(entry);
        }
    }

    trace!("Found {} neighbor entries", entries.len());
    Ok(entries)
}

/// Parse a line from `ip neigh show` output
fn parse_ip_neigh_line(line: &str) -> Option<NeighborEntry> {
    // Format: "192.168.1.1 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE"
    let parts: Vec<&str> = line.split_whitespace().collect();

    if parts.len() < 4 {
        return None;
    }

    let ip = Ipv4Addr::from_str(parts[0]).ok()?;

    let dev_idx = parts.iter().position(|&p| p == "dev")?;
    let lladdr_idx = parts.iter().position(|&p| p == "lladdr");

    if dev_idx + 1 >= parts.len() {
        return None;
    }

    let interface = parts[dev_idx + 1].to_string();

    // MAC is missing for INCOMPLETE entries
    let mac = lladdr_idx
        .and_then(|idx| parts.get(idx + 1))
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    let state = parts
        .last()
        .map(|s| parse_neighbor_state(s))
        .unwrap_or(NeighborState::Unknown);

    Some(NeighborEntry {
        ip,
        mac,
        interface,
        state,
    })
}

fn parse_neighbor_state(s: &str) -> NeighborState {
    match s.to_uppercase().as_str() {
        "REACHABLE" => NeighborState::Reachable,
        "STALE" => NeighborState::Stale,
        "DELAY" => NeighborState::Delay,
        "PROBE" => NeighborState::Probe,
        "FAILED" => NeighborState::Failed,
        "INCOMPLETE" => NeighborState::Incomplete,
        "PERMANENT" => NeighborState::Permanent,
        _ => NeighborState::Unknown,
    }
}

/// Look up a MAC in `/proc/net/arp`.
///
/// The proc table is often readable in containers where `ip neigh` sees an
/// empty view, so it is tried first by the standard sweep.
pub fn mac_from_proc(ip: Ipv4Addr) -> Option<String> {
    let content = std::fs::read_to_string("/proc/net/arp").ok()?;
    parse_proc_arp(&content, ip)
}

/// Find the MAC for `ip` in `/proc/net/arp` content
fn parse_proc_arp(content: &str, ip: Ipv4Addr) -> Option<String> {
    // Columns: IP address, HW type, Flags, HW address, Mask, Device
    for line in content.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 4 && parts[0] == ip.to_string() {
            let mac = parts[3].to_lowercase();
            if is_valid_mac(&mac) {
                return Some(mac);
            }
        }
    }
    None
}

/// Actively probe a host, then re-read the neighbor table for its MAC.
///
/// One ping is enough to make the kernel attempt neighbor resolution; the
/// ping result itself is irrelevant. Used when the pre-populated table lacks
/// an entry, and always in constrained environments where the table starts
/// isolated from the physical LAN.
pub async fn probe_then_lookup(ip: Ipv4Addr) -> Option<String> {
    let probe = tokio::process::Command::new("ping")
        .args(["-c", "1", "-W", &PROBE_WAIT_SECS.to_string(), &ip.to_string()])
        .output();

    match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            trace!(ip = %ip, error = %e, "Probe ping failed to spawn");
        }
        Err(_) => {
            trace!(ip = %ip, "Probe ping timed out");
        }
    }

    match neighbor_table() {
        Ok(entries) => entries
            .into_iter()
            .find(|e| e.ip == ip && e.has_valid_mac())
            .map(|e| e.mac),
        Err(e) => {
            debug!(ip = %ip, error = %e, "Neighbor table read failed after probe");
            None
        }
    }
}
