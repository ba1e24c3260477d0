//! Scan range resolution: gateway auto-detection with configured fallback

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::process::Command;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum RangeError {
    #[error("invalid CIDR range '{0}'")]
    InvalidCidr(String),
    #[error("prefix length {0} out of range")]
    InvalidPrefix(u8),
}

/// A CIDR range handed to the sweep tools, e.g. `192.168.1.0/24`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScanRange {
    pub network: Ipv4Addr,
    pub prefix_len: u8,
}

impl ScanRange {
    pub fn new(network: Ipv4Addr, prefix_len: u8) -> Result<Self, RangeError> {
        if prefix_len > 32 {
            return Err(RangeError::InvalidPrefix(prefix_len));
        }
        Ok(Self {
            network,
            prefix_len,
        })
    }

    /// The /24 range containing the given address
    pub fn slash24_for(addr: Ipv4Addr) -> Self {
        let o = addr.octets();
        Self {
            network: Ipv4Addr::new(o[0], o[1], o[2], 0),
            prefix_len: 24,
        }
    }
}

impl std::fmt::Display for ScanRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for ScanRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (net, prefix) = s
            .split_once('/')
            .ok_or_else(|| RangeError::InvalidCidr(s.to_string()))?;
        let network =
            Ipv4Addr::from_str(net.trim()).map_err(|_| RangeError::InvalidCidr(s.to_string()))?;
        let prefix_len: u8 = prefix
            .trim()
            .parse()
            .map_err(|_| RangeError::InvalidCidr(s.to_string()))?;
        Self::new(network, prefix_len)
    }
}

impl TryFrom<String> for ScanRange {
    type Error = RangeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ScanRange> for String {
    fn from(r: ScanRange) -> Self {
        r.to_string()
    }
}

/// Determine the ranges to scan.
///
/// The default route's gateway, when it can be read, implies the local /24.
/// Otherwise the statically configured ranges are used. No resolvable range
/// at all is a configuration error the caller must surface.
pub fn resolve_ranges(fallback: &[ScanRange]) -> Result<Vec<ScanRange>> {
    if let Some(gateway) = detect_default_gateway() {
        let range = ScanRange::slash24_for(gateway);
        debug!(gateway = %gateway, range = %range, "Auto-detected scan range from default route");
        return Ok(vec![range]);
    }

    if fallback.is_empty() {
        anyhow::bail!("no default gateway detected and no fallback network ranges configured");
    }

    warn!(
        ranges = fallback.len(),
        "Gateway detection failed, using configured ranges"
    );
    Ok(fallback.to_vec())
}

/// Extract the gateway address from `ip route show default`
pub fn detect_default_gateway() -> Option<Ipv4Addr> {
    let output = Command::new("ip")
        .args(["route", "show", "default"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    parse_default_route(&String::from_utf8_lossy(&output.stdout))
}

/// Find the address following `via` in `ip route` output
fn parse_default_route(stdout: &str) -> Option<Ipv4Addr> {
    for line in stdout.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if let Some(idx) = parts.iter().position(|&p| p == "via") {
            if let Some(addr) = parts.get(idx + 1) {
                if let Ok(ip) = Ipv4Addr::from_str(addr) {
                    return Some(ip);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_route() {
        let stdout = "default via 192.168.1.254 dev eth0 proto dhcp metric 100\n";
        assert_eq!(
            parse_default_route(stdout),
            Some(Ipv4Addr::new(192, 168, 1, 254))
        );
    }

    #[test]
    fn test_parse_default_route_no_via() {
        assert_eq!(parse_default_route("default dev tun0 scope link\n"), None);
        assert_eq!(parse_default_route(""), None);
    }

    #[test]
    fn test_slash24_from_gateway() {
        let range = ScanRange::slash24_for(Ipv4Addr::new(10, 0, 3, 1));
        assert_eq!(range.to_string(), "10.0.3.0/24");
    }

    #[test]
    fn test_range_round_trip() {
        let range: ScanRange = "192.168.1.0/24".parse().unwrap();
        assert_eq!(range.network, Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(range.prefix_len, 24);
        assert_eq!(range.to_string(), "192.168.1.0/24");
    }

    #[test]
    fn test_invalid_ranges() {
        assert!("192.168.1.0".parse::<ScanRange>().is_err());
        assert!("not-a-range/24".parse::<ScanRange>().is_err());
        assert!("192.168.1.0/40".parse::<ScanRange>().is_err());
    }

    #[test]
    fn test_resolve_requires_some_range() {
        // Whatever the environment says about the gateway, an empty fallback
        // list must never silently yield zero ranges.
        match resolve_ranges(&[]) {
            Ok(ranges) => assert!(!ranges.is_empty()),
            Err(e) => assert!(e.to_string().contains("no default gateway")),
        }
    }
}
