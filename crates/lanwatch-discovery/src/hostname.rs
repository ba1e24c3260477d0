//! Reverse hostname resolution via an ordered fallback chain
//!
//! Three methods are tried in order and the first non-empty result wins:
//! reverse DNS, `nslookup`, then a NetBIOS name query for Windows devices.
//! Every step is bounded by a short timeout and failures resolve to `None`,
//! never to an error.

use std::net::IpAddr;
use std::time::Duration;
use tokio::time::timeout;
use tracing::trace;

/// Upper bound per lookup method
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Resolve a hostname for an IP, or `None` if every method comes up empty
pub async fn resolve_hostname(ip: IpAddr) -> Option<String> {
    if let Some(name) = reverse_dns(ip).await {
        trace!(ip = %ip, name = %name, "Hostname via reverse DNS");
        return Some(name);
    }
    if let Some(name) = nslookup(ip).await {
        trace!(ip = %ip, name = %name, "Hostname via nslookup");
        return Some(name);
    }
    if let Some(name) = netbios_name(ip).await {
        trace!(ip = %ip, name = %name, "Hostname via NetBIOS");
        return Some(name);
    }
    None
}

/// Reverse DNS lookup, rejecting answers that just echo the address back
async fn reverse_dns(ip: IpAddr) -> Option<String> {
    let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip));
    let name = timeout(LOOKUP_TIMEOUT, lookup).await.ok()?.ok()?.ok()?;
    if name.is_empty() || name.starts_with(&ip.to_string()) {
        return None;
    }
    Some(short_name(&name))
}

/// `nslookup <ip>`, parsing the `name =` answer line
async fn nslookup(ip: IpAddr) -> Option<String> {
    let output = run_tool("nslookup", &[&ip.to_string()]).await?;
    parse_nslookup(&output)
}

fn parse_nslookup(stdout: &str) -> Option<String> {
    for line in stdout.lines() {
        if line.to_lowercase().contains("name =") {
            let name = line.split('=').nth(1)?.trim().trim_end_matches('.');
            if !name.is_empty() {
                return Some(short_name(name));
            }
        }
    }
    None
}

/// `nmblookup -A <ip>`, parsing unique `<00>` name records
async fn netbios_name(ip: IpAddr) -> Option<String> {
    let output = run_tool("nmblookup", &["-A", &ip.to_string()]).await?;
    parse_nmblookup(&output)
}

fn parse_nmblookup(stdout: &str) -> Option<String> {
    for line in stdout.lines() {
        // Unique <00> records carry the machine name; GROUP records carry
        // the workgroup and are skipped.
        if line.contains("<00>") && !line.contains("GROUP") {
            let name = line.split_whitespace().next()?.trim();
            if !name.is_empty() && name != "*" {
                return Some(name.to_string());
            }
        }
    }
    None
}

/// The left-most DNS label, enough to identify the host on a LAN
fn short_name(fqdn: &str) -> String {
    fqdn.split('.').next().unwrap_or(fqdn).to_string()
}

/// Run an external lookup tool with the chain's timeout; any failure
/// (missing binary, non-zero exit, timeout) yields `None`
async fn run_tool(tool: &str, args: &[&str]) -> Option<String> {
    let command = tokio::process::Command::new(tool).args(args).output();
    let output = timeout(LOOKUP_TIMEOUT, command).await.ok()?.ok()?;
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nslookup() {
        let stdout = "42.1.168.192.in-addr.arpa\tname = printer.home.arpa.\n\nAuthoritative answers can be found from:\n";
        assert_eq!(parse_nslookup(stdout).as_deref(), Some("printer"));
    }

    #[test]
    fn test_parse_nslookup_no_answer() {
        let stdout = "** server can't find 42.1.168.192.in-addr.arpa: NXDOMAIN\n";
        assert_eq!(parse_nslookup(stdout), None);
    }

    #[test]
    fn test_parse_nmblookup_skips_group_records() {
        let stdout = "Looking up status of 192.168.1.50\n\
                      \tDESKTOP-AB12CD  <00> -         B <ACTIVE>\n\
                      \tWORKGROUP       <00> - <GROUP> B <ACTIVE>\n\
                      \tDESKTOP-AB12CD  <20> -         B <ACTIVE>\n";
        assert_eq!(parse_nmblookup(stdout).as_deref(), Some("DESKTOP-AB12CD"));
    }

    #[test]
    fn test_parse_nmblookup_rejects_wildcard() {
        let stdout = "\t*               <00> -         B <ACTIVE>\n";
        assert_eq!(parse_nmblookup(stdout), None);
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("printer.home.arpa"), "printer");
        assert_eq!(short_name("bare-host"), "bare-host");
    }
}
