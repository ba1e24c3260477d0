//! MAC-prefix vendor lookup backed by a cached OUI registry dump
//!
//! The full IEEE OUI text file is fetched at most once every 30 days and
//! cached on disk. When the registry is unreachable and nothing usable is
//! cached, a small built-in table keeps lookups working offline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const OUI_URL: &str = "https://standards-oui.ieee.org/oui/oui.txt";
const CACHE_FILE_NAME: &str = "oui.txt";
const CACHE_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 3600);
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("lanwatch/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum VendorDbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("fetch error: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("registry document contained no parseable entries")]
    EmptyDocument,
}

/// In-memory MAC-prefix to vendor-name table.
///
/// Built once, then read-only: concurrent lookups need no locking.
pub struct VendorDb {
    table: HashMap<String, String>,
    cache_path: PathBuf,
}

impl VendorDb {
    /// Load the vendor table, preferring a fresh cache over the network.
    ///
    /// Never fails: every degradation path ends at the built-in table.
    pub async fn load(cache_dir: &Path) -> Self {
        let cache_path = cache_dir.join(CACHE_FILE_NAME);

        if cache_is_fresh(&cache_path) {
            if let Ok(content) = std::fs::read_to_string(&cache_path) {
                let table = parse_oui(&content);
                if !table.is_empty() {
                    info!(entries = table.len(), "Loaded vendor table from cache");
                    return Self { table, cache_path };
                }
                warn!(path = %cache_path.display(), "Cached vendor table was unparseable");
            }
        }

        match fetch_and_cache(&cache_path).await {
            Ok(table) => {
                info!(entries = table.len(), "Downloaded vendor table from registry");
                Self { table, cache_path }
            }
            Err(e) => {
                warn!(error = %e, "Vendor registry fetch failed");
                // A stale cache still beats the built-in table
                if let Ok(content) = std::fs::read_to_string(&cache_path) {
                    let table = parse_oui(&content);
                    if !table.is_empty() {
                        warn!(entries = table.len(), "Using stale cached vendor table");
                        return Self { table, cache_path };
                    }
                }
                warn!("No usable cache, using built-in vendor table");
                Self {
                    table: builtin_table(),
                    cache_path,
                }
            }
        }
    }

    /// Build directly from a prepared table (offline use and tests)
    pub fn from_table(table: HashMap<String, String>) -> Self {
        Self {
            table,
            cache_path: PathBuf::new(),
        }
    }

    /// The built-in offline table
    pub fn builtin() -> Self {
        Self::from_table(builtin_table())
    }

    /// Force a fetch regardless of cache age
    pub async fn refresh(&mut self) -> Result<(), VendorDbError> {
        self.table = fetch_and_cache(&self.cache_path).await?;
        info!(entries = self.table.len(), "Vendor table refreshed");
        Ok(())
    }

    /// Resolve a vendor name from a MAC address.
    ///
    /// Returns `None` only for an empty MAC; an unmatched prefix resolves to
    /// `"Unknown"` so callers can distinguish "no MAC" from "no match".
    pub fn lookup(&self, mac: &str) -> Option<String> {
        if mac.is_empty() {
            return None;
        }
        let prefix = mac
            .split(':')
            .take(3)
            .collect::<Vec<_>>()
            .join(":")
            .to_lowercase();
        Some(
            self.table
                .get(&prefix)
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string()),
        )
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Whether the cache file exists and is younger than 30 days
fn cache_is_fresh(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    match modified.elapsed() {
        Ok(age) => age_within_window(age),
        // Modification time in the future counts as fresh
        Err(_) => true,
    }
}

fn age_within_window(age: Duration) -> bool {
    age < CACHE_MAX_AGE
}

/// Fetch the registry document, persist it, and parse it
async fn fetch_and_cache(cache_path: &Path) -> Result<HashMap<String, String>, VendorDbError> {
    debug!(url = OUI_URL, "Fetching OUI registry");
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()?;
    let content = client
        .get(OUI_URL)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let table = parse_oui(&content);
    if table.is_empty() {
        return Err(VendorDbError::EmptyDocument);
    }

    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(cache_path, &content)?;
    debug!(path = %cache_path.display(), "Cached OUI registry document");

    Ok(table)
}

/// Parse `(hex)` entry lines from the OUI registry document.
///
/// Lines that do not match the expected shape are skipped, never fatal.
fn parse_oui(content: &str) -> HashMap<String, String> {
    let mut table = HashMap::new();
    for line in content.lines() {
        let Some((prefix_part, company_part)) = line.split_once("(hex)") else {
            continue;
        };
        let prefix = prefix_part.trim().replace('-', ":").to_lowercase();
        let company = company_part.trim();
        if prefix.len() == 8 && !company.is_empty() {
            table.insert(prefix, company.to_string());
        }
    }
    table
}

/// Well-known prefixes kept for offline operation: virtualisation stacks,
/// common single-board computers, and a few frequent LAN residents.
fn builtin_table() -> HashMap<String, String> {
    [
        ("00:50:56", "VMware"),
        ("00:0c:29", "VMware"),
        ("08:00:27", "VirtualBox"),
        ("52:54:00", "QEMU"),
        ("00:16:3e", "Xen"),
        ("00:15:5d", "Microsoft Corporation"),
        ("00:1c:42", "Parallels"),
        ("00:03:ff", "Microsoft Corporation"),
        ("00:50:f2", "Microsoft Corporation"),
        ("b8:27:eb", "Raspberry Pi Foundation"),
        ("dc:a6:32", "Raspberry Pi Foundation"),
        ("e4:5f:01", "Raspberry Pi Foundation"),
        ("00:1b:21", "Intel Corporate"),
        ("00:1e:58", "WistronInfocomm"),
        ("00:26:b9", "Seagate Technology"),
        ("28:c6:8e", "Ubiquiti Networks"),
        ("00:17:fa", "Honeywell"),
        ("70:b3:d5", "IEEE Registration Authority"),
        ("ac:de:48", "Private"),
        ("02:00:00", "Locally Administered"),
    ]
    .into_iter()
    .map(|(p, v)| (p.to_string(), v.to_string()))
    .collect()
}
