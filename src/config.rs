use anyhow::{bail, Result};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of addresses walked by a single scan.
pub const DEFAULT_BUDGET: usize = 10_000;
/// Default number of handshakes averaged by the latency probe.
pub const DEFAULT_PING_COUNT: u32 = 3;
/// Default size of the ranked shortlist.
pub const DEFAULT_TOP: usize = 10;

/// Resolved, immutable scan settings.
///
/// Built once at startup (normally from the command line) and shared
/// read-only with every component behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Base address; the first probed address is the one after it.
    pub address: Ipv4Addr,
    pub port: u16,
    /// Number of concurrent probe workers.
    pub threads: usize,
    /// Deadline applied separately to the TCP dial and to the TLS handshake.
    pub timeout: Duration,
    /// Record failed and non-qualifying probes too.
    pub show_fail: bool,
    /// Write result lines to `results_path`.
    pub persist_output: bool,
    /// Number of addresses requested from the cursor.
    pub budget: usize,
    pub results_path: PathBuf,
    pub domains_path: PathBuf,
    /// Repetitions handed to the latency probe.
    pub ping_count: u32,
    /// Length of the ranked shortlist.
    pub top: usize,
    /// Optional JSON export of the ranked shortlist.
    pub json_path: Option<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            address: Ipv4Addr::UNSPECIFIED,
            port: 443,
            threads: 128,
            timeout: Duration::from_secs(4),
            show_fail: false,
            persist_output: true,
            budget: DEFAULT_BUDGET,
            results_path: PathBuf::from("results.txt"),
            domains_path: PathBuf::from("domains.txt"),
            ping_count: DEFAULT_PING_COUNT,
            top: DEFAULT_TOP,
            json_path: None,
        }
    }
}

impl ScanConfig {
    /// Reject settings the scan engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            bail!("thread count must be greater than zero");
        }
        if self.timeout.is_zero() {
            bail!("timeout must be greater than zero");
        }
        if self.budget == 0 {
            bail!("address budget must be greater than zero");
        }
        if self.port == 0 {
            bail!("port must be in 1..=65535");
        }
        Ok(())
    }
}
