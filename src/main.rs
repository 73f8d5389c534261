use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use h2_hunter::config::{ScanConfig, DEFAULT_BUDGET, DEFAULT_PING_COUNT, DEFAULT_TOP};
use h2_hunter::latency::{LatencyProbe, TlsPinger};
use h2_hunter::tls::TlsClient;
use h2_hunter::{ranker, scanner};

use anyhow::Result;
use clap::{ArgAction, Parser};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// h2-hunter — sweep an IPv4 range for TLS 1.3 + HTTP/2 endpoints and rank them by latency.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "h2-hunter",
    version,
    about = "Sweep an IPv4 range for TLS 1.3 + HTTP/2 endpoints and rank them by latency.",
    long_about = None
)]
struct Cli {
    /// Address to start from; the first probed address is the one after it.
    #[arg(long, default_value = "0.0.0.0")]
    addr: Ipv4Addr,

    /// Port to probe on every address.
    #[arg(long, default_value_t = 443)]
    port: u16,

    /// Number of concurrent probe workers.
    #[arg(long, default_value_t = 128)]
    thread: usize,

    /// Dial and handshake timeout in seconds.
    #[arg(long = "timeout", default_value_t = 4)]
    timeout_s: u64,

    /// Write result lines to the results file.
    #[arg(short = 'o', long = "output", default_value_t = true, action = ArgAction::Set)]
    output: bool,

    /// Also record failed and non-TLS1.3/h2 probes.
    #[arg(long = "show-fail", default_value_t = false)]
    show_fail: bool,

    /// Number of addresses to walk.
    #[arg(long, default_value_t = DEFAULT_BUDGET)]
    count: usize,

    /// Results file (truncated on start).
    #[arg(long, default_value = "results.txt")]
    results: PathBuf,

    /// Domain list file (truncated on start).
    #[arg(long, default_value = "domains.txt")]
    domains: PathBuf,

    /// TLS handshakes averaged per latency measurement.
    #[arg(long = "ping-count", default_value_t = DEFAULT_PING_COUNT)]
    ping_count: u32,

    /// Port used when measuring latency to a certificate's domain.
    #[arg(long = "ping-port", default_value_t = 443)]
    ping_port: u16,

    /// Skip latency measurement.
    #[arg(long = "no-ping", default_value_t = false)]
    no_ping: bool,

    /// Size of the ranked shortlist.
    #[arg(long, default_value_t = DEFAULT_TOP)]
    top: usize,

    /// Also write the ranked shortlist as JSON to this path.
    #[arg(long)]
    json: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> ScanConfig {
        ScanConfig {
            address: self.addr,
            port: self.port,
            threads: self.thread,
            timeout: Duration::from_secs(self.timeout_s),
            show_fail: self.show_fail,
            persist_output: self.output,
            budget: self.count,
            results_path: self.results,
            domains_path: self.domains,
            ping_count: self.ping_count,
            top: self.top,
            json_path: self.json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let ping_port = cli.ping_port;
    let no_ping = cli.no_ping;
    let config = cli.into_config();
    config.validate()?;
    let config = Arc::new(config);

    let tls = TlsClient::insecure()?;
    let latency: Option<Arc<dyn LatencyProbe>> = if no_ping {
        None
    } else {
        Some(Arc::new(TlsPinger::new(tls.clone(), ping_port, config.timeout)))
    };

    let report = scanner::run(config.clone(), tls, latency).await?;
    if report.sink.write_errors > 0 {
        error!(count = report.sink.write_errors, "some result lines could not be written");
    }

    if config.persist_output {
        print!("{}", ranker::render(&report.ranking));
        if let Some(path) = config.json_path.as_deref() {
            if let Err(e) = ranker::write_json(path, &config.results_path, &report.ranking) {
                error!(error = %e, path = %path.display(), "failed to write JSON shortlist");
            } else {
                info!(path = %path.display(), "wrote JSON shortlist");
            }
        }
    }

    Ok(())
}
