//! Single consumer that writes result lines while the scan is running.

use crate::config::ScanConfig;
use crate::format::ResultLine;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Producer side of the result queue.
pub type ResultSender = mpsc::Sender<ResultLine>;

/// Counters reported once the sink has drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub lines: u64,
    pub domains: u64,
    pub write_errors: u64,
}

/// Owns the output files; fed through a bounded channel.
#[derive(Debug)]
pub struct ResultSink {
    rx: mpsc::Receiver<ResultLine>,
    results: Option<BufWriter<File>>,
    domains: BufWriter<File>,
}

impl ResultSink {
    /// Create (truncating) the output files and the result queue.
    ///
    /// Failing to open a file is a setup error and aborts the scan before
    /// any address is probed.
    pub async fn open(config: &ScanConfig, capacity: usize) -> Result<(ResultSender, Self)> {
        let results = if config.persist_output {
            Some(BufWriter::new(create_truncated(&config.results_path).await?))
        } else {
            None
        };
        let domains = BufWriter::new(create_truncated(&config.domains_path).await?);
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Ok((
            tx,
            Self {
                rx,
                results,
                domains,
            },
        ))
    }

    /// Run the consumer in its own task.
    ///
    /// The task finishes once every sender is dropped and the queue is empty,
    /// so dropping the senders and awaiting the handle flushes every line.
    pub fn spawn(self) -> JoinHandle<Result<SinkStats>> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> Result<SinkStats> {
        let mut stats = SinkStats::default();
        while let Some(line) = self.rx.recv().await {
            info!(target: "h2_hunter::result", "{}", line.text);
            stats.lines += 1;

            if let Some(results) = self.results.as_mut() {
                if let Err(e) = write_line(results, &line.text).await {
                    error!(error = %e, "error writing result line");
                    stats.write_errors += 1;
                }
            }
            if let Some(domain) = line.domain.as_deref().filter(|d| !d.is_empty()) {
                match write_line(&mut self.domains, domain).await {
                    Ok(()) => stats.domains += 1,
                    Err(e) => {
                        error!(error = %e, domain, "error writing domain");
                        stats.write_errors += 1;
                    }
                }
            }
        }

        if let Some(results) = self.results.as_mut() {
            results.flush().await.context("flushing results file")?;
        }
        self.domains.flush().await.context("flushing domains file")?;
        Ok(stats)
    }
}

async fn create_truncated(path: &Path) -> Result<File> {
    let mut opts = OpenOptions::new();
    opts.create(true).write(true).truncate(true);
    #[cfg(unix)]
    opts.mode(0o600);
    opts.open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))
}

async fn write_line(w: &mut BufWriter<File>, text: &str) -> std::io::Result<()> {
    w.write_all(text.as_bytes()).await?;
    w.write_all(b"\n").await
}
