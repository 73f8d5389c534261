use crate::config::ScanConfig;
use crate::cursor::AddressCursor;
use crate::latency::LatencyProbe;
use crate::probe::Prober;
use crate::ranker::{self, RankedEntry};
use crate::sink::{ResultSender, ResultSink, SinkStats};
use crate::tls::TlsClient;
use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Progress counters shared by the driver and the workers.
#[derive(Clone, Debug, Default)]
pub struct ScanProgress {
    pub dispatched: Arc<AtomicU64>,
    pub probed: Arc<AtomicU64>,
    pub qualified: Arc<AtomicU64>,
    pub recorded: Arc<AtomicU64>,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ScanSummary {
        ScanSummary {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            probed: self.probed.load(Ordering::Relaxed),
            qualified: self.qualified.load(Ordering::Relaxed),
            recorded: self.recorded.load(Ordering::Relaxed),
            exhausted: false,
        }
    }
}

/// Totals of a finished range walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Addresses pushed into the queue.
    pub dispatched: u64,
    /// Addresses a worker finished probing.
    pub probed: u64,
    /// Probes that passed the gate and the name filter.
    pub qualified: u64,
    /// Lines handed to the result sink.
    pub recorded: u64,
    /// The cursor hit a reserved boundary before the budget ran out.
    pub exhausted: bool,
}

/// Everything a complete run produced.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub summary: ScanSummary,
    pub sink: SinkStats,
    /// Empty when results were not persisted.
    pub ranking: Vec<RankedEntry>,
}

/// Walk `config.budget` addresses from the cursor through a pool of
/// `config.threads` workers, sending recordable lines to `results`.
///
/// Returns once the queue is closed and every dispatched address has been
/// probed. Results reach the sink in completion order, not address order.
pub async fn scan_range(
    config: Arc<ScanConfig>,
    cursor: &AddressCursor,
    prober: Arc<Prober>,
    results: ResultSender,
    progress: ScanProgress,
) -> Result<ScanSummary> {
    let (addr_tx, addr_rx) = mpsc::channel::<Ipv4Addr>(config.budget.max(1));
    let addr_rx = Arc::new(Mutex::new(addr_rx));

    let mut workers = JoinSet::new();
    for id in 0..config.threads {
        let addr_rx = addr_rx.clone();
        let prober = prober.clone();
        let results = results.clone();
        let progress = progress.clone();
        let show_fail = config.show_fail;

        workers.spawn(async move {
            loop {
                // Lock only for the pop; probing happens unlocked.
                let next = addr_rx.lock().await.recv().await;
                let Some(addr) = next else { break };

                let outcome = prober.probe(IpAddr::V4(addr)).await;
                progress.probed.fetch_add(1, Ordering::Relaxed);
                if outcome.qualifies() {
                    progress.qualified.fetch_add(1, Ordering::Relaxed);
                }

                let Some(line) = outcome.to_result_line(show_fail) else {
                    continue;
                };
                if results.send(line).await.is_err() {
                    debug!(worker = id, "result sink closed, worker stopping");
                    break;
                }
                progress.recorded.fetch_add(1, Ordering::Relaxed);
            }
        });
    }
    // Workers hold their own clones; the sink closes when the last one exits.
    drop(results);

    let mut exhausted = false;
    for _ in 0..config.budget {
        let Some(addr) = cursor.next(true) else {
            info!(last = %cursor.position(), "address range exhausted");
            exhausted = true;
            break;
        };
        addr_tx
            .send(addr)
            .await
            .context("address queue closed while dispatching")?;
        progress.dispatched.fetch_add(1, Ordering::Relaxed);
    }
    drop(addr_tx);

    while let Some(res) = workers.join_next().await {
        res.context("probe worker panicked")?;
    }

    let mut summary = progress.snapshot();
    summary.exhausted = exhausted;
    Ok(summary)
}

/// Full pipeline: open sinks, walk the range, drain the sink, rank.
pub async fn run(
    config: Arc<ScanConfig>,
    tls: TlsClient,
    latency: Option<Arc<dyn LatencyProbe>>,
) -> Result<ScanReport> {
    config.validate()?;

    let (results, sink) = ResultSink::open(&config, config.budget).await?;
    let sink_task = sink.spawn();

    let cursor = AddressCursor::new(config.address);
    let prober = Arc::new(Prober::new(config.clone(), tls, latency));
    info!(
        start = %config.address,
        port = config.port,
        threads = config.threads,
        budget = config.budget,
        timeout_s = config.timeout.as_secs(),
        "scan starting"
    );

    let summary = scan_range(
        config.clone(),
        &cursor,
        prober,
        results,
        ScanProgress::new(),
    )
    .await?;

    let sink = sink_task.await.context("result sink panicked")??;
    info!(
        dispatched = summary.dispatched,
        probed = summary.probed,
        qualified = summary.qualified,
        lines = sink.lines,
        domains = sink.domains,
        "scan completed"
    );

    let ranking = if config.persist_output {
        ranker::rank_file(&config.results_path, config.top)?
    } else {
        info!("results were not persisted, skipping ranking");
        Vec::new()
    };

    Ok(ScanReport {
        summary,
        sink,
        ranking,
    })
}
