//! Per-address probe: dial, TLS handshake, classification and latency.

use crate::config::ScanConfig;
use crate::error::ProbeError;
use crate::format::{self, Latency, ResultLine};
use crate::latency::LatencyProbe;
use crate::tls::{self, TlsClient, ALPN_H2, TLS13_LABEL};
use rustls::pki_types::ServerName;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

/// Certificate names that show up on appliances and placeholder setups.
pub const DENY_LIST: &[&str] = &["invalid2.invalid", "OPNsense.localdomain"];

/// Why a completed handshake is not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// Not TLS 1.3 with `h2`, and failures are not shown.
    Gate,
    Wildcard,
    Localhost,
    /// Name does not contain exactly one period.
    NotSecondLevel,
    DenyListed,
}

#[derive(Debug)]
pub enum Verdict {
    Qualifies,
    Excluded(Exclusion),
    Failed(ProbeError),
}

/// What one probe learned about one address.
#[derive(Debug)]
pub struct ProbeOutcome {
    /// Address and port that were dialed.
    pub target: SocketAddr,
    /// Peer address of the established connection.
    pub remote: Option<SocketAddr>,
    pub tls_version: &'static str,
    pub alpn: String,
    pub common_name: String,
    pub latency: Latency,
    pub verdict: Verdict,
}

impl ProbeOutcome {
    fn failed(target: SocketAddr, remote: Option<SocketAddr>, err: ProbeError) -> Self {
        Self {
            target,
            remote,
            tls_version: "",
            alpn: String::new(),
            common_name: String::new(),
            latency: Latency::NotMeasured,
            verdict: Verdict::Failed(err),
        }
    }

    pub fn qualifies(&self) -> bool {
        matches!(self.verdict, Verdict::Qualifies)
    }

    /// Project the outcome onto the line recorded by the result sink, if any.
    pub fn to_result_line(&self, show_fail: bool) -> Option<ResultLine> {
        match &self.verdict {
            Verdict::Qualifies => Some(format::result_line(
                self.remote.unwrap_or(self.target),
                self.tls_version,
                &self.alpn,
                &self.common_name,
                &self.latency,
            )),
            Verdict::Excluded(_) => None,
            Verdict::Failed(err) if show_fail => Some(format::failure_line(
                self.remote.unwrap_or(self.target),
                &err.to_string(),
            )),
            Verdict::Failed(_) => None,
        }
    }
}

/// TLS 1.3 with `h2`, unless every outcome is being recorded anyway.
pub fn passes_gate(version: &str, alpn: &str, show_fail: bool) -> bool {
    show_fail || (version == TLS13_LABEL && alpn == ALPN_H2)
}

/// Reject names that do not look like a real second-level domain.
///
/// The one-period rule is a heuristic and deliberately turns away
/// `www.example.com` as well as bare host names.
pub fn exclusion(common_name: &str) -> Option<Exclusion> {
    if common_name.starts_with('*') {
        Some(Exclusion::Wildcard)
    } else if common_name == "localhost" {
        Some(Exclusion::Localhost)
    } else if common_name.matches('.').count() != 1 {
        Some(Exclusion::NotSecondLevel)
    } else if DENY_LIST.contains(&common_name) {
        Some(Exclusion::DenyListed)
    } else {
        None
    }
}

/// Stateless probe; cheap to share between workers.
#[derive(Debug, Clone)]
pub struct Prober {
    config: Arc<ScanConfig>,
    tls: TlsClient,
    latency: Option<Arc<dyn LatencyProbe>>,
}

impl Prober {
    pub fn new(
        config: Arc<ScanConfig>,
        tls: TlsClient,
        latency: Option<Arc<dyn LatencyProbe>>,
    ) -> Self {
        Self {
            config,
            tls,
            latency,
        }
    }

    pub async fn probe(&self, ip: IpAddr) -> ProbeOutcome {
        let target = SocketAddr::new(ip, self.config.port);
        let timeout = self.config.timeout;

        let stream = match time::timeout(timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return ProbeOutcome::failed(target, None, ProbeError::Dial(e)),
            Err(_) => {
                return ProbeOutcome::failed(target, None, ProbeError::DialTimeout(timeout))
            }
        };
        let remote = stream.peer_addr().ok();
        let peer = remote.unwrap_or(target);

        // Fresh deadline so the handshake gets the full timeout of its own.
        let server_name = ServerName::from(peer.ip());
        let session = match time::timeout(timeout, self.tls.handshake(server_name, stream)).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                return ProbeOutcome::failed(target, remote, ProbeError::Handshake(e))
            }
            Err(_) => {
                return ProbeOutcome::failed(
                    target,
                    remote,
                    ProbeError::HandshakeTimeout(timeout),
                )
            }
        };
        let info = tls::session_info(session.get_ref().1);
        drop(session);

        let mut outcome = ProbeOutcome {
            target,
            remote,
            tls_version: info.version,
            alpn: info.alpn,
            common_name: info.common_name,
            latency: Latency::NotMeasured,
            verdict: Verdict::Qualifies,
        };

        if !passes_gate(outcome.tls_version, &outcome.alpn, self.config.show_fail) {
            outcome.verdict = Verdict::Excluded(Exclusion::Gate);
            return outcome;
        }
        if let Some(reason) = exclusion(&outcome.common_name) {
            debug!(%peer, cn = %outcome.common_name, ?reason, "certificate name excluded");
            outcome.verdict = Verdict::Excluded(reason);
            return outcome;
        }

        if let Some(pinger) = &self.latency {
            outcome.latency = match pinger
                .measure(&outcome.common_name, self.config.ping_count)
                .await
            {
                Ok(secs) if secs.is_finite() && secs >= 0.0 => {
                    Latency::Measured(format::latency_from_secs(secs))
                }
                Ok(secs) => Latency::Failed(format!("invalid latency {secs}")),
                Err(e) => {
                    debug!(cn = %outcome.common_name, error = %e, "latency probe failed");
                    Latency::Failed(e.to_string())
                }
            };
        }

        outcome
    }
}
