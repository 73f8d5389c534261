//! Round-trip latency collaborator.
//!
//! The probe hands a host name and a repetition count to a [`LatencyProbe`]
//! and gets back the average round trip in seconds. [`TlsPinger`] measures it
//! as the time to connect and finish a TLS handshake with the host.

use crate::error::LatencyError;
use crate::tls::TlsClient;
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use std::fmt::Debug;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::debug;

#[async_trait]
pub trait LatencyProbe: Debug + Send + Sync {
    /// Average round-trip time to `host` over `count` attempts, in seconds.
    async fn measure(&self, host: &str, count: u32) -> Result<f64, LatencyError>;
}

/// Measures connect + TLS handshake time against `host:port`.
#[derive(Debug, Clone)]
pub struct TlsPinger {
    tls: TlsClient,
    port: u16,
    timeout: Duration,
}

impl TlsPinger {
    pub fn new(tls: TlsClient, port: u16, timeout: Duration) -> Self {
        Self { tls, port, timeout }
    }

    async fn once(&self, host: &str) -> Result<Duration, LatencyError> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| LatencyError::InvalidHost(host.to_string()))?;

        let start = Instant::now();
        let stream = match time::timeout(self.timeout, TcpStream::connect((host, self.port))).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(LatencyError::Connect {
                    host: host.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(LatencyError::Timeout {
                    host: host.to_string(),
                    timeout: self.timeout,
                })
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(host, error = %e, "could not disable Nagle on ping socket");
        }

        match time::timeout(self.timeout, self.tls.handshake(server_name, stream)).await {
            Ok(Ok(_session)) => Ok(start.elapsed()),
            Ok(Err(source)) => Err(LatencyError::Handshake {
                host: host.to_string(),
                source,
            }),
            Err(_) => Err(LatencyError::Timeout {
                host: host.to_string(),
                timeout: self.timeout,
            }),
        }
    }
}

#[async_trait]
impl LatencyProbe for TlsPinger {
    async fn measure(&self, host: &str, count: u32) -> Result<f64, LatencyError> {
        if count == 0 {
            return Err(LatencyError::NoAttempts);
        }
        let mut total = Duration::ZERO;
        for attempt in 1..=count {
            let rtt = self.once(host).await?;
            debug!(host, attempt, rtt_us = rtt.as_micros() as u64, "tls ping");
            total += rtt;
        }
        Ok(total.as_secs_f64() / f64::from(count))
    }
}
