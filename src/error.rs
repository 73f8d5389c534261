use std::io;
use std::time::Duration;

/// Why a single address produced no TLS session.
///
/// These never leave the probe: they only become a failure line when the
/// scan runs with `show_fail`.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("dial failed: {0}")]
    Dial(#[source] io::Error),

    #[error("dial timed out after {0:?}")]
    DialTimeout(Duration),

    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),

    #[error("TLS handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
}

/// Failure of the latency collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LatencyError {
    #[error("no ping attempts requested")]
    NoAttempts,

    #[error("invalid host name: {0}")]
    InvalidHost(String),

    #[error("connect to {host} failed: {source}")]
    Connect {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("TLS handshake with {host} failed: {source}")]
    Handshake {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("{host} did not answer within {timeout:?}")]
    Timeout { host: String, timeout: Duration },
}

/// A `Ping:` token that cannot be turned back into a duration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,

    #[error("invalid number in duration {0:?}")]
    Number(String),

    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },
}
