//! Fixed-width result lines and the duration text they carry.
//!
//! Every column is left-justified to [`COLUMN_WIDTH`] characters and always
//! followed by at least one space, so overlong values never run into the next
//! column. The ranker
//! matches `ALPN: h2` followed by the domain column and a `Ping:` token, so
//! the layout here and the patterns in `ranker` must stay in step.

use crate::error::DurationParseError;
use std::net::SocketAddr;
use std::time::Duration;

pub const COLUMN_WIDTH: usize = 22;
/// Stand-in for an empty ALPN result so the TLS column keeps its shape.
pub const NO_ALPN: &str = "  ";

/// One line handed from a probe to the result sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLine {
    pub text: String,
    /// Domain recorded in the domain list, if any.
    pub domain: Option<String>,
}

/// Latency column contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Latency {
    /// No latency probe configured.
    NotMeasured,
    Measured(Duration),
    Failed(String),
}

/// `TLS v1.3    ALPN: h2`
pub fn tls_column(version: &str, alpn: &str) -> String {
    let alpn = if alpn.is_empty() { NO_ALPN } else { alpn };
    format!("TLS v{version}    ALPN: {alpn}")
}

/// Left-justify `value` to the column width, keeping at least one trailing space.
fn column(value: &str) -> String {
    let width = COLUMN_WIDTH.max(value.chars().count() + 1);
    format!("{value:<width$}")
}

/// Line for a session that passed the classification gate and the name filter.
pub fn result_line(
    remote: SocketAddr,
    version: &str,
    alpn: &str,
    common_name: &str,
    latency: &Latency,
) -> ResultLine {
    let endpoint = remote.to_string();
    let domain = (!common_name.is_empty() && common_name != remote.ip().to_string())
        .then(|| common_name.to_string());

    let mut text = column(&endpoint);
    text.push_str(&column(&tls_column(version, alpn)));
    text.push_str(&column(domain.as_deref().unwrap_or("")));
    match latency {
        Latency::NotMeasured => {}
        // A zero average carries no information and would outrank everything.
        Latency::Measured(d) if d.is_zero() => {}
        Latency::Measured(d) => text.push_str(&format!("Ping: {:<30}", format_duration(*d))),
        Latency::Failed(reason) => text.push_str(&format!("ping failed: {reason}")),
    }

    ResultLine { text, domain }
}

/// Line for a probe that never got a usable session.
pub fn failure_line(endpoint: SocketAddr, reason: &str) -> ResultLine {
    ResultLine {
        text: column(&endpoint.to_string()) + reason,
        domain: None,
    }
}

/// Seconds reported by the latency probe, truncated to whole microseconds.
pub fn latency_from_secs(secs: f64) -> Duration {
    // Scale first so float noise below a microsecond cannot drop a whole unit.
    Duration::from_micros((secs * 1_000_000.0) as u64)
}

/// Render a duration the way Go's `time.Duration` prints, with `us` in
/// place of `µs`: `0s`, `850ns`, `345us`, `12.5ms`, `1.25s`, `2m3s`, `1h0m0s`.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{nanos}ns");
    }
    if nanos < 1_000_000 {
        return format!("{}us", decimal(nanos / 1_000, nanos % 1_000, 3));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", decimal(nanos / 1_000_000, nanos % 1_000_000, 6));
    }

    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = decimal(
        u128::from(total_secs % 60),
        u128::from(d.subsec_nanos()),
        9,
    );
    if hours > 0 {
        format!("{hours}h{minutes}m{secs}s")
    } else if minutes > 0 {
        format!("{minutes}m{secs}s")
    } else {
        format!("{secs}s")
    }
}

fn decimal(whole: u128, frac: u128, digits: usize) -> String {
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0digits$}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Parse the duration text produced by [`format_duration`].
///
/// Accepts one or more `<number><unit>` segments (`1m2.5s`), units `ns`,
/// `us`, `µs`, `ms`, `s`, `m` and `h`.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationParseError::Empty);
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (num, tail) = rest.split_at(num_end);
        if num.is_empty() || num.starts_with('.') || num.ends_with('.') {
            return Err(DurationParseError::Number(input.to_string()));
        }
        let value: f64 = num
            .parse()
            .map_err(|_| DurationParseError::Number(input.to_string()))?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);
        let scale = match unit {
            "" => return Err(DurationParseError::MissingUnit(input.to_string())),
            "ns" => 1e-9,
            "us" | "µs" | "μs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            other => {
                return Err(DurationParseError::UnknownUnit {
                    unit: other.to_string(),
                    input: input.to_string(),
                })
            }
        };
        total += value * scale;
        rest = tail;
    }

    // Round to whole nanoseconds; f64 arithmetic leaves dust below that.
    Ok(Duration::from_nanos((total * 1e9).round() as u64))
}
