//! Post-scan pass that ranks recorded endpoints by latency.

use crate::error::DurationParseError;
use crate::format::parse_duration;
use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use time::{format_description::well_known, OffsetDateTime};
use tracing::warn;

static ALPN_H2_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ALPN:\s*h2\s+([a-zA-Z0-9.\-]+)").expect("valid ALPN pattern")
});

static PING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Ping:\s*((?:[0-9]+(?:\.[0-9]+)?[a-z]+)+)").expect("valid ping pattern")
});

/// A ranked result line and the latency parsed from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    pub line: String,
    pub domain: String,
    #[serde(rename = "latency_us", serialize_with = "as_micros")]
    pub latency: Duration,
}

fn as_micros<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_micros().min(u64::MAX as u128) as u64)
}

/// Extract `(domain, latency)` from a qualifying line.
///
/// Lines without `ALPN: h2` and a domain, or without a `Ping:` token, give
/// `Ok(None)`. A `Ping:` token that does not parse gives an error.
pub fn parse_line(line: &str) -> Result<Option<(String, Duration)>, DurationParseError> {
    let Some(caps) = ALPN_H2_RE.captures(line) else {
        return Ok(None);
    };
    let Some(ping) = PING_RE.captures(line) else {
        return Ok(None);
    };
    let latency = parse_duration(&ping[1])?;
    Ok(Some((caps[1].to_string(), latency)))
}

/// Rank qualifying lines from `reader`, fastest first, keeping at most `top`.
pub fn rank_lines<R: BufRead>(reader: R, top: usize) -> Result<Vec<RankedEntry>> {
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line.context("reading results")?;
        match parse_line(&line) {
            Ok(Some((domain, latency))) => entries.push(RankedEntry {
                line,
                domain,
                latency,
            }),
            Ok(None) => {}
            Err(e) => warn!(error = %e, %line, "skipping line with unparsable ping"),
        }
    }
    // Stable sort keeps file order for equal latencies, so reruns agree.
    entries.sort_by_key(|e| e.latency);
    entries.truncate(top);
    Ok(entries)
}

/// Re-open the results file and rank it.
pub fn rank_file(path: impl AsRef<Path>, top: usize) -> Result<Vec<RankedEntry>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("failed to open {} for reading", path.display()))?;
    rank_lines(BufReader::new(file), top)
}

/// `1: <line>` per entry, under a heading.
pub fn render(entries: &[RankedEntry]) -> String {
    let mut out = String::from("Top servers by TLS ping:\n");
    for (i, e) in entries.iter().enumerate() {
        out.push_str(&format!("{}: {}\n", i + 1, e.line));
    }
    out
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    generated_at: String,
    source: String,
    entries: Vec<ReportEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct ReportEntry<'a> {
    rank: usize,
    #[serde(flatten)]
    entry: &'a RankedEntry,
}

/// Write the shortlist as pretty JSON.
pub fn write_json(path: &Path, source: &Path, entries: &[RankedEntry]) -> Result<()> {
    let report = Report {
        generated_at: now_rfc3339(),
        source: source.display().to_string(),
        entries: entries
            .iter()
            .enumerate()
            .map(|(i, entry)| ReportEntry { rank: i + 1, entry })
            .collect(),
    };
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, &report)?;
    Ok(())
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{failure_line, result_line, Latency};
    use std::io::Cursor;

    fn h2_line(last: u8, cn: &str, latency: Latency) -> String {
        let addr = format!("203.0.113.{last}:443").parse().unwrap();
        result_line(addr, "1.3", "h2", cn, &latency).text
    }

    #[test]
    fn ranks_ascending_and_keeps_lines_verbatim() {
        let lines = [
            h2_line(1, "slow.com", Latency::Measured(Duration::from_millis(80))),
            h2_line(2, "fast.com", Latency::Measured(Duration::from_micros(4_500))),
            h2_line(3, "mid.com", Latency::Measured(Duration::from_millis(20))),
        ];
        let ranked = rank_lines(Cursor::new(lines.join("\n")), 10).unwrap();
        let domains: Vec<_> = ranked.iter().map(|e| e.domain.as_str()).collect();
        assert_eq!(domains, ["fast.com", "mid.com", "slow.com"]);
        assert_eq!(ranked[0].line, lines[1]);
        assert_eq!(ranked[0].latency, Duration::from_micros(4_500));
    }

    #[test]
    fn keeps_only_top_n() {
        let lines: Vec<_> = (1..=15)
            .map(|i| h2_line(i, "edge.net", Latency::Measured(Duration::from_millis(u64::from(i)))))
            .collect();
        let ranked = rank_lines(Cursor::new(lines.join("\n")), 10).unwrap();
        assert_eq!(ranked.len(), 10);
        assert_eq!(ranked[9].latency, Duration::from_millis(10));
    }

    #[test]
    fn skips_lines_without_latency_or_h2() {
        let addr = "203.0.113.9:443".parse().unwrap();
        let text = [
            h2_line(1, "example.com", Latency::NotMeasured),
            h2_line(2, "example.com", Latency::Failed("timeout".into())),
            result_line(addr, "1.2", "http/1.1", "example.com", &Latency::Measured(Duration::from_millis(1))).text,
            failure_line(addr, "dial failed: connection refused").text,
            "Ping: 1ms but nothing else".to_string(),
        ]
        .join("\n");
        assert!(rank_lines(Cursor::new(text), 10).unwrap().is_empty());
    }

    #[test]
    fn unparsable_ping_is_skipped_not_fatal() {
        let good = h2_line(1, "example.com", Latency::Measured(Duration::from_millis(3)));
        let bad = "203.0.113.2:443       TLS v1.3    ALPN: h2  example.com           Ping: 12parsecs";
        let ranked = rank_lines(Cursor::new(format!("{bad}\n{good}\n")), 10).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].line, good);
    }

    #[test]
    fn every_measured_h2_line_reparses() {
        for micros in [1u64, 999, 1_000, 12_345, 999_999, 1_000_000, 61_250_000, 3_600_000_001] {
            let d = Duration::from_micros(micros);
            for cn in ["example.com", "very-long-cdn-edge-hostname.com"] {
                let line = h2_line(7, cn, Latency::Measured(d));
                let parsed = parse_line(&line).unwrap();
                assert_eq!(parsed, Some((cn.to_string(), d)), "{line}");
            }
        }
    }

    #[test]
    fn ranking_twice_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.txt");
        let lines = [
            h2_line(1, "b.com", Latency::Measured(Duration::from_millis(5))),
            h2_line(2, "a.com", Latency::Measured(Duration::from_millis(5))),
            h2_line(3, "c.com", Latency::Measured(Duration::from_millis(1))),
        ];
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        let first = render(&rank_file(&path, 10).unwrap());
        let second = render(&rank_file(&path, 10).unwrap());
        assert_eq!(first, second);
        assert!(first.starts_with("Top servers by TLS ping:\n1: 203.0.113.3:443"));
    }

    #[test]
    fn json_report_carries_rank_and_micros() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("top.json");
        let entries = vec![RankedEntry {
            line: "x".into(),
            domain: "example.com".into(),
            latency: Duration::from_millis(12),
        }];
        write_json(&out, Path::new("results.txt"), &entries).unwrap();

        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(v["entries"][0]["rank"], 1);
        assert_eq!(v["entries"][0]["domain"], "example.com");
        assert_eq!(v["entries"][0]["latency_us"], 12_000);
        assert_eq!(v["source"], "results.txt");
    }
}
