//! Text and JSON renderings of benchmark results.
//!
//! A result is the sorted list of run times a harness collected for one
//! benchmark. It can be written as:
//!
//! - a dashboard entry ([`Bench`]): median value, `±rme%` range and the
//!   replicache summary line as `extra`,
//! - the replicache summary line itself,
//!   `name 50/75/90/95%=a/b/c/d ms avg=e ms (n runs sampled)`,
//! - a benchmark.js style line, `name x ops ops/sec ±rme% (n runs sampled)`,
//! - Bencher Metric Format JSON.
//!
//! The summary line is also parsed back, from runner logs and from the
//! `extra` field of stored entries.

use crate::error::{HistoryError, Result};
use crate::model::Bench;
use crate::stats::Samples;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;

pub const MEDIAN_UNIT: &str = "median ms";

/// Raw samples for one benchmark as produced by a runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkResult {
    pub name: String,
    #[serde(default)]
    pub group: String,
    pub sorted_run_times_ms: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_size: Option<u64>,
}

impl BenchmarkResult {
    pub fn samples(&self) -> Result<Samples> {
        Samples::new(&self.name, self.sorted_run_times_ms.clone())
    }
}

pub fn to_bench(result: &BenchmarkResult) -> Result<Bench> {
    let samples = result.samples()?;

    Ok(Bench {
        name: result.name.clone(),
        value: samples.percentile(0.5),
        range: Some(format_range(samples.rme())),
        unit: MEDIAN_UNIT.to_string(),
        extra: Some(summary_line(&result.name, &samples, result.byte_size)),
    })
}

pub fn replicache_line(result: &BenchmarkResult) -> Result<String> {
    let samples = result.samples()?;
    Ok(summary_line(&result.name, &samples, result.byte_size))
}

pub fn benchmark_js_line(result: &BenchmarkResult) -> Result<String> {
    let samples = result.samples()?;

    Ok(format!(
        "{} x {:.2} ops/sec {} ({} runs sampled)",
        result.name,
        samples.ops_per_sec(),
        format_range(samples.rme()),
        samples.len()
    ))
}

/// Bencher Metric Format for a batch of results.
pub fn bmf(results: &[BenchmarkResult]) -> Result<Value> {
    let mut metrics = Map::new();

    for result in results {
        let samples = result.samples()?;
        let mut measures = Map::new();
        measures.insert(
            "latency".to_string(),
            json!({
                "value": samples.percentile(0.5),
                "lower_value": samples.min(),
                "upper_value": samples.max(),
            }),
        );
        if let Some(byte_size) = result.byte_size {
            measures.insert(
                "throughput".to_string(),
                json!({ "value": samples.throughput_mb_per_s(byte_size) }),
            );
        }
        metrics.insert(result.name.clone(), Value::Object(measures));
    }

    Ok(Value::Object(metrics))
}

pub fn format_range(rme: f64) -> String {
    format!("±{rme:.1}%")
}

/// Percent value of a `±x%` (or `+/- x%`) range string.
pub fn parse_range(range: &str) -> Result<f64> {
    let malformed = || HistoryError::parse("range", range);

    let trimmed = range.trim();
    let body = trimmed
        .strip_prefix('±')
        .or_else(|| trimmed.strip_prefix("+/-"))
        .and_then(|rest| rest.trim_end().strip_suffix('%'))
        .ok_or_else(malformed)?;

    let percent = body.trim().parse::<f64>().map_err(|_| malformed())?;
    if !percent.is_finite() || percent < 0.0 {
        return Err(malformed());
    }

    Ok(percent)
}

fn summary_line(name: &str, samples: &Samples, byte_size: Option<u64>) -> String {
    let throughput = byte_size
        .map(|bytes| format!(" {:.2} MB/s", samples.throughput_mb_per_s(bytes)))
        .unwrap_or_default();

    format!(
        "{name} 50/75/90/95%={:.2}/{:.2}/{:.2}/{:.2} ms avg={:.2} ms{throughput} ({} runs sampled)",
        samples.percentile(0.5),
        samples.percentile(0.75),
        samples.percentile(0.9),
        samples.percentile(0.95),
        samples.mean(),
        samples.len()
    )
}

/// A replicache summary line read back from text.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub name: String,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub avg: f64,
    pub throughput_mb_per_s: Option<f64>,
    pub runs: u32,
}

impl Summary {
    pub fn to_bench(&self) -> Bench {
        Bench {
            name: self.name.clone(),
            value: self.p50,
            range: None,
            unit: MEDIAN_UNIT.to_string(),
            extra: Some(self.to_line()),
        }
    }

    pub fn to_line(&self) -> String {
        let throughput = self
            .throughput_mb_per_s
            .map(|t| format!(" {t:.2} MB/s"))
            .unwrap_or_default();

        format!(
            "{} 50/75/90/95%={:.2}/{:.2}/{:.2}/{:.2} ms avg={:.2} ms{throughput} ({} runs sampled)",
            self.name, self.p50, self.p75, self.p90, self.p95, self.avg, self.runs
        )
    }
}

static SUMMARY: OnceCell<Regex> = OnceCell::const_new();
async fn summary_regex() -> &'static Regex {
    SUMMARY
        .get_or_init(|| async {
            Regex::new(r"^(?P<name>.+?) 50/75/90/95%=(?P<p50>[0-9.]+)/(?P<p75>[0-9.]+)/(?P<p90>[0-9.]+)/(?P<p95>[0-9.]+) ms avg=(?P<avg>[0-9.]+) ms(?: (?P<throughput>[0-9.]+) MB/s)? \((?P<runs>[0-9]+) runs? sampled\)$")
            .unwrap()
        })
        .await
}

pub async fn parse_summary(line: &str) -> Result<Summary> {
    let line = line.trim();
    let cap = summary_regex()
        .await
        .captures(line)
        .ok_or_else(|| HistoryError::parse("summary line", line))?;

    let number = |group: &str| -> Result<f64> {
        cap[group]
            .parse::<f64>()
            .map_err(|_| HistoryError::parse("summary value", &cap[group]))
    };

    Ok(Summary {
        name: cap["name"].to_string(),
        p50: number("p50")?,
        p75: number("p75")?,
        p90: number("p90")?,
        p95: number("p95")?,
        avg: number("avg")?,
        throughput_mb_per_s: cap
            .name("throughput")
            .and_then(|m| m.as_str().parse::<f64>().ok()),
        runs: cap["runs"]
            .parse::<u32>()
            .map_err(|_| HistoryError::parse("run count", &cap["runs"]))?,
    })
}
