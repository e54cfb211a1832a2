use anyhow::{Context, Result};
use regex::Regex;
use serde_json::{json, Map, Value};
use shared::format::{self, BenchmarkResult, Summary};
use shared::Bench;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// One benchmark's numbers as found in runner output: raw samples from a JSON
/// result file, or a summary line scraped from a text log.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Samples(BenchmarkResult),
    Summary(Summary),
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Entry::Samples(result) => &result.name,
            Entry::Summary(summary) => &summary.name,
        }
    }

    fn rename(&mut self, name: String) {
        match self {
            Entry::Samples(result) => result.name = name,
            Entry::Summary(summary) => summary.name = name,
        }
    }

    pub fn to_bench(&self) -> Result<Bench> {
        match self {
            Entry::Samples(result) => Ok(format::to_bench(result)?),
            Entry::Summary(summary) => Ok(summary.to_bench()),
        }
    }

    pub fn replicache_line(&self) -> Result<String> {
        match self {
            Entry::Samples(result) => Ok(format::replicache_line(result)?),
            Entry::Summary(summary) => Ok(summary.to_line()),
        }
    }

    /// Summaries carry no spread, so their line has no `±` part.
    pub fn benchmark_js_line(&self) -> Result<String> {
        match self {
            Entry::Samples(result) => Ok(format::benchmark_js_line(result)?),
            Entry::Summary(summary) => Ok(format!(
                "{} x {:.2} ops/sec ({} runs sampled)",
                summary.name,
                1000.0 / summary.avg,
                summary.runs
            )),
        }
    }

    fn bmf_measures(&self) -> Result<Value> {
        match self {
            Entry::Samples(result) => {
                let value = format::bmf(std::slice::from_ref(result))?;
                Ok(value[&result.name].clone())
            }
            Entry::Summary(summary) => {
                let mut measures = Map::new();
                measures.insert(
                    "latency".to_string(),
                    json!({ "value": summary.p50, "upper_value": summary.p95 }),
                );
                if let Some(throughput) = summary.throughput_mb_per_s {
                    measures.insert("throughput".to_string(), json!({ "value": throughput }));
                }
                Ok(Value::Object(measures))
            }
        }
    }
}

pub fn bmf(entries: &[Entry]) -> Result<Value> {
    let mut metrics = Map::new();
    for entry in entries {
        metrics.insert(entry.name().to_string(), entry.bmf_measures()?);
    }

    Ok(Value::Object(metrics))
}

static BROWSER: OnceCell<Regex> = OnceCell::const_new();
async fn browser_regex() -> &'static Regex {
    BROWSER
        .get_or_init(|| async {
            Regex::new(r"^Running \d+ benchmarks? on (?P<browser>[A-Za-z]+)\.\.\.$").unwrap()
        })
        .await
}

/// Scrapes summary lines from a runner log. Anything that is not a summary
/// line is skipped. With `tag_browser`, names get the browser announced by the
/// last `Running N benchmarks on <Browser>...` line appended in brackets.
pub async fn scan_log(text: &str, tag_browser: bool) -> Vec<Entry> {
    let browser_re = browser_regex().await;
    let mut browser: Option<String> = None;
    let mut entries = Vec::new();

    for line in text.lines().map(str::trim) {
        if let Some(cap) = browser_re.captures(line) {
            browser = Some(cap["browser"].to_string());
            continue;
        }

        let Ok(mut summary) = format::parse_summary(line).await else {
            continue;
        };
        if tag_browser {
            if let Some(browser) = &browser {
                summary.name = format!("{} [{}]", summary.name, browser);
            }
        }
        entries.push(Entry::Summary(summary));
    }

    entries
}

/// Reads one input file. `.json` files hold an array of raw results; anything
/// else is treated as a text log.
pub async fn read_file(path: &Path, tag_browser: bool) -> Result<Vec<Entry>> {
    let text = fs::read_to_string(path).with_context(|| format!("read {path:?}"))?;

    let entries = if path.extension().map_or(false, |ext| ext == "json") {
        let results: Vec<BenchmarkResult> =
            serde_json::from_str(&text).with_context(|| format!("parse {path:?}"))?;
        results.into_iter().map(Entry::Samples).collect()
    } else {
        scan_log(&text, tag_browser).await
    };

    debug!("{:?}: {} entries", path, entries.len());
    Ok(entries)
}

/// Drops entries whose name does not match `filter`, then collapses repeated
/// names keeping the last one in the position of the first.
pub fn select(entries: Vec<Entry>, filter: Option<&Regex>) -> Vec<Entry> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut selected: Vec<Entry> = Vec::new();

    for entry in entries {
        if let Some(filter) = filter {
            if !filter.is_match(entry.name()) {
                continue;
            }
        }

        let existing = positions.get(entry.name()).copied();
        match existing {
            Some(index) => {
                warn!("{:?} reported more than once, keeping the last", entry.name());
                selected[index] = entry;
            }
            None => {
                positions.insert(entry.name().to_string(), selected.len());
                selected.push(entry);
            }
        }
    }

    selected
}

/// Appends ` [suffix]` to every entry name.
pub fn tag(entries: &mut [Entry], suffix: &str) {
    for entry in entries {
        let name = format!("{} [{}]", entry.name(), suffix);
        entry.rename(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
Running 3 benchmarks on Chromium...
populate 1024x1000 (clean, indexes: 0) 50/75/90/95%=12.50/13.10/14.00/15.20 ms avg=13.01 ms (19 runs sampled)
[vite] page reloaded
scan 1024x1000 50/75/90/95%=0.90/1.00/1.10/1.20 ms avg=0.95 ms 1027.37 MB/s (10 runs sampled)
Running 1 benchmark on Firefox...
scan 1024x1000 50/75/90/95%=1.90/2.00/2.10/2.20 ms avg=1.95 ms (10 runs sampled)
Done!
";

    #[tokio::test]
    async fn scans_summary_lines_and_skips_noise() {
        let entries = scan_log(LOG, false).await;

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name(), "populate 1024x1000 (clean, indexes: 0)");
        let bench = entries[1].to_bench().unwrap();
        assert_eq!(bench.value, 0.9);
        assert_eq!(bench.unit, "median ms");
    }

    #[tokio::test]
    async fn tags_names_with_browser() {
        let entries = scan_log(LOG, true).await;

        assert_eq!(entries[1].name(), "scan 1024x1000 [Chromium]");
        assert_eq!(entries[2].name(), "scan 1024x1000 [Firefox]");
    }

    #[tokio::test]
    async fn last_duplicate_wins_in_first_position() {
        let entries = select(scan_log(LOG, false).await, None);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].name(), "scan 1024x1000");
        assert_eq!(entries[1].to_bench().unwrap().value, 1.9);
    }

    #[tokio::test]
    async fn filter_by_name() {
        let filter = Regex::new("^populate").unwrap();
        let entries = select(scan_log(LOG, false).await, Some(&filter));

        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn bmf_mixes_samples_and_summaries() {
        let mut entries = vec![
            Entry::Samples(BenchmarkResult {
                name: "persist 1024x1000".to_string(),
                group: "replicache".to_string(),
                sorted_run_times_ms: vec![40.0, 42.0, 44.0],
                byte_size: None,
            }),
            Entry::Summary(format::parse_summary(
                "scan 1024x1000 50/75/90/95%=0.90/1.00/1.10/1.20 ms avg=0.95 ms (10 runs sampled)",
            )
            .await
            .unwrap()),
        ];
        tag(&mut entries, "webkit");

        let value = bmf(&entries).unwrap();
        assert_eq!(value["persist 1024x1000 [webkit]"]["latency"]["value"], 42.0);
        assert_eq!(value["persist 1024x1000 [webkit]"]["latency"]["lower_value"], 40.0);
        assert_eq!(value["scan 1024x1000 [webkit]"]["latency"]["upper_value"], 1.2);
    }

    #[tokio::test]
    async fn reads_json_result_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        fs::write(
            &path,
            r#"[{"name": "create index 1024x5000", "group": "replicache", "sortedRunTimesMs": [5.0, 6.0], "byteSize": 5120000}]"#,
        )
        .unwrap();

        let entries = read_file(&path, false).await.unwrap();

        assert!(matches!(&entries[0], Entry::Samples(r) if r.byte_size == Some(5_120_000)));
        let line = entries[0].replicache_line().unwrap();
        assert!(line.starts_with("create index 1024x5000 50/75/90/95%="));
    }
}
