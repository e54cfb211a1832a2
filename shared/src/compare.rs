use crate::model::{Bench, BenchmarkData, BenchmarkRun, Tool};
use std::fmt::Write;

pub const DEFAULT_ALERT_THRESHOLD: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Regression,
    Improvement,
    Unchanged,
    New,
}

/// One bench of the current run set against its previous value.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub name: String,
    pub unit: String,
    pub current: f64,
    pub previous: Option<f64>,
    /// Commit the previous value was recorded for.
    pub previous_commit: Option<String>,
    /// Greater than 1 means worse, whichever direction the tool measures.
    pub ratio: Option<f64>,
    pub verdict: Verdict,
}

/// Worse-is-bigger ratio of `current` against `previous`.
pub fn ratio(tool: Tool, current: f64, previous: f64) -> Option<f64> {
    let (numerator, denominator) = if tool.bigger_is_better() {
        (previous, current)
    } else {
        (current, previous)
    };

    if denominator == 0.0 {
        return None;
    }
    Some(numerator / denominator)
}

fn verdict(ratio: Option<f64>, threshold: f64) -> Verdict {
    match ratio {
        Some(r) if r > threshold => Verdict::Regression,
        Some(r) if r < 1.0 / threshold => Verdict::Improvement,
        _ => Verdict::Unchanged,
    }
}

fn compare_bench(
    tool: Tool,
    bench: &Bench,
    previous: Option<(&BenchmarkRun, &Bench)>,
    threshold: f64,
) -> Comparison {
    let ratio = previous.and_then(|(_, prev)| ratio(tool, bench.value, prev.value));
    let verdict = match previous {
        Some(_) => verdict(ratio, threshold),
        None => Verdict::New,
    };

    Comparison {
        name: bench.name.clone(),
        unit: bench.unit.clone(),
        current: bench.value,
        previous: previous.map(|(_, prev)| prev.value),
        previous_commit: previous.map(|(run, _)| run.commit.id.clone()),
        ratio,
        verdict,
    }
}

/// Compares every bench of `current` with the most recent earlier value in
/// `data`'s `suite`. `before` is the index of the first run not to look at;
/// pass the suite length for a run that has not been appended yet.
pub fn compare_with_history(
    data: &BenchmarkData,
    suite: &str,
    current: &BenchmarkRun,
    before: usize,
    threshold: f64,
) -> Vec<Comparison> {
    current
        .benches
        .iter()
        .map(|bench| {
            let previous = data
                .previous_bench(suite, &bench.name, before)
                .ok()
                .flatten();
            compare_bench(current.tool, bench, previous, threshold)
        })
        .collect()
}

/// Compares two specific runs bench by bench. Benches missing from `base`
/// are reported as new.
pub fn compare_runs(base: &BenchmarkRun, head: &BenchmarkRun, threshold: f64) -> Vec<Comparison> {
    head.benches
        .iter()
        .map(|bench| {
            let previous = base.bench(&bench.name).map(|prev| (base, prev));
            compare_bench(head.tool, bench, previous, threshold)
        })
        .collect()
}

pub fn alerts(comparisons: &[Comparison]) -> Vec<&Comparison> {
    comparisons
        .iter()
        .filter(|c| c.verdict == Verdict::Regression)
        .collect()
}

/// True when any ratio is strictly above `fail_threshold`.
pub fn exceeds(comparisons: &[Comparison], fail_threshold: f64) -> bool {
    comparisons
        .iter()
        .any(|c| c.ratio.map_or(false, |r| r > fail_threshold))
}

/// Markdown alert listing the regressed benches of `current`.
pub fn render_alert(
    suite: &str,
    current: &BenchmarkRun,
    comparisons: &[Comparison],
    threshold: f64,
) -> String {
    let regressions = alerts(comparisons);
    let mut out = String::new();

    let _ = writeln!(out, "# Performance Alert");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Possible performance regression was detected for benchmark **'{suite}'**."
    );
    let _ = writeln!(
        out,
        "Benchmark result of this commit is worse than the previous benchmark result exceeding threshold `{}`.",
        format_ratio(threshold)
    );
    let _ = writeln!(out);

    // Rows may compare against different runs when bench membership varies.
    let mut previous_ids: Vec<&str> = regressions
        .iter()
        .filter_map(|c| c.previous_commit.as_deref())
        .collect();
    previous_ids.sort_unstable();
    previous_ids.dedup();
    let shared_previous = match previous_ids.as_slice() {
        [id] => Some(*id),
        _ => None,
    };

    let previous_header = match shared_previous {
        Some(id) => format!("Previous: {id}"),
        None => "Previous".to_string(),
    };
    let _ = writeln!(
        out,
        "| Benchmark suite | Current: {} | {} | Ratio |",
        current.commit.id, previous_header
    );
    let _ = writeln!(out, "|-|-|-|-|");

    for c in regressions {
        let previous_commit = match (shared_previous, c.previous_commit.as_deref()) {
            (None, Some(id)) => format!(" ({})", id.get(..7).unwrap_or(id)),
            _ => String::new(),
        };
        let _ = writeln!(
            out,
            "| `{}` | `{}` {} | `{}` {}{} | `{}` |",
            c.name,
            c.current,
            c.unit,
            c.previous.map(|v| v.to_string()).unwrap_or_default(),
            c.unit,
            previous_commit,
            c.ratio.map(format_ratio).unwrap_or_default()
        );
    }

    out
}

/// A ratio as a percentage, `2.0` -> `200%`.
pub fn format_ratio(ratio: f64) -> String {
    let percent = ratio * 100.0;
    if (percent - percent.round()).abs() < 1e-9 {
        format!("{percent:.0}%")
    } else {
        format!("{percent:.2}%")
    }
}
