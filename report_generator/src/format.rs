use std::fmt::Write;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use shared::compare::{format_ratio, Comparison, Verdict};
use shared::history::SeriesPoint;
use shared::BenchmarkRun;

const COLUMN_WIDTH: usize = 12;
const NAME_WIDTH: usize = 48;
const COLUMN_PADDING: &str = "  ";

pub fn format_date(epoch_ms: i64) -> String {
    Utc.timestamp_millis_opt(epoch_ms)
        .single()
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| epoch_ms.to_string())
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string())
}

fn truncate(name: &str) -> String {
    if name.chars().count() <= NAME_WIDTH {
        return name.to_string();
    }
    let kept: String = name.chars().take(NAME_WIDTH - 1).collect();
    format!("{kept}…")
}

fn row<'a, I: IntoIterator<Item = &'a str>>(first: &str, columns: I) -> String {
    std::iter::once(format!("{:<NAME_WIDTH$}", truncate(first)))
        .chain(columns.into_iter().map(|col| format!("{col:>COLUMN_WIDTH$}")))
        .collect::<Vec<_>>()
        .join(COLUMN_PADDING)
}

/// One row per bench, one column per run (oldest on the left).
pub fn format_history(suite: &str, runs: &[BenchmarkRun], names: &[String]) -> Result<String> {
    let mut table = String::new();

    writeln!(table, "{suite}")?;
    writeln!(table, "{}", "=".repeat(suite.chars().count()))?;
    writeln!(table)?;

    let header = row("bench", runs.iter().map(BenchmarkRun::short_id));
    writeln!(table, "{header}")?;
    writeln!(table, "{}", "=".repeat(header.chars().count()))?;

    for name in names {
        let values: Vec<String> = runs
            .iter()
            .map(|run| format_value(run.bench(name).map(|b| b.value)))
            .collect();
        writeln!(table, "{}", row(name, values.iter().map(String::as_str)))?;
    }

    Ok(table)
}

/// Values of one bench over time with the change against the previous point.
pub fn format_series(bench: &str, points: &[SeriesPoint]) -> Result<String> {
    let mut table = String::new();

    writeln!(table, "{bench}")?;
    writeln!(table, "{}", "=".repeat(bench.chars().count()))?;
    writeln!(table)?;

    let mut previous: Option<f64> = None;
    for point in points {
        let change = match previous {
            Some(prev) if prev != 0.0 => format!("{:+.1}%", (point.value - prev) / prev * 100.0),
            _ => String::new(),
        };
        let commit = point.commit.get(..7).unwrap_or(&point.commit);

        writeln!(
            table,
            "{}  {}  {:>COLUMN_WIDTH$} {}  {}",
            format_date(point.date),
            commit,
            format!("{:.2}", point.value),
            point.unit,
            change
        )?;
        previous = Some(point.value);
    }

    Ok(table)
}

pub fn format_comparison(base: &BenchmarkRun, head: &BenchmarkRun, comparisons: &[Comparison]) -> Result<String> {
    let mut table = String::new();

    let header = row("bench", [base.short_id(), head.short_id(), "ratio", "verdict"]);
    writeln!(table, "{header}")?;
    writeln!(table, "{}", "=".repeat(header.chars().count()))?;

    for c in comparisons {
        let previous = format_value(c.previous);
        let current = format_value(Some(c.current));
        let ratio = c.ratio.map(format_ratio).unwrap_or_else(|| "-".to_string());
        let verdict = match c.verdict {
            Verdict::Regression => "regression",
            Verdict::Improvement => "improvement",
            Verdict::Unchanged => "",
            Verdict::New => "new",
        };

        writeln!(
            table,
            "{}",
            row(&c.name, [previous.as_str(), current.as_str(), ratio.as_str(), verdict])
        )?;
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Bench, CommitInfo, Person, Tool};

    fn run(id: &str, date: i64, benches: &[(&str, f64)]) -> BenchmarkRun {
        let person = Person {
            email: "dev@example.com".to_string(),
            name: "Dev".to_string(),
            username: None,
        };
        BenchmarkRun {
            commit: CommitInfo {
                author: person.clone(),
                committer: person,
                distinct: true,
                id: id.to_string(),
                message: String::new(),
                timestamp: String::new(),
                tree_id: String::new(),
                url: String::new(),
            },
            date,
            tool: Tool::CustomSmallerIsBetter,
            benches: benches
                .iter()
                .map(|(name, value)| Bench {
                    name: name.to_string(),
                    value: *value,
                    range: None,
                    unit: "median ms".to_string(),
                    extra: None,
                })
                .collect(),
        }
    }

    #[test]
    fn dates_render_in_utc() {
        assert_eq!(format_date(1650318893513), "2022-04-18 21:54");
    }

    #[test]
    fn history_marks_missing_benches() {
        let runs = vec![
            run("aaaaaaa111", 0, &[("populate", 10.0)]),
            run("bbbbbbb222", 1, &[("populate", 11.5), ("persist", 40.0)]),
        ];
        let names = vec!["populate".to_string(), "persist".to_string()];

        let table = format_history("Benchmark", &runs, &names).unwrap();
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines[0], "Benchmark");
        assert!(lines[3].ends_with("aaaaaaa       bbbbbbb"));
        assert!(lines[5].starts_with("populate "));
        assert!(lines[5].ends_with("10.00         11.50"));
        assert!(lines[6].ends_with("    -         40.00"));
    }

    #[test]
    fn series_shows_relative_change() {
        let points = vec![
            SeriesPoint {
                commit: "aaaaaaa111".to_string(),
                date: 0,
                value: 10.0,
                unit: "median ms".to_string(),
            },
            SeriesPoint {
                commit: "bbbbbbb222".to_string(),
                date: 60_000,
                value: 12.0,
                unit: "median ms".to_string(),
            },
        ];

        let table = format_series("scan", &points).unwrap();
        let lines: Vec<&str> = table.lines().collect();

        assert!(lines[3].starts_with("1970-01-01 00:00  aaaaaaa"));
        assert!(lines[4].ends_with("12.00 median ms  +20.0%"));
    }

    #[test]
    fn long_names_are_truncated() {
        let name = "refresh, 1024x1000 (indexes: 0) existing, refreshing 10 mutations";
        let truncated = truncate(name);
        assert_eq!(truncated.chars().count(), NAME_WIDTH);
        assert!(truncated.ends_with('…'));
    }
}
