//! Append-only operations on a loaded history.
//!
//! Runs are keyed by `(commit id, date)` and kept oldest first. A run is never
//! edited after it is appended; the only removal is [`BenchmarkData::trim`],
//! which drops the oldest runs once a suite grows past a size limit.

use crate::error::{HistoryError, Result};
use crate::format::parse_range;
use crate::model::{Bench, BenchmarkData, BenchmarkRun};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use tracing::{debug, info};

/// One value of one bench over time.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub commit: String,
    pub date: i64,
    pub value: f64,
    pub unit: String,
}

/// A broken invariant found in a stored file.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub suite: String,
    pub run: usize,
    pub kind: ViolationKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViolationKind {
    DuplicateRun { commit: String, date: i64 },
    OutOfOrder { date: i64, previous: i64 },
    DuplicateBench(String),
    NonFiniteValue(String),
    MalformedRange { bench: String, range: String },
    EmptyRun,
}

impl Display for Violation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} run #{}: ", self.suite, self.run)?;
        match &self.kind {
            ViolationKind::DuplicateRun { commit, date } => {
                write!(f, "duplicate run for {commit} at {date}")
            }
            ViolationKind::OutOfOrder { date, previous } => {
                write!(f, "date {date} is older than the previous run ({previous})")
            }
            ViolationKind::DuplicateBench(name) => write!(f, "bench {name:?} appears twice"),
            ViolationKind::NonFiniteValue(name) => write!(f, "bench {name:?} has a non-finite value"),
            ViolationKind::MalformedRange { bench, range } => {
                write!(f, "bench {bench:?} has malformed range {range:?}")
            }
            ViolationKind::EmptyRun => write!(f, "run has no benches"),
        }
    }
}

impl BenchmarkData {
    pub fn suites(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn runs(&self, suite: &str) -> Result<&[BenchmarkRun]> {
        self.entries
            .get(suite)
            .map(Vec::as_slice)
            .ok_or_else(|| HistoryError::UnknownSuite(suite.to_string()))
    }

    pub fn latest(&self, suite: &str) -> Result<Option<&BenchmarkRun>> {
        Ok(self.runs(suite)?.last())
    }

    /// Newest run whose commit id starts with `commit`.
    pub fn find_run(&self, suite: &str, commit: &str) -> Result<(usize, &BenchmarkRun)> {
        self.runs(suite)?
            .iter()
            .enumerate()
            .rev()
            .find(|(_, run)| !commit.is_empty() && run.commit.id.starts_with(commit))
            .ok_or_else(|| HistoryError::UnknownRun {
                suite: suite.to_string(),
                commit: commit.to_string(),
            })
    }

    /// Every bench name seen in the suite, in the order it first appeared.
    pub fn bench_names(&self, suite: &str) -> Result<Vec<String>> {
        let mut seen = BTreeSet::new();
        let mut names = Vec::new();

        for run in self.runs(suite)? {
            for bench in &run.benches {
                if seen.insert(bench.name.as_str()) {
                    names.push(bench.name.clone());
                }
            }
        }

        Ok(names)
    }

    /// Values of `bench` across the suite, skipping runs that lack it.
    pub fn series(&self, suite: &str, bench: &str) -> Result<Vec<SeriesPoint>> {
        Ok(self
            .runs(suite)?
            .iter()
            .filter_map(|run| {
                run.bench(bench).map(|b| SeriesPoint {
                    commit: run.commit.id.clone(),
                    date: run.date,
                    value: b.value,
                    unit: b.unit.clone(),
                })
            })
            .collect())
    }

    /// Most recent bench named `bench` in runs before index `before`.
    pub fn previous_bench(
        &self,
        suite: &str,
        bench: &str,
        before: usize,
    ) -> Result<Option<(&BenchmarkRun, &Bench)>> {
        let runs = self.runs(suite)?;
        let end = before.min(runs.len());

        Ok(runs[..end]
            .iter()
            .rev()
            .find_map(|run| run.bench(bench).map(|b| (run, b))))
    }

    /// Appends `run` to `suite`, creating the suite if needed, then trims the
    /// suite to `max_items` runs. `now` becomes `lastUpdate`.
    pub fn append(
        &mut self,
        suite: &str,
        run: BenchmarkRun,
        max_items: Option<usize>,
        now: i64,
    ) -> Result<()> {
        check_run(&run)?;

        let runs = self.entries.entry(suite.to_string()).or_default();

        if runs
            .iter()
            .any(|r| r.commit.id == run.commit.id && r.date == run.date)
        {
            return Err(HistoryError::DuplicateRun {
                suite: suite.to_string(),
                commit: run.commit.id,
                date: run.date,
            });
        }

        if let Some(latest) = runs.last() {
            if run.date < latest.date {
                return Err(HistoryError::OutOfOrder {
                    suite: suite.to_string(),
                    date: run.date,
                    latest: latest.date,
                });
            }
        }

        info!(
            "Appending {} bench(es) for {} to suite {}",
            run.benches.len(),
            run.short_id(),
            suite
        );
        runs.push(run);
        self.last_update = now;

        if let Some(max_items) = max_items {
            self.trim(suite, max_items)?;
        }

        Ok(())
    }

    /// Drops the oldest runs so at most `max_items` remain. Returns how many
    /// were dropped.
    pub fn trim(&mut self, suite: &str, max_items: usize) -> Result<usize> {
        let runs = self
            .entries
            .get_mut(suite)
            .ok_or_else(|| HistoryError::UnknownSuite(suite.to_string()))?;

        let excess = runs.len().saturating_sub(max_items);
        if excess > 0 {
            runs.drain(..excess);
            debug!("Trimmed {} run(s) from suite {}", excess, suite);
        }

        Ok(excess)
    }

    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        for (suite, runs) in &self.entries {
            let mut keys = BTreeSet::new();
            let mut previous_date: Option<i64> = None;

            for (index, run) in runs.iter().enumerate() {
                let mut push = |kind| {
                    violations.push(Violation {
                        suite: suite.clone(),
                        run: index,
                        kind,
                    })
                };

                if !keys.insert((run.commit.id.as_str(), run.date)) {
                    push(ViolationKind::DuplicateRun {
                        commit: run.commit.id.clone(),
                        date: run.date,
                    });
                }
                if let Some(previous) = previous_date {
                    if run.date < previous {
                        push(ViolationKind::OutOfOrder {
                            date: run.date,
                            previous,
                        });
                    }
                }
                previous_date = Some(run.date);

                if run.benches.is_empty() {
                    push(ViolationKind::EmptyRun);
                }

                let mut names = BTreeSet::new();
                for bench in &run.benches {
                    if !names.insert(bench.name.as_str()) {
                        push(ViolationKind::DuplicateBench(bench.name.clone()));
                    }
                    if !bench.value.is_finite() {
                        push(ViolationKind::NonFiniteValue(bench.name.clone()));
                    }
                    if let Some(range) = &bench.range {
                        if parse_range(range).is_err() {
                            push(ViolationKind::MalformedRange {
                                bench: bench.name.clone(),
                                range: range.clone(),
                            });
                        }
                    }
                }
            }
        }

        violations
    }
}

fn check_run(run: &BenchmarkRun) -> Result<()> {
    if run.commit.id.is_empty() {
        return Err(HistoryError::InvalidRun("commit id is empty".to_string()));
    }
    if run.benches.is_empty() {
        return Err(HistoryError::InvalidRun(format!(
            "run for {} has no benches",
            run.short_id()
        )));
    }

    let mut names = BTreeSet::new();
    for bench in &run.benches {
        if !names.insert(bench.name.as_str()) {
            return Err(HistoryError::InvalidRun(format!(
                "bench {:?} appears twice",
                bench.name
            )));
        }
        if !bench.value.is_finite() {
            return Err(HistoryError::InvalidRun(format!(
                "bench {:?} has a non-finite value",
                bench.name
            )));
        }
    }

    Ok(())
}
