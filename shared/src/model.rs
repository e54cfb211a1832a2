use crate::error::HistoryError;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub const DEFAULT_SUITE: &str = "Benchmark";

/// Largest integer a JavaScript number holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Everything the dashboard page reads from `window.BENCHMARK_DATA`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkData {
    /// Epoch milliseconds of the last append.
    pub last_update: i64,
    pub repo_url: String,
    /// Runs per suite, oldest first.
    pub entries: BTreeMap<String, Vec<BenchmarkRun>>,
}

impl BenchmarkData {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            last_update: 0,
            repo_url: repo_url.into(),
            entries: BTreeMap::new(),
        }
    }
}

/// One benchmark suite execution for one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    pub commit: CommitInfo,
    /// Epoch milliseconds.
    pub date: i64,
    pub tool: Tool,
    pub benches: Vec<Bench>,
}

impl BenchmarkRun {
    pub fn bench(&self, name: &str) -> Option<&Bench> {
        self.benches.iter().find(|b| b.name == name)
    }

    pub fn short_id(&self) -> &str {
        let id = self.commit.id.as_str();
        id.get(..7).unwrap_or(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub author: Person,
    pub committer: Person,
    #[serde(default)]
    pub distinct: bool,
    pub id: String,
    pub message: String,
    pub timestamp: String,
    pub tree_id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// A single named measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bench {
    pub name: String,
    #[serde(serialize_with = "serialize_value")]
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

/// Whole numbers are written without a fractional part, the way the
/// dashboard's `JSON.stringify` leaves them.
fn serialize_value<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if value.is_finite() && value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

/// The tool that produced a run's numbers. Decides which direction is better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tool {
    #[serde(rename = "cargo")]
    Cargo,
    #[serde(rename = "go")]
    Go,
    #[serde(rename = "benchmarkjs")]
    BenchmarkJs,
    #[serde(rename = "benchmarkluau")]
    BenchmarkLuau,
    #[serde(rename = "pytest")]
    Pytest,
    #[serde(rename = "googlecpp")]
    GoogleCpp,
    #[serde(rename = "catch2")]
    Catch2,
    #[serde(rename = "julia")]
    Julia,
    #[serde(rename = "jmh")]
    Jmh,
    #[serde(rename = "benchmarkdotnet")]
    BenchmarkDotNet,
    #[serde(rename = "customBiggerIsBetter")]
    CustomBiggerIsBetter,
    #[default]
    #[serde(rename = "customSmallerIsBetter")]
    CustomSmallerIsBetter,
}

impl Tool {
    pub fn variants() -> &'static [Tool] {
        &[
            Tool::Cargo,
            Tool::Go,
            Tool::BenchmarkJs,
            Tool::BenchmarkLuau,
            Tool::Pytest,
            Tool::GoogleCpp,
            Tool::Catch2,
            Tool::Julia,
            Tool::Jmh,
            Tool::BenchmarkDotNet,
            Tool::CustomBiggerIsBetter,
            Tool::CustomSmallerIsBetter,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Cargo => "cargo",
            Tool::Go => "go",
            Tool::BenchmarkJs => "benchmarkjs",
            Tool::BenchmarkLuau => "benchmarkluau",
            Tool::Pytest => "pytest",
            Tool::GoogleCpp => "googlecpp",
            Tool::Catch2 => "catch2",
            Tool::Julia => "julia",
            Tool::Jmh => "jmh",
            Tool::BenchmarkDotNet => "benchmarkdotnet",
            Tool::CustomBiggerIsBetter => "customBiggerIsBetter",
            Tool::CustomSmallerIsBetter => "customSmallerIsBetter",
        }
    }

    /// Throughput-style tools report ops/sec, everything else reports time.
    pub fn bigger_is_better(&self) -> bool {
        matches!(
            self,
            Tool::BenchmarkJs | Tool::BenchmarkLuau | Tool::Pytest | Tool::CustomBiggerIsBetter
        )
    }
}

impl Display for Tool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tool::variants()
            .iter()
            .find(|tool| tool.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| HistoryError::parse("tool", s))
    }
}
