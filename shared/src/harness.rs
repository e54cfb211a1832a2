use crate::error::{HistoryError, Result};
use crate::format::BenchmarkResult;
use regex::Regex;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    Quick,
    Full,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Quick => "quick",
            Profile::Full => "full",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HarnessConfig {
    pub warmup_runs: u32,
    pub min_runs: u32,
    pub max_runs: u32,
    /// Keep sampling until this much time has been measured.
    pub min_total: Duration,
}

impl HarnessConfig {
    pub fn for_profile(profile: Profile) -> Self {
        match profile {
            Profile::Quick => Self {
                warmup_runs: 1,
                min_runs: 5,
                max_runs: 50,
                min_total: Duration::from_millis(500),
            },
            Profile::Full => Self {
                warmup_runs: 2,
                min_runs: 9,
                max_runs: 200,
                min_total: Duration::from_secs(5),
            },
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::for_profile(Profile::Quick)
    }
}

/// Times the interesting part of a single run.
#[derive(Debug, Default)]
pub struct Bencher {
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

impl Bencher {
    /// Starts (or restarts) the clock. Work done before this is not measured.
    pub fn reset(&mut self) {
        self.started = Some(Instant::now());
        self.elapsed = None;
    }

    pub fn stop(&mut self) {
        if let Some(started) = self.started {
            self.elapsed = Some(started.elapsed());
        }
    }
}

pub trait Benchmark {
    fn name(&self) -> String;

    fn group(&self) -> &str;

    /// Bytes touched by one run, for throughput reporting.
    fn byte_size(&self) -> Option<u64> {
        None
    }

    fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    fn run(&mut self, bencher: &mut Bencher) -> Result<()>;

    fn teardown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Runs `benchmark` once, returning the measured time. A run that never calls
/// [`Bencher::reset`] is timed as a whole; one that resets without stopping is
/// timed up to its return.
fn run_once(benchmark: &mut dyn Benchmark) -> Result<Duration> {
    let mut bencher = Bencher::default();
    let whole = Instant::now();

    benchmark.run(&mut bencher)?;

    let elapsed = match (bencher.elapsed, bencher.started) {
        (Some(elapsed), _) => elapsed,
        (None, Some(started)) => started.elapsed(),
        (None, None) => whole.elapsed(),
    };

    Ok(elapsed)
}

pub fn run_benchmark(config: &HarnessConfig, benchmark: &mut dyn Benchmark) -> Result<BenchmarkResult> {
    let name = benchmark.name();
    benchmark.setup()?;

    let outcome = sample(config, benchmark);
    let teardown = benchmark.teardown();
    let mut run_times_ms = outcome?;
    teardown?;

    if run_times_ms.is_empty() {
        return Err(HistoryError::EmptySamples(name));
    }
    run_times_ms.sort_by(f64::total_cmp);
    debug!("{} sampled {} run(s)", name, run_times_ms.len());

    Ok(BenchmarkResult {
        name,
        group: benchmark.group().to_string(),
        sorted_run_times_ms: run_times_ms,
        byte_size: benchmark.byte_size(),
    })
}

fn sample(config: &HarnessConfig, benchmark: &mut dyn Benchmark) -> Result<Vec<f64>> {
    for _ in 0..config.warmup_runs {
        run_once(benchmark)?;
    }

    let mut run_times_ms = Vec::new();
    let mut total = Duration::ZERO;
    let max_runs = config.max_runs.max(1);

    while (run_times_ms.len() as u32) < max_runs {
        let elapsed = run_once(benchmark)?;
        total += elapsed;
        run_times_ms.push(elapsed.as_secs_f64() * 1000.0);

        if run_times_ms.len() as u32 >= config.min_runs && total >= config.min_total {
            break;
        }
    }

    Ok(run_times_ms)
}

/// Which benchmarks of a registry to run.
#[derive(Debug, Default, Clone)]
pub struct Selection {
    pub groups: Vec<String>,
    pub name: Option<Regex>,
}

impl Selection {
    pub fn matches(&self, benchmark: &dyn Benchmark) -> bool {
        let group_ok = self.groups.is_empty() || self.groups.iter().any(|g| g == benchmark.group());
        let name_ok = self
            .name
            .as_ref()
            .map_or(true, |re| re.is_match(&benchmark.name()));

        group_ok && name_ok
    }
}

/// `group / name` lines for every benchmark, sorted.
pub fn list(benchmarks: &[Box<dyn Benchmark>]) -> Vec<String> {
    let mut lines: Vec<(String, String)> = benchmarks
        .iter()
        .map(|b| (b.group().to_string(), b.name()))
        .collect();
    lines.sort();

    lines
        .into_iter()
        .map(|(group, name)| format!("{group} / {name}"))
        .collect()
}

pub fn run_all(
    config: &HarnessConfig,
    benchmarks: &mut [Box<dyn Benchmark>],
    selection: &Selection,
) -> Result<Vec<BenchmarkResult>> {
    let mut results = Vec::new();

    for benchmark in benchmarks.iter_mut() {
        if !selection.matches(benchmark.as_ref()) {
            continue;
        }
        results.push(run_benchmark(config, benchmark.as_mut())?);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    struct Counting {
        name: &'static str,
        group: &'static str,
        runs: u32,
        setups: u32,
        teardowns: u32,
        measured: bool,
    }

    impl Counting {
        fn new(name: &'static str, group: &'static str) -> Self {
            Self {
                name,
                group,
                runs: 0,
                setups: 0,
                teardowns: 0,
                measured: true,
            }
        }
    }

    impl Benchmark for Counting {
        fn name(&self) -> String {
            self.name.to_string()
        }

        fn group(&self) -> &str {
            self.group
        }

        fn setup(&mut self) -> Result<()> {
            self.setups += 1;
            Ok(())
        }

        fn run(&mut self, bencher: &mut Bencher) -> Result<()> {
            self.runs += 1;
            sleep(Duration::from_millis(2));
            if self.measured {
                bencher.reset();
                bencher.stop();
            }
            Ok(())
        }

        fn teardown(&mut self) -> Result<()> {
            self.teardowns += 1;
            Ok(())
        }
    }

    fn config(min_runs: u32, max_runs: u32, min_total: Duration) -> HarnessConfig {
        HarnessConfig {
            warmup_runs: 1,
            min_runs,
            max_runs,
            min_total,
        }
    }

    #[test]
    fn stops_after_min_runs_when_time_is_met() {
        let mut bench = Counting::new("scan", "replicache");
        let result = run_benchmark(&config(3, 10, Duration::ZERO), &mut bench).unwrap();

        assert_eq!(result.sorted_run_times_ms.len(), 3);
        assert_eq!(bench.runs, 4); // one warmup
        assert_eq!((bench.setups, bench.teardowns), (1, 1));
        assert_eq!(result.group, "replicache");
    }

    #[test]
    fn max_runs_bounds_sampling() {
        let mut bench = Counting::new("scan", "replicache");
        let result =
            run_benchmark(&config(1, 4, Duration::from_secs(3600)), &mut bench).unwrap();

        assert_eq!(result.sorted_run_times_ms.len(), 4);
    }

    #[test]
    fn reset_excludes_setup_work() {
        let mut measured = Counting::new("measured", "g");
        let mut whole = Counting::new("whole", "g");
        whole.measured = false;

        let cfg = config(3, 3, Duration::ZERO);
        let measured = run_benchmark(&cfg, &mut measured).unwrap();
        let whole = run_benchmark(&cfg, &mut whole).unwrap();

        assert!(measured.sorted_run_times_ms[2] < 2.0);
        assert!(whole.sorted_run_times_ms[0] >= 2.0);
    }

    #[test]
    fn selection_filters_by_group_and_name() {
        let mut benchmarks: Vec<Box<dyn Benchmark>> = vec![
            Box::new(Counting::new("populate 1024x1000", "replicache")),
            Box::new(Counting::new("scan 1024x1000", "replicache")),
            Box::new(Counting::new("idb read", "storage")),
        ];

        assert_eq!(
            list(&benchmarks),
            vec![
                "replicache / populate 1024x1000",
                "replicache / scan 1024x1000",
                "storage / idb read",
            ]
        );

        let selection = Selection {
            groups: vec!["replicache".to_string()],
            name: Some(Regex::new("^scan").unwrap()),
        };
        let results = run_all(&config(1, 1, Duration::ZERO), &mut benchmarks, &selection).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "scan 1024x1000");
    }
}
