mod format;
mod record;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shared::config::{self, Parameters};
use shared::{compare, datajs, Location, Tool};
use std::path::PathBuf;
use tracing::{error, info};

use self::record::{CommitSource, Outcome, Recording};

/// Where `data.js` lives when neither the flag nor `perf.yml` names it.
const DEFAULT_DATA: &str = "dev/bench/data.js";

#[derive(Parser, Debug)]
#[command(name = "report_generator")]
#[command(about = "Maintains the benchmark dashboard history file")]
struct Args {
    /// Settings file. Defaults to `perf.yml` when present.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Data file location (path, s3://bucket/key or https://...).
    #[arg(long, global = true, value_name = "LOCATION")]
    data: Option<String>,

    #[arg(long, global = true)]
    suite: Option<String>,

    /// Log as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct RunOptions {
    #[arg(long)]
    tool: Option<Tool>,

    /// GitHub event payload to take the commit from. Defaults to
    /// `$GITHUB_EVENT_PATH` when set.
    #[arg(long, value_name = "PATH")]
    github_event: Option<PathBuf>,

    /// Revision to read from git when there is no event payload.
    #[arg(long, default_value = "HEAD")]
    commit_rev: String,

    #[arg(long, default_value = ".")]
    repo_dir: PathBuf,

    #[arg(long)]
    repo_url: Option<String>,

    /// Runs kept per suite. Unlimited when neither this nor `perf.yml` sets it.
    #[arg(long)]
    max_items: Option<usize>,

    /// Worse-is-bigger ratio above which a bench is reported, e.g. 2.0.
    #[arg(long)]
    alert_threshold: Option<f64>,

    /// Ratio above which the command exits with an error.
    #[arg(long)]
    fail_threshold: Option<f64>,

    /// Compare and report without writing the data file.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Records one run from a JSON file of benches.
    Append {
        /// File with an array of `{name, value, unit, range, extra}`.
        #[arg(long, value_name = "LOCATION")]
        entries: String,

        #[command(flatten)]
        run: RunOptions,
    },
    /// Records one run from every result file under a directory or prefix,
    /// then deletes those files.
    Collect {
        #[arg(long, value_name = "LOCATION")]
        results: String,

        /// Leave the result files in place.
        #[arg(long, default_value_t = false)]
        keep: bool,

        #[command(flatten)]
        run: RunOptions,
    },
    /// Prints recent runs as a table, or one bench over time.
    Show {
        #[arg(long)]
        bench: Option<String>,

        #[arg(long, default_value_t = 10)]
        last: usize,
    },
    /// Compares two recorded runs by commit id prefix.
    Compare {
        #[arg(long)]
        base: String,

        /// Defaults to the latest run.
        #[arg(long)]
        head: Option<String>,

        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Drops the oldest runs of the suite.
    Trim {
        #[arg(long)]
        max_items: usize,
    },
    /// Checks the data file and exits with an error on any violation.
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    shared::log::init(args.log_json);

    let parameters = config::load_or_default(args.config.as_deref()).context("load config")?;
    let data: Location = args
        .data
        .as_deref()
        .or(parameters.data.as_deref())
        .unwrap_or(DEFAULT_DATA)
        .parse()
        .context("--data")?;
    let suite = args
        .suite
        .clone()
        .unwrap_or_else(|| parameters.suite().to_string());

    match args.command {
        Command::Append { entries, run } => {
            let location: Location = entries.parse().context("--entries")?;
            let benches = record::read_benches(&location).await?;
            let recording = recording(&parameters, data, suite, &run);
            let outcome = record_run(&recording, &run, benches).await?;
            report(outcome)
        }
        Command::Collect { results, keep, run } => {
            let results: Location = results.parse().context("--results")?;
            let (files, benches) = record::collect(&results).await?;
            if benches.is_empty() {
                bail!("no benches found under {results}");
            }

            let recording = recording(&parameters, data, suite, &run);
            let outcome = record_run(&recording, &run, benches).await?;

            if keep || recording.dry_run {
                info!("Keeping {} result file(s)", files.len());
            } else {
                Location::delete_many(&files)
                    .await
                    .context("delete result files")?;
                info!("Deleted {} result file(s)", files.len());
            }
            report(outcome)
        }
        Command::Show { bench, last } => {
            let history = datajs::read(&data).await?;
            let runs = history.runs(&suite)?;
            let table = match bench {
                Some(bench) => {
                    let points = history.series(&suite, &bench)?;
                    let start = points.len().saturating_sub(last);
                    format::format_series(&bench, &points[start..])?
                }
                None => {
                    let start = runs.len().saturating_sub(last);
                    let names = history.bench_names(&suite)?;
                    format::format_history(&suite, &runs[start..], &names)?
                }
            };
            print!("{table}");
            Ok(())
        }
        Command::Compare {
            base,
            head,
            threshold,
        } => {
            let history = datajs::read(&data).await?;
            let (_, base) = history.find_run(&suite, &base)?;
            let head = match head {
                Some(head) => history.find_run(&suite, &head)?.1,
                None => history
                    .latest(&suite)?
                    .context("suite has no runs")?,
            };

            let threshold = threshold.unwrap_or_else(|| parameters.alert_threshold());
            let comparisons = compare::compare_runs(base, head, threshold);
            print!("{}", format::format_comparison(base, head, &comparisons)?);
            Ok(())
        }
        Command::Trim { max_items } => {
            let mut history = datajs::read(&data).await?;
            let dropped = history.trim(&suite, max_items)?;
            if dropped == 0 {
                info!("Nothing to trim in {}", suite);
                return Ok(());
            }

            datajs::write(&data, &history).await?;
            info!("Dropped {} run(s) from {}", dropped, suite);
            Ok(())
        }
        Command::Validate => {
            let history = datajs::read(&data).await?;
            let violations = history.validate();
            for violation in &violations {
                error!("{}", violation);
            }
            if !violations.is_empty() {
                bail!("{} violation(s) in {}", violations.len(), data);
            }

            info!("{} is valid", data);
            Ok(())
        }
    }
}

fn recording(parameters: &Parameters, data: Location, suite: String, run: &RunOptions) -> Recording {
    Recording {
        data,
        suite,
        tool: run.tool.unwrap_or_else(|| parameters.tool()),
        repo_url: run.repo_url.clone().unwrap_or_else(|| parameters.repo_url()),
        max_items: run.max_items.or(parameters.max_items),
        alert_threshold: run
            .alert_threshold
            .unwrap_or_else(|| parameters.alert_threshold()),
        fail_threshold: run.fail_threshold.or(parameters.fail_threshold),
        dry_run: run.dry_run,
    }
}

fn commit_source(run: &RunOptions) -> CommitSource {
    match run.github_event.clone().or_else(record::default_event_path) {
        Some(path) => CommitSource::GithubEvent(path),
        None => CommitSource::Git {
            repo_dir: run.repo_dir.clone(),
            rev: run.commit_rev.clone(),
        },
    }
}

async fn record_run(
    recording: &Recording,
    run: &RunOptions,
    benches: Vec<shared::Bench>,
) -> Result<Outcome> {
    let commit = commit_source(run)
        .resolve(&recording.repo_url)
        .await
        .context("resolve commit")?;
    let now = chrono::Utc::now().timestamp_millis();

    record::record(recording, commit, benches, now).await
}

fn report(outcome: Outcome) -> Result<()> {
    info!("Benches compared: {}", outcome.comparisons.len());

    if let Some(alert) = &outcome.alert {
        println!("{alert}");
    }
    if outcome.failed {
        bail!("performance regression above the fail threshold");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_global_options_after_subcommand() {
        let args = Args::try_parse_from([
            "report_generator",
            "append",
            "--entries",
            "out.json",
            "--tool",
            "benchmarkjs",
            "--data",
            "s3://bucket/dev/bench/data.js",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(args.data.as_deref(), Some("s3://bucket/dev/bench/data.js"));
        match args.command {
            Command::Append { entries, run } => {
                assert_eq!(entries, "out.json");
                assert_eq!(run.tool, Some(Tool::BenchmarkJs));
                assert!(run.dry_run);
                assert_eq!(run.commit_rev, "HEAD");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn flags_override_config() {
        let parameters = Parameters {
            tool: Some(Tool::Pytest),
            max_items: Some(20),
            alert_threshold: Some(1.5),
            fail_threshold: Some(3.0),
            ..Parameters::default()
        };
        let args = Args::try_parse_from([
            "report_generator",
            "collect",
            "--results",
            "results/",
            "--alert-threshold",
            "1.2",
            "--repo-url",
            "https://github.com/owner/repo",
        ])
        .unwrap();
        let Command::Collect { run, .. } = args.command else {
            panic!("expected collect");
        };

        let recording = recording(
            &parameters,
            Location::Local(PathBuf::from("data.js")),
            "Benchmark".to_string(),
            &run,
        );

        assert_eq!(recording.tool, Tool::Pytest);
        assert_eq!(recording.max_items, Some(20));
        assert_eq!(recording.alert_threshold, 1.2);
        assert_eq!(recording.fail_threshold, Some(3.0));
        assert_eq!(recording.repo_url, "https://github.com/owner/repo");
    }

    #[test]
    fn history_is_unbounded_without_max_items() {
        let args = Args::try_parse_from([
            "report_generator",
            "append",
            "--entries",
            "e.json",
        ])
        .unwrap();
        let Command::Append { run, .. } = args.command else {
            panic!("expected append");
        };

        let recording = recording(
            &Parameters::default(),
            Location::Local(PathBuf::from("data.js")),
            "Benchmark".to_string(),
            &run,
        );

        assert_eq!(recording.max_items, None);
    }

    #[test]
    fn explicit_event_wins_over_git() {
        let args = Args::try_parse_from([
            "report_generator",
            "append",
            "--entries",
            "out.json",
            "--github-event",
            "event.json",
        ])
        .unwrap();
        let Command::Append { run, .. } = args.command else {
            panic!("expected append");
        };

        assert!(matches!(
            commit_source(&run),
            CommitSource::GithubEvent(path) if path == PathBuf::from("event.json")
        ));
    }
}
