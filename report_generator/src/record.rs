use anyhow::{Context, Result};
use futures::future::try_join_all;
use shared::compare::{self, Comparison};
use shared::{datajs, Bench, BenchmarkRun, CommitInfo, Location, Tool};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where the commit a run is recorded for comes from.
#[derive(Debug, Clone)]
pub enum CommitSource {
    /// GitHub event payload file (`$GITHUB_EVENT_PATH`).
    GithubEvent(PathBuf),
    Git { repo_dir: PathBuf, rev: String },
}

impl CommitSource {
    pub async fn resolve(&self, repo_url: &str) -> Result<CommitInfo> {
        match self {
            CommitSource::GithubEvent(path) => {
                let event = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("read {path:?}"))?;
                let event: serde_json::Value =
                    serde_json::from_str(&event).with_context(|| format!("parse {path:?}"))?;
                Ok(CommitInfo::from_github_event(&event)?)
            }
            CommitSource::Git { repo_dir, rev } => Ok(CommitInfo::from_git(repo_dir, rev, repo_url)?),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recording {
    pub data: Location,
    pub suite: String,
    pub tool: Tool,
    pub repo_url: String,
    pub max_items: Option<usize>,
    pub alert_threshold: f64,
    pub fail_threshold: Option<f64>,
    pub dry_run: bool,
}

#[derive(Debug)]
pub struct Outcome {
    pub comparisons: Vec<Comparison>,
    pub alert: Option<String>,
    pub failed: bool,
}

/// Appends a run of `benches` to the data file, comparing it with the runs
/// already recorded for the suite first.
pub async fn record(
    recording: &Recording,
    commit: CommitInfo,
    benches: Vec<Bench>,
    now: i64,
) -> Result<Outcome> {
    let mut data = datajs::read_or_new(&recording.data, &recording.repo_url)
        .await
        .with_context(|| format!("load {}", recording.data))?;
    if data.repo_url.is_empty() {
        data.repo_url = recording.repo_url.clone();
    }

    let run = BenchmarkRun {
        commit,
        date: now,
        tool: recording.tool,
        benches,
    };

    let recorded = data.runs(&recording.suite).map(|r| r.len()).unwrap_or(0);
    let comparisons = compare::compare_with_history(
        &data,
        &recording.suite,
        &run,
        recorded,
        recording.alert_threshold,
    );
    for c in compare::alerts(&comparisons) {
        warn!(
            "{} regressed: {} -> {} {}",
            c.name,
            c.previous.unwrap_or_default(),
            c.current,
            c.unit
        );
    }

    let alert = (!compare::alerts(&comparisons).is_empty()).then(|| {
        compare::render_alert(&recording.suite, &run, &comparisons, recording.alert_threshold)
    });
    let failed = recording
        .fail_threshold
        .map_or(false, |fail| compare::exceeds(&comparisons, fail));

    data.append(&recording.suite, run, recording.max_items, now)
        .context("append run")?;

    if recording.dry_run {
        info!("Dry run, not writing {}", recording.data);
    } else {
        datajs::write(&recording.data, &data)
            .await
            .with_context(|| format!("write {}", recording.data))?;
        info!("Wrote {}", recording.data);
    }

    Ok(Outcome {
        comparisons,
        alert,
        failed,
    })
}

/// Reads a JSON array of benches.
pub async fn read_benches(location: &Location) -> Result<Vec<Bench>> {
    location
        .read_json::<Vec<Bench>>()
        .await
        .with_context(|| format!("read benches from {location}"))
}

/// Fetches every result file under `results` and merges them into one list.
pub async fn collect(results: &Location) -> Result<(Vec<Location>, Vec<Bench>)> {
    let files = results
        .list()
        .await
        .with_context(|| format!("list {results}"))?;
    info!("Result files found: {}", files.len());

    let fetched = try_join_all(files.iter().map(read_benches)).await?;
    info!("Result files fetched: {}", fetched.len());

    Ok((files, merge(fetched)))
}

/// Concatenates bench lists. A name seen again replaces the earlier bench but
/// keeps its position.
pub fn merge(lists: Vec<Vec<Bench>>) -> Vec<Bench> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Bench> = Vec::new();

    for bench in lists.into_iter().flatten() {
        match positions.get(&bench.name).copied() {
            Some(index) => {
                warn!("{:?} reported more than once, keeping the last", bench.name);
                merged[index] = bench;
            }
            None => {
                positions.insert(bench.name.clone(), merged.len());
                merged.push(bench);
            }
        }
    }

    merged
}

pub fn default_event_path() -> Option<PathBuf> {
    std::env::var_os("GITHUB_EVENT_PATH")
        .map(PathBuf::from)
        .filter(|p| Path::new(p).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Person, DEFAULT_SUITE};
    use std::fs;

    fn bench(name: &str, value: f64) -> Bench {
        Bench {
            name: name.to_string(),
            value,
            range: None,
            unit: "median ms".to_string(),
            extra: None,
        }
    }

    fn commit(id: &str) -> CommitInfo {
        let person = Person {
            email: "dev@example.com".to_string(),
            name: "Dev".to_string(),
            username: None,
        };
        CommitInfo {
            author: person.clone(),
            committer: person,
            distinct: true,
            id: id.to_string(),
            message: "msg".to_string(),
            timestamp: "2022-04-18T21:54:00Z".to_string(),
            tree_id: "tree".to_string(),
            url: format!("https://github.com/owner/repo/commit/{id}"),
        }
    }

    fn recording(data: Location) -> Recording {
        Recording {
            data,
            suite: DEFAULT_SUITE.to_string(),
            tool: Tool::CustomSmallerIsBetter,
            repo_url: "https://github.com/owner/repo".to_string(),
            max_items: None,
            alert_threshold: 2.0,
            fail_threshold: Some(3.0),
            dry_run: false,
        }
    }

    #[test]
    fn merge_keeps_first_position_and_last_value() {
        let merged = merge(vec![
            vec![bench("populate", 1.0), bench("scan", 2.0)],
            vec![bench("populate", 3.0), bench("persist", 4.0)],
        ]);

        let pairs: Vec<(&str, f64)> = merged.iter().map(|b| (b.name.as_str(), b.value)).collect();
        assert_eq!(pairs, vec![("populate", 3.0), ("scan", 2.0), ("persist", 4.0)]);
    }

    #[tokio::test]
    async fn record_appends_and_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let data = Location::Local(dir.path().join("data.js"));
        let recording = recording(data.clone());

        let first = record(&recording, commit("aaa1111"), vec![bench("populate", 10.0)], 1_000)
            .await
            .unwrap();
        assert!(first.alert.is_none());
        assert!(!first.failed);

        let second = record(&recording, commit("bbb2222"), vec![bench("populate", 25.0)], 2_000)
            .await
            .unwrap();
        let alert = second.alert.unwrap();
        assert!(alert.contains("`populate`"));
        assert!(!second.failed);

        let third = record(&recording, commit("ccc3333"), vec![bench("populate", 100.0)], 3_000)
            .await
            .unwrap();
        assert!(third.failed);

        let stored = datajs::read(&data).await.unwrap();
        assert_eq!(stored.runs(DEFAULT_SUITE).unwrap().len(), 3);
        assert_eq!(stored.last_update, 3_000);
    }

    #[tokio::test]
    async fn dry_run_leaves_data_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let data = Location::Local(dir.path().join("data.js"));
        let mut recording = recording(data.clone());
        recording.dry_run = true;

        record(&recording, commit("aaa1111"), vec![bench("populate", 10.0)], 1_000)
            .await
            .unwrap();

        assert!(!data.exists().await.unwrap());
    }

    #[tokio::test]
    async fn collect_reads_every_result_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("chromium.json"),
            serde_json::to_string(&vec![bench("scan [Chromium]", 1.0)]).unwrap(),
        )
        .unwrap();
        fs::write(
            dir.path().join("firefox.json"),
            serde_json::to_string(&vec![bench("scan [Firefox]", 2.0)]).unwrap(),
        )
        .unwrap();

        let (files, benches) = collect(&Location::Local(dir.path().to_path_buf()))
            .await
            .unwrap();

        assert_eq!(files.len(), 2);
        let names: Vec<&str> = benches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["scan [Chromium]", "scan [Firefox]"]);
    }

    #[tokio::test]
    async fn github_event_supplies_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.json");
        fs::write(
            &path,
            serde_json::json!({ "head_commit": commit("ddd4444") }).to_string(),
        )
        .unwrap();

        let resolved = CommitSource::GithubEvent(path).resolve("ignored").await.unwrap();
        assert_eq!(resolved.id, "ddd4444");
    }
}
