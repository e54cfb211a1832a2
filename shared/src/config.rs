use crate::compare::DEFAULT_ALERT_THRESHOLD;
use crate::error::Result;
use crate::model::{Tool, DEFAULT_SUITE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "perf.yml";

/// Settings read from `perf.yml`. Every field is optional; command line flags
/// take precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Parameters {
    pub suite: Option<String>,
    pub tool: Option<Tool>,
    pub repo_url: Option<String>,
    /// Data file location (`path`, `s3://bucket/key` or `https://...`).
    pub data: Option<String>,
    pub max_items: Option<usize>,
    pub alert_threshold: Option<f64>,
    pub fail_threshold: Option<f64>,
}

impl Parameters {
    pub fn suite(&self) -> &str {
        self.suite.as_deref().unwrap_or(DEFAULT_SUITE)
    }

    pub fn tool(&self) -> Tool {
        self.tool.unwrap_or_default()
    }

    pub fn alert_threshold(&self) -> f64 {
        self.alert_threshold.unwrap_or(DEFAULT_ALERT_THRESHOLD)
    }

    /// Configured repository URL, else the one GitHub Actions exposes.
    pub fn repo_url(&self) -> String {
        self.repo_url
            .clone()
            .or_else(repo_url_from_env)
            .unwrap_or_default()
    }
}

pub fn load_parameters(path: &Path) -> Result<Parameters> {
    let parameters = fs::read_to_string(path)?;
    let parameters: Parameters = serde_yaml::from_str(&parameters)?;
    debug!("Loaded parameters from {}", path.display());

    Ok(parameters)
}

/// Loads `path` when given, else `perf.yml` from the working directory when it
/// exists, else defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Parameters> {
    match path {
        Some(path) => load_parameters(path),
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            load_parameters(Path::new(DEFAULT_CONFIG_FILE))
        }
        None => Ok(Parameters::default()),
    }
}

pub fn repo_url_from_env() -> Option<String> {
    let server = std::env::var("GITHUB_SERVER_URL").ok()?;
    let repository = std::env::var("GITHUB_REPOSITORY").ok()?;

    Some(format!("{}/{}", server.trim_end_matches('/'), repository))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_yaml_parameters() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "suite: Replicache\ntool: customSmallerIsBetter\nrepo_url: https://github.com/rocicorp/replicache\ndata: s3://perf/data.js\nmax_items: 500\nalert_threshold: 1.5\n"
        )
        .unwrap();

        let parameters = load_parameters(file.path()).unwrap();

        assert_eq!(parameters.suite(), "Replicache");
        assert_eq!(parameters.tool(), Tool::CustomSmallerIsBetter);
        assert_eq!(parameters.data.as_deref(), Some("s3://perf/data.js"));
        assert_eq!(parameters.max_items, Some(500));
        assert_eq!(parameters.alert_threshold(), 1.5);
        assert_eq!(parameters.fail_threshold, None);
        assert_eq!(parameters.repo_url(), "https://github.com/rocicorp/replicache");
    }

    #[test]
    fn defaults_when_fields_are_missing() {
        let parameters: Parameters = serde_yaml::from_str("{}").unwrap();

        assert_eq!(parameters.suite(), "Benchmark");
        assert_eq!(parameters.tool(), Tool::CustomSmallerIsBetter);
        assert_eq!(parameters.alert_threshold(), 2.0);
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(serde_yaml::from_str::<Parameters>("alert-threshold: 3\n").is_err());
    }
}
