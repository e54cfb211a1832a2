use thiserror::Error;

pub type Result<T> = std::result::Result<T, HistoryError>;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("json failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml failure: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("s3 failure: {0}")]
    S3(String),

    #[error("http failure: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed data file: {0}")]
    MalformedDataFile(String),

    #[error("run for commit `{commit}` at {date} already exists in suite `{suite}`")]
    DuplicateRun {
        suite: String,
        commit: String,
        date: i64,
    },

    #[error("run dated {date} is older than the newest run ({latest}) in suite `{suite}`")]
    OutOfOrder { suite: String, date: i64, latest: i64 },

    #[error("invalid run: {0}")]
    InvalidRun(String),

    #[error("unknown suite `{0}`")]
    UnknownSuite(String),

    #[error("no run matching `{commit}` in suite `{suite}`")]
    UnknownRun { suite: String, commit: String },

    #[error("`{0}` is read-only")]
    ReadOnly(String),

    #[error("git failed: {0}")]
    Git(String),

    #[error("no samples recorded for `{0}`")]
    EmptySamples(String),

    #[error("cannot parse {what}: {input:?}")]
    Parse { what: &'static str, input: String },
}

impl HistoryError {
    pub(crate) fn parse(what: &'static str, input: impl Into<String>) -> Self {
        Self::Parse {
            what,
            input: input.into(),
        }
    }

    pub(crate) fn s3(err: impl std::fmt::Display) -> Self {
        Self::S3(err.to_string())
    }
}
