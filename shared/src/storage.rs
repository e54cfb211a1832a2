use crate::error::{HistoryError, Result};
use crate::s3;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

/// Where a data file or result file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    S3 { bucket: String, key: String },
    /// Published copy, read-only.
    Http(String),
}

impl Location {
    pub async fn exists(&self) -> Result<bool> {
        match self {
            Location::Local(path) => Ok(tokio::fs::try_exists(path).await?),
            Location::S3 { bucket, key } => s3::exists(s3::client().await, bucket, key).await,
            Location::Http(url) => {
                let response = reqwest::Client::new().head(url).send().await?;
                Ok(response.status().is_success())
            }
        }
    }

    pub async fn read_string(&self) -> Result<String> {
        debug!("Reading {}", self);
        match self {
            Location::Local(path) => Ok(tokio::fs::read_to_string(path).await?),
            Location::S3 { bucket, key } => s3::get_text(s3::client().await, bucket, key).await,
            Location::Http(url) => {
                let text = reqwest::get(url)
                    .await?
                    .error_for_status()?
                    .text()
                    .await?;
                Ok(text)
            }
        }
    }

    pub async fn read_json<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        match self {
            Location::S3 { bucket, key } => s3::get_from_json(s3::client().await, bucket, key).await,
            _ => {
                let text = self.read_string().await?;
                Ok(serde_json::from_str(&text)?)
            }
        }
    }

    /// Replaces the contents at this location. Local files are swapped in
    /// whole so a reader never sees a partial file.
    pub async fn write_string(&self, contents: &str, content_type: &str) -> Result<()> {
        match self {
            Location::Local(path) => {
                let path = path.clone();
                let contents = contents.to_string();
                tokio::task::spawn_blocking(move || write_local_atomic(&path, &contents))
                    .await
                    .map_err(|e| HistoryError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
            }
            Location::S3 { bucket, key } => {
                s3::put_text(s3::client().await, bucket, key, contents, content_type).await
            }
            Location::Http(url) => Err(HistoryError::ReadOnly(url.clone())),
        }
    }

    /// Result files below this location: `*.json` files under a local
    /// directory, or every object under an S3 prefix.
    pub async fn list(&self) -> Result<Vec<Location>> {
        match self {
            Location::Local(dir) => {
                let mut files: Vec<PathBuf> = WalkDir::new(dir)
                    .into_iter()
                    .filter_map(std::result::Result::ok)
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.into_path())
                    .filter(|p| p.extension().map_or(false, |ext| ext == "json"))
                    .collect();
                files.sort();

                Ok(files.into_iter().map(Location::Local).collect())
            }
            Location::S3 { bucket, key } => {
                let keys = s3::list(s3::client().await, bucket, key).await?;

                Ok(keys
                    .into_iter()
                    .filter(|k| !k.ends_with('/'))
                    .map(|key| Location::S3 {
                        bucket: bucket.clone(),
                        key,
                    })
                    .collect())
            }
            Location::Http(url) => Err(HistoryError::ReadOnly(url.clone())),
        }
    }

    /// Deletes every location in `locations`. S3 objects are removed in
    /// batches per bucket.
    pub async fn delete_many(locations: &[Location]) -> Result<()> {
        let mut by_bucket: BTreeMap<&str, Vec<String>> = BTreeMap::new();

        for location in locations {
            match location {
                Location::Local(path) => tokio::fs::remove_file(path).await?,
                Location::S3 { bucket, key } => {
                    by_bucket.entry(bucket.as_str()).or_default().push(key.clone());
                }
                Location::Http(url) => return Err(HistoryError::ReadOnly(url.clone())),
            }
        }

        for (bucket, keys) in by_bucket {
            // DeleteObjects accepts at most 1000 keys per request.
            for chunk in keys.chunks(1000) {
                s3::delete_many(s3::client().await, bucket, chunk).await?;
            }
        }

        Ok(())
    }
}

fn write_local_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut file = NamedTempFile::new_in(&dir)?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    file.persist(path).map_err(|e| HistoryError::Io(e.error))?;

    Ok(())
}

impl FromStr for Location {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix("s3://") {
            let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
            if bucket.is_empty() {
                return Err(HistoryError::parse("s3 location", s));
            }
            return Ok(Location::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        if s.starts_with("http://") || s.starts_with("https://") {
            return Ok(Location::Http(s.to_string()));
        }

        if s.is_empty() {
            return Err(HistoryError::parse("location", s));
        }

        Ok(Location::Local(PathBuf::from(s)))
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::S3 { bucket, key } => write!(f, "s3://{bucket}/{key}"),
            Location::Http(url) => f.write_str(url),
        }
    }
}
