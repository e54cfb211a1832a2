//! Shared pieces for maintaining a benchmark dashboard's `data.js` history.

pub mod commit;
pub mod compare;
pub mod config;
pub mod datajs;
pub mod error;
pub mod format;
pub mod harness;
pub mod history;
pub mod log;
pub mod model;
pub mod s3;
pub mod stats;
pub mod storage;

pub use error::{HistoryError, Result};
pub use model::{Bench, BenchmarkData, BenchmarkRun, CommitInfo, Person, Tool, DEFAULT_SUITE};
pub use storage::Location;
