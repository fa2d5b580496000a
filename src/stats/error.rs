use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("statistics I/O failed on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("statistics snapshot is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("all {attempts} attempts to {url} failed: {source}")]
    Upstream {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("statistics driver task failed: {0}")]
    Driver(#[from] tokio::task::JoinError),
}

impl StatsError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StatsError::Io { path: path.into(), source }
    }
}
