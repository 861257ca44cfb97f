use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("feed parsing error: {0}")]
    Parse(String),
    #[error("unsupported feed source `{0}`")]
    Unsupported(String),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cache file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read subscription list {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to fetch subscription list: {0}")]
    Network(#[from] reqwest::Error),
    #[error("invalid subscription list: {0}")]
    Invalid(String),
    #[error("remote source is not configured: {0}")]
    NotConfigured(&'static str),
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("an instance is already running (PID: {pid})")]
    AlreadyRunning { pid: u32 },
    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("a reload is already in progress")]
    Busy,
    #[error("invalid feed index {0}")]
    InvalidIndex(usize),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Reload(#[from] ReloadError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Startup failures, split into the fatal class (exit right away) and the
/// recoverable class (report and return without entering the main loop).
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("couldn't determine the configuration directory; please set HOME")]
    NoConfigDir,
    #[error("opening the cache file failed: {0}")]
    CacheOpen(#[source] CacheError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to load subscriptions from {source_name}: {error}")]
    Source {
        source_name: String,
        #[source]
        error: SourceError,
    },
    #[error("{0}")]
    NoUrls(String),
    #[error("failed to set up the feed fetcher: {0}")]
    Fetcher(#[source] FetchError),
    #[error("error while loading feeds from the cache: {0}")]
    Internalize(#[source] CacheError),
}

impl StartupError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StartupError::NoConfigDir | StartupError::CacheOpen(_))
    }
}
