use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_MAX_WINDOWS: usize = 100;
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_PERSIST_FILE: &str = "statistics_data.json";

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_FETCH_ATTEMPTS: u32 = 5;
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Tunables for the statistics collector and its background drivers.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Length of one window. Also the rotation period.
    pub window_duration: Duration,
    /// History ring bound. Oldest windows are evicted first.
    pub max_windows: usize,
    pub save_interval: Duration,
    /// Snapshots saved longer ago than this are ignored on restore.
    pub stale_threshold: Duration,
    pub persist_path: PathBuf,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            window_duration: DEFAULT_WINDOW,
            max_windows: DEFAULT_MAX_WINDOWS,
            save_interval: DEFAULT_SAVE_INTERVAL,
            stale_threshold: DEFAULT_STALE_THRESHOLD,
            persist_path: PathBuf::from(DEFAULT_PERSIST_FILE),
        }
    }
}

impl CollectorConfig {
    pub fn with_window_duration(mut self, window: Duration) -> Self {
        self.window_duration = window;
        self
    }

    /// A bound of zero would make every rotation discard the closed window,
    /// so it is raised to one.
    pub fn with_max_windows(mut self, max_windows: usize) -> Self {
        self.max_windows = max_windows.max(1);
        self
    }

    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self
    }

    pub fn with_stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = threshold;
        self
    }

    pub fn with_persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = path.into();
        self
    }
}

/// Timeout and retry settings for instrumented upstream calls.
#[derive(Debug, Clone, Copy)]
pub struct FetchConfig {
    pub timeout: Duration,
    /// Total attempts per logical call, including the first one.
    pub retries: u32,
    /// Attempt `n` waits `n * backoff` before the next try.
    pub backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            retries: DEFAULT_FETCH_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl FetchConfig {
    pub fn new(timeout: Duration, retries: u32) -> Self {
        let timeout = if timeout.is_zero() { DEFAULT_FETCH_TIMEOUT } else { timeout };
        Self {
            timeout,
            retries: retries.max(1),
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}
