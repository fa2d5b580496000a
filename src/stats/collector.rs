use crate::config::{CollectorConfig, DEFAULT_WINDOW};
use crate::stats::classifier::classify;
use crate::stats::error::StatsError;
use crate::stats::report::StatisticsReport;
use crate::stats::store::{PersistedSnapshot, SnapshotStore};
use crate::stats::window::{DomainStats, Window};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A finished outbound call, as reported by an instrumented call site.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub target: String,
    pub elapsed: Duration,
    pub retries: u32,
    pub success: bool,
}

/// What `restore` found in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// No prior state.
    Fresh,
    /// State existed but could not be read or parsed.
    Corrupt,
    /// State was older than the stale threshold.
    Stale,
    Restored {
        windows: usize,
        /// Whether the saved current window was still open and got resumed.
        resumed_current: bool,
    },
}

#[derive(Debug)]
struct CollectorState {
    current: Window,
    history: VecDeque<Arc<Window>>,
}

/// Process-wide aggregator of upstream call statistics.
///
/// One instance per process, created at startup and shared by `Arc` with
/// every call site and background driver.
pub struct StatsCollector {
    state: RwLock<CollectorState>,
    config: CollectorConfig,
    span: TimeDelta,
    store: Box<dyn SnapshotStore>,
    // Held from snapshot to write so saves land in the order they were taken.
    persist_lock: Mutex<()>,
}

impl StatsCollector {
    /// A running collector with one fresh window and no history.
    pub fn new(config: CollectorConfig, store: Box<dyn SnapshotStore>) -> Self {
        let now = Utc::now();
        let span = TimeDelta::from_std(config.window_duration)
            .ok()
            .filter(|span| now.checked_add_signed(*span).is_some())
            .or_else(|| TimeDelta::from_std(DEFAULT_WINDOW).ok())
            .unwrap_or(TimeDelta::minutes(10));
        let window_duration = span.to_std().unwrap_or(DEFAULT_WINDOW);
        let max_windows = config.max_windows.max(1);

        Self {
            state: RwLock::new(CollectorState {
                current: Window::open(now, span),
                history: VecDeque::with_capacity(max_windows),
            }),
            config: CollectorConfig {
                window_duration,
                max_windows,
                ..config
            },
            span,
            store,
            persist_lock: Mutex::new(()),
        }
    }

    /// Builds the collector and restores whatever usable state the store holds.
    pub fn initialize(config: CollectorConfig, store: Box<dyn SnapshotStore>) -> Arc<Self> {
        let collector = Self::new(config, store);
        collector.restore();
        Arc::new(collector)
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Window length in effect. Durations too large to represent a window end
    /// fall back to the default.
    pub fn window_duration(&self) -> Duration {
        self.config.window_duration
    }

    pub fn max_windows(&self) -> usize {
        self.config.max_windows
    }

    /// Attributes one finished call to the current window.
    pub fn record(&self, target: &str, elapsed: Duration, retries: u32, success: bool) {
        let domain = classify(target);
        let mut state = self.state.write();
        state.current.record(domain, elapsed, retries, success);
    }

    pub fn record_outcome(&self, outcome: &CallOutcome) {
        self.record(&outcome.target, outcome.elapsed, outcome.retries, outcome.success);
    }

    /// Copy of the current window's per-domain stats.
    pub fn current_window_snapshot(&self) -> BTreeMap<String, DomainStats> {
        self.state.read().current.stats.clone()
    }

    /// Copy of the current window including its time range.
    pub fn current_window_info(&self) -> Window {
        self.state.read().current.clone()
    }

    /// Closed windows, oldest first. The open window is not included.
    pub fn all_windows_snapshot(&self) -> Vec<Arc<Window>> {
        self.state.read().history.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.state.read().history.len()
    }

    /// Closes the current window into history and opens a new one at `now`.
    pub fn rotate(&self) -> Arc<Window> {
        self.rotate_at(Utc::now())
    }

    /// Rotation with an explicit instant. Returns the window that was closed.
    pub fn rotate_at(&self, now: DateTime<Utc>) -> Arc<Window> {
        let mut state = self.state.write();
        let closed = Arc::new(std::mem::replace(&mut state.current, Window::open(now, self.span)));
        state.history.push_back(Arc::clone(&closed));
        while state.history.len() > self.config.max_windows {
            state.history.pop_front();
        }
        debug!(
            history = state.history.len(),
            requests = closed.total_requests(),
            "Rotated statistics window"
        );
        closed
    }

    /// Self-consistent copy of the full state, taken under the read lock.
    pub fn snapshot(&self) -> PersistedSnapshot {
        let state = self.state.read();
        PersistedSnapshot {
            history: state.history.iter().cloned().collect(),
            current_window: state.current.clone(),
            saved_at: Utc::now(),
        }
    }

    /// Writes the current state to the store. The state lock is released
    /// before any I/O; concurrent saves are serialized, newest last.
    pub fn persist(&self) -> Result<(), StatsError> {
        let _guard = self.persist_lock.lock();
        let snapshot = self.snapshot();
        self.store.save(&snapshot)
    }

    pub fn restore(&self) -> RestoreOutcome {
        self.restore_at(Utc::now())
    }

    /// Loads the stored snapshot as of `now`. Never leaves the collector
    /// without a current window.
    pub fn restore_at(&self, now: DateTime<Utc>) -> RestoreOutcome {
        let snapshot = match self.store.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!("No saved statistics found, starting fresh");
                return RestoreOutcome::Fresh;
            }
            Err(e) => {
                warn!("Could not load saved statistics, starting fresh: {}", e);
                return RestoreOutcome::Corrupt;
            }
        };

        let stale_after = TimeDelta::from_std(self.config.stale_threshold).unwrap_or(TimeDelta::MAX);
        if now.signed_duration_since(snapshot.saved_at) > stale_after {
            info!(saved_at = %snapshot.saved_at, "Saved statistics are stale, starting fresh");
            return RestoreOutcome::Stale;
        }

        let PersistedSnapshot { history, current_window, .. } = snapshot;
        let mut history: VecDeque<Arc<Window>> = history.into();
        while history.len() > self.config.max_windows {
            history.pop_front();
        }
        let windows = history.len();

        let mut state = self.state.write();
        state.history = history;

        // A window whose range elapsed while we were down is dropped, not resumed.
        let resumed_current = !current_window.has_elapsed(now);
        if resumed_current {
            state.current = current_window;
        } else {
            state.current = Window::open(now, self.span);
        }

        info!(windows, resumed_current, "Restored saved statistics");
        RestoreOutcome::Restored { windows, resumed_current }
    }

    /// Current and historical state for reporting, read under one lock.
    pub fn report(&self) -> StatisticsReport {
        let state = self.state.read();
        StatisticsReport {
            current_window: state.current.clone(),
            historical_windows: state.history.iter().cloned().collect(),
            server_time: Utc::now(),
            window_duration_minutes: self.config.window_duration.as_secs() / 60,
            max_stored_windows: self.config.max_windows,
        }
    }
}

impl std::fmt::Debug for StatsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsCollector")
            .field("config", &self.config)
            .field("history", &self.history_len())
            .finish_non_exhaustive()
    }
}
