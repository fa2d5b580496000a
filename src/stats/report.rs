use crate::stats::window::Window;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Read-only view handed to dashboards and other reporting consumers.
#[derive(Debug, Clone, Serialize)]
pub struct StatisticsReport {
    pub current_window: Window,
    pub historical_windows: Vec<Arc<Window>>,
    pub server_time: DateTime<Utc>,
    pub window_duration_minutes: u64,
    pub max_stored_windows: usize,
}

impl StatisticsReport {
    /// Requests across the current window and every stored window.
    pub fn total_requests(&self) -> u64 {
        self.current_window.total_requests()
            + self
                .historical_windows
                .iter()
                .map(|w| w.total_requests())
                .sum::<u64>()
    }
}
