use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Running counters for one canonical domain inside one window.
///
/// Invariant: `total_requests == successful_requests + failed_requests`
/// after every update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "DomainStatsRecord", into = "DomainStatsRecord")]
pub struct DomainStats {
    pub domain: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_retries: u64,
    /// Derived: accumulated response time / total requests, in milliseconds.
    pub average_response_ms: f64,
    total_response_time: Duration,
}

impl DomainStats {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            total_retries: 0,
            average_response_ms: 0.0,
            total_response_time: Duration::ZERO,
        }
    }

    pub(crate) fn apply(&mut self, elapsed: Duration, retries: u32, success: bool) {
        self.total_requests = self.total_requests.saturating_add(1);
        if success {
            self.successful_requests = self.successful_requests.saturating_add(1);
        } else {
            self.failed_requests = self.failed_requests.saturating_add(1);
        }
        self.total_retries = self.total_retries.saturating_add(u64::from(retries));
        self.total_response_time = self.total_response_time.saturating_add(elapsed);
        self.average_response_ms =
            self.total_response_time.as_nanos() as f64 / self.total_requests as f64 / 1e6;
    }

    /// Fraction of calls that succeeded, `0.0` when nothing was recorded.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }
}

// The accumulated response time is internal; equality covers what callers can see.
impl PartialEq for DomainStats {
    fn eq(&self, other: &Self) -> bool {
        self.domain == other.domain
            && self.total_requests == other.total_requests
            && self.successful_requests == other.successful_requests
            && self.failed_requests == other.failed_requests
            && self.total_retries == other.total_retries
            && self.average_response_ms == other.average_response_ms
    }
}

/// On-disk shape of [`DomainStats`].
#[derive(Serialize, Deserialize)]
struct DomainStatsRecord {
    domain: String,
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    total_retries: u64,
    average_response_ms: f64,
}

impl From<DomainStats> for DomainStatsRecord {
    fn from(stats: DomainStats) -> Self {
        Self {
            domain: stats.domain,
            total_requests: stats.total_requests,
            successful_requests: stats.successful_requests,
            failed_requests: stats.failed_requests,
            total_retries: stats.total_retries,
            average_response_ms: stats.average_response_ms,
        }
    }
}

impl TryFrom<DomainStatsRecord> for DomainStats {
    type Error = String;

    fn try_from(record: DomainStatsRecord) -> Result<Self, Self::Error> {
        if record.successful_requests.checked_add(record.failed_requests) != Some(record.total_requests) {
            return Err(format!(
                "{}: total_requests {} != successful {} + failed {}",
                record.domain, record.total_requests, record.successful_requests, record.failed_requests
            ));
        }
        if !record.average_response_ms.is_finite() || record.average_response_ms < 0.0 {
            return Err(format!("{}: invalid average_response_ms", record.domain));
        }

        // Rebuild the accumulator so a resumed window keeps averaging correctly.
        let total_ms = record.average_response_ms * record.total_requests as f64;
        let total_response_time = Duration::try_from_secs_f64(total_ms / 1000.0).unwrap_or_default();
        Ok(Self {
            domain: record.domain,
            total_requests: record.total_requests,
            successful_requests: record.successful_requests,
            failed_requests: record.failed_requests,
            total_retries: record.total_retries,
            average_response_ms: record.average_response_ms,
            total_response_time,
        })
    }
}

/// A fixed-duration bucket of per-domain statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WindowRecord")]
pub struct Window {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub stats: BTreeMap<String, DomainStats>,
}

#[derive(Deserialize)]
struct WindowRecord {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    stats: BTreeMap<String, DomainStats>,
}

impl TryFrom<WindowRecord> for Window {
    type Error = String;

    fn try_from(record: WindowRecord) -> Result<Self, Self::Error> {
        if record.end_time < record.start_time {
            return Err(format!("window ends at {} before it starts at {}", record.end_time, record.start_time));
        }
        if let Some((key, stats)) = record.stats.iter().find(|(key, stats)| **key != stats.domain) {
            return Err(format!("stats keyed {} belong to {}", key, stats.domain));
        }
        Ok(Self {
            start_time: record.start_time,
            end_time: record.end_time,
            stats: record.stats,
        })
    }
}

impl Window {
    /// The end saturates at the latest representable instant.
    pub fn open(start_time: DateTime<Utc>, span: TimeDelta) -> Self {
        Self {
            start_time,
            end_time: start_time.checked_add_signed(span).unwrap_or(DateTime::<Utc>::MAX_UTC),
            stats: BTreeMap::new(),
        }
    }

    /// True once `now` has reached the end of the window's time range.
    pub fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    pub fn domain(&self, name: &str) -> Option<&DomainStats> {
        self.stats.get(name)
    }

    pub fn total_requests(&self) -> u64 {
        self.stats.values().map(|s| s.total_requests).sum()
    }

    pub(crate) fn record(&mut self, domain: String, elapsed: Duration, retries: u32, success: bool) {
        self.stats
            .entry(domain)
            .or_insert_with_key(|name| DomainStats::new(name.clone()))
            .apply(elapsed, retries, success);
    }
}
