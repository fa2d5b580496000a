use crate::stats::collector::StatsCollector;
use crate::stats::error::StatsError;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MIN_PERIOD: Duration = Duration::from_millis(1);
// Keeps timer deadlines representable for absurdly long windows.
const MAX_PERIOD: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// The two background loops that keep a collector moving: window rotation
/// and periodic saving. Both stop when the token is cancelled.
#[derive(Debug)]
pub struct StatsDrivers {
    collector: Arc<StatsCollector>,
    token: CancellationToken,
    rotation: JoinHandle<()>,
    saver: JoinHandle<()>,
}

impl StatsDrivers {
    /// Must be called from within a tokio runtime.
    pub fn spawn(collector: Arc<StatsCollector>, token: CancellationToken) -> Self {
        let rotation = tokio::spawn(rotation_loop(Arc::clone(&collector), token.clone()));
        let saver = tokio::spawn(save_loop(Arc::clone(&collector), token.clone()));
        info!(
            window = ?collector.window_duration(),
            save_interval = ?collector.config().save_interval,
            "Statistics drivers started"
        );
        Self {
            collector,
            token,
            rotation,
            saver,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Stops both loops, waits for them, then saves one last time.
    pub async fn shutdown(self) -> Result<(), StatsError> {
        self.token.cancel();
        for (name, handle) in [("rotation", self.rotation), ("save", self.saver)] {
            if let Err(e) = handle.await {
                error!("Statistics {} driver ended abnormally: {}", name, e);
            }
        }
        let result = persist_off_thread(&self.collector).await;
        info!("Statistics drivers stopped");
        result
    }
}

/// Runs `persist` on the blocking pool so file I/O never stalls the runtime.
pub async fn persist_off_thread(collector: &Arc<StatsCollector>) -> Result<(), StatsError> {
    let collector = Arc::clone(collector);
    tokio::task::spawn_blocking(move || collector.persist()).await?
}

async fn rotation_loop(collector: Arc<StatsCollector>, token: CancellationToken) {
    let period = collector.window_duration().clamp(MIN_PERIOD, MAX_PERIOD);
    // A resumed window closes at its own end time, not a full period from now.
    let first = (collector.current_window_info().end_time - Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO)
        .min(MAX_PERIOD);
    let mut ticker = interval_at(Instant::now() + first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                collector.rotate();
                if let Err(e) = persist_off_thread(&collector).await {
                    warn!("Error saving statistics after window rotation: {}", e);
                }
            }
        }
    }
    debug!("Rotation driver exiting");
}

async fn save_loop(collector: Arc<StatsCollector>, token: CancellationToken) {
    let period = collector.config().save_interval.clamp(MIN_PERIOD, MAX_PERIOD);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = persist_off_thread(&collector).await {
                    warn!("Error during periodic statistics save: {}", e);
                }
            }
        }
    }
    debug!("Save driver exiting");
}
