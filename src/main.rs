use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use upstream_stats::services::upstream::UpstreamClient;
use upstream_stats::stats::FileSnapshotStore;
use upstream_stats::{CollectorConfig, FetchConfig, StatsCollector, StatsDrivers};

const POLL_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let targets: Vec<String> = std::env::args().skip(1).collect();
    tracing::info!("Upstream statistics collector starting, {} target(s)", targets.len());

    let config = CollectorConfig::default();
    let store = FileSnapshotStore::new(config.persist_path.clone());
    let collector = StatsCollector::initialize(config, Box::new(store));

    let token = CancellationToken::new();
    let drivers = StatsDrivers::spawn(Arc::clone(&collector), token.clone());
    let client = UpstreamClient::new(Arc::clone(&collector), FetchConfig::default());

    let poller = tokio::spawn(poll_targets(client, targets, token.child_token()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    token.cancel();
    if let Err(e) = poller.await {
        tracing::warn!("Poller ended abnormally: {}", e);
    }
    if let Err(e) = drivers.shutdown().await {
        tracing::warn!("Final statistics save failed: {}", e);
    }

    let report = collector.report();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn poll_targets(client: UpstreamClient, targets: Vec<String>, token: CancellationToken) {
    let mut cadence = tokio::time::interval(POLL_INTERVAL);
    cadence.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = cadence.tick() => {
                for url in &targets {
                    match client.get_with_retry(url).await {
                        Ok(resp) => tracing::debug!("{} -> {}", url, resp.status()),
                        Err(e) => tracing::warn!("{}", e),
                    }
                }
            }
        }
    }
}
