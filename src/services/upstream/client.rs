use crate::config::FetchConfig;
use crate::stats::{StatsCollector, StatsError};
use reqwest::{Client, Response};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// HTTP client whose every logical call is recorded in the statistics collector.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    config: FetchConfig,
    collector: Arc<StatsCollector>,
}

impl UpstreamClient {
    pub fn new(collector: Arc<StatsCollector>, config: FetchConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(config.timeout)
                .build()
                .unwrap_or_default(),
            config,
            collector,
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// GET with linear backoff. Records exactly one outcome per call, after the
    /// last attempt. Any HTTP response counts as a transport success.
    pub async fn get_with_retry(&self, url: &str) -> Result<Response, StatsError> {
        let started = Instant::now();
        let attempts = self.config.retries.max(1);
        let mut attempt = 1;

        let source = loop {
            match self.client.get(url).send().await {
                Ok(resp) => {
                    self.collector.record(url, started.elapsed(), attempt - 1, true);
                    return Ok(resp);
                }
                Err(e) if attempt < attempts => {
                    let wait = self.config.backoff * attempt;
                    warn!(
                        "Request to {} failed (attempt {}/{}): {}. Retrying in {:?}",
                        url, attempt, attempts, e, wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Request to {} failed after {} attempts: {}", url, attempts, e);
                    break e;
                }
            }
        };

        self.collector.record(url, started.elapsed(), attempts - 1, false);
        Err(StatsError::Upstream {
            url: url.to_string(),
            attempts,
            source,
        })
    }
}
