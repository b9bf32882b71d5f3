use std::time::Duration;

use agent_core::{IndicatorFeed, IndicatorSnapshot, Interval};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};

/// HTTP client for the external indicator service, which owns the RSI /
/// MACD / Bollinger / ADX arithmetic and the regime classification.
pub struct IndicatorServiceClient {
    client: Client,
    base_url: String,
}

impl IndicatorServiceClient {
    pub fn new(base_url: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl IndicatorFeed for IndicatorServiceClient {
    async fn fetch(&self, coin: &str, interval: Interval) -> Result<Option<IndicatorSnapshot>> {
        let url = format!(
            "{}/indicators/{}/{}",
            self.base_url,
            coin,
            interval.as_str()
        );
        let response = self.client.get(&url).send().await?;

        match response.status() {
            // The service answers 204/404 while a coin's candle history is
            // still too short to compute a snapshot.
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => {
                tracing::debug!(coin, interval = interval.as_str(), "insufficient history");
                Ok(None)
            }
            status if status.is_success() => {
                let snapshot = response.json::<IndicatorSnapshot>().await?;
                Ok(Some(snapshot))
            }
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(anyhow!("indicator service returned {}: {}", status, text))
            }
        }
    }
}
