//! Social sentiment collaborator (LunarCrush-style API).
//!
//! Strictly advisory: every failure path degrades to "sentiment
//! unavailable" at the caller, which disables only the sentiment-dependent
//! rule branches.

use std::time::Duration;

use agent_core::{SentimentFeed, SentimentSnapshot};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

pub struct SentimentClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct AssetsResponse {
    data: Vec<AssetRow>,
}

#[derive(Debug, Deserialize)]
struct AssetRow {
    symbol: String,
    #[serde(default)]
    galaxy_score: f64,
    #[serde(default)]
    sentiment: f64,
    #[serde(default)]
    alt_rank: u32,
}

impl SentimentClient {
    pub fn new(base_url: String, api_key: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl SentimentFeed for SentimentClient {
    async fn fetch_sentiment(&self, coins: &[String]) -> Result<Vec<SentimentSnapshot>> {
        let url = format!("{}/public/coins/list/v2", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("symbols", coins.join(","))])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "sentiment API returned {}",
                response.status()
            ));
        }

        let assets = response.json::<AssetsResponse>().await?;
        let snapshots = assets
            .data
            .into_iter()
            .filter(|row| coins.iter().any(|c| c == &row.symbol))
            .map(|row| SentimentSnapshot {
                coin: row.symbol,
                galaxy_score: row.galaxy_score,
                sentiment_pct: row.sentiment,
                alt_rank: row.alt_rank,
            })
            .collect();
        Ok(snapshots)
    }
}
