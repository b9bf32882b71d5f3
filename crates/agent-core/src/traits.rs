use anyhow::Result;
use async_trait::async_trait;

use crate::types::{
    Balance, ExchangePosition, IndicatorSnapshot, Interval, MarketOrderRequest, OrderResult,
    ScoreRequest, ScoreResponse, SentimentSnapshot,
};

// ---------------------------------------------------------------------------
// Exchange
// ---------------------------------------------------------------------------

/// Venue-agnostic perp exchange contract. All methods are fallible and are
/// wrapped in the agent's bounded retry at call sites.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Account margin summary.
    async fn fetch_balance(&self) -> Result<Balance>;

    /// All open positions, at most one per coin.
    async fn fetch_positions(&self) -> Result<Vec<ExchangePosition>>;

    /// Current mid price for a coin.
    async fn fetch_mid(&self, coin: &str) -> Result<f64>;

    /// Submit a market order with slippage protection.
    async fn place_market_order(&self, req: &MarketOrderRequest) -> Result<OrderResult>;

    /// Close the entire position for a coin at market.
    async fn close_position(&self, coin: &str) -> Result<OrderResult>;

    /// Cancel any resting orders for a coin.
    async fn cancel_open_orders(&self, coin: &str) -> Result<()>;

    /// Whether this is a simulated (dry-run) venue.
    fn is_paper(&self) -> bool;

    /// Venue name for logging.
    fn venue_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Indicator feed
// ---------------------------------------------------------------------------

/// Supplies computed indicator snapshots. `Ok(None)` means insufficient
/// history for this coin/interval: a non-error skip, never retried.
#[async_trait]
pub trait IndicatorFeed: Send + Sync {
    async fn fetch(&self, coin: &str, interval: Interval) -> Result<Option<IndicatorSnapshot>>;
}

// ---------------------------------------------------------------------------
// Advisory collaborators
// ---------------------------------------------------------------------------

/// Social sentiment provider. Advisory: callers degrade to "sentiment
/// unavailable" on any failure.
#[async_trait]
pub trait SentimentFeed: Send + Sync {
    async fn fetch_sentiment(&self, coins: &[String]) -> Result<Vec<SentimentSnapshot>>;
}

/// External ML confidence scorer. Advisory: a `None` score or an error must
/// never block trading, only forfeit the confidence blend.
#[async_trait]
pub trait ConfidenceScorer: Send + Sync {
    async fn score_signal(&self, req: &ScoreRequest) -> Result<ScoreResponse>;
}
