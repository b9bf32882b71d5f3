//! Shared data model and collaborator contracts for the perp trading agent.
//!
//! Everything here is venue-agnostic: the decision crates (signal-engine,
//! position-sizer, risk-governor, ...) depend only on these types, and the
//! I/O crates (hyperliquid-client, sentiment-client, ml-client) implement
//! the traits.

mod error;
mod traits;
mod types;

pub use error::ExchangeError;
pub use traits::{ConfidenceScorer, Exchange, IndicatorFeed, SentimentFeed};
pub use types::{
    Adx, Balance, BollingerBands, ExchangePosition, ExitSignal, IndicatorSnapshot, Interval, Macd,
    MarketOrderRequest, OrderResult, OrderStatus, Position, Provenance, Regime, ScoreRequest,
    ScoreResponse, SentimentSnapshot, Side, Signal, StrategyCategory, TpSl, VolatilityClass,
    pnl_pct,
};
