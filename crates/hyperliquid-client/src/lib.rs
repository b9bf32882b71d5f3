//! Exchange plumbing: the live Hyperliquid REST client, the dry-run paper
//! venue, and the indicator-service feed.
//!
//! None of this contains decision logic. Market reads go straight to the
//! venue's `/info` endpoint; order placement goes through a local signing
//! gateway (wallet signing is the gateway's problem, not ours).

pub mod client;
pub mod indicator_feed;
pub mod models;
pub mod paper;

pub use client::HyperliquidClient;
pub use indicator_feed::IndicatorServiceClient;
pub use paper::PaperExchange;
