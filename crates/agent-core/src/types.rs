use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Market classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// +1 for longs, -1 for shorts. Used to sign PnL and DI spreads.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

/// Coarse market regime derived from ADX and Bollinger width by the
/// indicator service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Quiet,
    Ranging,
    Trending,
    VolatileTrend,
}

impl Regime {
    /// Regimes where mean-reversion rules are allowed to fire.
    pub fn is_rangebound(&self) -> bool {
        matches!(self, Regime::Quiet | Regime::Ranging)
    }

    /// Regimes where trend-following rules are allowed to fire.
    pub fn is_directional(&self) -> bool {
        matches!(self, Regime::Trending | Regime::VolatileTrend)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Quiet => "quiet",
            Regime::Ranging => "ranging",
            Regime::Trending => "trending",
            Regime::VolatileTrend => "volatile_trend",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyCategory {
    Trend,
    MeanReversion,
    Breakout,
    SentimentConfirmed,
    Contrarian,
}

impl StrategyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyCategory::Trend => "trend",
            StrategyCategory::MeanReversion => "mean-reversion",
            StrategyCategory::Breakout => "breakout",
            StrategyCategory::SentimentConfirmed => "sentiment-confirmed",
            StrategyCategory::Contrarian => "contrarian",
        }
    }
}

/// Per-coin volatility class derived from the ATR ratio by the volatility
/// monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityClass {
    Calm,
    Normal,
    Elevated,
    Spike,
}

impl VolatilityClass {
    /// Elevated and spike coins both count toward the global "hot" tally.
    pub fn is_hot(&self) -> bool {
        matches!(self, VolatilityClass::Elevated | VolatilityClass::Spike)
    }
}

// ---------------------------------------------------------------------------
// Indicator snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "15m")]
    M15,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::H1 => "1h",
            Interval::M15 => "15m",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// Normalized band width: (upper - lower) / middle.
    pub width: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Adx {
    pub value: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

impl Adx {
    /// DI spread signed for the trade direction: positive means the
    /// directional indicators favor the trade.
    pub fn spread_for(&self, side: Side) -> f64 {
        match side {
            Side::Long => self.plus_di - self.minus_di,
            Side::Short => self.minus_di - self.plus_di,
        }
    }
}

/// One bundle of computed technical values per (coin, interval, cycle).
/// Produced fresh each evaluation by the indicator service; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub coin: String,
    pub interval: Interval,
    pub price: f64,
    pub rsi: f64,
    pub macd: Macd,
    pub bollinger: BollingerBands,
    pub atr: f64,
    pub adx: Adx,
    pub regime: Regime,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// A tradeable entry candidate. Lives for one cycle; the winning candidate's
/// rule/category survive as the opened position's provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub coin: String,
    pub side: Side,
    pub rule: String,
    pub category: StrategyCategory,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitSignal {
    pub rule: &'static str,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Positions and balances
// ---------------------------------------------------------------------------

/// Wire-level position as reported by the venue. Carries no signal
/// provenance; the control loop joins it with its own [`Provenance`] map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub coin: String,
    pub side: Side,
    pub entry_price: f64,
    pub size: f64,
    pub leverage: u32,
    pub unrealized_pnl: f64,
}

/// Entry-signal provenance the loop remembers for each open position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub rule: String,
    pub category: StrategyCategory,
    pub opened_at: DateTime<Utc>,
}

/// A fully-described open position: venue state plus entry provenance.
/// Invariant: at most one open position per coin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub coin: String,
    pub side: Side,
    pub entry_price: f64,
    pub size: f64,
    pub leverage: u32,
    pub opened_at: DateTime<Utc>,
    pub rule: String,
    pub category: StrategyCategory,
}

impl Position {
    /// Unrealized PnL as a percentage of entry price, signed by side.
    /// Leverage affects sizing only, not the exit thresholds.
    pub fn pnl_pct(&self, price: f64) -> f64 {
        pnl_pct(self.side, self.entry_price, price)
    }
}

/// Price move relative to entry as a percentage, signed by side.
pub fn pnl_pct(side: Side, entry_price: f64, price: f64) -> f64 {
    if entry_price <= 0.0 {
        return 0.0;
    }
    side.sign() * (price - entry_price) / entry_price * 100.0
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Balance {
    pub available: f64,
    pub account_value: f64,
    pub margin_used: f64,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TpSl {
    pub take_profit: f64,
    pub stop_loss: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOrderRequest {
    pub coin: String,
    pub side: Side,
    pub size: f64,
    pub leverage: u32,
    pub slippage_bps: u32,
    pub tp_sl: Option<TpSl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Filled,
    Resting,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub status: OrderStatus,
    pub filled_size: f64,
    pub avg_price: f64,
}

// ---------------------------------------------------------------------------
// Sentiment
// ---------------------------------------------------------------------------

/// Social sentiment snapshot for one coin (LunarCrush-style fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    pub coin: String,
    /// Composite social/market score, 0-100.
    pub galaxy_score: f64,
    /// Share of bullish social posts, 0-100.
    pub sentiment_pct: f64,
    /// Market-wide rank; lower is more prominent.
    pub alt_rank: u32,
}

impl SentimentSnapshot {
    pub fn is_bullish_extreme(&self) -> bool {
        self.galaxy_score >= 70.0 && self.sentiment_pct >= 80.0
    }

    pub fn is_bearish_extreme(&self) -> bool {
        self.galaxy_score >= 70.0 && self.sentiment_pct <= 20.0
    }

    pub fn is_extreme(&self) -> bool {
        self.is_bullish_extreme() || self.is_bearish_extreme()
    }

    /// The direction an extreme reading points in, if any.
    pub fn extreme_side(&self) -> Option<Side> {
        if self.is_bullish_extreme() {
            Some(Side::Long)
        } else if self.is_bearish_extreme() {
            Some(Side::Short)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// ML scorer contract
// ---------------------------------------------------------------------------

/// Feature payload for the external confidence scorer. Field names follow
/// the scorer's training schema.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreRequest {
    pub coin: String,
    pub side: Side,
    pub rule: String,
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
    pub rsi: f64,
    pub macd_histogram: f64,
    pub bb_width: f64,
    pub atr_pct: f64,
    pub regime: Regime,
    pub galaxy_score: Option<f64>,
    pub sentiment_pct: Option<f64>,
    pub alt_rank: Option<u32>,
}

/// Scorer reply. A `None` score means "no opinion" (untrained model, scorer
/// down); the caller keeps the rule confidence unchanged.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreResponse {
    pub score: Option<f64>,
    #[serde(rename = "modelSamples", default)]
    pub model_samples: u64,
}
