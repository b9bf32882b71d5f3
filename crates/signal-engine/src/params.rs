//! Fixed rule parameters. These are the tuned production values; tests pin
//! them, so changing one is a deliberate recalibration, not a refactor.

/// Candidates below this confidence are discarded (and surfaced as
/// near-misses). Contrarian flips are exempt; they use
/// [`CONTRARIAN_FLOOR`] instead.
pub const MIN_CONFIDENCE: f64 = 0.60;

// -- Mean reversion (R1 long / R2 short) -----------------------------------

pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;
pub const MEAN_REVERSION_BASE: f64 = 0.60;
/// 15-minute RSI confirmation band for entry timing.
pub const RSI_CONFIRM_OVERSOLD: f64 = 35.0;
pub const RSI_CONFIRM_OVERBOUGHT: f64 = 65.0;

// -- Trend following (R3 long / R4 short) ----------------------------------

pub const TREND_BASE: f64 = 0.60;
pub const ADX_TREND_FLOOR: f64 = 25.0;
/// ADX band just below the strict cutoff that the short rule still accepts
/// when the DI spread is wide enough.
pub const ADX_TRANSITIONAL_FLOOR: f64 = 20.0;
/// DI spread required for the relaxed-ADX short entry.
pub const DI_SPREAD_RELAXATION: f64 = 15.0;
pub const RSI_MIDPOINT: f64 = 50.0;
/// RSI midpoint shift allowed under an aligned sentiment extreme.
pub const SENTIMENT_RSI_RELAXATION: f64 = 5.0;

// -- Confidence adjustments -------------------------------------------------

/// Added when the 15-minute snapshot confirms the direction.
pub const CONFIRM_BONUS: f64 = 0.05;
pub const DI_SPREAD_BONUS_STEP_1: f64 = 10.0;
pub const DI_SPREAD_BONUS_STEP_2: f64 = 20.0;
pub const DI_SPREAD_BONUS_SMALL: f64 = 0.05;
pub const DI_SPREAD_BONUS_LARGE: f64 = 0.10;

// -- Breakout (R5) ----------------------------------------------------------

/// Bollinger width below this latches the per-coin squeeze flag.
pub const SQUEEZE_WIDTH: f64 = 0.02;
/// Width above this, while latched, resolves the squeeze.
pub const BREAKOUT_WIDTH: f64 = 0.045;
/// Below MIN_CONFIDENCE on purpose: the rule is structurally present but
/// inert unless re-tuned.
pub const BREAKOUT_BASE: f64 = 0.55;

// -- Sentiment (R6) ---------------------------------------------------------

pub const SENTIMENT_BASE: f64 = 0.62;

// -- Contrarian override ----------------------------------------------------

/// RSI stretch that marks a crowded candidate eligible for the flip.
pub const CONTRARIAN_RSI_STRETCH: f64 = 65.0;
pub const CONTRARIAN_DISCOUNT: f64 = 0.80;
/// Flipped candidates below this are discarded (recorded as near-misses).
pub const CONTRARIAN_FLOOR: f64 = 0.55;

// -- Near-miss margins ------------------------------------------------------

/// A failed numeric gate only counts as "close" within these margins.
pub const NEAR_RSI_MARGIN: f64 = 5.0;
pub const NEAR_ADX_MARGIN: f64 = 5.0;
pub const NEAR_DI_MARGIN: f64 = 3.0;
/// MACD histogram is price-scaled; "close to zero" means within 5 bps of
/// price.
pub const NEAR_MACD_BPS: f64 = 5.0;
/// At most this many failed gates still qualifies as a near-miss.
pub const NEAR_MISS_MAX_FAILED: usize = 2;

// -- Exit thresholds (PnL %, signed by side) --------------------------------

pub const TRAIL_ARM: f64 = 1.5;
pub const TRAIL_TRIGGER: f64 = 0.5;
pub const TRAIL_ARM_VOLATILE: f64 = 2.0;
pub const TRAIL_TRIGGER_VOLATILE: f64 = 0.8;
pub const TAKE_PROFIT_CAP: f64 = 4.0;
pub const TAKE_PROFIT_CAP_VOLATILE: f64 = 6.0;
pub const STOP_LOSS: f64 = -2.0;
/// Tighter floor for sentiment-only entries: known-weaker setups get less
/// room.
pub const STOP_LOSS_SENTIMENT: f64 = -1.5;
pub const ADX_COLLAPSE: f64 = 18.0;
pub const TIME_STOP_HOURS: i64 = 6;
pub const FLAT_BAND: f64 = 0.3;

// Contrarian positions run on a tighter book.
pub const CONTRARIAN_TRAIL_ARM: f64 = 1.0;
pub const CONTRARIAN_TRAIL_TRIGGER: f64 = 0.3;
pub const CONTRARIAN_TAKE_PROFIT_CAP: f64 = 2.5;
pub const CONTRARIAN_STOP_LOSS: f64 = -1.2;
pub const CONTRARIAN_TIME_STOP_HOURS: i64 = 2;
