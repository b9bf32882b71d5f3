use agent_core::{IndicatorSnapshot, SentimentSnapshot, Side, Signal, StrategyCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::params;
use crate::state::AgentState;

/// Everything the entry evaluator needs for one coin in one cycle. The
/// contrarian gate is drawn by the control loop so the evaluator stays
/// deterministic.
pub struct EntryContext<'a> {
    pub ind_1h: &'a IndicatorSnapshot,
    pub ind_15m: Option<&'a IndicatorSnapshot>,
    pub sentiment: Option<&'a SentimentSnapshot>,
    pub contrarian_draw: bool,
}

/// An entry that almost fired: at most two gating conditions failed, each by
/// a small margin. Recorded so the filter's judgment can be audited later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearMiss {
    pub coin: String,
    pub side: Side,
    pub rule: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub blocked_by: Vec<String>,
    pub snapshot: IndicatorSnapshot,
}

pub struct EntryEvaluation {
    pub signal: Option<Signal>,
    pub near_misses: Vec<NearMiss>,
}

// ---------------------------------------------------------------------------
// Gate bookkeeping
// ---------------------------------------------------------------------------

struct Gate {
    name: &'static str,
    passed: bool,
    /// Failed, but within the rule family's near margin.
    near: bool,
}

impl Gate {
    /// A gate with no meaningful "close" reading (e.g. wrong regime).
    fn hard(name: &'static str, passed: bool) -> Self {
        Gate {
            name,
            passed,
            near: false,
        }
    }

    fn soft(name: &'static str, passed: bool, near: bool) -> Self {
        Gate { name, passed, near }
    }
}

struct RuleCheck {
    rule: &'static str,
    side: Side,
    gates: Vec<Gate>,
}

impl RuleCheck {
    fn fired(&self) -> bool {
        self.gates.iter().all(|g| g.passed)
    }

    /// 1-2 failed gates, every failure within margin, qualifies as a
    /// near-miss. Three or more failures is "not close" and ignored.
    fn near_miss(&self, ind: &IndicatorSnapshot) -> Option<NearMiss> {
        let failed: Vec<&Gate> = self.gates.iter().filter(|g| !g.passed).collect();
        if failed.is_empty() || failed.len() > params::NEAR_MISS_MAX_FAILED {
            return None;
        }
        if !failed.iter().all(|g| g.near) {
            return None;
        }
        let blocked_by: Vec<String> = failed.iter().map(|g| g.name.to_string()).collect();
        Some(near_miss(
            self.rule,
            self.side,
            ind,
            blocked_by,
            format!("{} blocked at RSI {:.1}", self.rule, ind.rsi),
        ))
    }
}

fn near_miss(
    rule: &str,
    side: Side,
    ind: &IndicatorSnapshot,
    blocked_by: Vec<String>,
    reason: String,
) -> NearMiss {
    NearMiss {
        coin: ind.coin.clone(),
        side,
        rule: rule.to_string(),
        price: ind.price,
        timestamp: ind.timestamp,
        reason,
        blocked_by,
        snapshot: ind.clone(),
    }
}

/// MACD histogram is price-scaled, so "close to zero" is measured in basis
/// points of price.
fn macd_near_zero(histogram: f64, price: f64) -> bool {
    histogram.abs() <= price * params::NEAR_MACD_BPS / 10_000.0
}

// ---------------------------------------------------------------------------
// Rule families
// ---------------------------------------------------------------------------

fn mean_reversion(
    ind: &IndicatorSnapshot,
    ind_15m: Option<&IndicatorSnapshot>,
    side: Side,
) -> (RuleCheck, Option<Signal>) {
    let (rule, rsi_gate, rsi_near, confirm) = match side {
        Side::Long => (
            "R1-mean-reversion",
            ind.rsi < params::RSI_OVERSOLD,
            ind.rsi < params::RSI_CONFIRM_OVERSOLD,
            ind_15m.map(|i| i.rsi < params::RSI_CONFIRM_OVERSOLD),
        ),
        Side::Short => (
            "R2-mean-reversion",
            ind.rsi > params::RSI_OVERBOUGHT,
            ind.rsi > params::RSI_CONFIRM_OVERBOUGHT,
            ind_15m.map(|i| i.rsi > params::RSI_CONFIRM_OVERBOUGHT),
        ),
    };

    let check = RuleCheck {
        rule,
        side,
        gates: vec![
            Gate::hard("regime-rangebound", ind.regime.is_rangebound()),
            Gate::soft("rsi-extreme", rsi_gate, rsi_near),
        ],
    };

    let signal = check.fired().then(|| {
        let mut confidence = params::MEAN_REVERSION_BASE;
        let mut reason = format!(
            "RSI {:.1} {} in {} regime",
            ind.rsi,
            if side == Side::Long {
                "oversold"
            } else {
                "overbought"
            },
            ind.regime.as_str()
        );
        if confirm == Some(true) {
            confidence += params::CONFIRM_BONUS;
            reason.push_str(", 15m confirms");
        }
        Signal {
            coin: ind.coin.clone(),
            side,
            rule: rule.to_string(),
            category: StrategyCategory::MeanReversion,
            confidence,
            reason,
        }
    });

    (check, signal)
}

fn trend_follow(
    ind: &IndicatorSnapshot,
    ind_15m: Option<&IndicatorSnapshot>,
    sentiment: Option<&SentimentSnapshot>,
    side: Side,
) -> (RuleCheck, Option<Signal>) {
    let spread = ind.adx.spread_for(side);

    // Aligned sentiment extremes buy a little slack on the RSI midpoint.
    let relaxed = sentiment.and_then(|s| s.extreme_side()) == Some(side);
    let midpoint_shift = if relaxed {
        params::SENTIMENT_RSI_RELAXATION
    } else {
        0.0
    };

    let (rule, adx_passed, rsi_passed, rsi_near, macd_passed, confirm) = match side {
        Side::Long => (
            "R3-trend",
            ind.adx.value > params::ADX_TREND_FLOOR,
            ind.rsi > params::RSI_MIDPOINT - midpoint_shift,
            ind.rsi > params::RSI_MIDPOINT - midpoint_shift - params::NEAR_RSI_MARGIN,
            ind.macd.histogram > 0.0,
            ind_15m.map(|i| i.rsi > params::RSI_MIDPOINT),
        ),
        Side::Short => (
            "R4-trend",
            // The short rule accepts a transitional ADX band when the DI
            // spread is wide enough.
            ind.adx.value > params::ADX_TREND_FLOOR
                || (ind.adx.value > params::ADX_TRANSITIONAL_FLOOR
                    && spread >= params::DI_SPREAD_RELAXATION),
            ind.rsi < params::RSI_MIDPOINT + midpoint_shift,
            ind.rsi < params::RSI_MIDPOINT + midpoint_shift + params::NEAR_RSI_MARGIN,
            ind.macd.histogram < 0.0,
            ind_15m.map(|i| i.rsi < params::RSI_MIDPOINT),
        ),
    };

    let check = RuleCheck {
        rule,
        side,
        gates: vec![
            Gate::hard("regime-directional", ind.regime.is_directional()),
            Gate::soft(
                "adx-strength",
                adx_passed,
                ind.adx.value > params::ADX_TREND_FLOOR - params::NEAR_ADX_MARGIN,
            ),
            Gate::soft("di-alignment", spread > 0.0, spread > -params::NEAR_DI_MARGIN),
            Gate::soft("rsi-midpoint", rsi_passed, rsi_near),
            Gate::soft(
                "macd-histogram",
                macd_passed,
                macd_near_zero(ind.macd.histogram, ind.price),
            ),
        ],
    };

    let signal = check.fired().then(|| {
        let mut confidence = params::TREND_BASE;
        let mut reason = format!(
            "ADX {:.1} with DI spread {:.1} in {} regime",
            ind.adx.value,
            spread,
            ind.regime.as_str()
        );
        if spread >= params::DI_SPREAD_BONUS_STEP_2 {
            confidence += params::DI_SPREAD_BONUS_LARGE;
        } else if spread >= params::DI_SPREAD_BONUS_STEP_1 {
            confidence += params::DI_SPREAD_BONUS_SMALL;
        }
        if confirm == Some(true) {
            confidence += params::CONFIRM_BONUS;
            reason.push_str(", 15m confirms");
        }
        if relaxed {
            reason.push_str(", sentiment-relaxed RSI");
        }
        Signal {
            coin: ind.coin.clone(),
            side,
            rule: rule.to_string(),
            category: StrategyCategory::Trend,
            confidence,
            reason,
        }
    });

    (check, signal)
}

/// Two-phase breakout: a squeeze latches the per-coin flag; a later
/// expansion resolves it, firing only if price breached a band.
fn breakout(
    ind: &IndicatorSnapshot,
    state: &mut AgentState,
) -> (Option<Signal>, Option<NearMiss>) {
    let width = ind.bollinger.width;
    let coin = ind.coin.as_str();

    if state.squeeze_forming(coin) {
        if width > params::BREAKOUT_WIDTH {
            state.set_squeeze_forming(coin, false);
            tracing::debug!(coin, width, "squeeze resolved");

            let side = if ind.price > ind.bollinger.upper {
                Some(Side::Long)
            } else if ind.price < ind.bollinger.lower {
                Some(Side::Short)
            } else {
                None
            };

            return match side {
                Some(side) => (
                    Some(Signal {
                        coin: ind.coin.clone(),
                        side,
                        rule: "R5-breakout".to_string(),
                        category: StrategyCategory::Breakout,
                        confidence: params::BREAKOUT_BASE,
                        reason: format!(
                            "width expansion {:.3} after squeeze, band breach {}",
                            width,
                            side.as_str()
                        ),
                    }),
                    None,
                ),
                // Expansion without a breach: the squeeze resolved untradeably.
                None => (
                    None,
                    Some(near_miss(
                        "R5-breakout",
                        Side::Long,
                        ind,
                        vec!["band-breach".to_string()],
                        format!("width expanded to {:.3} but price stayed inside bands", width),
                    )),
                ),
            };
        }
    } else if width < params::SQUEEZE_WIDTH {
        state.set_squeeze_forming(coin, true);
        tracing::debug!(coin, width, "squeeze forming");
    }

    (None, None)
}

/// Standalone sentiment entry: only consulted when no technical rule fired.
fn sentiment_only(
    ind: &IndicatorSnapshot,
    sentiment: &SentimentSnapshot,
) -> (Option<RuleCheck>, Option<Signal>) {
    let Some(side) = sentiment.extreme_side() else {
        return (None, None);
    };

    let spread = ind.adx.spread_for(side);
    let check = RuleCheck {
        rule: "R6-sentiment",
        side,
        gates: vec![Gate::soft(
            "di-lean",
            spread > 0.0,
            spread > -params::NEAR_DI_MARGIN,
        )],
    };

    let signal = check.fired().then(|| Signal {
        coin: ind.coin.clone(),
        side,
        rule: "R6-sentiment".to_string(),
        category: StrategyCategory::SentimentConfirmed,
        confidence: params::SENTIMENT_BASE,
        reason: format!(
            "{} sentiment extreme (galaxy {:.0}, {:.0}% bullish) with DI lean",
            side.as_str(),
            sentiment.galaxy_score,
            sentiment.sentiment_pct
        ),
    });

    (Some(check), signal)
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Evaluate the full entry rule set for one coin.
///
/// Every matching rule appends a candidate; the highest confidence wins and
/// ties keep the first encountered. Candidates below the global minimum are
/// discarded and surfaced as near-misses. The contrarian override may flip
/// the winner as the final step.
pub fn evaluate_entry(ctx: &EntryContext<'_>, state: &mut AgentState) -> EntryEvaluation {
    let ind = ctx.ind_1h;
    let mut candidates: Vec<Signal> = Vec::new();
    let mut near_misses: Vec<NearMiss> = Vec::new();

    for side in [Side::Long, Side::Short] {
        let (check, signal) = mean_reversion(ind, ctx.ind_15m, side);
        match signal {
            Some(sig) => candidates.push(sig),
            None => near_misses.extend(check.near_miss(ind)),
        }

        let (check, signal) = trend_follow(ind, ctx.ind_15m, ctx.sentiment, side);
        match signal {
            Some(sig) => candidates.push(sig),
            None => near_misses.extend(check.near_miss(ind)),
        }
    }

    let (breakout_signal, breakout_miss) = breakout(ind, state);
    candidates.extend(breakout_signal);
    near_misses.extend(breakout_miss);

    // Sentiment-only entries never compete with technical rules.
    if candidates.is_empty() {
        if let Some(sentiment) = ctx.sentiment {
            let (check, signal) = sentiment_only(ind, sentiment);
            match signal {
                Some(sig) => candidates.push(sig),
                None => {
                    if let Some(check) = check {
                        near_misses.extend(check.near_miss(ind));
                    }
                }
            }
        }
    }

    // Global minimum-confidence cutoff.
    let mut eligible: Vec<Signal> = Vec::new();
    for sig in candidates {
        if sig.confidence >= params::MIN_CONFIDENCE {
            eligible.push(sig);
        } else {
            near_misses.push(near_miss(
                &sig.rule,
                sig.side,
                ind,
                vec!["min-confidence".to_string()],
                format!("{} at {:.2} below {:.2} cutoff", sig.rule, sig.confidence, params::MIN_CONFIDENCE),
            ));
        }
    }

    // Highest confidence wins; ties keep the first encountered.
    let mut best: Option<Signal> = None;
    for sig in eligible {
        match &best {
            Some(b) if sig.confidence <= b.confidence => {}
            _ => best = Some(sig),
        }
    }

    let signal = match best {
        Some(sig) => apply_contrarian(ctx, ind, sig, &mut near_misses),
        None => None,
    };

    EntryEvaluation {
        signal,
        near_misses,
    }
}

/// Contrarian override: fade a crowded candidate. Requires the drawn gate,
/// an extreme sentiment reading aligned with the candidate, and RSI
/// stretched the same way.
fn apply_contrarian(
    ctx: &EntryContext<'_>,
    ind: &IndicatorSnapshot,
    sig: Signal,
    near_misses: &mut Vec<NearMiss>,
) -> Option<Signal> {
    if !ctx.contrarian_draw {
        return Some(sig);
    }
    let Some(sentiment) = ctx.sentiment else {
        return Some(sig);
    };
    if sentiment.extreme_side() != Some(sig.side) {
        return Some(sig);
    }
    let stretched = match sig.side {
        Side::Long => ind.rsi >= params::CONTRARIAN_RSI_STRETCH,
        Side::Short => ind.rsi <= 100.0 - params::CONTRARIAN_RSI_STRETCH,
    };
    if !stretched {
        return Some(sig);
    }

    let flipped = sig.side.opposite();
    let confidence = sig.confidence * params::CONTRARIAN_DISCOUNT;
    let rule = format!("C-{}", sig.rule);

    if confidence < params::CONTRARIAN_FLOOR {
        near_misses.push(near_miss(
            &rule,
            flipped,
            ind,
            vec!["contrarian-floor".to_string()],
            format!("contrarian flip of {} discounted to {:.2}", sig.rule, confidence),
        ));
        return None;
    }

    Some(Signal {
        coin: sig.coin,
        side: flipped,
        rule,
        category: StrategyCategory::Contrarian,
        confidence,
        reason: format!(
            "contrarian fade of {} (RSI {:.1}, galaxy {:.0})",
            sig.rule, ind.rsi, sentiment.galaxy_score
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{Adx, BollingerBands, Interval, Macd, Regime};

    fn snapshot(regime: Regime, rsi: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            coin: "BTC".to_string(),
            interval: Interval::H1,
            price: 100.0,
            rsi,
            macd: Macd {
                line: 0.0,
                signal: 0.0,
                histogram: 0.0,
            },
            bollinger: BollingerBands {
                upper: 103.0,
                middle: 100.0,
                lower: 97.0,
                width: 0.06,
            },
            atr: 1.0,
            adx: Adx {
                value: 15.0,
                plus_di: 20.0,
                minus_di: 20.0,
            },
            regime,
            timestamp: Utc::now(),
        }
    }

    fn ctx(ind: &IndicatorSnapshot) -> EntryContext<'_> {
        EntryContext {
            ind_1h: ind,
            ind_15m: None,
            sentiment: None,
            contrarian_draw: false,
        }
    }

    fn bullish_extreme() -> SentimentSnapshot {
        SentimentSnapshot {
            coin: "BTC".to_string(),
            galaxy_score: 75.0,
            sentiment_pct: 85.0,
            alt_rank: 10,
        }
    }

    #[test]
    fn quiet_oversold_fires_r1_at_base_confidence() {
        let ind = snapshot(Regime::Quiet, 25.0);
        let mut state = AgentState::new();

        let eval = evaluate_entry(&ctx(&ind), &mut state);

        let sig = eval.signal.expect("R1 should fire");
        assert_eq!(sig.rule, "R1-mean-reversion");
        assert_eq!(sig.side, Side::Long);
        assert_eq!(sig.category, StrategyCategory::MeanReversion);
        assert!((sig.confidence - 0.60).abs() < 1e-9);
    }

    #[test]
    fn oversold_never_emits_trend_candidate() {
        let ind = snapshot(Regime::Quiet, 25.0);
        let mut state = AgentState::new();

        let eval = evaluate_entry(&ctx(&ind), &mut state);

        let sig = eval.signal.unwrap();
        assert!(!sig.rule.contains("trend"));
    }

    #[test]
    fn fifteen_minute_confirmation_adds_bonus() {
        let ind = snapshot(Regime::Ranging, 28.0);
        let mut ind_15m = snapshot(Regime::Ranging, 32.0);
        ind_15m.interval = Interval::M15;
        let mut state = AgentState::new();

        let eval = evaluate_entry(
            &EntryContext {
                ind_1h: &ind,
                ind_15m: Some(&ind_15m),
                sentiment: None,
                contrarian_draw: false,
            },
            &mut state,
        );

        let sig = eval.signal.unwrap();
        assert!((sig.confidence - 0.65).abs() < 1e-9);
    }

    #[test]
    fn trend_long_with_di_spread_bonus() {
        let mut ind = snapshot(Regime::Trending, 55.0);
        ind.adx = Adx {
            value: 30.0,
            plus_di: 25.0,
            minus_di: 10.0,
        };
        ind.macd.histogram = 0.01;
        let mut state = AgentState::new();

        let eval = evaluate_entry(&ctx(&ind), &mut state);

        let sig = eval.signal.expect("R3 should fire");
        assert_eq!(sig.rule, "R3-trend");
        assert_eq!(sig.side, Side::Long);
        assert!(sig.confidence > 0.60);
        assert!((sig.confidence - 0.65).abs() < 1e-9);
    }

    #[test]
    fn trend_short_accepts_transitional_adx_with_wide_spread() {
        let mut ind = snapshot(Regime::Trending, 42.0);
        ind.adx = Adx {
            value: 22.0,
            plus_di: 10.0,
            minus_di: 28.0,
        };
        ind.macd.histogram = -0.8;
        let mut state = AgentState::new();

        let eval = evaluate_entry(&ctx(&ind), &mut state);

        let sig = eval.signal.expect("transitional R4 should fire");
        assert_eq!(sig.rule, "R4-trend");
        assert_eq!(sig.side, Side::Short);
        // Spread 18 lands the small DI bonus.
        assert!((sig.confidence - 0.65).abs() < 1e-9);
    }

    #[test]
    fn trend_short_rejects_transitional_adx_with_narrow_spread() {
        let mut ind = snapshot(Regime::Trending, 42.0);
        ind.adx = Adx {
            value: 22.0,
            plus_di: 18.0,
            minus_di: 28.0,
        };
        ind.macd.histogram = -0.8;
        let mut state = AgentState::new();

        let eval = evaluate_entry(&ctx(&ind), &mut state);

        assert!(eval.signal.is_none());
    }

    #[test]
    fn breakout_requires_prior_squeeze() {
        let mut ind = snapshot(Regime::Ranging, 50.0);
        ind.bollinger.width = 0.05;
        ind.price = 104.0;
        let mut state = AgentState::new();

        let eval = evaluate_entry(&ctx(&ind), &mut state);
        assert!(eval.signal.is_none());
        assert!(!state.squeeze_forming("BTC"));
    }

    #[test]
    fn breakout_latch_fires_then_clears_but_stays_below_cutoff() {
        let mut state = AgentState::new();

        let mut squeeze = snapshot(Regime::Ranging, 50.0);
        squeeze.bollinger.width = 0.015;
        evaluate_entry(&ctx(&squeeze), &mut state);
        assert!(state.squeeze_forming("BTC"));

        let mut expansion = snapshot(Regime::Ranging, 50.0);
        expansion.bollinger.width = 0.05;
        expansion.price = 104.0;
        let eval = evaluate_entry(&ctx(&expansion), &mut state);

        // Base 0.55 sits under the 0.60 cutoff: discarded, surfaced as a
        // near-miss, latch cleared.
        assert!(eval.signal.is_none());
        assert!(!state.squeeze_forming("BTC"));
        assert!(eval
            .near_misses
            .iter()
            .any(|nm| nm.rule == "R5-breakout"
                && nm.blocked_by == vec!["min-confidence".to_string()]));
    }

    #[test]
    fn sentiment_only_fires_when_no_technical_rule_did() {
        let mut ind = snapshot(Regime::Ranging, 55.0);
        ind.adx.plus_di = 28.0;
        ind.adx.minus_di = 12.0;
        let sentiment = bullish_extreme();
        let mut state = AgentState::new();

        let eval = evaluate_entry(
            &EntryContext {
                ind_1h: &ind,
                ind_15m: None,
                sentiment: Some(&sentiment),
                contrarian_draw: false,
            },
            &mut state,
        );

        let sig = eval.signal.expect("R6 should fire");
        assert_eq!(sig.rule, "R6-sentiment");
        assert_eq!(sig.category, StrategyCategory::SentimentConfirmed);
        assert!((sig.confidence - 0.62).abs() < 1e-9);
    }

    #[test]
    fn sentiment_unavailable_disables_only_sentiment_branches() {
        let mut ind = snapshot(Regime::Ranging, 55.0);
        ind.adx.plus_di = 28.0;
        ind.adx.minus_di = 12.0;
        let mut state = AgentState::new();

        let eval = evaluate_entry(&ctx(&ind), &mut state);
        assert!(eval.signal.is_none());
    }

    #[test]
    fn contrarian_flip_discounts_and_retags() {
        let mut ind = snapshot(Regime::Trending, 68.0);
        ind.adx = Adx {
            value: 32.0,
            plus_di: 35.0,
            minus_di: 10.0,
        };
        ind.macd.histogram = 0.9;
        let sentiment = bullish_extreme();
        let mut state = AgentState::new();

        let eval = evaluate_entry(
            &EntryContext {
                ind_1h: &ind,
                ind_15m: None,
                sentiment: Some(&sentiment),
                contrarian_draw: true,
            },
            &mut state,
        );

        let sig = eval.signal.expect("contrarian flip should survive");
        assert_eq!(sig.side, Side::Short);
        assert_eq!(sig.rule, "C-R3-trend");
        assert_eq!(sig.category, StrategyCategory::Contrarian);
        // R3 base 0.60 + large DI bonus 0.10 = 0.70; discounted to 0.56.
        assert!((sig.confidence - 0.56).abs() < 1e-9);
    }

    #[test]
    fn contrarian_floor_discards_and_records_near_miss() {
        // R3 with no bonuses: 0.60 * 0.80 = 0.48 < 0.55 floor.
        let mut ind = snapshot(Regime::Trending, 68.0);
        ind.adx = Adx {
            value: 32.0,
            plus_di: 24.0,
            minus_di: 16.0,
        };
        ind.macd.histogram = 0.9;
        let sentiment = bullish_extreme();
        let mut state = AgentState::new();

        let eval = evaluate_entry(
            &EntryContext {
                ind_1h: &ind,
                ind_15m: None,
                sentiment: Some(&sentiment),
                contrarian_draw: true,
            },
            &mut state,
        );

        assert!(eval.signal.is_none());
        assert!(eval
            .near_misses
            .iter()
            .any(|nm| nm.blocked_by == vec!["contrarian-floor".to_string()]
                && nm.side == Side::Short));
    }

    #[test]
    fn contrarian_draw_false_leaves_candidate_untouched() {
        let mut ind = snapshot(Regime::Trending, 68.0);
        ind.adx = Adx {
            value: 32.0,
            plus_di: 35.0,
            minus_di: 10.0,
        };
        ind.macd.histogram = 0.9;
        let sentiment = bullish_extreme();
        let mut state = AgentState::new();

        let eval = evaluate_entry(
            &EntryContext {
                ind_1h: &ind,
                ind_15m: None,
                sentiment: Some(&sentiment),
                contrarian_draw: false,
            },
            &mut state,
        );

        assert_eq!(eval.signal.unwrap().rule, "R3-trend");
    }

    #[test]
    fn near_miss_requires_small_margin() {
        // RSI 33 in a quiet regime: one failed gate, within margin.
        let ind = snapshot(Regime::Quiet, 33.0);
        let mut state = AgentState::new();

        let eval = evaluate_entry(&ctx(&ind), &mut state);

        assert!(eval.signal.is_none());
        let nm = eval
            .near_misses
            .iter()
            .find(|nm| nm.rule == "R1-mean-reversion")
            .expect("near miss recorded");
        assert_eq!(nm.blocked_by, vec!["rsi-extreme".to_string()]);
        assert_eq!(nm.side, Side::Long);
    }

    #[test]
    fn three_or_more_failed_gates_never_record() {
        // Trending regime, weak ADX, wrong DI, neutral RSI: R1 fails the
        // regime gate hard and the trend rules fail 3+ gates.
        let ind = snapshot(Regime::Quiet, 50.0);
        let mut state = AgentState::new();

        let eval = evaluate_entry(&ctx(&ind), &mut state);

        assert!(eval.signal.is_none());
        assert!(eval.near_misses.is_empty());
    }
}
