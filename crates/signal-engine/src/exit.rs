use std::collections::HashSet;

use agent_core::{ExitSignal, IndicatorSnapshot, Position, Side, StrategyCategory};
use chrono::{DateTime, Duration, Utc};

use crate::params;
use crate::state::AgentState;

/// PnL-percentage thresholds for one position, selected from its coin's
/// volatility tier and its entry provenance.
#[derive(Debug, Clone, Copy)]
pub struct ExitThresholds {
    pub trail_arm: f64,
    pub trail_trigger: f64,
    pub take_profit_cap: f64,
    pub stop_loss: f64,
    pub time_stop: Duration,
}

impl ExitThresholds {
    /// Contrarian positions run tighter across the board; otherwise the
    /// volatile-coin tier widens the trailing/take-profit bands, and
    /// sentiment-origin entries get a tighter stop.
    pub fn for_position(position: &Position, volatile_coins: &HashSet<String>) -> Self {
        if position.category == StrategyCategory::Contrarian {
            return ExitThresholds {
                trail_arm: params::CONTRARIAN_TRAIL_ARM,
                trail_trigger: params::CONTRARIAN_TRAIL_TRIGGER,
                take_profit_cap: params::CONTRARIAN_TAKE_PROFIT_CAP,
                stop_loss: params::CONTRARIAN_STOP_LOSS,
                time_stop: Duration::hours(params::CONTRARIAN_TIME_STOP_HOURS),
            };
        }

        let volatile = volatile_coins.contains(&position.coin);
        let stop_loss = if position.rule == "R6-sentiment" {
            params::STOP_LOSS_SENTIMENT
        } else {
            params::STOP_LOSS
        };

        ExitThresholds {
            trail_arm: if volatile {
                params::TRAIL_ARM_VOLATILE
            } else {
                params::TRAIL_ARM
            },
            trail_trigger: if volatile {
                params::TRAIL_TRIGGER_VOLATILE
            } else {
                params::TRAIL_TRIGGER
            },
            take_profit_cap: if volatile {
                params::TAKE_PROFIT_CAP_VOLATILE
            } else {
                params::TAKE_PROFIT_CAP
            },
            stop_loss,
            time_stop: Duration::hours(params::TIME_STOP_HOURS),
        }
    }
}

/// Evaluate the exit rules for one open position, in fixed priority order;
/// first match wins. Idempotent for unchanged inputs: the only state write
/// is the peak high-water mark, which is monotonic.
pub fn evaluate_exit(
    position: &Position,
    price: f64,
    ind_1h: &IndicatorSnapshot,
    state: &mut AgentState,
    volatile_coins: &HashSet<String>,
    now: DateTime<Utc>,
) -> Option<ExitSignal> {
    let pnl = position.pnl_pct(price);
    let peak = state.update_peak(&position.coin, pnl);
    let t = ExitThresholds::for_position(position, volatile_coins);

    // 1. Trailing stop: armed once the peak clears the arm threshold.
    if peak >= t.trail_arm && pnl < t.trail_trigger {
        return Some(ExitSignal {
            rule: "EXIT-1-trailing",
            reason: format!(
                "peak {:.2}% armed trail, now {:.2}% below trigger {:.2}%",
                peak, pnl, t.trail_trigger
            ),
        });
    }

    // 2. Hard take-profit cap, independent of the trailing state.
    if pnl >= t.take_profit_cap {
        return Some(ExitSignal {
            rule: "EXIT-2-take-profit",
            reason: format!("pnl {:.2}% at cap {:.2}%", pnl, t.take_profit_cap),
        });
    }

    // 3. Stop loss.
    if pnl <= t.stop_loss {
        return Some(ExitSignal {
            rule: "EXIT-3-stop-loss",
            reason: format!("pnl {:.2}% through floor {:.2}%", pnl, t.stop_loss),
        });
    }

    // 4. Signal reversal.
    if let Some(reason) = reversal_reason(position, ind_1h) {
        return Some(ExitSignal {
            rule: "EXIT-4-reversal",
            reason,
        });
    }

    // 5. Time stop for stale, flat positions.
    let opened_at = state.entry_time(&position.coin).unwrap_or(position.opened_at);
    if now - opened_at > t.time_stop && pnl.abs() <= params::FLAT_BAND {
        return Some(ExitSignal {
            rule: "EXIT-5-time-stop",
            reason: format!(
                "flat at {:.2}% after {}h",
                pnl,
                (now - opened_at).num_hours()
            ),
        });
    }

    None
}

fn reversal_reason(position: &Position, ind: &IndicatorSnapshot) -> Option<String> {
    // Trend-origin positions exit when the trend evaporates.
    if position.category == StrategyCategory::Trend {
        if ind.adx.value < params::ADX_COLLAPSE {
            return Some(format!(
                "ADX collapsed to {:.1} below {:.1}",
                ind.adx.value,
                params::ADX_COLLAPSE
            ));
        }
        if ind.adx.spread_for(position.side) < 0.0 {
            return Some(format!(
                "DI flipped against {} (+DI {:.1} / -DI {:.1})",
                position.side.as_str(),
                ind.adx.plus_di,
                ind.adx.minus_di
            ));
        }
    }

    // Any position exits on RSI reaching the opposite extreme.
    let opposite_extreme = match position.side {
        Side::Long => ind.rsi >= params::RSI_OVERBOUGHT,
        Side::Short => ind.rsi <= params::RSI_OVERSOLD,
    };
    if opposite_extreme {
        return Some(format!(
            "RSI {:.1} at opposite extreme for {}",
            ind.rsi,
            position.side.as_str()
        ));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{Adx, BollingerBands, Interval, Macd, Regime};

    fn position(rule: &str, category: StrategyCategory) -> Position {
        Position {
            coin: "DOGE".to_string(),
            side: Side::Long,
            entry_price: 100.0,
            size: 10.0,
            leverage: 3,
            opened_at: Utc::now(),
            rule: rule.to_string(),
            category,
        }
    }

    fn snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            coin: "DOGE".to_string(),
            interval: Interval::H1,
            price: 100.0,
            rsi: 50.0,
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
                value: 30.0,
                plus_di: 25.0,
                minus_di: 10.0,
            },
            regime: Regime::Trending,
            timestamp: Utc::now(),
        }
    }

    fn volatile() -> HashSet<String> {
        ["DOGE".to_string()].into_iter().collect()
    }

    #[test]
    fn trailing_stop_fires_after_arm_and_fallback() {
        let pos = position("R3-trend", StrategyCategory::Trend);
        let mut state = AgentState::new();
        state.on_entry("DOGE", pos.opened_at);

        // Peak 2.5% clears the volatile-coin arm threshold of 2%.
        state.update_peak("DOGE", 2.5);

        // Now at +0.4%, below the 0.8% trigger.
        let exit = evaluate_exit(&pos, 100.4, &snapshot(), &mut state, &volatile(), Utc::now());
        assert_eq!(exit.unwrap().rule, "EXIT-1-trailing");

        // Idempotent under repeated evaluation with unchanged inputs.
        let again = evaluate_exit(&pos, 100.4, &snapshot(), &mut state, &volatile(), Utc::now());
        assert_eq!(again.unwrap().rule, "EXIT-1-trailing");
    }

    #[test]
    fn trailing_stop_not_armed_without_peak() {
        let pos = position("R3-trend", StrategyCategory::Trend);
        let mut state = AgentState::new();
        state.on_entry("DOGE", pos.opened_at);

        let exit = evaluate_exit(&pos, 100.4, &snapshot(), &mut state, &volatile(), Utc::now());
        assert!(exit.is_none());
    }

    #[test]
    fn take_profit_cap_ignores_trailing_state() {
        let pos = position("R3-trend", StrategyCategory::Trend);
        let mut state = AgentState::new();
        state.on_entry("DOGE", pos.opened_at);

        // +6.5% on a volatile coin: straight through the 6% cap.
        let exit = evaluate_exit(&pos, 106.5, &snapshot(), &mut state, &volatile(), Utc::now());
        assert_eq!(exit.unwrap().rule, "EXIT-2-take-profit");
    }

    #[test]
    fn stop_loss_tighter_for_sentiment_origin() {
        let mut state = AgentState::new();
        let coins = HashSet::new();

        // -1.7%: inside the normal -2% floor but through the -1.5%
        // sentiment-rule floor.
        let pos = position("R6-sentiment", StrategyCategory::SentimentConfirmed);
        state.on_entry("DOGE", pos.opened_at);
        let exit = evaluate_exit(&pos, 98.3, &snapshot(), &mut state, &coins, Utc::now());
        assert_eq!(exit.unwrap().rule, "EXIT-3-stop-loss");

        let pos = position("R3-trend", StrategyCategory::Trend);
        state.on_exit("DOGE");
        state.on_entry("DOGE", pos.opened_at);
        let exit = evaluate_exit(&pos, 98.3, &snapshot(), &mut state, &coins, Utc::now());
        assert!(exit.map(|e| e.rule) != Some("EXIT-3-stop-loss"));
    }

    #[test]
    fn reversal_on_adx_collapse_for_trend_origin() {
        let pos = position("R3-trend", StrategyCategory::Trend);
        let mut state = AgentState::new();
        state.on_entry("DOGE", pos.opened_at);

        let mut ind = snapshot();
        ind.adx.value = 15.0;
        let exit = evaluate_exit(&pos, 100.5, &ind, &mut state, &volatile(), Utc::now());
        assert_eq!(exit.unwrap().rule, "EXIT-4-reversal");
    }

    #[test]
    fn reversal_on_di_flip_for_trend_origin() {
        let pos = position("R3-trend", StrategyCategory::Trend);
        let mut state = AgentState::new();
        state.on_entry("DOGE", pos.opened_at);

        let mut ind = snapshot();
        ind.adx.plus_di = 10.0;
        ind.adx.minus_di = 25.0;
        let exit = evaluate_exit(&pos, 100.5, &ind, &mut state, &volatile(), Utc::now());
        assert_eq!(exit.unwrap().rule, "EXIT-4-reversal");
    }

    #[test]
    fn no_adx_reversal_for_mean_reversion_origin() {
        let pos = position("R1-mean-reversion", StrategyCategory::MeanReversion);
        let mut state = AgentState::new();
        state.on_entry("DOGE", pos.opened_at);

        let mut ind = snapshot();
        ind.adx.value = 15.0;
        let exit = evaluate_exit(&pos, 100.5, &ind, &mut state, &volatile(), Utc::now());
        assert!(exit.is_none());
    }

    #[test]
    fn rsi_opposite_extreme_exits_any_position() {
        let pos = position("R1-mean-reversion", StrategyCategory::MeanReversion);
        let mut state = AgentState::new();
        state.on_entry("DOGE", pos.opened_at);

        let mut ind = snapshot();
        ind.rsi = 72.0;
        let exit = evaluate_exit(&pos, 100.5, &ind, &mut state, &volatile(), Utc::now());
        assert_eq!(exit.unwrap().rule, "EXIT-4-reversal");
    }

    #[test]
    fn time_stop_fires_only_when_flat() {
        let mut pos = position("R1-mean-reversion", StrategyCategory::MeanReversion);
        pos.opened_at = Utc::now() - Duration::hours(7);
        let mut state = AgentState::new();
        state.on_entry("DOGE", pos.opened_at);

        // Flat at +0.1% after 7h.
        let exit = evaluate_exit(&pos, 100.1, &snapshot(), &mut state, &volatile(), Utc::now());
        assert_eq!(exit.unwrap().rule, "EXIT-5-time-stop");

        // Same age but +1.0%: not flat, no exit.
        state.on_exit("DOGE");
        state.on_entry("DOGE", pos.opened_at);
        let exit = evaluate_exit(&pos, 101.0, &snapshot(), &mut state, &volatile(), Utc::now());
        assert!(exit.is_none());
    }

    #[test]
    fn contrarian_positions_use_tight_thresholds() {
        let pos = position("C-R3-trend", StrategyCategory::Contrarian);
        let mut state = AgentState::new();
        state.on_entry("DOGE", pos.opened_at);

        // +2.7% clears the 2.5% contrarian cap (normal volatile cap is 6%).
        let exit = evaluate_exit(&pos, 102.7, &snapshot(), &mut state, &volatile(), Utc::now());
        assert_eq!(exit.unwrap().rule, "EXIT-2-take-profit");

        // Contrarian stop at -1.2%.
        state.on_exit("DOGE");
        state.on_entry("DOGE", pos.opened_at);
        let exit = evaluate_exit(&pos, 98.7, &snapshot(), &mut state, &volatile(), Utc::now());
        assert_eq!(exit.unwrap().rule, "EXIT-3-stop-loss");
    }

    #[test]
    fn contrarian_falls_through_to_reversal_checks() {
        let pos = position("C-R3-trend", StrategyCategory::Contrarian);
        let mut state = AgentState::new();
        state.on_entry("DOGE", pos.opened_at);

        let mut ind = snapshot();
        ind.rsi = 75.0;
        let exit = evaluate_exit(&pos, 100.2, &ind, &mut state, &volatile(), Utc::now());
        assert_eq!(exit.unwrap().rule, "EXIT-4-reversal");
    }

    #[test]
    fn short_position_pnl_is_signed() {
        let mut pos = position("R4-trend", StrategyCategory::Trend);
        pos.side = Side::Short;
        let mut state = AgentState::new();
        state.on_entry("DOGE", pos.opened_at);

        // Price dropped 7%: short is +7%, through the volatile cap.
        let mut ind = snapshot();
        ind.adx.plus_di = 10.0;
        ind.adx.minus_di = 25.0;
        let exit = evaluate_exit(&pos, 93.0, &ind, &mut state, &volatile(), Utc::now());
        assert_eq!(exit.unwrap().rule, "EXIT-2-take-profit");
    }
}
