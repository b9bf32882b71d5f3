//! Blocked-signal bookkeeping: were the filters right to block?
//!
//! Near-misses recorded by the entry evaluator age here until the
//! counterfactual can be observed, then get paired with the coin's current
//! price to decide whether skipping the trade was the right call. Aggregated
//! per-rule rates feed a textual "lesson" report for the operator.

use std::collections::{BTreeMap, VecDeque};

use agent_core::pnl_pct;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use signal_engine::NearMiss;

/// Bounded retention caps, oldest pruned first.
const MAX_NEAR_MISSES: usize = 300;
const MAX_OUTCOMES: usize = 500;
/// A near-miss must be at least this old before its counterfactual is
/// observable.
const MIN_AGE_MINUTES: i64 = 60;

/// A reconciled near-miss: what the blocked trade would have done.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearMissOutcome {
    pub coin: String,
    pub rule: String,
    pub blocked_by: Vec<String>,
    pub would_have_won: bool,
    pub pnl_pct: f64,
    pub reconciled_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct NearMissRecorder {
    near_misses: VecDeque<NearMiss>,
    outcomes: VecDeque<NearMissOutcome>,
}

impl NearMissRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, near_miss: NearMiss) {
        self.near_misses.push_back(near_miss);
        while self.near_misses.len() > MAX_NEAR_MISSES {
            self.near_misses.pop_front();
        }
    }

    pub fn record_all(&mut self, near_misses: impl IntoIterator<Item = NearMiss>) {
        for nm in near_misses {
            self.record(nm);
        }
    }

    pub fn pending(&self) -> usize {
        self.near_misses.len()
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &NearMissOutcome> {
        self.outcomes.iter()
    }

    /// Remove and return every near-miss old enough to reconcile. The caller
    /// fetches current prices and hands each one back via
    /// [`record_outcome`](Self::record_outcome).
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<NearMiss> {
        let cutoff = now - Duration::minutes(MIN_AGE_MINUTES);
        let mut due = Vec::new();
        let mut keep = VecDeque::with_capacity(self.near_misses.len());
        for nm in self.near_misses.drain(..) {
            if nm.timestamp <= cutoff {
                due.push(nm);
            } else {
                keep.push_back(nm);
            }
        }
        self.near_misses = keep;
        due
    }

    /// Compute the counterfactual for one near-miss against the coin's
    /// current price and file the outcome.
    pub fn record_outcome(&mut self, near_miss: &NearMiss, current_price: f64, now: DateTime<Utc>) {
        let pnl = pnl_pct(near_miss.side, near_miss.price, current_price);
        let outcome = NearMissOutcome {
            coin: near_miss.coin.clone(),
            rule: near_miss.rule.clone(),
            blocked_by: near_miss.blocked_by.clone(),
            would_have_won: pnl > 0.0,
            pnl_pct: pnl,
            reconciled_at: now,
        };
        tracing::debug!(
            coin = %outcome.coin,
            rule = %outcome.rule,
            pnl_pct = outcome.pnl_pct,
            would_have_won = outcome.would_have_won,
            "near-miss reconciled"
        );
        self.outcomes.push_back(outcome);
        while self.outcomes.len() > MAX_OUTCOMES {
            self.outcomes.pop_front();
        }
    }

    /// Aggregate outcomes into per-rule skip accuracy.
    pub fn lesson_report(&self) -> LessonReport {
        let mut by_rule: BTreeMap<String, RuleLesson> = BTreeMap::new();
        for outcome in &self.outcomes {
            let lesson = by_rule
                .entry(outcome.rule.clone())
                .or_insert_with(|| RuleLesson {
                    rule: outcome.rule.clone(),
                    blocked: 0,
                    would_have_won: 0,
                    avg_pnl_pct: 0.0,
                });
            lesson.blocked += 1;
            if outcome.would_have_won {
                lesson.would_have_won += 1;
            }
            lesson.avg_pnl_pct += outcome.pnl_pct;
        }
        for lesson in by_rule.values_mut() {
            if lesson.blocked > 0 {
                lesson.avg_pnl_pct /= lesson.blocked as f64;
            }
        }
        LessonReport {
            generated_at: Utc::now(),
            rules: by_rule.into_values().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleLesson {
    pub rule: String,
    pub blocked: u64,
    pub would_have_won: u64,
    pub avg_pnl_pct: f64,
}

impl RuleLesson {
    /// Share of blocked trades that would have lost: how often the filter
    /// was right.
    pub fn right_to_skip_rate(&self) -> f64 {
        if self.blocked == 0 {
            return 0.0;
        }
        (self.blocked - self.would_have_won) as f64 / self.blocked as f64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonReport {
    pub generated_at: DateTime<Utc>,
    pub rules: Vec<RuleLesson>,
}

impl LessonReport {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Operator-facing summary, one line per rule.
    pub fn render(&self) -> String {
        if self.rules.is_empty() {
            return "No reconciled near-misses yet.".to_string();
        }
        let mut out = String::from("Filter lessons (right-to-skip by rule):\n");
        for lesson in &self.rules {
            out.push_str(&format!(
                "  {}: {}/{} right to skip ({:.0}%), counterfactual avg {:+.2}%\n",
                lesson.rule,
                lesson.blocked - lesson.would_have_won,
                lesson.blocked,
                lesson.right_to_skip_rate() * 100.0,
                lesson.avg_pnl_pct,
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{Adx, BollingerBands, IndicatorSnapshot, Interval, Macd, Regime, Side};

    fn near_miss(coin: &str, rule: &str, side: Side, price: f64, age_minutes: i64) -> NearMiss {
        let timestamp = Utc::now() - Duration::minutes(age_minutes);
        NearMiss {
            coin: coin.to_string(),
            side,
            rule: rule.to_string(),
            price,
            timestamp,
            reason: "test".to_string(),
            blocked_by: vec!["rsi-extreme".to_string()],
            snapshot: IndicatorSnapshot {
                coin: coin.to_string(),
                interval: Interval::H1,
                price,
                rsi: 33.0,
                macd: Macd {
                    line: 0.0,
                    signal: 0.0,
                    histogram: 0.0,
                },
                bollinger: BollingerBands {
                    upper: price * 1.03,
                    middle: price,
                    lower: price * 0.97,
                    width: 0.06,
                },
                atr: 1.0,
                adx: Adx {
                    value: 20.0,
                    plus_di: 20.0,
                    minus_di: 20.0,
                },
                regime: Regime::Ranging,
                timestamp,
            },
        }
    }

    #[test]
    fn retention_is_bounded_oldest_first() {
        let mut rec = NearMissRecorder::new();
        for i in 0..(MAX_NEAR_MISSES + 10) {
            rec.record(near_miss(&format!("C{i}"), "R1-mean-reversion", Side::Long, 100.0, 0));
        }
        assert_eq!(rec.pending(), MAX_NEAR_MISSES);
    }

    #[test]
    fn only_aged_near_misses_are_due() {
        let mut rec = NearMissRecorder::new();
        rec.record(near_miss("BTC", "R1-mean-reversion", Side::Long, 100.0, 90));
        rec.record(near_miss("ETH", "R1-mean-reversion", Side::Long, 100.0, 10));

        let due = rec.take_due(Utc::now());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].coin, "BTC");
        assert_eq!(rec.pending(), 1);
    }

    #[test]
    fn counterfactual_is_signed_by_side() {
        let mut rec = NearMissRecorder::new();
        let now = Utc::now();

        // Blocked long, price went up 2%: the filter was wrong.
        let long = near_miss("BTC", "R1-mean-reversion", Side::Long, 100.0, 90);
        rec.record_outcome(&long, 102.0, now);

        // Blocked short, price went up 2%: the filter was right.
        let short = near_miss("ETH", "R2-mean-reversion", Side::Short, 100.0, 90);
        rec.record_outcome(&short, 102.0, now);

        let outcomes: Vec<_> = rec.outcomes().collect();
        assert!(outcomes[0].would_have_won);
        assert!((outcomes[0].pnl_pct - 2.0).abs() < 1e-9);
        assert!(!outcomes[1].would_have_won);
        assert!((outcomes[1].pnl_pct + 2.0).abs() < 1e-9);
    }

    #[test]
    fn lesson_report_aggregates_per_rule() {
        let mut rec = NearMissRecorder::new();
        let now = Utc::now();

        for (price_now, _) in [(98.0, ()), (97.0, ()), (103.0, ())] {
            let nm = near_miss("BTC", "R1-mean-reversion", Side::Long, 100.0, 90);
            rec.record_outcome(&nm, price_now, now);
        }

        let report = rec.lesson_report();
        assert_eq!(report.rules.len(), 1);
        let lesson = &report.rules[0];
        assert_eq!(lesson.blocked, 3);
        assert_eq!(lesson.would_have_won, 1);
        assert!((lesson.right_to_skip_rate() - 2.0 / 3.0).abs() < 1e-9);

        let rendered = report.render();
        assert!(rendered.contains("R1-mean-reversion"));
        assert!(rendered.contains("2/3"));
    }
}
