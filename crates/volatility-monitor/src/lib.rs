//! Per-coin ATR volatility classification and the global polling-cadence
//! state machine.
//!
//! Each coin keeps a fixed-length rolling window of ATR readings; the class
//! is the ratio of the latest reading to the window mean. The monitor folds
//! per-coin classes into one global state that scales the loop's sleep
//! interval. State changes are edge-triggered: the caller only hears about
//! transitions, not steady state.

use std::collections::{HashMap, VecDeque};

use agent_core::VolatilityClass;
use serde::{Deserialize, Serialize};

/// Rolling window length per coin.
const WINDOW_LEN: usize = 20;
/// Readings required before a coin is classified at all.
const MIN_SAMPLES: usize = 5;

const SPIKE_RATIO: f64 = 2.5;
const ELEVATED_RATIO: f64 = 1.5;
const CALM_RATIO: f64 = 1.0;

/// Coins at elevated-or-worse needed to force the global spike state.
const HOT_COINS_FOR_SPIKE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlobalVolatility {
    Normal,
    Elevated,
    Spike,
}

impl GlobalVolatility {
    /// Multiplier applied to the configured polling interval.
    pub fn sleep_multiplier(&self) -> f64 {
        match self {
            GlobalVolatility::Normal => 1.0,
            GlobalVolatility::Elevated => 0.5,
            GlobalVolatility::Spike => 0.33,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalVolatility::Normal => "normal",
            GlobalVolatility::Elevated => "elevated",
            GlobalVolatility::Spike => "spike",
        }
    }
}

/// An edge-triggered global state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: GlobalVolatility,
    pub to: GlobalVolatility,
}

#[derive(Debug, Default)]
struct AtrWindow {
    readings: VecDeque<f64>,
}

impl AtrWindow {
    fn push(&mut self, atr: f64) {
        self.readings.push_back(atr);
        if self.readings.len() > WINDOW_LEN {
            self.readings.pop_front();
        }
    }

    fn classify(&self) -> Option<VolatilityClass> {
        if self.readings.len() < MIN_SAMPLES {
            return None;
        }
        let mean = self.readings.iter().sum::<f64>() / self.readings.len() as f64;
        if mean <= 0.0 {
            return Some(VolatilityClass::Normal);
        }
        let latest = self.readings.back().copied().unwrap_or(0.0);
        let ratio = latest / mean;

        Some(if ratio > SPIKE_RATIO {
            VolatilityClass::Spike
        } else if ratio > ELEVATED_RATIO {
            VolatilityClass::Elevated
        } else if ratio < CALM_RATIO {
            VolatilityClass::Calm
        } else {
            VolatilityClass::Normal
        })
    }
}

#[derive(Debug, Default)]
pub struct VolatilityMonitor {
    windows: HashMap<String, AtrWindow>,
    classes: HashMap<String, VolatilityClass>,
    global: Option<GlobalVolatility>,
}

impl VolatilityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one ATR reading for a coin and refresh its class.
    pub fn record_atr(&mut self, coin: &str, atr: f64) {
        let window = self.windows.entry(coin.to_string()).or_default();
        window.push(atr);
        match window.classify() {
            Some(class) => {
                self.classes.insert(coin.to_string(), class);
            }
            None => {
                self.classes.remove(coin);
            }
        }
    }

    pub fn class_of(&self, coin: &str) -> Option<VolatilityClass> {
        self.classes.get(coin).copied()
    }

    /// Fold per-coin classes into the global state. Returns the transition
    /// if the state changed, `None` on steady state.
    pub fn refresh_global(&mut self) -> Option<Transition> {
        let spiking = self
            .classes
            .values()
            .any(|c| *c == VolatilityClass::Spike);
        let hot = self.classes.values().filter(|c| c.is_hot()).count();

        let next = if spiking || hot >= HOT_COINS_FOR_SPIKE {
            GlobalVolatility::Spike
        } else if hot > 0 {
            GlobalVolatility::Elevated
        } else {
            GlobalVolatility::Normal
        };

        let prev = self.global.replace(next);
        match prev {
            Some(prev) if prev != next => {
                tracing::info!(from = prev.as_str(), to = next.as_str(), "global volatility transition");
                Some(Transition {
                    from: prev,
                    to: next,
                })
            }
            None if next != GlobalVolatility::Normal => Some(Transition {
                from: GlobalVolatility::Normal,
                to: next,
            }),
            _ => None,
        }
    }

    pub fn global(&self) -> GlobalVolatility {
        self.global.unwrap_or(GlobalVolatility::Normal)
    }
}
