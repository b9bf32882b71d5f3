use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Process-lifetime per-coin bookkeeping. Owned by the control loop (single
/// writer) and passed by reference into the evaluators each cycle; no
/// evaluation touches another coin's slice.
#[derive(Debug, Default)]
pub struct AgentState {
    /// High-water mark of unrealized PnL%, used to arm trailing stops.
    peak_pnl: HashMap<String, f64>,
    /// Two-step breakout latch: a squeeze has formed and not yet resolved.
    squeeze_forming: HashMap<String, bool>,
    /// Entry timestamps for time-stop exits.
    entry_time: HashMap<String, DateTime<Utc>>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the coin's slice for a freshly opened position.
    pub fn on_entry(&mut self, coin: &str, opened_at: DateTime<Utc>) {
        self.peak_pnl.insert(coin.to_string(), 0.0);
        self.entry_time.insert(coin.to_string(), opened_at);
    }

    /// Drop the coin's position bookkeeping after an exit fill.
    pub fn on_exit(&mut self, coin: &str) {
        self.peak_pnl.remove(coin);
        self.entry_time.remove(coin);
    }

    /// Raise the high-water mark; returns the current peak.
    pub fn update_peak(&mut self, coin: &str, pnl_pct: f64) -> f64 {
        let peak = self.peak_pnl.entry(coin.to_string()).or_insert(0.0);
        if pnl_pct > *peak {
            *peak = pnl_pct;
        }
        *peak
    }

    pub fn peak(&self, coin: &str) -> f64 {
        self.peak_pnl.get(coin).copied().unwrap_or(0.0)
    }

    pub fn squeeze_forming(&self, coin: &str) -> bool {
        self.squeeze_forming.get(coin).copied().unwrap_or(false)
    }

    pub fn set_squeeze_forming(&mut self, coin: &str, forming: bool) {
        self.squeeze_forming.insert(coin.to_string(), forming);
    }

    pub fn entry_time(&self, coin: &str) -> Option<DateTime<Utc>> {
        self.entry_time.get(coin).copied()
    }
}
