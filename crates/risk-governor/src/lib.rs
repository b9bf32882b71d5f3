//! Session accounting and the two terminal risk conditions.
//!
//! The circuit breaker (cumulative realized loss) and the session timeout
//! are checked once per cycle; either verdict ends the loop for the rest of
//! the process lifetime. Neither is an error path: they are the designed
//! way for a session to end.

use agent_core::StrategyCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why the loop must stop, or that it may continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskVerdict {
    Continue,
    /// Cumulative realized loss breached the limit: close everything and
    /// stop.
    CircuitBreaker,
    /// Session ran out of wall-clock time: stop, positions stay open.
    SessionTimeout,
}

/// Process-lifetime session aggregate. Single writer: the control loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub started_at: DateTime<Utc>,
    pub realized_pnl: f64,
    pub wins: u64,
    pub losses: u64,
    pub contrarian_wins: u64,
    pub contrarian_losses: u64,
    pub cycles: u64,
    pub consecutive_errors: u32,

    circuit_breaker_usd: f64,
    session_hours: f64,
}

impl Session {
    pub fn new(circuit_breaker_usd: f64, session_hours: f64, started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            realized_pnl: 0.0,
            wins: 0,
            losses: 0,
            contrarian_wins: 0,
            contrarian_losses: 0,
            cycles: 0,
            consecutive_errors: 0,
            circuit_breaker_usd,
            session_hours,
        }
    }

    /// Record a closed trade's realized PnL.
    pub fn record_close(&mut self, pnl: f64, category: StrategyCategory) {
        self.realized_pnl += pnl;
        let won = pnl > 0.0;
        if won {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        if category == StrategyCategory::Contrarian {
            if won {
                self.contrarian_wins += 1;
            } else {
                self.contrarian_losses += 1;
            }
        }
    }

    pub fn record_cycle(&mut self) {
        self.cycles += 1;
    }

    pub fn record_cycle_error(&mut self) -> u32 {
        self.consecutive_errors += 1;
        self.consecutive_errors
    }

    pub fn reset_errors(&mut self) {
        self.consecutive_errors = 0;
    }

    pub fn win_rate(&self) -> f64 {
        let total = self.wins + self.losses;
        if total == 0 {
            return 0.0;
        }
        self.wins as f64 / total as f64
    }

    pub fn contrarian_win_rate(&self) -> f64 {
        let total = self.contrarian_wins + self.contrarian_losses;
        if total == 0 {
            return 0.0;
        }
        self.contrarian_wins as f64 / total as f64
    }

    /// Evaluate both terminal conditions. The circuit breaker is a pure
    /// threshold on cumulative realized PnL; the timeout is pure wall clock.
    pub fn check(&self, now: DateTime<Utc>) -> RiskVerdict {
        if self.realized_pnl < -self.circuit_breaker_usd {
            tracing::warn!(
                realized_pnl = self.realized_pnl,
                limit = -self.circuit_breaker_usd,
                "circuit breaker tripped"
            );
            return RiskVerdict::CircuitBreaker;
        }

        let elapsed_hours = (now - self.started_at).num_seconds() as f64 / 3600.0;
        if elapsed_hours > self.session_hours {
            tracing::info!(elapsed_hours, limit = self.session_hours, "session timeout");
            return RiskVerdict::SessionTimeout;
        }

        RiskVerdict::Continue
    }
}
