//! Allocation-limited position sizing.
//!
//! Margin is a fixed slice of available balance scaled by a per-rule
//! reliability factor; notional is margin times leverage; size is notional
//! at the current price, rounded to the asset's size precision. Anything
//! below the minimum notional floor is rejected.

use agent_core::{Signal, StrategyCategory};
use anyhow::{bail, Result};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Orders whose notional lands under this are not worth the fees.
pub const MIN_NOTIONAL_USD: f64 = 10.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSizer {
    /// Share of available balance allocatable to one position, in percent.
    pub max_alloc_pct: f64,
    /// Size precision (decimal places) for the asset.
    pub size_decimals: u32,
}

/// A sized, ready-to-submit order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SizedOrder {
    pub size: f64,
    pub notional: f64,
    pub margin: f64,
}

impl PositionSizer {
    pub fn new(max_alloc_pct: f64, size_decimals: u32) -> Result<Self> {
        if max_alloc_pct <= 0.0 || max_alloc_pct > 100.0 {
            bail!("max_alloc_pct must be in (0, 100]");
        }
        Ok(Self {
            max_alloc_pct,
            size_decimals,
        })
    }

    /// Size an approved signal, or reject it (`None`) when the result would
    /// be below the minimum notional floor or round to nothing.
    pub fn size_order(
        &self,
        available_balance: f64,
        signal: &Signal,
        price: f64,
        leverage: u32,
    ) -> Option<SizedOrder> {
        if available_balance <= 0.0 || price <= 0.0 {
            return None;
        }

        let margin = available_balance * (self.max_alloc_pct / 100.0) * scale_factor(signal);
        let notional = margin * f64::from(leverage);

        if notional < MIN_NOTIONAL_USD {
            tracing::debug!(
                coin = %signal.coin,
                notional,
                "sized order below minimum notional, rejecting"
            );
            return None;
        }

        let raw_size = Decimal::from_f64(notional / price)?;
        let size = raw_size
            .round_dp(self.size_decimals)
            .to_f64()
            .unwrap_or(0.0);
        if size <= 0.0 {
            return None;
        }

        Some(SizedOrder {
            size,
            notional,
            margin,
        })
    }
}

/// Per-rule sizing multiplier. Empirically weaker setups get less capital;
/// contrarian fades get the least.
pub fn scale_factor(signal: &Signal) -> f64 {
    if signal.category == StrategyCategory::Contrarian {
        return 0.5;
    }
    match signal.rule.as_str() {
        "R1-mean-reversion" | "R2-mean-reversion" => 0.9,
        "R3-trend" => 1.0,
        "R4-trend" => 0.85,
        "R5-breakout" => 0.7,
        "R6-sentiment" => 0.6,
        _ => 0.8,
    }
}
