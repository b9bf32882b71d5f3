use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /info wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InfoRequest {
    AllMids,
    #[serde(rename_all = "camelCase")]
    ClearinghouseState {
        user: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearinghouseState {
    pub margin_summary: MarginSummary,
    pub withdrawable: String,
    #[serde(default)]
    pub asset_positions: Vec<AssetPosition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginSummary {
    pub account_value: String,
    pub total_margin_used: String,
}

#[derive(Debug, Deserialize)]
pub struct AssetPosition {
    pub position: WirePosition,
}

/// Venue position: signed size (`szi`), positive for longs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePosition {
    pub coin: String,
    pub szi: String,
    pub entry_px: Option<String>,
    pub leverage: WireLeverage,
    pub unrealized_pnl: String,
}

#[derive(Debug, Deserialize)]
pub struct WireLeverage {
    pub value: u32,
}

// ---------------------------------------------------------------------------
// Signing-gateway wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayOrderRequest<'a> {
    pub coin: &'a str,
    pub side: &'a str,
    pub size: f64,
    pub leverage: u32,
    pub slippage_bps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayOrderResponse {
    pub order_id: String,
    pub status: String,
    pub filled_size: f64,
    pub avg_price: f64,
}
