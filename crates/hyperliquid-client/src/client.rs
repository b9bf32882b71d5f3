use std::collections::HashMap;
use std::time::Duration;

use agent_core::{
    Balance, Exchange, ExchangeError, ExchangePosition, MarketOrderRequest, OrderResult,
    OrderStatus, Side,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::models::*;

/// Live Hyperliquid client. Reads go to the venue's `/info` endpoint;
/// order placement goes through the local signing gateway, which owns the
/// wallet key and the EIP-712 signing ceremony.
pub struct HyperliquidClient {
    client: Client,
    api_url: String,
    gateway_url: String,
    wallet_address: String,
}

impl HyperliquidClient {
    pub fn new(api_url: String, gateway_url: String, wallet_address: String) -> Result<Self> {
        if wallet_address.is_empty() {
            return Err(ExchangeError::MissingCredential("HL_WALLET_ADDRESS").into());
        }
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            api_url,
            gateway_url,
            wallet_address,
        })
    }

    async fn info<T: serde::de::DeserializeOwned>(&self, req: &InfoRequest) -> Result<T> {
        let url = format!("{}/info", self.api_url);
        let response = self
            .client
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Rejected(text).into());
        }
        Ok(response.json::<T>().await?)
    }

    async fn gateway(&self, path: &str, body: &impl serde::Serialize) -> Result<GatewayOrderResponse> {
        let url = format!("{}{}", self.gateway_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Rejected(text).into());
        }
        Ok(response.json::<GatewayOrderResponse>().await?)
    }
}

fn parse_f64(s: &str) -> f64 {
    s.parse().unwrap_or(0.0)
}

fn to_order_result(resp: GatewayOrderResponse) -> OrderResult {
    let status = match resp.status.as_str() {
        "filled" => OrderStatus::Filled,
        "resting" => OrderStatus::Resting,
        _ => OrderStatus::Rejected,
    };
    OrderResult {
        order_id: resp.order_id,
        status,
        filled_size: resp.filled_size,
        avg_price: resp.avg_price,
    }
}

#[async_trait]
impl Exchange for HyperliquidClient {
    async fn fetch_balance(&self) -> Result<Balance> {
        let state: ClearinghouseState = self
            .info(&InfoRequest::ClearinghouseState {
                user: self.wallet_address.clone(),
            })
            .await?;

        Ok(Balance {
            available: parse_f64(&state.withdrawable),
            account_value: parse_f64(&state.margin_summary.account_value),
            margin_used: parse_f64(&state.margin_summary.total_margin_used),
        })
    }

    async fn fetch_positions(&self) -> Result<Vec<ExchangePosition>> {
        let state: ClearinghouseState = self
            .info(&InfoRequest::ClearinghouseState {
                user: self.wallet_address.clone(),
            })
            .await?;

        let mut positions = Vec::new();
        for ap in state.asset_positions {
            let szi = parse_f64(&ap.position.szi);
            if szi == 0.0 {
                continue;
            }
            positions.push(ExchangePosition {
                coin: ap.position.coin,
                side: if szi > 0.0 { Side::Long } else { Side::Short },
                entry_price: ap.position.entry_px.as_deref().map(parse_f64).unwrap_or(0.0),
                size: szi.abs(),
                leverage: ap.position.leverage.value,
                unrealized_pnl: parse_f64(&ap.position.unrealized_pnl),
            });
        }
        Ok(positions)
    }

    async fn fetch_mid(&self, coin: &str) -> Result<f64> {
        let mids: HashMap<String, String> = self.info(&InfoRequest::AllMids).await?;
        mids.get(coin)
            .map(|s| parse_f64(s))
            .filter(|p| *p > 0.0)
            .ok_or_else(|| anyhow!("no mid price for {}", coin))
    }

    async fn place_market_order(&self, req: &MarketOrderRequest) -> Result<OrderResult> {
        tracing::info!(
            coin = %req.coin,
            side = req.side.as_str(),
            size = req.size,
            leverage = req.leverage,
            "submitting market order"
        );
        let body = GatewayOrderRequest {
            coin: &req.coin,
            side: req.side.as_str(),
            size: req.size,
            leverage: req.leverage,
            slippage_bps: req.slippage_bps,
            take_profit: req.tp_sl.map(|t| t.take_profit),
            stop_loss: req.tp_sl.map(|t| t.stop_loss),
        };
        let resp = self.gateway("/order", &body).await?;
        tracing::info!(order_id = %resp.order_id, status = %resp.status, "order accepted");
        Ok(to_order_result(resp))
    }

    async fn close_position(&self, coin: &str) -> Result<OrderResult> {
        let resp = self
            .gateway("/close", &serde_json::json!({ "coin": coin }))
            .await?;
        Ok(to_order_result(resp))
    }

    async fn cancel_open_orders(&self, coin: &str) -> Result<()> {
        self.gateway("/cancel", &serde_json::json!({ "coin": coin }))
            .await?;
        tracing::info!(coin, "open orders cancelled");
        Ok(())
    }

    fn is_paper(&self) -> bool {
        false
    }

    fn venue_name(&self) -> &str {
        "hyperliquid"
    }
}
