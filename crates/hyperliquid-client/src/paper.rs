use std::collections::HashMap;

use agent_core::{
    Balance, Exchange, ExchangeError, ExchangePosition, MarketOrderRequest, OrderResult,
    OrderStatus, Side,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Dry-run venue: fills every market order instantly at the last mark price
/// and keeps balance/position state in memory. The control loop pushes mark
/// prices into it each cycle via [`set_mark`](PaperExchange::set_mark).
pub struct PaperExchange {
    book: RwLock<Book>,
}

struct Book {
    available: f64,
    margin_used: f64,
    marks: HashMap<String, f64>,
    positions: HashMap<String, PaperPosition>,
}

struct PaperPosition {
    side: Side,
    entry_price: f64,
    size: f64,
    leverage: u32,
    margin: f64,
}

impl PaperExchange {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            book: RwLock::new(Book {
                available: starting_balance,
                margin_used: 0.0,
                marks: HashMap::new(),
                positions: HashMap::new(),
            }),
        }
    }

    /// Record the latest mark price for a coin. Fills and unrealized PnL
    /// are computed against these.
    pub async fn set_mark(&self, coin: &str, price: f64) {
        let mut book = self.book.write().await;
        book.marks.insert(coin.to_string(), price);
    }
}

fn unrealized(side: Side, entry: f64, mark: f64, size: f64) -> f64 {
    side.sign() * (mark - entry) * size
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn fetch_balance(&self) -> Result<Balance> {
        let book = self.book.read().await;
        let unrealized_total: f64 = book
            .positions
            .iter()
            .map(|(coin, p)| {
                let mark = book.marks.get(coin).copied().unwrap_or(p.entry_price);
                unrealized(p.side, p.entry_price, mark, p.size)
            })
            .sum();
        Ok(Balance {
            available: book.available,
            account_value: book.available + book.margin_used + unrealized_total,
            margin_used: book.margin_used,
        })
    }

    async fn fetch_positions(&self) -> Result<Vec<ExchangePosition>> {
        let book = self.book.read().await;
        Ok(book
            .positions
            .iter()
            .map(|(coin, p)| {
                let mark = book.marks.get(coin).copied().unwrap_or(p.entry_price);
                ExchangePosition {
                    coin: coin.clone(),
                    side: p.side,
                    entry_price: p.entry_price,
                    size: p.size,
                    leverage: p.leverage,
                    unrealized_pnl: unrealized(p.side, p.entry_price, mark, p.size),
                }
            })
            .collect())
    }

    async fn fetch_mid(&self, coin: &str) -> Result<f64> {
        let book = self.book.read().await;
        book.marks
            .get(coin)
            .copied()
            .ok_or_else(|| anyhow!("no mark price recorded for {}", coin))
    }

    async fn place_market_order(&self, req: &MarketOrderRequest) -> Result<OrderResult> {
        let mut book = self.book.write().await;

        if book.positions.contains_key(&req.coin) {
            return Err(
                ExchangeError::Rejected(format!("position already open for {}", req.coin)).into(),
            );
        }
        let mark = book
            .marks
            .get(&req.coin)
            .copied()
            .ok_or_else(|| anyhow!("no mark price recorded for {}", req.coin))?;

        let notional = req.size * mark;
        let margin = notional / f64::from(req.leverage.max(1));
        if margin > book.available {
            return Err(ExchangeError::Rejected(format!(
                "insufficient balance: need {:.2}, have {:.2}",
                margin, book.available
            ))
            .into());
        }

        book.available -= margin;
        book.margin_used += margin;
        book.positions.insert(
            req.coin.clone(),
            PaperPosition {
                side: req.side,
                entry_price: mark,
                size: req.size,
                leverage: req.leverage,
                margin,
            },
        );

        tracing::info!(
            coin = %req.coin,
            side = req.side.as_str(),
            size = req.size,
            price = mark,
            "paper fill"
        );

        Ok(OrderResult {
            order_id: format!("paper-{}", Uuid::new_v4()),
            status: OrderStatus::Filled,
            filled_size: req.size,
            avg_price: mark,
        })
    }

    async fn close_position(&self, coin: &str) -> Result<OrderResult> {
        let mut book = self.book.write().await;
        let position = book
            .positions
            .remove(coin)
            .ok_or_else(|| anyhow!("no open position for {}", coin))?;

        let mark = book
            .marks
            .get(coin)
            .copied()
            .unwrap_or(position.entry_price);
        let realized = unrealized(position.side, position.entry_price, mark, position.size);

        book.available += position.margin + realized;
        book.margin_used -= position.margin;

        tracing::info!(coin, price = mark, realized, "paper close");

        Ok(OrderResult {
            order_id: format!("paper-{}", Uuid::new_v4()),
            status: OrderStatus::Filled,
            filled_size: position.size,
            avg_price: mark,
        })
    }

    async fn cancel_open_orders(&self, _coin: &str) -> Result<()> {
        // Market orders fill instantly; there is never a resting order.
        Ok(())
    }

    fn is_paper(&self) -> bool {
        true
    }

    fn venue_name(&self) -> &str {
        "paper"
    }
}
