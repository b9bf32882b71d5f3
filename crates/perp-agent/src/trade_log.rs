use agent_core::{Position, Signal};
use anyhow::Result;

/// Sqlite-backed persistence for sessions, trades, and key-value agent
/// state (filter lessons live under the `filter_lessons` key).
///
/// Every caller treats failures here as non-fatal: log and move on, never
/// block a trading decision.
pub struct TradeLog {
    pub(crate) db_pool: sqlx::AnyPool,
}

impl TradeLog {
    pub fn new(db_pool: sqlx::AnyPool) -> Self {
        Self { db_pool }
    }

    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS agent_sessions (
                id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                config_json TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'running',
                realized_pnl REAL DEFAULT 0,
                wins INTEGER DEFAULT 0,
                losses INTEGER DEFAULT 0,
                cycles INTEGER DEFAULT 0,
                closed_at TEXT
            )",
        )
        .execute(&self.db_pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS agent_trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                coin TEXT NOT NULL,
                side TEXT NOT NULL,
                rule TEXT NOT NULL,
                category TEXT NOT NULL,
                confidence REAL,
                size REAL NOT NULL,
                leverage INTEGER NOT NULL,
                entry_price REAL NOT NULL,
                opened_at TEXT NOT NULL,
                exit_rule TEXT,
                exit_price REAL,
                pnl REAL,
                pnl_pct REAL,
                closed_at TEXT,
                status TEXT NOT NULL DEFAULT 'open'
            )",
        )
        .execute(&self.db_pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS agent_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.db_pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_session ON agent_trades(session_id)")
            .execute(&self.db_pool)
            .await
            .ok();
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_status ON agent_trades(status)")
            .execute(&self.db_pool)
            .await
            .ok();

        Ok(())
    }

    pub async fn register_session(&self, session_id: &str, config_json: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_sessions (id, started_at, config_json) VALUES (?, ?, ?)",
        )
        .bind(session_id)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(config_json)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    pub async fn close_session(
        &self,
        session_id: &str,
        status: &str,
        realized_pnl: f64,
        wins: u64,
        losses: u64,
        cycles: u64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE agent_sessions
             SET status = ?, realized_pnl = ?, wins = ?, losses = ?, cycles = ?, closed_at = ?
             WHERE id = ?",
        )
        .bind(status)
        .bind(realized_pnl)
        .bind(wins as i64)
        .bind(losses as i64)
        .bind(cycles as i64)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(session_id)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    /// Record a filled entry. Returns the trade row id for the matching
    /// close later.
    pub async fn log_trade_open(
        &self,
        session_id: &str,
        position: &Position,
        signal: &Signal,
    ) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO agent_trades (
                session_id, coin, side, rule, category, confidence,
                size, leverage, entry_price, opened_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id",
        )
        .bind(session_id)
        .bind(&position.coin)
        .bind(position.side.as_str())
        .bind(&position.rule)
        .bind(position.category.as_str())
        .bind(signal.confidence)
        .bind(position.size)
        .bind(position.leverage as i64)
        .bind(position.entry_price)
        .bind(position.opened_at.to_rfc3339())
        .fetch_one(&self.db_pool)
        .await?;
        Ok(id)
    }

    pub async fn log_trade_close(
        &self,
        trade_id: i64,
        exit_rule: &str,
        exit_price: f64,
        pnl: f64,
        pnl_pct: f64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE agent_trades
             SET exit_rule = ?, exit_price = ?, pnl = ?, pnl_pct = ?,
                 closed_at = ?, status = 'closed'
             WHERE id = ?",
        )
        .bind(exit_rule)
        .bind(exit_price)
        .bind(pnl)
        .bind(pnl_pct)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(trade_id)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    pub async fn save_state(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_state (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    pub async fn load_state(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM agent_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }
}
