use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    // Trading surface
    pub dry_run: bool,                     // simulate without order placement
    pub interval_minutes: u64,             // target polling cadence
    pub coins: Vec<String>,                // scan universe
    pub max_concurrent_positions: usize,   // hard cap on open positions
    pub max_allocation_pct: f64,           // balance share per position
    pub leverage: u32,
    pub circuit_breaker_usd: f64,          // cumulative session loss limit
    pub session_hours: f64,                // session wall-clock timeout
    pub contrarian_pct: f64,               // contrarian flip probability (0-100)
    pub volatility_detection_enabled: bool,

    // Execution details
    pub volatile_coins: Vec<String>,       // wider exit thresholds
    pub slippage_bps: u32,
    pub size_decimals: u32,
    pub min_confidence: f64,
    pub paper_starting_balance: f64,

    // Collaborator endpoints
    pub hl_api_url: String,
    pub hl_gateway_url: String,
    pub hl_wallet_address: String,         // required in live mode
    pub indicator_service_url: String,
    pub ml_scorer_url: String,
    pub sentiment_enabled: bool,
    pub sentiment_api_url: String,
    pub sentiment_api_key: String,

    // Ambient
    pub discord_webhook_url: String,
    pub database_url: String,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            dry_run: env::var("DRY_RUN")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
            interval_minutes: env::var("INTERVAL_MINUTES")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            coins: env::var("COIN_LIST")
                .unwrap_or_else(|_| "BTC,ETH,SOL,DOGE,WIF".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            max_concurrent_positions: env::var("MAX_CONCURRENT_POSITIONS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            max_allocation_pct: env::var("MAX_ALLOCATION_PCT")
                .unwrap_or_else(|_| "20.0".to_string())
                .parse()?,
            leverage: env::var("LEVERAGE")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            circuit_breaker_usd: env::var("CIRCUIT_BREAKER_USD")
                .unwrap_or_else(|_| "100.0".to_string())
                .parse()?,
            session_hours: env::var("SESSION_HOURS")
                .unwrap_or_else(|_| "12.0".to_string())
                .parse()?,
            contrarian_pct: env::var("CONTRARIAN_PCT")
                .unwrap_or_else(|_| "10.0".to_string())
                .parse()?,
            volatility_detection_enabled: env::var("VOLATILITY_DETECTION_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,

            volatile_coins: env::var("VOLATILE_COINS")
                .unwrap_or_else(|_| "DOGE,WIF,PEPE".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            slippage_bps: env::var("SLIPPAGE_BPS")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
            size_decimals: env::var("SIZE_DECIMALS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            min_confidence: env::var("MIN_CONFIDENCE")
                .unwrap_or_else(|_| "0.60".to_string())
                .parse()?,
            paper_starting_balance: env::var("PAPER_STARTING_BALANCE")
                .unwrap_or_else(|_| "10000.0".to_string())
                .parse()?,

            hl_api_url: env::var("HL_API_URL")
                .unwrap_or_else(|_| "https://api.hyperliquid.xyz".to_string()),
            hl_gateway_url: env::var("HL_GATEWAY_URL")
                .unwrap_or_else(|_| "http://localhost:3100".to_string()),
            hl_wallet_address: env::var("HL_WALLET_ADDRESS").unwrap_or_default(),
            indicator_service_url: env::var("INDICATOR_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8600".to_string()),
            ml_scorer_url: env::var("ML_SCORER_URL")
                .unwrap_or_else(|_| "http://localhost:8601".to_string()),
            sentiment_enabled: env::var("SENTIMENT_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
            sentiment_api_url: env::var("SENTIMENT_API_URL")
                .unwrap_or_else(|_| "https://lunarcrush.com/api4".to_string()),
            sentiment_api_key: env::var("SENTIMENT_API_KEY").unwrap_or_default(),

            discord_webhook_url: env::var("DISCORD_WEBHOOK_URL").unwrap_or_default(),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:perp_agent.db?mode=rwc".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.coins.is_empty() {
            bail!("COIN_LIST must name at least one coin");
        }
        if self.interval_minutes == 0 {
            bail!("INTERVAL_MINUTES must be at least 1");
        }
        if !(1..=50).contains(&self.leverage) {
            bail!("LEVERAGE must be between 1 and 50");
        }
        if self.max_allocation_pct <= 0.0 || self.max_allocation_pct > 100.0 {
            bail!("MAX_ALLOCATION_PCT must be in (0, 100]");
        }
        if !(0.0..=100.0).contains(&self.contrarian_pct) {
            bail!("CONTRARIAN_PCT must be in [0, 100]");
        }
        if self.session_hours <= 0.0 {
            bail!("SESSION_HOURS must be positive");
        }
        if self.circuit_breaker_usd <= 0.0 {
            bail!("CIRCUIT_BREAKER_USD must be positive");
        }
        if self.max_concurrent_positions == 0 {
            bail!("MAX_CONCURRENT_POSITIONS must be at least 1");
        }
        Ok(())
    }

    /// Live trading requires a wallet address for clearinghouse queries.
    /// Missing credential in live mode is a startup precondition failure.
    pub fn live_credentials_present(&self) -> bool {
        self.dry_run || !self.hl_wallet_address.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AgentConfig {
        AgentConfig {
            dry_run: true,
            interval_minutes: 5,
            coins: vec!["BTC".to_string()],
            max_concurrent_positions: 3,
            max_allocation_pct: 20.0,
            leverage: 3,
            circuit_breaker_usd: 100.0,
            session_hours: 12.0,
            contrarian_pct: 10.0,
            volatility_detection_enabled: true,
            volatile_coins: vec![],
            slippage_bps: 50,
            size_decimals: 3,
            min_confidence: 0.60,
            paper_starting_balance: 10_000.0,
            hl_api_url: String::new(),
            hl_gateway_url: String::new(),
            hl_wallet_address: String::new(),
            indicator_service_url: String::new(),
            ml_scorer_url: String::new(),
            sentiment_enabled: false,
            sentiment_api_url: String::new(),
            sentiment_api_key: String::new(),
            discord_webhook_url: String::new(),
            database_url: String::new(),
        }
    }

    #[test]
    fn validation_bounds() {
        assert!(base().validate().is_ok());

        let mut c = base();
        c.leverage = 0;
        assert!(c.validate().is_err());

        let mut c = base();
        c.max_allocation_pct = 120.0;
        assert!(c.validate().is_err());

        let mut c = base();
        c.coins.clear();
        assert!(c.validate().is_err());
    }

    #[test]
    fn dry_run_needs_no_wallet() {
        let c = base();
        assert!(c.live_credentials_present());

        let mut c = base();
        c.dry_run = false;
        assert!(!c.live_credentials_present());

        c.hl_wallet_address = "0xabc".to_string();
        assert!(c.live_credentials_present());
    }
}
