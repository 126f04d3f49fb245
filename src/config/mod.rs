//! Configuration management for the portfolio rebalancer.
//!
//! Loads settings from an optional config file, `REBALANCER__*` environment
//! variables and the legacy flat variables (`RECALL_API_KEY`, ...).

use crate::error::RebalanceError;
use crate::exchange::{reference_tokens, TokenConfig, TokenRegistry};
use crate::scheduler::DailyTime;
use crate::strategy::{RebalanceConfig, TargetAllocation, TargetWeight};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Recall venue credentials and endpoint
    #[serde(default)]
    pub recall: RecallConfig,
    /// CoinGecko price feed
    #[serde(default)]
    pub coingecko: CoinGeckoConfig,
    /// Rebalancing and scheduling parameters
    #[serde(default)]
    pub trading: TradingConfig,
    /// HTTP transport settings
    #[serde(default)]
    pub http: HttpConfig,
    /// Tradable tokens
    #[serde(default = "reference_tokens")]
    pub tokens: Vec<TokenConfig>,
    /// Target weights
    #[serde(default)]
    pub portfolio: PortfolioConfig,
}

/// Recall deployment to talk to.
///
/// Only `production` (any case) selects the production API; every other
/// value falls back to the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecallEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl RecallEnvironment {
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("production") {
            RecallEnvironment::Production
        } else {
            RecallEnvironment::Sandbox
        }
    }
}

impl<'de> Deserialize<'de> for RecallEnvironment {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Bearer API key
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub environment: RecallEnvironment,
    /// Overrides the environment's base URL
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinGeckoConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_coingecko_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Local time of the daily rebalance (HH:MM)
    #[serde(default = "default_rebalance_time")]
    pub rebalance_time: String,
    /// Absolute drift that triggers rebalancing (0.0-1.0)
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: Decimal,
    /// Minimum trade value in USD
    #[serde(default = "default_min_trade_amount")]
    pub min_trade_amount: Decimal,
    /// Pause between sequential trades in milliseconds
    #[serde(default = "default_trade_delay_ms")]
    pub trade_delay_ms: u64,
    /// Portfolio report cadence in minutes, aligned to midnight
    #[serde(default = "default_report_interval_minutes")]
    pub report_interval_minutes: u32,
    /// Liquidity token every trade routes through
    #[serde(default = "default_base_asset")]
    pub base_asset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioConfig {
    #[serde(default = "default_targets")]
    pub targets: Vec<TargetWeight>,
}

// Default value functions
fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_rebalance_time() -> String {
    "09:00".to_string()
}

fn default_drift_threshold() -> Decimal {
    dec!(0.02) // 2% drift triggers rebalance
}

fn default_min_trade_amount() -> Decimal {
    dec!(10) // $10
}

fn default_trade_delay_ms() -> u64 {
    1000
}

fn default_report_interval_minutes() -> u32 {
    60
}

fn default_base_asset() -> String {
    "USDC".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_targets() -> Vec<TargetWeight> {
    vec![
        TargetWeight::new("WETH", dec!(0.4)),
        TargetWeight::new("WBTC", dec!(0.4)),
        TargetWeight::new("USDC", dec!(0.2)),
    ]
}

impl Config {
    /// Load configuration from `.env`, the config file and environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(path) => config::File::with_name(path).required(true),
            None => config::File::with_name("config").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::default().separator("__").prefix("REBALANCER"))
            .set_override_option("recall.api_key", std::env::var("RECALL_API_KEY").ok())?
            .set_override_option("recall.environment", std::env::var("RECALL_ENVIRONMENT").ok())?
            .set_override_option("coingecko.api_key", std::env::var("COINGECKO_API_KEY").ok())?
            .set_override_option("trading.rebalance_time", std::env::var("REBALANCE_TIME").ok())?
            .set_override_option("trading.drift_threshold", std::env::var("DRIFT_THRESHOLD").ok())?
            .set_override_option("trading.min_trade_amount", std::env::var("MIN_TRADE_AMOUNT").ok())?
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.trading.drift_threshold > Decimal::ZERO && self.trading.drift_threshold < Decimal::ONE,
            "drift_threshold must be between 0 and 1"
        );

        anyhow::ensure!(
            self.trading.min_trade_amount >= Decimal::ZERO,
            "min_trade_amount must not be negative"
        );

        anyhow::ensure!(
            (1..=1440).contains(&self.trading.report_interval_minutes)
                && 1440 % self.trading.report_interval_minutes == 0,
            "report_interval_minutes must divide a day"
        );

        anyhow::ensure!(self.http.timeout_secs > 0, "http timeout must be positive");

        self.rebalance_time()?;

        let allocation = self.target_allocation()?;
        self.token_registry()?.ensure_covers(&allocation)?;

        Ok(())
    }

    pub fn target_allocation(&self) -> std::result::Result<TargetAllocation, RebalanceError> {
        TargetAllocation::new(self.portfolio.targets.clone())
    }

    pub fn token_registry(&self) -> std::result::Result<TokenRegistry, RebalanceError> {
        TokenRegistry::new(self.tokens.clone(), self.trading.base_asset.clone())
    }

    pub fn rebalance_time(&self) -> Result<DailyTime> {
        self.trading
            .rebalance_time
            .parse()
            .with_context(|| format!("invalid rebalance_time '{}'", self.trading.rebalance_time))
    }

    pub fn rebalance_config(&self) -> RebalanceConfig {
        RebalanceConfig {
            drift_threshold: self.trading.drift_threshold,
            min_trade_value: self.trading.min_trade_amount,
        }
    }

    pub fn trade_delay(&self) -> Duration {
        Duration::from_millis(self.trading.trade_delay_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recall: RecallConfig::default(),
            coingecko: CoinGeckoConfig::default(),
            trading: TradingConfig::default(),
            http: HttpConfig::default(),
            tokens: reference_tokens(),
            portfolio: PortfolioConfig::default(),
        }
    }
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_coingecko_url(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            rebalance_time: default_rebalance_time(),
            drift_threshold: default_drift_threshold(),
            min_trade_amount: default_min_trade_amount(),
            trade_delay_ms: default_trade_delay_ms(),
            report_interval_minutes: default_report_interval_minutes(),
            base_asset: default_base_asset(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            targets: default_targets(),
        }
    }
}
