//! Token table: venue addresses, decimal precision and price-feed ids.

use crate::error::{RebalanceError, Result};
use crate::exchange::types::TradeRequest;
use crate::strategy::TargetAllocation;
use crate::utils::decimal::{self, MAX_DECIMALS};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Static description of a tradable token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    /// Contract address the venue identifies the token by
    pub address: String,
    /// Decimal precision of the token's base units
    pub decimals: u32,
    /// CoinGecko coin id used for USD prices
    pub coingecko_id: String,
}

impl TokenConfig {
    pub fn new(symbol: &str, address: &str, decimals: u32, coingecko_id: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            address: address.to_string(),
            decimals,
            coingecko_id: coingecko_id.to_string(),
        }
    }
}

/// USDC, WETH and WBTC on Ethereum mainnet.
pub fn reference_tokens() -> Vec<TokenConfig> {
    vec![
        TokenConfig::new("USDC", "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6, "usd-coin"),
        TokenConfig::new("WETH", "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", 18, "weth"),
        TokenConfig::new("WBTC", "0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599", 8, "wrapped-bitcoin"),
    ]
}

/// Validated token table plus the base (liquidity) asset.
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    tokens: Vec<TokenConfig>,
    base_asset: String,
}

impl TokenRegistry {
    pub fn new(tokens: Vec<TokenConfig>, base_asset: impl Into<String>) -> Result<Self> {
        let base_asset = base_asset.into();

        if tokens.is_empty() {
            return Err(RebalanceError::Configuration("token table is empty".into()));
        }

        let mut symbols = HashSet::new();
        for token in &tokens {
            if !symbols.insert(token.symbol.as_str()) {
                return Err(RebalanceError::Configuration(format!(
                    "duplicate token: {}",
                    token.symbol
                )));
            }
            if token.decimals > MAX_DECIMALS {
                return Err(RebalanceError::Configuration(format!(
                    "{} has {} decimals, at most {} supported",
                    token.symbol, token.decimals, MAX_DECIMALS
                )));
            }
            if token.address.trim().is_empty() {
                return Err(RebalanceError::Configuration(format!(
                    "{} has no address",
                    token.symbol
                )));
            }
        }

        if !symbols.contains(base_asset.as_str()) {
            return Err(RebalanceError::Configuration(format!(
                "base asset {} is not in the token table",
                base_asset
            )));
        }

        Ok(Self { tokens, base_asset })
    }

    /// Registry over [`reference_tokens`] with USDC as base asset.
    pub fn reference() -> Self {
        Self {
            tokens: reference_tokens(),
            base_asset: "USDC".to_string(),
        }
    }

    pub fn base_asset(&self) -> &str {
        &self.base_asset
    }

    pub fn get(&self, symbol: &str) -> Result<&TokenConfig> {
        self.tokens
            .iter()
            .find(|t| t.symbol == symbol)
            .ok_or_else(|| RebalanceError::UnknownToken(symbol.to_string()))
    }

    /// Look a token up by contract address (case-insensitive).
    pub fn by_address(&self, address: &str) -> Option<&TokenConfig> {
        self.tokens
            .iter()
            .find(|t| t.address.eq_ignore_ascii_case(address))
    }

    pub fn symbols(&self) -> Vec<String> {
        self.tokens.iter().map(|t| t.symbol.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TokenConfig> {
        self.tokens.iter()
    }

    /// Every allocation symbol must be tradable.
    pub fn ensure_covers(&self, allocation: &TargetAllocation) -> Result<()> {
        for symbol in allocation.symbols() {
            self.get(symbol).map_err(|_| {
                RebalanceError::Configuration(format!("no token config for target {}", symbol))
            })?;
        }
        Ok(())
    }

    pub fn to_base_units(&self, amount: Decimal, symbol: &str) -> Result<String> {
        decimal::to_base_units(amount, self.get(symbol)?.decimals)
    }

    pub fn from_base_units(&self, units: &str, symbol: &str) -> Result<Decimal> {
        decimal::from_base_units(units, self.get(symbol)?.decimals)
    }

    /// Build a trade from `from_symbol` to `to_symbol`, with `amount` in
    /// human-readable units of the source token.
    pub fn create_trade_request(
        &self,
        from_symbol: &str,
        to_symbol: &str,
        amount: Decimal,
        reason: &str,
    ) -> Result<TradeRequest> {
        let from = self.get(from_symbol)?;
        let to = self.get(to_symbol)?;

        Ok(TradeRequest {
            from_token: from.address.clone(),
            to_token: to.address.clone(),
            amount: decimal::to_base_units(amount, from.decimals)?,
            reason: reason.to_string(),
        })
    }
}
