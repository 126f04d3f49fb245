//! Capability traits the rebalance engine consumes.
//!
//! Implement these to plug in a different market-data provider or venue:
//! - [`PriceSource`]: USD unit prices per token symbol
//! - [`BalanceSource`]: current holdings per token symbol
//! - [`TradeExecutor`]: trade submission in the venue's wire format

use crate::error::Result;
use crate::exchange::types::{TradeRequest, TradeResponse};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Trait for providers of USD token prices.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch USD prices for the given symbols.
    ///
    /// Symbols the provider has no quote for are absent from the result.
    async fn get_prices(&self, symbols: &[String]) -> Result<HashMap<String, Decimal>>;
}

/// Trait for venues that report token balances.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Fetch human-readable balances keyed by symbol.
    async fn get_balances(&self) -> Result<HashMap<String, Decimal>>;
}

/// Trait for venues that execute token swaps.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    /// Submit a trade; a rejected or failed trade is an error.
    async fn execute_trade(&self, request: &TradeRequest) -> Result<TradeResponse>;
}
