//! Type definitions for Recall and CoinGecko API payloads.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Trade instruction in the venue's wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    /// Source token address
    pub from_token: String,
    /// Destination token address
    pub to_token: String,
    /// Integer amount in base units of the source token
    pub amount: String,
    pub reason: String,
}

/// Venue reply to a trade submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    /// Everything else the venue returned (transaction details etc.)
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

fn default_success() -> bool {
    true
}

impl TradeResponse {
    /// A bare successful response.
    pub fn accepted() -> Self {
        Self {
            success: true,
            error: None,
            details: serde_json::Map::new(),
        }
    }

    pub fn status(&self) -> &'static str {
        if self.success {
            "success"
        } else {
            "failed"
        }
    }
}

/// Agent portfolio as returned by `GET /api/agent/portfolio`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPortfolio {
    #[serde(default)]
    pub tokens: Vec<TokenHolding>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub total_value: Option<Decimal>,
}

/// A single token entry in the agent portfolio.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenHolding {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
}

impl AgentPortfolio {
    /// Symbol -> amount, ignoring entries without either field.
    pub fn balances(&self) -> HashMap<String, Decimal> {
        self.tokens
            .iter()
            .filter_map(|t| Some((t.symbol.clone()?, t.amount?)))
            .collect()
    }
}

/// USD quote for a single CoinGecko coin id.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinGeckoQuote {
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub usd: Option<Decimal>,
}

/// `GET /simple/price` response: coin id -> quote.
pub type SimplePriceResponse = HashMap<String, CoinGeckoQuote>;
