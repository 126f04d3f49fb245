//! CoinGecko REST API client for USD token prices.

use crate::config::CoinGeckoConfig;
use crate::error::{RebalanceError, Result};
use crate::exchange::tokens::TokenRegistry;
use crate::exchange::traits::PriceSource;
use crate::exchange::types::SimplePriceResponse;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// CoinGecko client mapping token symbols to coin ids.
#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    /// symbol -> coin id
    coin_ids: HashMap<String, String>,
}

impl CoinGeckoClient {
    /// Create a new CoinGecko client from configuration.
    pub fn new(
        config: &CoinGeckoConfig,
        tokens: &TokenRegistry,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let coin_ids = tokens
            .iter()
            .map(|t| (t.symbol.clone(), t.coingecko_id.clone()))
            .collect();

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            coin_ids,
        })
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    #[instrument(skip(self), name = "coingecko_get_prices")]
    async fn get_prices(&self, symbols: &[String]) -> Result<HashMap<String, Decimal>> {
        let requested: Vec<(&String, &String)> = symbols
            .iter()
            .filter_map(|s| self.coin_ids.get(s).map(|id| (s, id)))
            .collect();

        if requested.is_empty() {
            return Ok(HashMap::new());
        }

        let ids = requested
            .iter()
            .map(|(_, id)| id.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let url = format!("{}/simple/price", self.base_url);
        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(&[("ids", ids.as_str()), ("vs_currencies", "usd")]);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RebalanceError::PriceFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RebalanceError::PriceFetch(format!(
                "CoinGecko API error {}: {}",
                status, body
            )));
        }

        let quotes: SimplePriceResponse = response
            .json()
            .await
            .map_err(|e| RebalanceError::PriceFetch(format!("invalid price response: {}", e)))?;

        let prices: HashMap<String, Decimal> = requested
            .into_iter()
            .filter_map(|(symbol, id)| {
                quotes
                    .get(id)
                    .and_then(|q| q.usd)
                    .map(|usd| (symbol.clone(), usd))
            })
            .collect();

        debug!(?prices, "Token prices fetched successfully");
        Ok(prices)
    }
}
