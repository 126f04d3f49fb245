//! Recall competitions REST API client.

use crate::config::{RecallConfig, RecallEnvironment};
use crate::error::{RebalanceError, Result};
use crate::exchange::traits::{BalanceSource, TradeExecutor};
use crate::exchange::types::*;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

const PRODUCTION_URL: &str = "https://api.competitions.recall.network";
const SANDBOX_URL: &str = "https://api.sandbox.competitions.recall.network";

/// Recall API client: balances, portfolio details and trade execution.
#[derive(Debug, Clone)]
pub struct RecallClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl RecallClient {
    /// Create a new Recall client from configuration.
    pub fn new(config: &RecallConfig, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = match (&config.base_url, config.environment) {
            (Some(url), _) => url.clone(),
            (None, RecallEnvironment::Production) => PRODUCTION_URL.to_string(),
            (None, RecallEnvironment::Sandbox) => SANDBOX_URL.to_string(),
        };

        Self::with_base_url(&base_url, &config.api_key, timeout)
    }

    /// Create a new Recall client with a custom base URL.
    pub fn with_base_url(base_url: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_agent_portfolio(&self) -> std::result::Result<Response, String> {
        let url = format!("{}/api/agent/portfolio", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Recall API error {}: {}", status, body));
        }

        Ok(response)
    }

    /// Raw portfolio details, passed through untouched.
    #[instrument(skip(self), name = "recall_get_portfolio")]
    pub async fn get_portfolio(&self) -> Result<serde_json::Value> {
        let response = self
            .get_agent_portfolio()
            .await
            .map_err(RebalanceError::BalanceFetch)?;

        let portfolio: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RebalanceError::BalanceFetch(format!("invalid portfolio response: {}", e)))?;

        debug!("Portfolio fetched successfully");
        Ok(portfolio)
    }
}

#[async_trait]
impl BalanceSource for RecallClient {
    #[instrument(skip(self), name = "recall_get_balances")]
    async fn get_balances(&self) -> Result<HashMap<String, Decimal>> {
        let response = self.get_agent_portfolio().await.map_err(|e| {
            error!(error = %e, "Failed to fetch balance");
            RebalanceError::BalanceFetch(e)
        })?;

        let portfolio: AgentPortfolio = response
            .json()
            .await
            .map_err(|e| RebalanceError::BalanceFetch(format!("invalid portfolio response: {}", e)))?;

        let balances = portfolio.balances();
        debug!(tokens = balances.len(), "Balance fetched successfully");
        Ok(balances)
    }
}

#[async_trait]
impl TradeExecutor for RecallClient {
    #[instrument(skip(self), name = "recall_execute_trade")]
    async fn execute_trade(&self, request: &TradeRequest) -> Result<TradeResponse> {
        let url = format!("{}/api/trade/execute", self.base_url);

        info!(
            from = %request.from_token,
            to = %request.to_token,
            amount = %request.amount,
            reason = %request.reason,
            "Executing trade"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| RebalanceError::trade("transport", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, %body, "Trade execution failed");
            return Err(RebalanceError::trade(status.as_u16().to_string(), body));
        }

        let trade: TradeResponse = response
            .json()
            .await
            .map_err(|e| RebalanceError::trade(status.as_u16().to_string(), format!("invalid response: {}", e)))?;

        if !trade.success {
            let details = trade.error.clone().unwrap_or_else(|| "trade rejected".to_string());
            error!(%details, "Trade rejected by venue");
            return Err(RebalanceError::trade("rejected", details));
        }

        info!("Trade executed successfully");
        Ok(trade)
    }
}
