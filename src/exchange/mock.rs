//! In-memory venue for tests.
//!
//! Serves prices and balances from memory and settles trades at the
//! current simulated prices, so a full rebalance can run without network
//! access.

use super::tokens::TokenRegistry;
use super::traits::{BalanceSource, PriceSource, TradeExecutor};
use super::types::{TradeRequest, TradeResponse};
use crate::error::{RebalanceError, Result};
use crate::utils::safe_div;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Simulated venue state.
#[derive(Debug, Clone, Default)]
pub struct MockVenueState {
    pub balances: HashMap<String, Decimal>,
    pub prices: HashMap<String, Decimal>,
    /// Every trade request received, including failed ones
    pub submissions: Vec<TradeRequest>,
    /// Trades that settled
    pub settled: Vec<TradeRequest>,
    /// Submission index (0-based) at which trading starts failing
    pub fail_trades_from: Option<usize>,
    pub fail_prices: bool,
    pub fail_balances: bool,
    /// Number of balance snapshots served
    pub balance_fetches: u64,
}

/// In-memory venue implementing every capability the engine needs.
#[derive(Debug, Clone)]
pub struct MockVenue {
    tokens: TokenRegistry,
    state: Arc<RwLock<MockVenueState>>,
}

impl MockVenue {
    pub fn new(tokens: TokenRegistry) -> Self {
        Self {
            tokens,
            state: Arc::new(RwLock::new(MockVenueState::default())),
        }
    }

    /// Update simulated market data.
    pub async fn set_prices(&self, prices: &[(&str, Decimal)]) {
        let mut state = self.state.write().await;
        for (symbol, price) in prices {
            state.prices.insert(symbol.to_string(), *price);
        }
    }

    pub async fn set_balances(&self, balances: &[(&str, Decimal)]) {
        let mut state = self.state.write().await;
        for (symbol, amount) in balances {
            state.balances.insert(symbol.to_string(), *amount);
        }
    }

    /// Reject every trade from the `index`-th submission onward.
    pub async fn fail_trades_from(&self, index: usize) {
        self.state.write().await.fail_trades_from = Some(index);
    }

    pub async fn fail_prices(&self, fail: bool) {
        self.state.write().await.fail_prices = fail;
    }

    pub async fn fail_balances(&self, fail: bool) {
        self.state.write().await.fail_balances = fail;
    }

    pub async fn balance(&self, symbol: &str) -> Decimal {
        self.state
            .read()
            .await
            .balances
            .get(symbol)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Get current mock state for assertions and logging.
    pub async fn get_state(&self) -> MockVenueState {
        self.state.read().await.clone()
    }

    /// Settled trades as `(from_symbol, to_symbol, amount_from)`.
    pub async fn settled_trades(&self) -> Vec<(String, String, Decimal)> {
        let state = self.state.read().await;
        state
            .settled
            .iter()
            .filter_map(|t| {
                let from = self.tokens.by_address(&t.from_token)?;
                let to = self.tokens.by_address(&t.to_token)?;
                let amount = self.tokens.from_base_units(&t.amount, &from.symbol).ok()?;
                Some((from.symbol.clone(), to.symbol.clone(), amount))
            })
            .collect()
    }
}

#[async_trait]
impl PriceSource for MockVenue {
    async fn get_prices(&self, symbols: &[String]) -> Result<HashMap<String, Decimal>> {
        let state = self.state.read().await;
        if state.fail_prices {
            return Err(RebalanceError::PriceFetch("simulated price outage".into()));
        }

        Ok(symbols
            .iter()
            .filter_map(|s| state.prices.get(s).map(|p| (s.clone(), *p)))
            .collect())
    }
}

#[async_trait]
impl BalanceSource for MockVenue {
    async fn get_balances(&self) -> Result<HashMap<String, Decimal>> {
        let mut state = self.state.write().await;
        if state.fail_balances {
            return Err(RebalanceError::BalanceFetch("simulated balance outage".into()));
        }

        state.balance_fetches += 1;
        Ok(state.balances.clone())
    }
}

#[async_trait]
impl TradeExecutor for MockVenue {
    async fn execute_trade(&self, request: &TradeRequest) -> Result<TradeResponse> {
        let mut state = self.state.write().await;
        let index = state.submissions.len();
        state.submissions.push(request.clone());

        if state.fail_trades_from.is_some_and(|from| index >= from) {
            return Err(RebalanceError::trade("500", "simulated venue failure"));
        }

        let from = self
            .tokens
            .by_address(&request.from_token)
            .ok_or_else(|| RebalanceError::trade("400", format!("unknown token {}", request.from_token)))?;
        let to = self
            .tokens
            .by_address(&request.to_token)
            .ok_or_else(|| RebalanceError::trade("400", format!("unknown token {}", request.to_token)))?;

        let amount_in = self.tokens.from_base_units(&request.amount, &from.symbol)?;
        let held = state.balances.get(&from.symbol).copied().unwrap_or(Decimal::ZERO);
        if amount_in > held {
            return Err(RebalanceError::trade(
                "400",
                format!("insufficient {} balance: {} < {}", from.symbol, held, amount_in),
            ));
        }

        let price_in = state.prices.get(&from.symbol).copied().unwrap_or(Decimal::ZERO);
        let price_out = state.prices.get(&to.symbol).copied().unwrap_or(Decimal::ZERO);
        let amount_out = safe_div(amount_in * price_in, price_out);

        *state.balances.entry(from.symbol.clone()).or_default() -= amount_in;
        *state.balances.entry(to.symbol.clone()).or_default() += amount_out;
        state.settled.push(request.clone());

        debug!(
            from = %from.symbol,
            to = %to.symbol,
            %amount_in,
            %amount_out,
            "Mock trade settled"
        );
        info!(order_count = state.settled.len(), "Mock trade executed");

        Ok(TradeResponse::accepted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn venue() -> MockVenue {
        let venue = MockVenue::new(TokenRegistry::reference());
        venue
            .set_prices(&[("USDC", dec!(1)), ("WETH", dec!(2000)), ("WBTC", dec!(50000))])
            .await;
        venue
            .set_balances(&[("USDC", dec!(1000)), ("WETH", dec!(1))])
            .await;
        venue
    }

    #[tokio::test]
    async fn test_trade_settles_at_current_prices() {
        let venue = venue().await;
        let registry = TokenRegistry::reference();
        let request = registry
            .create_trade_request("WETH", "USDC", dec!(0.5), "test")
            .unwrap();

        let response = venue.execute_trade(&request).await.unwrap();

        assert!(response.success);
        assert_eq!(venue.balance("WETH").await, dec!(0.5));
        assert_eq!(venue.balance("USDC").await, dec!(2000));
        assert_eq!(
            venue.settled_trades().await,
            vec![("WETH".to_string(), "USDC".to_string(), dec!(0.5))]
        );
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejected() {
        let venue = venue().await;
        let request = TokenRegistry::reference()
            .create_trade_request("USDC", "WBTC", dec!(5000), "test")
            .unwrap();

        let err = venue.execute_trade(&request).await.unwrap_err();

        assert!(matches!(err, RebalanceError::TradeExecution { .. }));
        assert_eq!(venue.balance("USDC").await, dec!(1000));
        assert_eq!(venue.get_state().await.submissions.len(), 1);
        assert!(venue.get_state().await.settled.is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let venue = venue().await;
        venue.fail_prices(true).await;
        venue.fail_balances(true).await;

        assert!(matches!(
            venue.get_prices(&["USDC".to_string()]).await,
            Err(RebalanceError::PriceFetch(_))
        ));
        assert!(matches!(
            venue.get_balances().await,
            Err(RebalanceError::BalanceFetch(_))
        ));
    }

    #[tokio::test]
    async fn test_prices_only_for_requested_symbols() {
        let venue = venue().await;
        let prices = venue
            .get_prices(&["WETH".to_string(), "DOGE".to_string()])
            .await
            .unwrap();

        assert_eq!(prices.len(), 1);
        assert_eq!(prices["WETH"], dec!(2000));
    }
}
