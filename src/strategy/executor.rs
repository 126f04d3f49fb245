//! Rebalance execution.
//!
//! A run moves through `Idle -> Calculating -> Executing -> Done`, or ends in
//! `Failed` when any step errors. Sells always settle before buys so the
//! base asset they release can fund the purchases. Only one run may be in
//! flight; a second caller is turned away with
//! [`RebalanceError::RebalanceInProgress`].

use crate::error::{RebalanceError, Result};
use crate::exchange::{TradeExecutor, TradeRequest, TradeResponse};
use crate::strategy::manager::PortfolioManager;
use crate::strategy::rebalancer::{OrderSide, TradeOrder};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Lifecycle of a rebalance run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceState {
    Idle,
    Calculating,
    Executing,
    Done,
    Failed,
}

impl fmt::Display for RebalanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RebalanceState::Idle => "idle",
            RebalanceState::Calculating => "calculating",
            RebalanceState::Executing => "executing",
            RebalanceState::Done => "done",
            RebalanceState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// An order that reached the venue and was accepted.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedTrade {
    pub order: TradeOrder,
    pub request: TradeRequest,
    pub response: TradeResponse,
}

/// Outcome of a successful rebalance run.
#[derive(Debug, Clone, Serialize)]
pub struct RebalanceReport {
    /// Orders computed for this run, sells first
    pub orders: Vec<TradeOrder>,
    pub trades: Vec<ExecutedTrade>,
    /// Orders not sent to the venue (base-asset legs)
    pub skipped: Vec<TradeOrder>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RebalanceReport {
    /// True when the portfolio was already within tolerance.
    pub fn is_noop(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Clears the in-flight flag when the run ends, however it ends.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Drives rebalance runs against a trade venue.
pub struct RebalanceExecutor {
    manager: Arc<PortfolioManager>,
    trades: Arc<dyn TradeExecutor>,
    trade_delay: Duration,
    in_flight: AtomicBool,
    state: Mutex<RebalanceState>,
}

impl RebalanceExecutor {
    pub fn new(
        manager: Arc<PortfolioManager>,
        trades: Arc<dyn TradeExecutor>,
        trade_delay: Duration,
    ) -> Self {
        Self {
            manager,
            trades,
            trade_delay,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(RebalanceState::Idle),
        }
    }

    pub fn manager(&self) -> &Arc<PortfolioManager> {
        &self.manager
    }

    /// State of the current or most recent run.
    pub fn state(&self) -> RebalanceState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn set_state(&self, next: RebalanceState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        info!(from = %*state, to = %next, "Rebalance state transition");
        *state = next;
    }

    /// Run one complete rebalance.
    ///
    /// Fails fast: the first error stops the run, leaves the state at
    /// `Failed` and is returned to the caller. Trades already settled are
    /// not rolled back.
    #[instrument(skip(self), name = "rebalance")]
    pub async fn execute_rebalance(&self) -> Result<RebalanceReport> {
        let _guard = RunGuard::acquire(&self.in_flight).ok_or_else(|| {
            warn!("Rebalance requested while another run is in progress");
            RebalanceError::RebalanceInProgress
        })?;

        let started_at = Utc::now();
        match self.run(started_at).await {
            Ok(report) => {
                self.set_state(RebalanceState::Done);
                info!(
                    orders = report.orders.len(),
                    executed = report.trades.len(),
                    skipped = report.skipped.len(),
                    "Portfolio rebalancing completed"
                );
                Ok(report)
            }
            Err(e) => {
                self.set_state(RebalanceState::Failed);
                error!(error = %e, "Portfolio rebalancing failed");
                Err(e)
            }
        }
    }

    async fn run(&self, started_at: DateTime<Utc>) -> Result<RebalanceReport> {
        info!("Starting portfolio rebalancing");
        self.set_state(RebalanceState::Calculating);

        let orders = self.manager.calculate_rebalance_orders().await?;
        if orders.is_empty() {
            info!("No rebalancing needed");
            return Ok(RebalanceReport {
                orders,
                trades: Vec::new(),
                skipped: Vec::new(),
                started_at,
                finished_at: Utc::now(),
            });
        }

        self.set_state(RebalanceState::Executing);

        let (sells, buys): (Vec<&TradeOrder>, Vec<&TradeOrder>) =
            orders.iter().partition(|o| o.side == OrderSide::Sell);
        info!(
            sells = sells.len(),
            buys = buys.len(),
            "Executing rebalance orders"
        );

        let base_asset = self.manager.tokens().base_asset();
        let mut trades = Vec::new();
        let mut skipped = Vec::new();

        for (index, order) in sells.into_iter().chain(buys).enumerate() {
            if index > 0 && !self.trade_delay.is_zero() {
                tokio::time::sleep(self.trade_delay).await;
            }

            if order.symbol == base_asset {
                info!(
                    symbol = %order.symbol,
                    side = %order.side,
                    amount = %order.amount,
                    "Skipping base asset order, settled by the other legs"
                );
                skipped.push(order.clone());
                continue;
            }

            let trade = match order.side {
                OrderSide::Sell => self.execute_sell_order(order).await?,
                OrderSide::Buy => self.execute_buy_order(order).await?,
            };
            trades.push(trade);
        }

        Ok(RebalanceReport {
            orders,
            trades,
            skipped,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Sell `order.amount` of the symbol for the base asset.
    async fn execute_sell_order(&self, order: &TradeOrder) -> Result<ExecutedTrade> {
        let tokens = self.manager.tokens();
        let request = tokens.create_trade_request(
            &order.symbol,
            tokens.base_asset(),
            order.amount,
            &order.reason,
        )?;

        info!(symbol = %order.symbol, amount = %order.amount, "Executing sell order");
        self.submit(order, request).await
    }

    /// Buy `order.amount` of the symbol, paying in the base asset at the
    /// price seen right before submission.
    async fn execute_buy_order(&self, order: &TradeOrder) -> Result<ExecutedTrade> {
        // Fresh snapshot: prices may have moved since the orders were sized.
        let positions = self.manager.current_positions().await?;
        let position = positions
            .iter()
            .find(|p| p.symbol == order.symbol)
            .ok_or_else(|| RebalanceError::PositionNotFound(order.symbol.clone()))?;

        if position.price <= Decimal::ZERO {
            return Err(RebalanceError::PriceFetch(format!(
                "no usable price for {} to size buy order",
                order.symbol
            )));
        }

        let base_amount = order.amount * position.price;
        let tokens = self.manager.tokens();
        let request = tokens.create_trade_request(
            tokens.base_asset(),
            &order.symbol,
            base_amount,
            &order.reason,
        )?;

        info!(
            symbol = %order.symbol,
            amount = %order.amount,
            price = %position.price,
            %base_amount,
            "Executing buy order"
        );
        self.submit(order, request).await
    }

    async fn submit(&self, order: &TradeOrder, request: TradeRequest) -> Result<ExecutedTrade> {
        let response = self.trades.execute_trade(&request).await?;
        info!(
            symbol = %order.symbol,
            side = %order.side,
            status = response.status(),
            "Trade executed"
        );

        Ok(ExecutedTrade {
            order: order.clone(),
            request,
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{MockBalanceSource, MockPriceSource, MockVenue, TokenRegistry};
    use crate::strategy::allocation::TargetAllocation;
    use crate::strategy::rebalancer::RebalanceConfig;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use tokio::sync::{Notify, Semaphore};

    fn executor_for(
        venue: &MockVenue,
        targets: &[(&str, Decimal)],
        trades: Arc<dyn TradeExecutor>,
    ) -> RebalanceExecutor {
        let manager = PortfolioManager::new(
            Arc::new(venue.clone()),
            Arc::new(venue.clone()),
            TokenRegistry::reference(),
            TargetAllocation::from_pairs(targets).unwrap(),
            RebalanceConfig::default(),
        )
        .unwrap();
        RebalanceExecutor::new(Arc::new(manager), trades, Duration::ZERO)
    }

    async fn priced_venue() -> MockVenue {
        let venue = MockVenue::new(TokenRegistry::reference());
        venue
            .set_prices(&[("USDC", dec!(1)), ("WETH", dec!(2000)), ("WBTC", dec!(50000))])
            .await;
        venue
    }

    #[tokio::test]
    async fn test_sells_settle_before_buys() {
        let venue = priced_venue().await;
        venue.set_balances(&[("WETH", dec!(1))]).await;
        let executor = executor_for(
            &venue,
            &[("WBTC", dec!(0.5)), ("WETH", dec!(0.5))],
            Arc::new(venue.clone()),
        );

        let report = executor.execute_rebalance().await.unwrap();

        assert_eq!(executor.state(), RebalanceState::Done);
        assert!(!executor.is_running());
        assert_eq!(report.trades.len(), 2);
        assert_eq!(report.trades[0].order.side, OrderSide::Sell);
        assert_eq!(
            venue.settled_trades().await,
            vec![
                ("WETH".to_string(), "USDC".to_string(), dec!(0.5)),
                ("USDC".to_string(), "WBTC".to_string(), dec!(1000)),
            ]
        );
        assert_eq!(venue.balance("WBTC").await, dec!(0.02));
        assert_eq!(venue.balance("USDC").await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_base_asset_orders_skipped() {
        let venue = priced_venue().await;
        venue.set_balances(&[("WETH", dec!(1))]).await;
        let executor = executor_for(
            &venue,
            &[("WETH", dec!(0.5)), ("USDC", dec!(0.5))],
            Arc::new(venue.clone()),
        );

        let report = executor.execute_rebalance().await.unwrap();

        assert_eq!(report.orders.len(), 2);
        assert_eq!(report.trades.len(), 1);
        assert_eq!(report.skipped[0].symbol, "USDC");
        assert_eq!(venue.balance("USDC").await, dec!(1000));
    }

    #[tokio::test]
    async fn test_balanced_portfolio_is_noop() {
        let venue = priced_venue().await;
        venue
            .set_balances(&[("WETH", dec!(1)), ("USDC", dec!(2000))])
            .await;
        let executor = executor_for(
            &venue,
            &[("WETH", dec!(0.5)), ("USDC", dec!(0.5))],
            Arc::new(venue.clone()),
        );

        let report = executor.execute_rebalance().await.unwrap();

        assert!(report.is_noop());
        assert_eq!(executor.state(), RebalanceState::Done);
        assert!(venue.get_state().await.submissions.is_empty());
    }

    #[tokio::test]
    async fn test_failed_trade_aborts_remaining_orders() {
        let venue = priced_venue().await;
        venue.set_balances(&[("WETH", dec!(1))]).await;
        venue.fail_trades_from(0).await;
        let executor = executor_for(
            &venue,
            &[("WBTC", dec!(0.5)), ("WETH", dec!(0.5))],
            Arc::new(venue.clone()),
        );

        let err = executor.execute_rebalance().await.unwrap_err();

        assert!(matches!(err, RebalanceError::TradeExecution { .. }));
        assert_eq!(executor.state(), RebalanceState::Failed);
        assert!(!executor.is_running());
        assert_eq!(venue.get_state().await.submissions.len(), 1);
        assert_eq!(venue.balance("WETH").await, dec!(1));
    }

    #[tokio::test]
    async fn test_snapshot_failure_fails_run() {
        let venue = priced_venue().await;
        venue.fail_prices(true).await;
        let executor = executor_for(
            &venue,
            &[("WETH", dec!(0.5)), ("USDC", dec!(0.5))],
            Arc::new(venue.clone()),
        );

        let err = executor.execute_rebalance().await.unwrap_err();

        assert!(matches!(err, RebalanceError::PriceFetch(_)));
        assert_eq!(executor.state(), RebalanceState::Failed);
    }

    fn mocked_executor(prices: HashMap<String, Decimal>) -> RebalanceExecutor {
        let mut price_source = MockPriceSource::new();
        price_source
            .expect_get_prices()
            .returning(move |_| Ok(prices.clone()));
        let mut balance_source = MockBalanceSource::new();
        balance_source
            .expect_get_balances()
            .returning(|| Ok(HashMap::from([("USDC".to_string(), dec!(500))])));

        let manager = PortfolioManager::new(
            Arc::new(price_source),
            Arc::new(balance_source),
            TokenRegistry::reference(),
            TargetAllocation::from_pairs(&[("WETH", dec!(0.5)), ("USDC", dec!(0.5))]).unwrap(),
            RebalanceConfig::default(),
        )
        .unwrap();

        RebalanceExecutor::new(
            Arc::new(manager),
            Arc::new(crate::exchange::MockTradeExecutor::new()),
            Duration::ZERO,
        )
    }

    fn buy(symbol: &str, amount: Decimal) -> TradeOrder {
        TradeOrder {
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            amount,
            reason: format!("Rebalance: increasing {} allocation", symbol),
        }
    }

    #[tokio::test]
    async fn test_buy_for_untracked_symbol_is_position_not_found() {
        let executor = mocked_executor(HashMap::from([("USDC".to_string(), dec!(1))]));

        let err = executor
            .execute_buy_order(&buy("WBTC", dec!(0.1)))
            .await
            .unwrap_err();

        assert!(matches!(err, RebalanceError::PositionNotFound(ref s) if s == "WBTC"));
    }

    #[tokio::test]
    async fn test_buy_without_fresh_price_rejected() {
        let executor = mocked_executor(HashMap::from([("USDC".to_string(), dec!(1))]));

        let err = executor
            .execute_buy_order(&buy("WETH", dec!(0.1)))
            .await
            .unwrap_err();

        assert!(matches!(err, RebalanceError::PriceFetch(_)));
    }

    /// Holds every trade until released.
    struct GatedVenue {
        entered: Arc<Notify>,
        release: Arc<Semaphore>,
    }

    #[async_trait]
    impl TradeExecutor for GatedVenue {
        async fn execute_trade(&self, _request: &TradeRequest) -> Result<TradeResponse> {
            self.entered.notify_one();
            let permit = self
                .release
                .acquire()
                .await
                .map_err(|e| RebalanceError::trade("closed", e.to_string()))?;
            permit.forget();
            Ok(TradeResponse::accepted())
        }
    }

    #[tokio::test]
    async fn test_concurrent_rebalance_rejected() {
        let venue = priced_venue().await;
        venue.set_balances(&[("WETH", dec!(1))]).await;

        let entered = Arc::new(Notify::new());
        let release = Arc::new(Semaphore::new(0));
        let gated = GatedVenue {
            entered: entered.clone(),
            release: release.clone(),
        };
        let executor = Arc::new(executor_for(
            &venue,
            &[("WBTC", dec!(0.5)), ("WETH", dec!(0.5))],
            Arc::new(gated),
        ));

        let first = tokio::spawn({
            let executor = executor.clone();
            async move { executor.execute_rebalance().await }
        });

        entered.notified().await;
        assert!(executor.is_running());
        assert_eq!(executor.state(), RebalanceState::Executing);

        let second = executor.execute_rebalance().await;
        assert!(matches!(second, Err(RebalanceError::RebalanceInProgress)));

        release.add_permits(2);
        let report = first.await.unwrap().unwrap();

        assert_eq!(report.trades.len(), 2);
        assert!(!executor.is_running());
        assert_eq!(executor.state(), RebalanceState::Done);
    }
}
