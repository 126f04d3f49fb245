//! Portfolio snapshots: fetch balances and prices, derive positions.

use crate::error::Result;
use crate::exchange::{BalanceSource, PriceSource, TokenRegistry};
use crate::strategy::allocation::TargetAllocation;
use crate::strategy::position::{build_positions, total_value, Position};
use crate::strategy::rebalancer::{AllocationRebalancer, RebalanceConfig, TradeOrder};
use crate::strategy::summary::PortfolioSummary;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Reads the portfolio and turns it into positions, orders and summaries.
pub struct PortfolioManager {
    prices: Arc<dyn PriceSource>,
    balances: Arc<dyn BalanceSource>,
    tokens: TokenRegistry,
    allocation: TargetAllocation,
    rebalancer: AllocationRebalancer,
}

impl PortfolioManager {
    /// Create a portfolio manager; every allocation symbol must be in the token table.
    pub fn new(
        prices: Arc<dyn PriceSource>,
        balances: Arc<dyn BalanceSource>,
        tokens: TokenRegistry,
        allocation: TargetAllocation,
        config: RebalanceConfig,
    ) -> Result<Self> {
        tokens.ensure_covers(&allocation)?;

        Ok(Self {
            prices,
            balances,
            tokens,
            allocation,
            rebalancer: AllocationRebalancer::new(config),
        })
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    /// Fresh positions from concurrently fetched balances and prices.
    #[instrument(skip(self))]
    pub async fn current_positions(&self) -> Result<Vec<Position>> {
        debug!("Analyzing current portfolio");

        let symbols = self.tokens.symbols();
        let (balances, prices) = tokio::try_join!(
            self.balances.get_balances(),
            self.prices.get_prices(&symbols)
        )?;

        let positions = build_positions(&balances, &prices, &self.allocation);

        info!(
            total_value = %total_value(&positions),
            positions = ?positions
                .iter()
                .map(|p| format!(
                    "{} {:.2}% (target {:.2}%)",
                    p.symbol,
                    p.current_weight * dec!(100),
                    p.target_weight * dec!(100)
                ))
                .collect::<Vec<_>>(),
            "Portfolio analysis complete"
        );

        Ok(positions)
    }

    /// Orders needed to bring the current portfolio back to target.
    pub async fn calculate_rebalance_orders(&self) -> Result<Vec<TradeOrder>> {
        let positions = self.current_positions().await?;
        Ok(self.rebalancer.calculate_orders(&positions))
    }

    /// Read-only status projection.
    pub async fn portfolio_summary(&self) -> Result<PortfolioSummary> {
        let positions = self.current_positions().await?;
        Ok(PortfolioSummary::from_positions(
            &positions,
            self.rebalancer.config().drift_threshold,
        ))
    }
}
