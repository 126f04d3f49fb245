//! Rebalance order calculation to bring positions back to target weights.

use crate::strategy::position::{total_value, Position};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Configuration for allocation rebalancing.
#[derive(Debug, Clone)]
pub struct RebalanceConfig {
    /// Absolute drift (fraction of portfolio) that triggers a trade, e.g. 0.02 = 2%
    pub drift_threshold: Decimal,
    /// Minimum trade value in USD to avoid tiny trades
    pub min_trade_value: Decimal,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            drift_threshold: dec!(0.02), // 2% drift triggers rebalance
            min_trade_value: dec!(10),   // Min $10 trade
        }
    }
}

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// A rebalance trade in human-readable units of the traded token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeOrder {
    pub symbol: String,
    pub side: OrderSide,
    /// Always positive
    pub amount: Decimal,
    pub reason: String,
}

/// Computes drift-gated rebalance orders. Pure: no I/O.
#[derive(Debug, Clone)]
pub struct AllocationRebalancer {
    config: RebalanceConfig,
}

impl AllocationRebalancer {
    /// Create a new allocation rebalancer.
    pub fn new(config: RebalanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RebalanceConfig {
        &self.config
    }

    /// Whether a position has drifted past the threshold.
    pub fn needs_rebalancing(&self, position: &Position) -> bool {
        position.drift.abs() > self.config.drift_threshold
    }

    /// Derive sell orders for overweight positions and buy orders for
    /// underweight ones. Sells come first in the returned list.
    pub fn calculate_orders(&self, positions: &[Position]) -> Vec<TradeOrder> {
        let total_value = total_value(positions);
        let mut orders = Vec::new();

        if total_value == Decimal::ZERO {
            warn!("Portfolio has zero value, cannot rebalance");
            return orders;
        }

        let drifted: Vec<&Position> = positions
            .iter()
            .filter(|p| self.needs_rebalancing(p))
            .collect();

        if drifted.is_empty() {
            info!(
                threshold = %self.config.drift_threshold,
                "Portfolio is within drift threshold, no rebalancing needed"
            );
            return orders;
        }

        let (overweight, underweight): (Vec<&Position>, Vec<&Position>) =
            drifted.into_iter().partition(|p| p.drift > Decimal::ZERO);

        debug!(
            overweight = ?overweight.iter().map(|p| (&p.symbol, p.drift)).collect::<Vec<_>>(),
            underweight = ?underweight.iter().map(|p| (&p.symbol, p.drift)).collect::<Vec<_>>(),
            "Positions needing rebalancing"
        );

        for position in overweight {
            let excess_value = position.drift * total_value;
            let sell_amount = excess_value / position.price;

            if let Some(order) = self.gate(position, OrderSide::Sell, sell_amount) {
                orders.push(order);
            }
        }

        // Buys are funded from the base asset raised by the sells.
        for position in underweight {
            if position.price <= Decimal::ZERO {
                warn!(
                    symbol = %position.symbol,
                    "No price for underweight position, cannot size buy"
                );
                continue;
            }

            let deficit_value = position.drift.abs() * total_value;
            let buy_amount = deficit_value / position.price;

            if let Some(order) = self.gate(position, OrderSide::Buy, buy_amount) {
                orders.push(order);
            }
        }

        info!(
            order_count = orders.len(),
            %total_value,
            "Rebalance orders calculated"
        );

        orders
    }

    /// Apply the minimum trade value gate.
    fn gate(&self, position: &Position, side: OrderSide, amount: Decimal) -> Option<TradeOrder> {
        let trade_value = amount * position.price;
        if trade_value < self.config.min_trade_value {
            debug!(
                symbol = %position.symbol,
                %side,
                %trade_value,
                "Trade too small, skipping"
            );
            return None;
        }

        let verb = match side {
            OrderSide::Sell => "reducing",
            OrderSide::Buy => "increasing",
        };

        Some(TradeOrder {
            symbol: position.symbol.clone(),
            side,
            amount,
            reason: format!("Rebalance: {} {} allocation", verb, position.symbol),
        })
    }
}
