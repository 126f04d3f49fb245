//! Read-only portfolio status projection.

use crate::strategy::position::Position;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Per-position line of a portfolio summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionSummary {
    pub symbol: String,
    pub balance: Decimal,
    pub price: Decimal,
    pub value: Decimal,
    pub current_weight: Decimal,
    pub target_weight: Decimal,
    pub drift: Decimal,
    pub needs_rebalancing: bool,
}

/// Snapshot of portfolio value and drift for status display and reporting.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    pub total_value: Decimal,
    pub positions: Vec<PositionSummary>,
    pub rebalance_needed: bool,
    pub generated_at: DateTime<Utc>,
}

impl PortfolioSummary {
    pub fn from_positions(positions: &[Position], drift_threshold: Decimal) -> Self {
        let positions: Vec<PositionSummary> = positions
            .iter()
            .map(|p| PositionSummary {
                symbol: p.symbol.clone(),
                balance: p.balance,
                price: p.price,
                value: p.value,
                current_weight: p.current_weight,
                target_weight: p.target_weight,
                drift: p.drift,
                needs_rebalancing: p.drift.abs() > drift_threshold,
            })
            .collect();

        let rebalance_needed = positions.iter().any(|p| p.needs_rebalancing);

        Self {
            total_value: positions.iter().map(|p| p.value).sum(),
            positions,
            rebalance_needed,
            generated_at: Utc::now(),
        }
    }

    /// Largest absolute drift across positions.
    pub fn max_drift(&self) -> Decimal {
        self.positions
            .iter()
            .map(|p| p.drift.abs())
            .max()
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::allocation::TargetAllocation;
    use crate::strategy::position::build_positions;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn positions(balance_a: Decimal, balance_b: Decimal) -> Vec<Position> {
        let allocation = TargetAllocation::from_pairs(&[("A", dec!(0.5)), ("B", dec!(0.5))]).unwrap();
        let balances: HashMap<String, Decimal> =
            [("A".to_string(), balance_a), ("B".to_string(), balance_b)].into();
        let prices: HashMap<String, Decimal> =
            [("A".to_string(), dec!(2)), ("B".to_string(), dec!(1))].into();
        build_positions(&balances, &prices, &allocation)
    }

    #[test]
    fn test_summary_flags_drifted_positions() {
        let summary = PortfolioSummary::from_positions(&positions(dec!(75), dec!(50)), dec!(0.02));

        assert_eq!(summary.total_value, dec!(200));
        assert!(summary.rebalance_needed);
        assert!(summary.positions.iter().all(|p| p.needs_rebalancing));
        assert_eq!(summary.positions[0].current_weight, dec!(0.75));
        assert_eq!(summary.max_drift(), dec!(0.25));
    }

    #[test]
    fn test_summary_balanced_portfolio() {
        let summary = PortfolioSummary::from_positions(&positions(dec!(50), dec!(100)), dec!(0.02));

        assert_eq!(summary.total_value, dec!(200));
        assert!(!summary.rebalance_needed);
        assert_eq!(summary.max_drift(), Decimal::ZERO);
    }
}
