//! Position building from balances, prices and target weights.

use crate::strategy::allocation::TargetAllocation;
use crate::utils::safe_div;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// Derived per-symbol view of the portfolio. Recomputed on every evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub symbol: String,
    pub balance: Decimal,
    /// USD unit price; zero means unpriced
    pub price: Decimal,
    pub value: Decimal,
    pub target_weight: Decimal,
    pub current_weight: Decimal,
    /// current_weight - target_weight
    pub drift: Decimal,
}

/// Total USD value of every priced, non-zero holding.
///
/// Holdings outside the target allocation still count toward the total.
pub fn portfolio_value(
    balances: &HashMap<String, Decimal>,
    prices: &HashMap<String, Decimal>,
) -> Decimal {
    balances
        .iter()
        .filter(|(_, balance)| **balance > Decimal::ZERO)
        .filter_map(|(symbol, balance)| prices.get(symbol).map(|price| *balance * *price))
        .sum()
}

/// Build one position per allocation symbol, in allocation order.
pub fn build_positions(
    balances: &HashMap<String, Decimal>,
    prices: &HashMap<String, Decimal>,
    allocation: &TargetAllocation,
) -> Vec<Position> {
    let total_value = portfolio_value(balances, prices);

    allocation
        .iter()
        .map(|target| {
            let balance = balances.get(&target.symbol).copied().unwrap_or(Decimal::ZERO);
            let price = prices.get(&target.symbol).copied().unwrap_or(Decimal::ZERO);
            let value = balance * price;
            let current_weight = safe_div(value, total_value);

            Position {
                symbol: target.symbol.clone(),
                balance,
                price,
                value,
                target_weight: target.weight,
                current_weight,
                drift: current_weight - target.weight,
            }
        })
        .collect()
}

/// Sum of position values.
pub fn total_value(positions: &[Position]) -> Decimal {
    positions.iter().map(|p| p.value).sum()
}
