//! Target portfolio weights.

use crate::error::{RebalanceError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Allowed deviation of the weight sum from 1.0.
pub const WEIGHT_SUM_TOLERANCE: Decimal = dec!(0.001);

/// A single target entry: symbol + weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetWeight {
    pub symbol: String,
    /// Fraction of total portfolio value (0.0-1.0)
    pub weight: Decimal,
}

impl TargetWeight {
    pub fn new(symbol: impl Into<String>, weight: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            weight,
        }
    }
}

/// Validated target allocation, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetAllocation {
    targets: Vec<TargetWeight>,
}

impl TargetAllocation {
    /// Validate and build an allocation.
    ///
    /// Weights must each lie in [0, 1] and sum to 1.0 within
    /// [`WEIGHT_SUM_TOLERANCE`].
    pub fn new(targets: Vec<TargetWeight>) -> Result<Self> {
        if targets.is_empty() {
            return Err(RebalanceError::Configuration(
                "target allocation is empty".into(),
            ));
        }

        let mut seen = HashSet::new();
        for target in &targets {
            if target.symbol.trim().is_empty() {
                return Err(RebalanceError::Configuration("empty symbol".into()));
            }
            if !seen.insert(target.symbol.as_str()) {
                return Err(RebalanceError::Configuration(format!(
                    "duplicate symbol: {}",
                    target.symbol
                )));
            }
            if target.weight < Decimal::ZERO || target.weight > Decimal::ONE {
                return Err(RebalanceError::Configuration(format!(
                    "weight for {} ({}) must be between 0 and 1",
                    target.symbol, target.weight
                )));
            }
        }

        let total: Decimal = targets.iter().map(|t| t.weight).sum();
        if (total - Decimal::ONE).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(RebalanceError::Configuration(format!(
                "portfolio weights must sum to 1.0, got {}",
                total
            )));
        }

        Ok(Self { targets })
    }

    /// Convenience constructor from `(symbol, weight)` pairs.
    pub fn from_pairs(pairs: &[(&str, Decimal)]) -> Result<Self> {
        Self::new(
            pairs
                .iter()
                .map(|(symbol, weight)| TargetWeight::new(*symbol, *weight))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetWeight> {
        self.targets.iter()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.symbol.as_str())
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_allocation_keeps_order() {
        let allocation =
            TargetAllocation::from_pairs(&[("WETH", dec!(0.4)), ("WBTC", dec!(0.4)), ("USDC", dec!(0.2))])
                .unwrap();

        let symbols: Vec<&str> = allocation.symbols().collect();
        assert_eq!(symbols, vec!["WETH", "WBTC", "USDC"]);
        let weights: Vec<Decimal> = allocation.iter().map(|t| t.weight).collect();
        assert_eq!(weights, vec![dec!(0.4), dec!(0.4), dec!(0.2)]);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let err = TargetAllocation::from_pairs(&[("A", dec!(0.5)), ("B", dec!(0.4))]).unwrap_err();
        assert!(matches!(err, RebalanceError::Configuration(_)));

        let err = TargetAllocation::from_pairs(&[("A", dec!(0.6)), ("B", dec!(0.6))]).unwrap_err();
        assert!(matches!(err, RebalanceError::Configuration(_)));
    }

    #[test]
    fn test_sum_within_tolerance_accepted() {
        assert!(TargetAllocation::from_pairs(&[("A", dec!(0.3333)), ("B", dec!(0.3333)), ("C", dec!(0.3333))]).is_ok());
        assert!(TargetAllocation::from_pairs(&[("A", dec!(0.5)), ("B", dec!(0.5011))]).is_err());
    }

    #[test]
    fn test_rejects_duplicates_and_out_of_range() {
        assert!(TargetAllocation::from_pairs(&[("A", dec!(0.5)), ("A", dec!(0.5))]).is_err());
        assert!(TargetAllocation::from_pairs(&[("A", dec!(1.5)), ("B", dec!(-0.5))]).is_err());
        assert!(TargetAllocation::new(Vec::new()).is_err());
    }
}
