//! Error taxonomy for portfolio rebalancing.

use thiserror::Error;

/// Errors raised by the rebalance engine and its collaborators.
#[derive(Debug, Error)]
pub enum RebalanceError {
    /// Invalid allocation or token table. Fatal at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("price fetch failed: {0}")]
    PriceFetch(String),

    #[error("balance fetch failed: {0}")]
    BalanceFetch(String),

    #[error("trade execution failed ({status}): {details}")]
    TradeExecution { status: String, details: String },

    /// A buy order's symbol vanished from a fresh position snapshot.
    #[error("position not found for {0}")]
    PositionNotFound(String),

    #[error("unknown token symbol: {0}")]
    UnknownToken(String),

    #[error("amount conversion failed: {0}")]
    Conversion(String),

    #[error("a rebalance is already in progress")]
    RebalanceInProgress,
}

impl RebalanceError {
    /// Shorthand for a trade failure with venue status and details.
    pub fn trade(status: impl Into<String>, details: impl Into<String>) -> Self {
        Self::TradeExecution {
            status: status.into(),
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RebalanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_error_display() {
        let err = RebalanceError::trade("400", "insufficient balance");
        assert_eq!(
            err.to_string(),
            "trade execution failed (400): insufficient balance"
        );
    }
}
