//! Rebalancing strategy.
//!
//! Contains the core logic for:
//! - Target allocation and position snapshots
//! - Drift detection and order sizing
//! - Sequential rebalance execution
//! - Portfolio status reporting

mod allocation;
mod executor;
mod manager;
mod position;
mod rebalancer;
mod summary;

pub use allocation::{TargetAllocation, TargetWeight, WEIGHT_SUM_TOLERANCE};
pub use executor::{ExecutedTrade, RebalanceExecutor, RebalanceReport, RebalanceState};
pub use manager::PortfolioManager;
pub use position::{build_positions, portfolio_value, total_value, Position};
pub use rebalancer::{AllocationRebalancer, OrderSide, RebalanceConfig, TradeOrder};
pub use summary::{PortfolioSummary, PositionSummary};
