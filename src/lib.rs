//! # Portfolio Rebalancer
//!
//! Keeps a token portfolio on the Recall trading venue at fixed target
//! weights, rebalancing once a day through a single base asset (USDC).
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `exchange`: Recall and CoinGecko clients, token table, mock venue
//! - `strategy`: Positions, drift-gated order sizing and execution
//! - `scheduler`: Daily rebalance and periodic reporting jobs
//! - `utils`: Shared utilities and decimal arithmetic

pub mod config;
pub mod error;
pub mod exchange;
pub mod scheduler;
pub mod strategy;
pub mod utils;

pub use config::Config;
pub use error::{RebalanceError, Result};
