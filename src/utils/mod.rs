//! Shared utilities.

pub mod decimal;

pub use decimal::{from_base_units, safe_div, to_base_units};
