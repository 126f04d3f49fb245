//! Venue and market-data integrations.
//!
//! ## Recall
//! Trading venue REST API for:
//! - Agent balances and portfolio details
//! - Token swap execution
//!
//! ## CoinGecko
//! Read-only USD prices per token.
//!
//! ## Mock
//! In-memory venue implementing all capabilities, for tests.

mod coingecko;
pub mod mock;
mod recall;
pub mod tokens;
mod traits;
mod types;

pub use coingecko::CoinGeckoClient;
pub use mock::MockVenue;
pub use recall::RecallClient;
pub use tokens::{reference_tokens, TokenConfig, TokenRegistry};
pub use traits::{BalanceSource, PriceSource, TradeExecutor};
#[cfg(test)]
pub use traits::{MockBalanceSource, MockPriceSource, MockTradeExecutor};
pub use types::*;
