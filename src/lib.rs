//! Telegram-fed Solana token sniper
//!
//! Turns token call signals into a full position lifecycle against one
//! compounding bankroll: size, buy, monitor against take-profit/stop-loss,
//! sell and settle. All state survives restarts through an atomic JSON
//! ledger, and dry-run mode exercises the entire pipeline against
//! simulated execution.

pub mod cli;
pub mod config;
pub mod cycle;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod ledger;
pub mod notifier;
pub mod oracle;
pub mod position;
pub mod retry;
pub mod sizing;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
