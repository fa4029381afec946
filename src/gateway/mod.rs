//! Swap execution gateway
//!
//! One trait covering both live execution (Jupiter order -> sign ->
//! execute) and dry-run simulation. The simulated gateway fabricates
//! references without any network effects; everything downstream of the
//! gateway (ledger, bankroll) runs identically in both modes so dry-run
//! books stay trustworthy.

pub mod jupiter;
pub mod signer;
pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use jupiter::JupiterGateway;
pub use signer::{RemoteSigner, Signer};
pub use simulated::SimulatedGateway;

/// Wrapped SOL mint, the quote side of every swap
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Priority-fee tier for the swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Normal,
    High,
}

/// How much to trade
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TradeAmount {
    /// Exact SOL amount (buys)
    Sol(f64),
    /// Whole token balance held by the wallet (sells)
    FullBalance,
}

/// One swap the controller wants executed
#[derive(Debug, Clone)]
pub struct TradeIntent {
    pub side: TradeSide,
    pub address: String,
    pub amount: TradeAmount,
    pub urgency: Urgency,
}

impl TradeIntent {
    pub fn buy(address: &str, sol_amount: f64, urgency: Urgency) -> Self {
        Self {
            side: TradeSide::Buy,
            address: address.to_string(),
            amount: TradeAmount::Sol(sol_amount),
            urgency,
        }
    }

    pub fn sell(address: &str, urgency: Urgency) -> Self {
        Self {
            side: TradeSide::Sell,
            address: address.to_string(),
            amount: TradeAmount::FullBalance,
            urgency,
        }
    }
}

/// Executes trade intents and returns an opaque transaction reference.
/// Transient failures surface as retryable errors; the caller owns the
/// retry policy.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// "live" or "simulated", for logs and notifications
    fn mode(&self) -> &'static str;

    async fn execute(&self, intent: &TradeIntent) -> Result<String>;
}
