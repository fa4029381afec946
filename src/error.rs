//! Error types for the sniper bot

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sniper bot
#[derive(Error, Debug)]
pub enum Error {
    // Price oracle errors
    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Oracle timeout after {0}s")]
    OracleTimeout(u64),

    // Execution gateway errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Swap rejected by gateway: {0}")]
    ExecutionRejected(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Buy failed for {address} after {attempts} attempts")]
    BuyFailed { address: String, attempts: u32 },

    #[error("Sell failed for {address} after {attempts} attempts")]
    SellFailed { address: String, attempts: u32 },

    // Sizing errors
    #[error("Insufficient balance: {available:.4} available, {required:.4} required")]
    InsufficientBalance { available: f64, required: f64 },

    // Persistence errors
    #[error("Persistence failed: {0}")]
    Persistence(String),

    // Lifecycle
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient upstream failure)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Oracle(_)
                | Error::OracleTimeout(_)
                | Error::Gateway(_)
                | Error::ExecutionRejected(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
