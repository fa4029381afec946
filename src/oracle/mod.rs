//! Price oracle with provider fallback
//!
//! Providers are tried in configured order (Dexscreener, then Jupiter) and
//! their responses normalized into one [`TokenQuote`] schema. "Token not
//! found" is a valid result (all fields None), never an error; errors mean
//! genuine transport failure and are retryable.

pub mod dexscreener;
pub mod jupiter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::OracleConfig;
use crate::error::Result;
use crate::retry::RetryPolicy;

pub use dexscreener::DexScreenerProvider;
pub use jupiter::JupiterProvider;

/// Normalized best-effort market data for one token
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenQuote {
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub liquidity: Option<f64>,
    pub source: String,
}

impl TokenQuote {
    /// True when the quote carries no usable exit signal
    pub fn is_unknown(&self) -> bool {
        self.price.is_none() && self.market_cap.is_none()
    }
}

/// One upstream market-data source
#[async_trait]
pub trait PriceProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch a quote. Missing data maps to None fields; only transport
    /// failures return Err.
    async fn fetch(&self, address: &str) -> Result<TokenQuote>;

    /// SOL/USD spot price, if this provider offers one
    async fn sol_price_usd(&self) -> Result<Option<f64>> {
        Ok(None)
    }
}

/// Ordered provider chain producing a single normalized quote
pub struct PriceOracle {
    providers: Vec<Box<dyn PriceProvider>>,
    fallback_sol_price: f64,
}

impl PriceOracle {
    pub fn new(providers: Vec<Box<dyn PriceProvider>>, fallback_sol_price: f64) -> Self {
        Self {
            providers,
            fallback_sol_price,
        }
    }

    /// Build the default Dexscreener -> Jupiter chain
    pub fn from_config(config: &OracleConfig, fallback_sol_price: f64) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        Self::new(
            vec![
                Box::new(DexScreenerProvider::new(&config.dexscreener_url, timeout)),
                Box::new(JupiterProvider::new(&config.jupiter_url, timeout)),
            ],
            fallback_sol_price,
        )
    }

    /// Try each provider in order; the first quote with any data wins.
    /// Returns an unknown quote when every provider answered "not found",
    /// and an error only when all of them failed at the transport level.
    pub async fn fetch(&self, address: &str) -> Result<TokenQuote> {
        let mut last_err = None;
        let mut any_answered = false;

        for provider in &self.providers {
            match provider.fetch(address).await {
                Ok(quote) if !quote.is_unknown() => {
                    debug!(
                        "{} quote for {}: price={:?} mcap={:?}",
                        provider.name(),
                        address,
                        quote.price,
                        quote.market_cap
                    );
                    return Ok(quote);
                }
                Ok(_) => {
                    any_answered = true;
                }
                Err(e) => {
                    debug!("{} failed for {}: {}", provider.name(), address, e);
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if !any_answered => Err(e),
            _ => Ok(TokenQuote::default()),
        }
    }

    /// Best-effort fetch that retries both transport failures and unknown
    /// data, returning an unknown quote once attempts are exhausted. Used
    /// for entry/exit capture where the caller proceeds either way.
    pub async fn fetch_with_retry(
        &self,
        address: &str,
        policy: RetryPolicy,
        cancel: &CancellationToken,
    ) -> TokenQuote {
        let attempts = policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.fetch(address).await {
                Ok(quote) if !quote.is_unknown() => return quote,
                Ok(_) => debug!("No market data for {} (attempt {})", address, attempt),
                Err(e) => warn!("Quote fetch failed for {} (attempt {}): {}", address, attempt, e),
            }
            if attempt < attempts {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(policy.delay_ms)) => {}
                    _ = cancel.cancelled() => break,
                }
            }
        }
        TokenQuote::default()
    }

    /// SOL/USD spot from the first provider that has one, else the
    /// configured fallback
    pub async fn sol_price_usd(&self) -> f64 {
        for provider in &self.providers {
            match provider.sol_price_usd().await {
                Ok(Some(price)) if price > 0.0 => return price,
                Ok(_) => {}
                Err(e) => debug!("{} SOL price failed: {}", provider.name(), e),
            }
        }
        warn!(
            "No provider supplied a SOL price; using fallback {}",
            self.fallback_sol_price
        );
        self.fallback_sol_price
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedProvider;
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_fallback_ordering() {
        // first provider knows nothing, second has the data
        let empty = ScriptedProvider::new(vec![ScriptedProvider::unknown()]);
        let full = ScriptedProvider::new(vec![ScriptedProvider::mcap(120_000.0)]);
        let oracle = PriceOracle::new(vec![Box::new(empty), Box::new(full)], 150.0);

        let quote = oracle.fetch("CA").await.unwrap();
        assert_eq!(quote.market_cap, Some(120_000.0));
    }

    #[tokio::test]
    async fn test_not_found_is_not_an_error() {
        let a = ScriptedProvider::new(vec![ScriptedProvider::unknown()]);
        let b = ScriptedProvider::new(vec![Err(Error::Oracle("down".into()))]);
        let oracle = PriceOracle::new(vec![Box::new(a), Box::new(b)], 150.0);

        // one provider answered "not found", so the result is an unknown
        // quote rather than a transport error
        let quote = oracle.fetch("CA").await.unwrap();
        assert!(quote.is_unknown());
    }

    #[tokio::test]
    async fn test_all_transport_failures_propagate() {
        let a = ScriptedProvider::new(vec![Err(Error::Oracle("down".into()))]);
        let b = ScriptedProvider::new(vec![Err(Error::OracleTimeout(10))]);
        let oracle = PriceOracle::new(vec![Box::new(a), Box::new(b)], 150.0);

        assert!(oracle.fetch("CA").await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_with_retry_recovers() {
        let provider = ScriptedProvider::new(vec![
            ScriptedProvider::unknown(),
            ScriptedProvider::mcap(99_000.0),
        ]);
        let oracle = PriceOracle::new(vec![Box::new(provider)], 150.0);

        let quote = oracle
            .fetch_with_retry(
                "CA",
                RetryPolicy {
                    max_attempts: 3,
                    delay_ms: 1,
                },
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(quote.market_cap, Some(99_000.0));
    }

    #[tokio::test]
    async fn test_sol_price_fallback() {
        let mut provider = ScriptedProvider::new(vec![]);
        provider.sol_price = None;
        let oracle = PriceOracle::new(vec![Box::new(provider)], 150.0);
        assert_eq!(oracle.sol_price_usd().await, 150.0);
    }
}
