//! Jupiter Lite API price provider
//!
//! Also supplies the SOL/USD spot price used for fee conversion.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::{PriceProvider, TokenQuote};
use crate::error::{Error, Result};
use crate::gateway::WSOL_MINT;

#[derive(Debug, Clone, Deserialize)]
struct SearchToken {
    #[serde(rename = "usdPrice")]
    usd_price: Option<f64>,
    mcap: Option<f64>,
    liquidity: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PriceEntry {
    #[serde(rename = "usdPrice")]
    usd_price: Option<f64>,
}

pub struct JupiterProvider {
    client: reqwest::Client,
    base_url: String,
}

impl JupiterProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PriceProvider for JupiterProvider {
    fn name(&self) -> &'static str {
        "jupiter"
    }

    async fn fetch(&self, address: &str) -> Result<TokenQuote> {
        let url = format!("{}/tokens/v2/search?query={}", self.base_url, address);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Oracle(format!("jupiter: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::Oracle(format!("jupiter: status {}", resp.status())));
        }

        let tokens: Vec<SearchToken> = resp
            .json()
            .await
            .map_err(|e| Error::Oracle(format!("jupiter decode: {}", e)))?;

        let Some(token) = tokens.first() else {
            return Ok(TokenQuote::default());
        };

        let source = if token.mcap.is_some() || token.usd_price.is_some() {
            "jupiter".to_string()
        } else {
            String::new()
        };

        Ok(TokenQuote {
            price: token.usd_price,
            market_cap: token.mcap,
            liquidity: token.liquidity,
            source,
        })
    }

    async fn sol_price_usd(&self) -> Result<Option<f64>> {
        let url = format!("{}/price/v3?ids={}", self.base_url, WSOL_MINT);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Oracle(format!("jupiter price: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::Oracle(format!(
                "jupiter price: status {}",
                resp.status()
            )));
        }

        let data: HashMap<String, PriceEntry> = resp
            .json()
            .await
            .map_err(|e| Error::Oracle(format!("jupiter price decode: {}", e)))?;

        Ok(data.get(WSOL_MINT).and_then(|e| e.usd_price))
    }
}
