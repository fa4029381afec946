//! Dexscreener price provider

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{PriceProvider, TokenQuote};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
struct TokenPairsResponse {
    pairs: Option<Vec<DexPair>>,
    #[serde(rename = "tokenInfo")]
    token_info: Option<TokenInfo>,
}

#[derive(Debug, Clone, Deserialize)]
struct DexPair {
    #[serde(rename = "dexId")]
    dex_id: Option<String>,
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
    #[serde(rename = "marketCap")]
    market_cap: Option<f64>,
    fdv: Option<f64>,
    #[serde(rename = "circulatingSupply")]
    circulating_supply: Option<f64>,
    liquidity: Option<Liquidity>,
}

#[derive(Debug, Clone, Deserialize)]
struct Liquidity {
    usd: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct TokenInfo {
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
    #[serde(rename = "circulatingSupply")]
    circulating_supply: Option<f64>,
    #[serde(rename = "marketCap")]
    market_cap: Option<f64>,
}

pub struct DexScreenerProvider {
    client: reqwest::Client,
    base_url: String,
}

impl DexScreenerProvider {
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
impl PriceProvider for DexScreenerProvider {
    fn name(&self) -> &'static str {
        "dexscreener"
    }

    async fn fetch(&self, address: &str) -> Result<TokenQuote> {
        let url = format!("{}/{}", self.base_url, address);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Oracle(format!("dexscreener: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::Oracle(format!(
                "dexscreener: status {}",
                resp.status()
            )));
        }

        let data: TokenPairsResponse = resp
            .json()
            .await
            .map_err(|e| Error::Oracle(format!("dexscreener decode: {}", e)))?;

        // Prefer pump.fun pairs, then fall back to the first listed
        let pair = data.pairs.as_ref().and_then(|pairs| {
            pairs
                .iter()
                .find(|p| {
                    matches!(p.dex_id.as_deref(), Some("pumpswap") | Some("pumpfun"))
                })
                .or_else(|| pairs.first())
        });

        let info = data.token_info.as_ref();

        let price = pair
            .and_then(|p| p.price_usd.as_ref())
            .or_else(|| info.and_then(|i| i.price_usd.as_ref()))
            .and_then(|p| p.parse::<f64>().ok());

        let supply = pair
            .and_then(|p| p.circulating_supply)
            .or_else(|| info.and_then(|i| i.circulating_supply));

        let market_cap = pair
            .and_then(|p| p.market_cap.or(p.fdv))
            .or_else(|| info.and_then(|i| i.market_cap))
            .or_else(|| match (price, supply) {
                (Some(p), Some(s)) => Some(p * s),
                _ => None,
            });

        let liquidity = pair.and_then(|p| p.liquidity.as_ref()).and_then(|l| l.usd);

        let source = if market_cap.is_some() || price.is_some() {
            "dexscreener".to_string()
        } else {
            String::new()
        };

        Ok(TokenQuote {
            price,
            market_cap,
            liquidity,
            source,
        })
    }
}
