//! Live execution via the Jupiter Ultra API
//!
//! Flow per swap: fetch an order (unsigned transaction + request id), sign
//! through the [`Signer`] capability, then submit to the execute endpoint.
//! Sells first resolve the wallet's token balance from the balances
//! endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    ExecutionGateway, Signer, TradeAmount, TradeIntent, TradeSide, LAMPORTS_PER_SOL, WSOL_MINT,
};
use crate::config::GatewayConfig;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct OrderResponse {
    transaction: Option<String>,
    #[serde(rename = "requestId")]
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    status: Option<String>,
    signature: Option<String>,
    txid: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenBalance {
    amount: Option<String>,
}

pub struct JupiterGateway {
    client: reqwest::Client,
    base_url: String,
    signer: Arc<dyn Signer>,
}

impl JupiterGateway {
    pub fn new(config: &GatewayConfig, signer: Arc<dyn Signer>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            signer,
        }
    }

    /// Resolve the intent into (input mint, output mint, raw amount)
    async fn resolve_route(&self, intent: &TradeIntent) -> Result<(String, String, u64)> {
        match (intent.side, intent.amount) {
            (TradeSide::Buy, TradeAmount::Sol(sol)) => {
                let lamports = (sol * LAMPORTS_PER_SOL as f64).round() as u64;
                if lamports == 0 {
                    return Err(Error::ExecutionRejected(
                        "buy amount rounds to zero lamports".into(),
                    ));
                }
                Ok((WSOL_MINT.to_string(), intent.address.clone(), lamports))
            }
            (TradeSide::Sell, TradeAmount::FullBalance) => {
                let amount = self.token_balance(&intent.address).await?;
                if amount == 0 {
                    return Err(Error::ExecutionRejected(format!(
                        "no {} balance to sell",
                        intent.address
                    )));
                }
                Ok((intent.address.clone(), WSOL_MINT.to_string(), amount))
            }
            (side, amount) => Err(Error::Gateway(format!(
                "unsupported intent: {} {:?}",
                side, amount
            ))),
        }
    }

    /// Raw token balance of the signer's wallet
    async fn token_balance(&self, mint: &str) -> Result<u64> {
        let url = format!(
            "{}/ultra/v1/balances/{}",
            self.base_url,
            self.signer.address()
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Gateway(format!("balances: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::Gateway(format!("balances status {}", resp.status())));
        }

        let balances: HashMap<String, TokenBalance> = resp
            .json()
            .await
            .map_err(|e| Error::Gateway(format!("balances decode: {}", e)))?;

        Ok(balances
            .get(mint)
            .and_then(|b| b.amount.as_ref())
            .and_then(|a| a.parse::<u64>().ok())
            .unwrap_or(0))
    }
}

#[async_trait]
impl ExecutionGateway for JupiterGateway {
    fn mode(&self) -> &'static str {
        "live"
    }

    async fn execute(&self, intent: &TradeIntent) -> Result<String> {
        let (input_mint, output_mint, amount) = self.resolve_route(intent).await?;
        debug!(
            "{} order: {} -> {} amount={}",
            intent.side, input_mint, output_mint, amount
        );

        let order_url = format!("{}/ultra/v1/order", self.base_url);
        let resp = self
            .client
            .get(&order_url)
            .query(&[
                ("inputMint", input_mint.as_str()),
                ("outputMint", output_mint.as_str()),
                ("amount", &amount.to_string()),
                ("taker", self.signer.address()),
            ])
            .send()
            .await
            .map_err(|e| Error::Gateway(format!("order: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::Gateway(format!("order status {}", resp.status())));
        }

        let order: OrderResponse = resp
            .json()
            .await
            .map_err(|e| Error::Gateway(format!("order decode: {}", e)))?;

        let (Some(tx), Some(request_id)) = (order.transaction, order.request_id) else {
            return Err(Error::ExecutionRejected("order without transaction".into()));
        };

        let signed = self.signer.sign_transaction(&tx).await?;

        let execute_url = format!("{}/ultra/v1/execute", self.base_url);
        let resp = self
            .client
            .post(&execute_url)
            .json(&serde_json::json!({
                "signedTransaction": signed,
                "requestId": request_id,
            }))
            .send()
            .await
            .map_err(|e| Error::Gateway(format!("execute: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::Gateway(format!("execute status {}", resp.status())));
        }

        let result: ExecuteResponse = resp
            .json()
            .await
            .map_err(|e| Error::Gateway(format!("execute decode: {}", e)))?;

        if result
            .status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("success"))
            .unwrap_or(false)
        {
            let reference = result
                .signature
                .or(result.txid)
                .unwrap_or_else(|| "unknown".to_string());
            info!("{} executed: {}", intent.side, reference);
            Ok(reference)
        } else {
            let reason = result.error.unwrap_or_else(|| "unknown failure".into());
            warn!("{} rejected: {}", intent.side, reason);
            Err(Error::ExecutionRejected(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::signer::testing::StaticSigner;
    use crate::gateway::Urgency;

    fn gateway() -> JupiterGateway {
        JupiterGateway::new(
            &GatewayConfig::default(),
            Arc::new(StaticSigner {
                address: "Wa11etAddre55111111111111111111111111111111".into(),
            }),
        )
    }

    #[tokio::test]
    async fn test_buy_route_resolution() {
        let intent = TradeIntent::buy("Mint1", 0.5, Urgency::Normal);
        let (input, output, amount) = gateway().resolve_route(&intent).await.unwrap();
        assert_eq!(input, WSOL_MINT);
        assert_eq!(output, "Mint1");
        assert_eq!(amount, 500_000_000);
    }

    #[tokio::test]
    async fn test_zero_lamport_buy_rejected() {
        let intent = TradeIntent::buy("Mint1", 0.0, Urgency::Normal);
        let result = gateway().resolve_route(&intent).await;
        assert!(matches!(result, Err(Error::ExecutionRejected(_))));
    }

    #[tokio::test]
    async fn test_static_signer_contract() {
        let signer = StaticSigner {
            address: "Wa11et".into(),
        };
        assert_eq!(signer.address(), "Wa11et");
        assert_eq!(
            signer.sign_transaction("AQID").await.unwrap(),
            "signed:AQID"
        );
    }

    #[test]
    fn test_decode_execute_success() {
        let resp: ExecuteResponse =
            serde_json::from_str(r#"{"status":"Success","signature":"5abc"}"#).unwrap();
        assert_eq!(resp.status.as_deref(), Some("Success"));
        assert_eq!(resp.signature.as_deref(), Some("5abc"));
    }

    #[test]
    fn test_decode_execute_failure() {
        let resp: ExecuteResponse =
            serde_json::from_str(r#"{"status":"Failed","error":"slippage"}"#).unwrap();
        assert_eq!(resp.error.as_deref(), Some("slippage"));
    }

    #[test]
    fn test_decode_order() {
        let resp: OrderResponse =
            serde_json::from_str(r#"{"transaction":"AQID","requestId":"r1"}"#).unwrap();
        assert_eq!(resp.transaction.as_deref(), Some("AQID"));
        assert_eq!(resp.request_id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_decode_balances() {
        let balances: HashMap<String, TokenBalance> =
            serde_json::from_str(r#"{"Mint1":{"amount":"123456"}}"#).unwrap();
        assert_eq!(
            balances["Mint1"].amount.as_deref().unwrap().parse::<u64>().unwrap(),
            123_456
        );
    }
}
