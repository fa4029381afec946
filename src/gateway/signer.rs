//! Signer capability
//!
//! Transaction signing stays behind this trait: the gateway hands over an
//! unsigned base64 transaction and gets back a signed one. Key handling
//! lives outside this crate, in whatever service implements the contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// A signing capability bound to one wallet address
#[async_trait]
pub trait Signer: Send + Sync {
    /// The wallet address this signer signs for
    fn address(&self) -> &str;

    /// Sign a base64-encoded transaction, returning it signed
    async fn sign_transaction(&self, tx_base64: &str) -> Result<String>;
}

#[derive(Serialize)]
struct SignRequest<'a> {
    transaction: &'a str,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedTransaction")]
    signed_transaction: String,
}

/// Delegates signing to a local signing service over HTTP
pub struct RemoteSigner {
    client: reqwest::Client,
    url: String,
    address: String,
}

impl RemoteSigner {
    pub fn new(url: &str, address: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            url: url.to_string(),
            address: address.to_string(),
        }
    }
}

#[async_trait]
impl Signer for RemoteSigner {
    fn address(&self) -> &str {
        &self.address
    }

    async fn sign_transaction(&self, tx_base64: &str) -> Result<String> {
        let resp = self
            .client
            .post(&self.url)
            .json(&SignRequest {
                transaction: tx_base64,
            })
            .send()
            .await
            .map_err(|e| Error::Signing(format!("signer unreachable: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::Signing(format!("signer status {}", resp.status())));
        }

        let signed: SignResponse = resp
            .json()
            .await
            .map_err(|e| Error::Signing(format!("signer decode: {}", e)))?;

        Ok(signed.signed_transaction)
    }
}
