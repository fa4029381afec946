//! Simulated execution for dry runs
//!
//! Fabricates transaction references without touching the network. The
//! controller runs the exact same ledger and bankroll updates it would in
//! live mode, so dry-run statistics stay honest. An optional failure rate
//! injects transient rejections to exercise the retry path during soak
//! tests.

use async_trait::async_trait;
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use super::{ExecutionGateway, TradeIntent};
use crate::error::{Error, Result};

pub struct SimulatedGateway {
    fail_rate: f64,
}

impl SimulatedGateway {
    pub fn new(fail_rate: f64) -> Self {
        Self { fail_rate }
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[async_trait]
impl ExecutionGateway for SimulatedGateway {
    fn mode(&self) -> &'static str {
        "simulated"
    }

    async fn execute(&self, intent: &TradeIntent) -> Result<String> {
        if self.fail_rate > 0.0 && rand::thread_rng().gen::<f64>() < self.fail_rate {
            return Err(Error::ExecutionRejected("simulated transient failure".into()));
        }

        let reference = format!("SIM_{}_{}", intent.side, Uuid::new_v4().simple());
        info!("Simulated {} for {}: {}", intent.side, intent.address, reference);
        Ok(reference)
    }
}
