//! Durable state: bankroll, processed addresses, trade history
//!
//! Three JSON records under one data directory: `bankroll.json` (the
//! compounding balance and cycle counters), `processed.json` (addresses
//! already acted upon) and `trades.json` (append-only closed positions).
//! All writes go through write-to-temp-then-rename so a crash mid-write
//! never leaves a half-written file behind.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::position::Position;

/// Bankroll can be skimmed to nothing but never below this epsilon floor
pub const BALANCE_FLOOR: f64 = 0.01;

/// The single compounding balance shared across all positions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BankrollState {
    pub current_balance: f64,
    pub cycle_index: u32,
    pub positions_opened_today: u32,
    pub last_reset_date: NaiveDate,
}

impl BankrollState {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            current_balance: initial_balance.max(BALANCE_FLOOR),
            cycle_index: 0,
            positions_opened_today: 0,
            last_reset_date: Utc::now().date_naive(),
        }
    }

    /// Settle a closed position: the gross stake leaves the balance, the
    /// proceeds come back. The gas reserve was already withheld at sizing
    /// time, so no second skim happens here.
    pub fn apply_close(&mut self, invested_gross: f64, proceeds: f64) {
        self.current_balance =
            (self.current_balance - invested_gross + proceeds).max(BALANCE_FLOOR);
    }
}

/// Durable, crash-consistent store for the bot's shared state
pub struct Ledger {
    dir: PathBuf,
    initial_balance: f64,
    processed: RwLock<BTreeMap<String, DateTime<Utc>>>,
    trades: RwLock<Vec<Position>>,
}

impl Ledger {
    /// Open (or initialize) the ledger under `dir`
    pub async fn open(dir: impl AsRef<Path>, initial_balance: f64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Persistence(format!("create {}: {}", dir.display(), e)))?;

        let processed = load_or_default::<BTreeMap<String, DateTime<Utc>>>(
            &dir.join("processed.json"),
            "processed addresses",
        )
        .await;
        let trades =
            load_or_default::<Vec<Position>>(&dir.join("trades.json"), "trade history").await;

        info!(
            "Ledger opened: {} processed addresses, {} recorded trades",
            processed.len(),
            trades.len()
        );

        Ok(Self {
            dir,
            initial_balance,
            processed: RwLock::new(processed),
            trades: RwLock::new(trades),
        })
    }

    fn bankroll_path(&self) -> PathBuf {
        self.dir.join("bankroll.json")
    }

    /// Check whether an address was already acted upon this cycle
    pub async fn is_processed(&self, address: &str) -> bool {
        self.processed.read().await.contains_key(address)
    }

    /// Record an address as acted upon. The write is durable before this
    /// returns, closing the gap between duplicate detection and the buy.
    pub async fn mark_processed(&self, address: &str) -> Result<()> {
        let mut processed = self.processed.write().await;
        processed.insert(address.to_string(), Utc::now());
        let data = serde_json::to_vec_pretty(&*processed)?;
        write_atomic(&self.dir.join("processed.json"), &data).await
    }

    /// Forget all processed addresses (cycle reset)
    pub async fn clear_processed(&self) -> Result<()> {
        let mut processed = self.processed.write().await;
        processed.clear();
        let data = serde_json::to_vec_pretty(&*processed)?;
        write_atomic(&self.dir.join("processed.json"), &data).await
    }

    pub async fn processed_count(&self) -> usize {
        self.processed.read().await.len()
    }

    /// Load the bankroll snapshot, falling back to the configured starting
    /// capital when the file is missing or unparseable
    pub async fn load_bankroll(&self) -> BankrollState {
        let path = self.bankroll_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => match serde_json::from_str::<BankrollState>(&data) {
                Ok(state) => {
                    debug!("Loaded bankroll: ${:.2}", state.current_balance);
                    state
                }
                Err(e) => {
                    warn!(
                        "Corrupt bankroll snapshot ({}); starting from ${:.2}",
                        e, self.initial_balance
                    );
                    BankrollState::new(self.initial_balance)
                }
            },
            Err(_) => {
                info!(
                    "No bankroll snapshot; starting from ${:.2}",
                    self.initial_balance
                );
                BankrollState::new(self.initial_balance)
            }
        }
    }

    /// Persist the bankroll snapshot atomically
    pub async fn save_bankroll(&self, state: &BankrollState) -> Result<()> {
        let data = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.bankroll_path(), &data).await
    }

    /// Append a terminal position to the trade history. Prior entries are
    /// never mutated.
    pub async fn append_trade(&self, position: &Position) -> Result<()> {
        let mut trades = self.trades.write().await;
        trades.push(position.clone());
        let data = serde_json::to_vec_pretty(&*trades)?;
        write_atomic(&self.dir.join("trades.json"), &data).await
    }

    /// Most recent trades, newest last
    pub async fn recent_trades(&self, limit: usize) -> Vec<Position> {
        let trades = self.trades.read().await;
        let start = trades.len().saturating_sub(limit);
        trades[start..].to_vec()
    }

    pub async fn trade_count(&self) -> usize {
        self.trades.read().await.len()
    }
}

async fn load_or_default<T: serde::de::DeserializeOwned + Default>(
    path: &Path,
    what: &str,
) -> T {
    match tokio::fs::read_to_string(path).await {
        Ok(data) => match serde_json::from_str(&data) {
            Ok(value) => value,
            Err(e) => {
                warn!("Corrupt {} file ({}); starting empty", what, e);
                T::default()
            }
        },
        Err(_) => T::default(),
    }
}

/// Write-to-temp-then-rename. The rename is atomic on POSIX filesystems, so
/// readers only ever observe the previous or the new complete snapshot.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, data)
        .await
        .map_err(|e| Error::Persistence(format!("write {}: {}", tmp.display(), e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::Persistence(format!("rename {}: {}", path.display(), e)))?;
    Ok(())
}
