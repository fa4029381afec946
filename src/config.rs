//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub use crate::retry::RetryPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

/// Where durable state lives and how the bankroll starts
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub dir: String,
    /// Starting capital (USD) used when no bankroll snapshot exists
    #[serde(default = "default_initial_balance")]
    pub initial_balance_usd: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            initial_balance_usd: default_initial_balance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Simulate execution instead of sending real swaps
    #[serde(default = "default_true")]
    pub dry_run: bool,
    /// Fraction of the bankroll withheld as gas runway per sizing decision
    #[serde(default = "default_reserve_fraction")]
    pub reserve_fraction: f64,
    /// Smallest investable amount (USD); sizing never returns less
    #[serde(default = "default_floor_amount")]
    pub floor_amount: f64,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Give up waiting for entry price/market-cap data after this long
    #[serde(default = "default_entry_capture_timeout_secs")]
    pub entry_capture_timeout_secs: u64,
    /// Hard cap on how long a position may stay open (0 = unbounded)
    #[serde(default = "default_max_hold_secs")]
    pub max_hold_secs: u64,
    /// Treat the network as congested (uses the high priority tip)
    #[serde(default)]
    pub assume_congestion: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            reserve_fraction: default_reserve_fraction(),
            floor_amount: default_floor_amount(),
            take_profit_pct: default_take_profit_pct(),
            stop_loss_pct: default_stop_loss_pct(),
            poll_interval_ms: default_poll_interval_ms(),
            entry_capture_timeout_secs: default_entry_capture_timeout_secs(),
            max_hold_secs: default_max_hold_secs(),
            assume_congestion: false,
        }
    }
}

/// Swap fee model: a percentage of the traded amount per side, plus a flat
/// priority tip in SOL converted to USD at the current SOL price
#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    #[serde(default = "default_buy_fee_pct")]
    pub buy_fee_pct: f64,
    #[serde(default = "default_sell_fee_pct")]
    pub sell_fee_pct: f64,
    #[serde(default = "default_normal_tip_sol")]
    pub normal_tip_sol: f64,
    #[serde(default = "default_high_tip_sol")]
    pub high_tip_sol: f64,
    /// SOL/USD price used when no oracle can supply one
    #[serde(default = "default_fallback_sol_price")]
    pub fallback_sol_price_usd: f64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            buy_fee_pct: default_buy_fee_pct(),
            sell_fee_pct: default_sell_fee_pct(),
            normal_tip_sol: default_normal_tip_sol(),
            high_tip_sol: default_high_tip_sol(),
            fallback_sol_price_usd: default_fallback_sol_price(),
        }
    }
}

/// Rotating per-day position caps
#[derive(Debug, Clone, Deserialize)]
pub struct CycleConfig {
    /// Positions allowed per day, indexed by cycle day (rotates).
    /// A limit of 0 disables both the cap and day resets.
    #[serde(default = "default_daily_limits")]
    pub daily_limits: Vec<u32>,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            daily_limits: default_daily_limits(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_dexscreener_url")]
    pub dexscreener_url: String,
    #[serde(default = "default_jupiter_url")]
    pub jupiter_url: String,
    #[serde(default = "default_oracle_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            dexscreener_url: default_dexscreener_url(),
            jupiter_url: default_jupiter_url(),
            timeout_secs: default_oracle_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,
    /// Signing service endpoint; required for live trading
    #[serde(default)]
    pub signer_url: String,
    /// Wallet address the signer is bound to
    #[serde(default)]
    pub wallet_address: String,
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
    /// Simulated-mode transient failure rate in [0,1), for soak testing
    #[serde(default)]
    pub simulated_fail_rate: f64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            signer_url: String::new(),
            wallet_address: String::new(),
            timeout_secs: default_gateway_timeout_secs(),
            simulated_fail_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bot_token")]
    pub bot_token: String,
    #[serde(default = "default_chat_id")]
    pub chat_id: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: default_bot_token(),
            chat_id: default_chat_id(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

// Default value functions
fn default_data_dir() -> String {
    "data".into()
}

fn default_initial_balance() -> f64 {
    25.0
}

fn default_reserve_fraction() -> f64 {
    0.009
}

fn default_floor_amount() -> f64 {
    0.01
}

fn default_take_profit_pct() -> f64 {
    50.0
}

fn default_stop_loss_pct() -> f64 {
    20.0
}

fn default_poll_interval_ms() -> u64 {
    20_000
}

fn default_entry_capture_timeout_secs() -> u64 {
    600
}

fn default_max_hold_secs() -> u64 {
    86_400
}

fn default_buy_fee_pct() -> f64 {
    1.0
}

fn default_sell_fee_pct() -> f64 {
    1.0
}

fn default_normal_tip_sol() -> f64 {
    0.015
}

fn default_high_tip_sol() -> f64 {
    0.1
}

fn default_fallback_sol_price() -> f64 {
    150.0
}

fn default_daily_limits() -> Vec<u32> {
    vec![5, 4]
}

fn default_dexscreener_url() -> String {
    "https://api.dexscreener.com/latest/dex/tokens".into()
}

fn default_jupiter_url() -> String {
    "https://lite-api.jup.ag".into()
}

fn default_oracle_timeout_secs() -> u64 {
    10
}

fn default_gateway_base_url() -> String {
    "https://lite-api.jup.ag".into()
}

fn default_gateway_timeout_secs() -> u64 {
    15
}

fn default_bot_token() -> String {
    std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default()
}

fn default_chat_id() -> String {
    std::env::var("TELEGRAM_CHAT_ID").unwrap_or_default()
}

fn default_queue_capacity() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SNIPER_)
            .add_source(
                config::Environment::with_prefix("SNIPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.data.initial_balance_usd <= 0.0 {
            anyhow::bail!("initial_balance_usd must be positive");
        }

        if !(0.0..1.0).contains(&self.trading.reserve_fraction) {
            anyhow::bail!("reserve_fraction must be in [0, 1)");
        }

        if self.trading.floor_amount <= 0.0 {
            anyhow::bail!("floor_amount must be positive");
        }

        if self.trading.take_profit_pct <= 0.0 {
            anyhow::bail!("take_profit_pct must be positive");
        }

        if self.trading.stop_loss_pct <= 0.0 || self.trading.stop_loss_pct >= 100.0 {
            anyhow::bail!("stop_loss_pct must be between 0 and 100");
        }

        if self.trading.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be positive");
        }

        if self.fees.buy_fee_pct < 0.0 || self.fees.sell_fee_pct < 0.0 {
            anyhow::bail!("fee percentages cannot be negative");
        }

        if self.cycle.daily_limits.is_empty() {
            anyhow::bail!("daily_limits must contain at least one entry");
        }

        if !(0.0..1.0).contains(&self.gateway.simulated_fail_rate) {
            anyhow::bail!("simulated_fail_rate must be in [0, 1)");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry max_attempts must be at least 1");
        }

        if self.telegram.enabled
            && (self.telegram.bot_token.is_empty() || self.telegram.chat_id.is_empty())
        {
            anyhow::bail!("telegram is enabled but bot_token or chat_id is missing");
        }

        if !self.trading.dry_run && self.gateway.signer_url.is_empty() {
            anyhow::bail!("live trading requires gateway.signer_url");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Data:
    dir: {}
    initial_balance: ${}
  Trading:
    dry_run: {}
    reserve_fraction: {}
    take_profit: {}%
    stop_loss: {}%
    poll_interval: {}ms
    max_hold: {}s
  Fees:
    buy: {}% sell: {}%
    tips: {} / {} SOL
  Cycle:
    daily_limits: {:?}
  Oracle:
    dexscreener: {}
    jupiter: {}
  Gateway:
    base_url: {}
    signer_url: {}
  Telegram:
    enabled: {}
    bot_token: {}
"#,
            self.data.dir,
            self.data.initial_balance_usd,
            self.trading.dry_run,
            self.trading.reserve_fraction,
            self.trading.take_profit_pct,
            self.trading.stop_loss_pct,
            self.trading.poll_interval_ms,
            self.trading.max_hold_secs,
            self.fees.buy_fee_pct,
            self.fees.sell_fee_pct,
            self.fees.normal_tip_sol,
            self.fees.high_tip_sol,
            self.cycle.daily_limits,
            mask_url(&self.oracle.dexscreener_url),
            mask_url(&self.oracle.jupiter_url),
            mask_url(&self.gateway.base_url),
            if self.gateway.signer_url.is_empty() {
                "(not set)".to_string()
            } else {
                mask_url(&self.gateway.signer_url)
            },
            self.telegram.enabled,
            if self.telegram.bot_token.is_empty() {
                "(not set)"
            } else {
                "***"
            },
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            trading: TradingConfig::default(),
            fees: FeeConfig::default(),
            cycle: CycleConfig::default(),
            oracle: OracleConfig::default(),
            gateway: GatewayConfig::default(),
            retry: RetryPolicy::default(),
            telegram: TelegramConfig::default(),
            feed: FeedConfig::default(),
        }
    }
}
