//! CLI command implementations

use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::feed;
use crate::gateway::{
    ExecutionGateway, JupiterGateway, RemoteSigner, SimulatedGateway, WSOL_MINT,
};
use crate::ledger::Ledger;
use crate::notifier::{FanoutNotifier, LogNotifier, Notifier, TelegramNotifier};
use crate::oracle::PriceOracle;
use crate::position::{PositionController, PositionState};

/// Start the trading bot
pub async fn start(config: &Config, dry_run: bool) -> Result<()> {
    let mut config = config.clone();
    if dry_run {
        config.trading.dry_run = true;
    }
    if config.trading.dry_run {
        warn!("Running in DRY-RUN mode - swaps are simulated, the ledger is real");
    }

    info!("Starting sniper bot...");
    info!(
        "Take-profit: +{}%, stop-loss: -{}%, poll every {}ms",
        config.trading.take_profit_pct,
        config.trading.stop_loss_pct,
        config.trading.poll_interval_ms
    );

    let ledger = Arc::new(Ledger::open(&config.data.dir, config.data.initial_balance_usd).await?);
    let oracle = Arc::new(PriceOracle::from_config(
        &config.oracle,
        config.fees.fallback_sol_price_usd,
    ));

    let gateway: Arc<dyn ExecutionGateway> = if config.trading.dry_run {
        Arc::new(SimulatedGateway::new(config.gateway.simulated_fail_rate))
    } else {
        let signer = Arc::new(RemoteSigner::new(
            &config.gateway.signer_url,
            &config.gateway.wallet_address,
            Duration::from_secs(config.gateway.timeout_secs),
        ));
        Arc::new(JupiterGateway::new(&config.gateway, signer))
    };

    let notifier: Arc<dyn Notifier> = if config.telegram.enabled {
        info!("Telegram notifications enabled");
        Arc::new(FanoutNotifier::new(vec![
            Box::new(LogNotifier),
            Box::new(TelegramNotifier::new(&config.telegram)),
        ]))
    } else {
        Arc::new(LogNotifier)
    };

    let cancel = CancellationToken::new();
    let (signal_tx, signal_rx) = mpsc::channel(config.feed.queue_capacity);

    let controller = Arc::new(
        PositionController::new(&config, ledger, oracle, gateway, notifier, cancel.clone()).await,
    );

    let feed_task = tokio::spawn(feed::run_stdin_feed(signal_tx, cancel.clone()));

    tokio::select! {
        _ = controller.run(signal_rx) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            cancel.cancel();
        }
    }

    cancel.cancel();
    feed_task.abort();

    info!("Final balance: ${:.2}", controller.balance().await);
    Ok(())
}

/// Show the bankroll and recent trades
pub async fn status(config: &Config) -> Result<()> {
    let ledger = Ledger::open(&config.data.dir, config.data.initial_balance_usd).await?;
    let bankroll = ledger.load_bankroll().await;
    let trades = ledger.recent_trades(10).await;
    let total = ledger.trade_count().await;

    let wins = trades
        .iter()
        .filter(|t| t.state == PositionState::ClosedWin)
        .count();
    let losses = trades
        .iter()
        .filter(|t| t.state == PositionState::ClosedLoss)
        .count();
    let failed = trades
        .iter()
        .filter(|t| t.state == PositionState::Failed)
        .count();

    println!("\n=== SNIPER BOT STATUS ===\n");
    println!("Balance: ${:.2}", bankroll.current_balance);
    println!(
        "Cycle day {} - {} positions opened today (since {})",
        bankroll.cycle_index, bankroll.positions_opened_today, bankroll.last_reset_date
    );
    println!("Processed addresses: {}", ledger.processed_count().await);
    println!("Recorded trades: {}", total);

    println!("\n=== RECENT TRADES ===\n");
    if trades.is_empty() {
        println!("No trades yet.");
    } else {
        println!("(last {}: {} wins, {} losses, {} failed)\n", trades.len(), wins, losses, failed);
        for trade in trades.iter().rev() {
            let trigger = trade
                .exit_trigger
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".into());
            println!(
                "{:<12} {:<44} ${:>8.2} in  ${:>+8.2} P/L  ({})",
                trade.state.to_string(),
                trade.address,
                trade.invested_gross,
                trade.realized_profit,
                trigger
            );
        }
    }

    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check upstream API reachability
pub async fn health(config: &Config) -> Result<()> {
    println!("\n=== HEALTH CHECK ===\n");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.oracle.timeout_secs))
        .build()?;
    let mut all_healthy = true;

    print!("Dexscreener... ");
    let url = format!("{}/{}", config.oracle.dexscreener_url.trim_end_matches('/'), WSOL_MINT);
    match probe(&client, &url).await {
        Ok(ms) => println!("OK ({}ms)", ms),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    print!("Jupiter price... ");
    let url = format!(
        "{}/price/v3?ids={}",
        config.oracle.jupiter_url.trim_end_matches('/'),
        WSOL_MINT
    );
    match probe(&client, &url).await {
        Ok(ms) => println!("OK ({}ms)", ms),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    if !config.trading.dry_run {
        print!("Signing service... ");
        match probe(&client, &config.gateway.signer_url).await {
            Ok(ms) => println!("OK ({}ms)", ms),
            Err(e) => {
                println!("FAILED: {}", e);
                all_healthy = false;
            }
        }
    }

    if config.telegram.enabled {
        print!("Telegram bot... ");
        let url = format!(
            "https://api.telegram.org/bot{}/getMe",
            config.telegram.bot_token
        );
        match probe(&client, &url).await {
            Ok(ms) => println!("OK ({}ms)", ms),
            Err(e) => {
                println!("FAILED: {}", e);
                all_healthy = false;
            }
        }
    }

    println!();
    if all_healthy {
        println!("All systems healthy.");
    } else {
        println!("Some checks failed.");
    }

    Ok(())
}

async fn probe(client: &reqwest::Client, url: &str) -> Result<u128> {
    let started = Instant::now();
    let resp = client.get(url).send().await?;
    // any HTTP answer proves reachability; 4xx just means the probe target
    // dislikes the request shape
    if resp.status().is_server_error() {
        anyhow::bail!("status {}", resp.status());
    }
    Ok(started.elapsed().as_millis())
}
