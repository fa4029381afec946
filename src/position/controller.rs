//! Position lifecycle orchestration
//!
//! One controller drives every position from signal to settlement:
//! admission (day reset, duplicate check, daily cap, bankroll floor),
//! sizing, buy with retries, entry capture, the monitoring poll loop, and
//! the sell/settle tail. The bankroll lives behind a single async mutex;
//! admission holds it across check-and-mark so concurrent signals cannot
//! double-spend the balance or slip past the daily cap.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::exit;
use super::types::{ExitTrigger, Position, PositionState};
use crate::config::{Config, FeeConfig, TradingConfig};
use crate::cycle::CycleScheduler;
use crate::error::{Error, Result};
use crate::gateway::{ExecutionGateway, TradeIntent, TradeSide, Urgency};
use crate::ledger::{BankrollState, Ledger};
use crate::notifier::{Notifier, TradeEvent};
use crate::oracle::PriceOracle;
use crate::retry::{with_retry, RetryPolicy};
use crate::sizing::RiskSizer;

pub struct PositionController {
    trading: TradingConfig,
    fees: FeeConfig,
    retry: RetryPolicy,
    sizer: RiskSizer,
    scheduler: CycleScheduler,
    ledger: Arc<Ledger>,
    oracle: Arc<PriceOracle>,
    gateway: Arc<dyn ExecutionGateway>,
    notifier: Arc<dyn Notifier>,
    bankroll: Mutex<BankrollState>,
    cancel: CancellationToken,
}

impl PositionController {
    pub async fn new(
        config: &Config,
        ledger: Arc<Ledger>,
        oracle: Arc<PriceOracle>,
        gateway: Arc<dyn ExecutionGateway>,
        notifier: Arc<dyn Notifier>,
        cancel: CancellationToken,
    ) -> Self {
        let bankroll = ledger.load_bankroll().await;
        info!(
            "Bankroll ${:.2}, cycle day {}, {} opened today ({} mode)",
            bankroll.current_balance,
            bankroll.cycle_index,
            bankroll.positions_opened_today,
            gateway.mode()
        );
        Self {
            trading: config.trading.clone(),
            fees: config.fees.clone(),
            retry: config.retry,
            sizer: RiskSizer::new(config.trading.reserve_fraction, config.trading.floor_amount),
            scheduler: CycleScheduler::new(config.cycle.clone()),
            ledger,
            oracle,
            gateway,
            notifier,
            bankroll: Mutex::new(bankroll),
            cancel,
        }
    }

    pub async fn balance(&self) -> f64 {
        self.bankroll.lock().await.current_balance
    }

    pub async fn bankroll_snapshot(&self) -> BankrollState {
        self.bankroll.lock().await.clone()
    }

    /// Consume token signals until the feed closes or shutdown is requested
    pub async fn run(&self, mut signals: mpsc::Receiver<String>) {
        info!("Trading loop started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Trading loop stopping");
                    break;
                }
                next = signals.recv() => match next {
                    Some(address) => {
                        if let Err(e) = self.handle_signal(&address).await {
                            error!("Signal {} failed: {}", address, e);
                        }
                    }
                    None => {
                        info!("Signal feed closed");
                        break;
                    }
                }
            }
        }
    }

    /// Drive one token signal through the whole lifecycle. Skipped signals
    /// (duplicate, cap reached, bankroll exhausted) return Ok.
    pub async fn handle_signal(&self, address: &str) -> Result<()> {
        let Some(invested_gross) = self.admit(address).await else {
            return Ok(());
        };

        let urgency = if self.trading.assume_congestion {
            Urgency::High
        } else {
            Urgency::Normal
        };
        let sol_price = self.oracle.sol_price_usd().await;
        let buy_fee = self.fees.estimate(TradeSide::Buy, urgency, sol_price);
        let invested_net = self.sizer.adjust_for_fees(invested_gross, buy_fee);

        let mut position = Position::new(address.to_string(), invested_gross, invested_net);
        info!(
            "Opening position in {}: ${:.2} gross, ${:.2} after fees",
            address, invested_gross, invested_net
        );

        let intent = TradeIntent::buy(address, invested_net / sol_price, urgency);
        match with_retry(self.retry, "buy", &self.cancel, || {
            self.gateway.execute(&intent)
        })
        .await
        {
            Ok(reference) => {
                position.buy_reference = Some(reference);
                position.transition(PositionState::Bought)?;
            }
            Err(Error::Cancelled) => {
                info!("Buy cancelled for {}", address);
                return Ok(());
            }
            Err(e) => {
                let failure = Error::BuyFailed {
                    address: address.to_string(),
                    attempts: self.retry.max_attempts,
                };
                warn!("{}: {}", failure, e);
                position.transition(PositionState::Failed)?;
                position.closed_at = Some(Utc::now());
                persist_best_effort(
                    "trade history",
                    self.ledger.append_trade(&position).await,
                );
                self.notifier
                    .notify(&TradeEvent::error(&position, format!("{}: {}", failure, e)))
                    .await;
                return Ok(());
            }
        }

        // Entry reference is best-effort: a brand-new token may have no
        // indexed market data yet. Monitoring keeps trying until the
        // capture timeout.
        let entry = self
            .oracle
            .fetch_with_retry(address, self.retry, &self.cancel)
            .await;
        position.entry_price = entry.price;
        position.entry_market_cap = entry.market_cap;
        position.transition(PositionState::Monitoring)?;
        self.notifier.notify(&TradeEvent::buy(&position)).await;

        let Some(trigger) = self.monitor(&mut position).await else {
            // shutdown; the processed set keeps a restart from re-buying
            warn!(
                "Shutdown while monitoring {}; position left open",
                position.address
            );
            return Ok(());
        };

        self.close(&mut position, trigger, urgency).await
    }

    /// Admission gate, all under the bankroll lock: heartbeat the day
    /// reset, reject duplicates and over-cap signals, then mark the address
    /// processed and count the slot BEFORE any buy goes out.
    async fn admit(&self, address: &str) -> Option<f64> {
        let mut bankroll = self.bankroll.lock().await;

        if self
            .scheduler
            .maybe_reset(&mut bankroll, Utc::now().date_naive())
        {
            persist_best_effort("bankroll", self.ledger.save_bankroll(&bankroll).await);
            persist_best_effort("processed set", self.ledger.clear_processed().await);
        }

        if self.ledger.is_processed(address).await {
            debug!("Skipping {}: already processed", address);
            return None;
        }
        if !self.scheduler.can_open_position(&bankroll) {
            info!(
                "Skipping {}: daily cap reached ({} opened)",
                address, bankroll.positions_opened_today
            );
            return None;
        }
        if !self.sizer.can_sustain(bankroll.current_balance) {
            warn!(
                "Skipping {}: {}",
                address,
                Error::InsufficientBalance {
                    available: bankroll.current_balance,
                    required: self.trading.floor_amount,
                }
            );
            return None;
        }

        persist_best_effort("processed set", self.ledger.mark_processed(address).await);
        let invested_gross = self.sizer.next_investment(bankroll.current_balance);
        self.scheduler.record_position_opened(&mut bankroll);
        persist_best_effort("bankroll", self.ledger.save_bankroll(&bankroll).await);

        Some(invested_gross)
    }

    /// Poll until an exit rule fires. Returns None only on shutdown.
    async fn monitor(&self, position: &mut Position) -> Option<ExitTrigger> {
        let poll = Duration::from_millis(self.trading.poll_interval_ms);
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            let held_secs = (Utc::now() - position.opened_at).num_seconds().max(0) as u64;

            if position.entry_unknown() {
                if held_secs >= self.trading.entry_capture_timeout_secs {
                    warn!(
                        "No entry data for {} after {}s; closing at break-even",
                        position.address, held_secs
                    );
                    return Some(ExitTrigger::EntryTimeout);
                }
                if let Ok(quote) = self.oracle.fetch(&position.address).await {
                    if !quote.is_unknown() {
                        info!(
                            "Entry captured late for {}: price={:?} mcap={:?}",
                            position.address, quote.price, quote.market_cap
                        );
                        position.entry_price = quote.price;
                        position.entry_market_cap = quote.market_cap;
                    }
                }
            } else {
                if self.trading.max_hold_secs > 0 && held_secs >= self.trading.max_hold_secs {
                    info!(
                        "Max hold reached for {} after {}s",
                        position.address, held_secs
                    );
                    return Some(ExitTrigger::MaxHold);
                }
                match self.oracle.fetch(&position.address).await {
                    Ok(quote) => {
                        if let Some(trigger) = exit::check_exit(
                            position,
                            &quote,
                            self.trading.take_profit_pct,
                            self.trading.stop_loss_pct,
                        ) {
                            return Some(trigger);
                        }
                        debug!(
                            "Holding {}: price={:?} mcap={:?}",
                            position.address, quote.price, quote.market_cap
                        );
                    }
                    Err(e) => warn!("Quote fetch failed for {}: {}", position.address, e),
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                _ = self.cancel.cancelled() => {}
            }
        }
    }

    /// Sell, capture the exit reference and settle the bankroll. A sell
    /// that exhausts its retries leaves the position suspended in
    /// MONITORING and raises an error notification; nothing is settled on
    /// fabricated numbers. Once the sell landed, a snapshot write failure
    /// never short-circuits the trade record or the close notification.
    async fn close(
        &self,
        position: &mut Position,
        trigger: ExitTrigger,
        urgency: Urgency,
    ) -> Result<()> {
        let intent = TradeIntent::sell(&position.address, urgency);
        match with_retry(self.retry, "sell", &self.cancel, || {
            self.gateway.execute(&intent)
        })
        .await
        {
            Ok(reference) => position.sell_reference = Some(reference),
            Err(Error::Cancelled) => {
                info!("Sell cancelled for {}", position.address);
                return Ok(());
            }
            Err(e) => {
                let failure = Error::SellFailed {
                    address: position.address.clone(),
                    attempts: self.retry.max_attempts,
                };
                error!("{}; position needs manual attention: {}", failure, e);
                self.notifier
                    .notify(&TradeEvent::error(
                        position,
                        format!("{}, position suspended: {}", failure, e),
                    ))
                    .await;
                return Ok(());
            }
        }

        let exit_quote = self
            .oracle
            .fetch_with_retry(&position.address, self.retry, &self.cancel)
            .await;
        position.exit_price = exit_quote.price;
        position.exit_market_cap = exit_quote.market_cap;

        // No comparable observation means no evidence of a move: settle at
        // break-even rather than inventing a number.
        let change_pct = if trigger == ExitTrigger::EntryTimeout {
            0.0
        } else {
            exit::observed_change(position, &exit_quote).unwrap_or(0.0)
        };

        let sol_price = self.oracle.sol_price_usd().await;
        let sell_fee = self.fees.estimate(TradeSide::Sell, urgency, sol_price);
        let gross_proceeds = position.invested_net * (1.0 + change_pct / 100.0);
        let proceeds =
            (gross_proceeds - gross_proceeds * sell_fee.percent / 100.0 - sell_fee.flat_quote)
                .max(0.0);

        position.proceeds = Some(proceeds);
        position.realized_profit = proceeds - position.invested_net;
        position.exit_trigger = Some(trigger);
        position.closed_at = Some(Utc::now());
        let outcome = if position.realized_profit >= 0.0 {
            PositionState::ClosedWin
        } else {
            PositionState::ClosedLoss
        };
        position.transition(outcome)?;

        let balance_after = {
            let mut bankroll = self.bankroll.lock().await;
            bankroll.apply_close(position.invested_gross, proceeds);
            persist_best_effort("bankroll", self.ledger.save_bankroll(&bankroll).await);
            bankroll.current_balance
        };
        persist_best_effort("trade history", self.ledger.append_trade(position).await);

        info!(
            "Closed {} via {}: P/L ${:+.2}, balance ${:.2}",
            position.address, trigger, position.realized_profit, balance_after
        );
        self.notifier
            .notify(&TradeEvent::closed(position, balance_after))
            .await;
        Ok(())
    }
}

/// Snapshot write failures are logged, never fatal: in-memory state stays
/// authoritative and the next mutation rewrites the whole file.
fn persist_best_effort(what: &str, result: Result<()>) {
    if let Err(e) = result {
        error!("Failed to persist {}: {}", what, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeeConfig;
    use crate::error::Error;
    use crate::gateway::SimulatedGateway;
    use crate::ledger::BALANCE_FLOOR;
    use crate::notifier::testing::RecordingNotifier;
    use crate::notifier::EventKind;
    use crate::oracle::testing::ScriptedProvider;
    use crate::oracle::TokenQuote;
    use async_trait::async_trait;

    const EPS: f64 = 1e-9;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.data.initial_balance_usd = 100.0;
        config.trading.poll_interval_ms = 1;
        // zero fees keep the arithmetic exact
        config.fees = FeeConfig {
            buy_fee_pct: 0.0,
            sell_fee_pct: 0.0,
            normal_tip_sol: 0.0,
            high_tip_sol: 0.0,
            fallback_sol_price_usd: 150.0,
        };
        config.retry = RetryPolicy {
            max_attempts: 2,
            delay_ms: 1,
        };
        config
    }

    struct Harness {
        controller: Arc<PositionController>,
        ledger: Arc<Ledger>,
        notifier: Arc<RecordingNotifier>,
        _dir: tempfile::TempDir,
    }

    async fn harness(
        config: Config,
        script: Vec<crate::error::Result<TokenQuote>>,
        gateway: Arc<dyn ExecutionGateway>,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(
            Ledger::open(dir.path(), config.data.initial_balance_usd)
                .await
                .unwrap(),
        );
        let oracle = Arc::new(PriceOracle::new(
            vec![Box::new(ScriptedProvider::new(script))],
            config.fees.fallback_sol_price_usd,
        ));
        let notifier = Arc::new(RecordingNotifier::default());
        let controller = Arc::new(
            PositionController::new(
                &config,
                ledger.clone(),
                oracle,
                gateway,
                notifier.clone(),
                CancellationToken::new(),
            )
            .await,
        );
        Harness {
            controller,
            ledger,
            notifier,
            _dir: dir,
        }
    }

    struct RejectingGateway;

    #[async_trait]
    impl ExecutionGateway for RejectingGateway {
        fn mode(&self) -> &'static str {
            "test"
        }
        async fn execute(&self, _intent: &TradeIntent) -> crate::error::Result<String> {
            Err(Error::Gateway("down".into()))
        }
    }

    struct SellFailGateway;

    #[async_trait]
    impl ExecutionGateway for SellFailGateway {
        fn mode(&self) -> &'static str {
            "test"
        }
        async fn execute(&self, intent: &TradeIntent) -> crate::error::Result<String> {
            match intent.side {
                TradeSide::Buy => Ok("BUY_REF".into()),
                TradeSide::Sell => Err(Error::ExecutionRejected("slippage".into())),
            }
        }
    }

    #[tokio::test]
    async fn test_win_scenario_compounds_balance() {
        let h = harness(
            test_config(),
            vec![
                ScriptedProvider::mcap(100_000.0),
                ScriptedProvider::mcap(150_000.0),
            ],
            Arc::new(SimulatedGateway::default()),
        )
        .await;

        h.controller.handle_signal("WinCA").await.unwrap();

        let trades = h.ledger.recent_trades(1).await;
        assert_eq!(trades.len(), 1);
        let trade = &trades[0];
        assert_eq!(trade.state, PositionState::ClosedWin);
        assert_eq!(trade.exit_trigger, Some(ExitTrigger::TakeProfit));
        // +50% on the net stake, fees zeroed
        assert!((trade.realized_profit - 0.5 * trade.invested_net).abs() < EPS);
        assert!((trade.invested_gross - 99.1).abs() < EPS);

        let balance = h.controller.balance().await;
        assert!((balance - 149.55).abs() < EPS);
        // settlement is persisted
        let saved = h.ledger.load_bankroll().await;
        assert!((saved.current_balance - balance).abs() < EPS);
    }

    #[tokio::test]
    async fn test_loss_scenario_respects_floor() {
        let h = harness(
            test_config(),
            vec![
                ScriptedProvider::mcap(100_000.0),
                ScriptedProvider::mcap(75_000.0),
            ],
            Arc::new(SimulatedGateway::default()),
        )
        .await;

        h.controller.handle_signal("LossCA").await.unwrap();

        let trade = h.ledger.recent_trades(1).await.remove(0);
        assert_eq!(trade.state, PositionState::ClosedLoss);
        assert_eq!(trade.exit_trigger, Some(ExitTrigger::StopLoss));
        assert!(trade.realized_profit < 0.0);

        let balance = h.controller.balance().await;
        assert!((balance - 75.225).abs() < EPS);
        assert!(balance >= BALANCE_FLOOR);
    }

    #[tokio::test]
    async fn test_duplicate_signal_is_idempotent() {
        let h = harness(
            test_config(),
            vec![
                ScriptedProvider::mcap(100_000.0),
                ScriptedProvider::mcap(150_000.0),
            ],
            Arc::new(SimulatedGateway::default()),
        )
        .await;

        h.controller.handle_signal("SameCA").await.unwrap();
        h.controller.handle_signal("SameCA").await.unwrap();

        assert_eq!(h.ledger.trade_count().await, 1);
        assert_eq!(h.ledger.processed_count().await, 1);
        assert_eq!(
            h.controller.bankroll_snapshot().await.positions_opened_today,
            1
        );
    }

    #[tokio::test]
    async fn test_duplicate_burst_opens_one_position() {
        let h = harness(
            test_config(),
            vec![
                ScriptedProvider::mcap(100_000.0),
                ScriptedProvider::mcap(150_000.0),
            ],
            Arc::new(SimulatedGateway::default()),
        )
        .await;

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let controller = h.controller.clone();
            tasks.push(tokio::spawn(async move {
                controller.handle_signal("BurstCA").await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(h.ledger.trade_count().await, 1);
        assert_eq!(
            h.controller.bankroll_snapshot().await.positions_opened_today,
            1
        );
    }

    #[tokio::test]
    async fn test_buy_failure_records_failed_position() {
        let h = harness(test_config(), vec![], Arc::new(RejectingGateway)).await;

        h.controller.handle_signal("DeadCA").await.unwrap();

        let trade = h.ledger.recent_trades(1).await.remove(0);
        assert_eq!(trade.state, PositionState::Failed);
        assert!(trade.closed_at.is_some());
        // nothing was settled against the bankroll
        assert!((h.controller.balance().await - 100.0).abs() < EPS);
        assert_eq!(h.notifier.kinds().await, vec![EventKind::Error]);
        // the notification names the retry exhaustion
        let events = h.notifier.events.lock().await;
        let detail = events[0].detail.as_deref().unwrap();
        assert!(detail.contains("Buy failed for DeadCA after 2 attempts"));
        drop(events);
        // the address stays processed so the failure is not retried
        assert!(h.ledger.is_processed("DeadCA").await);
    }

    #[tokio::test]
    async fn test_sell_failure_suspends_position() {
        let h = harness(
            test_config(),
            vec![
                ScriptedProvider::mcap(100_000.0),
                ScriptedProvider::mcap(150_000.0),
            ],
            Arc::new(SellFailGateway),
        )
        .await;

        h.controller.handle_signal("StuckCA").await.unwrap();

        // suspended, not settled: no trade record, balance untouched
        assert_eq!(h.ledger.trade_count().await, 0);
        assert!((h.controller.balance().await - 100.0).abs() < EPS);
        assert_eq!(
            h.notifier.kinds().await,
            vec![EventKind::Buy, EventKind::Error]
        );
        let events = h.notifier.events.lock().await;
        let detail = events[1].detail.as_deref().unwrap();
        assert!(detail.contains("Sell failed for StuckCA after 2 attempts"));
    }

    #[tokio::test]
    async fn test_settlement_survives_bankroll_write_failure() {
        let h = harness(
            test_config(),
            vec![
                ScriptedProvider::mcap(100_000.0),
                ScriptedProvider::mcap(150_000.0),
            ],
            Arc::new(SimulatedGateway::default()),
        )
        .await;
        // a directory squatting on the snapshot path makes the atomic
        // rename fail on every bankroll save
        std::fs::create_dir(h._dir.path().join("bankroll.json")).unwrap();

        h.controller.handle_signal("WinCA").await.unwrap();

        // the trade record and close notification still happen
        assert_eq!(h.ledger.trade_count().await, 1);
        let trade = h.ledger.recent_trades(1).await.remove(0);
        assert_eq!(trade.state, PositionState::ClosedWin);
        assert_eq!(
            h.notifier.kinds().await,
            vec![EventKind::Buy, EventKind::Close]
        );
        // the in-memory bankroll carried the settlement
        assert!((h.controller.balance().await - 149.55).abs() < EPS);
    }

    #[tokio::test]
    async fn test_entry_timeout_settles_break_even() {
        let mut config = test_config();
        config.trading.entry_capture_timeout_secs = 0;
        let h = harness(
            config,
            vec![ScriptedProvider::unknown()],
            Arc::new(SimulatedGateway::default()),
        )
        .await;

        h.controller.handle_signal("GhostCA").await.unwrap();

        let trade = h.ledger.recent_trades(1).await.remove(0);
        assert_eq!(trade.exit_trigger, Some(ExitTrigger::EntryTimeout));
        assert!((trade.proceeds.unwrap() - trade.invested_net).abs() < EPS);
        assert!(trade.realized_profit.abs() < EPS);
        assert!((h.controller.balance().await - 100.0).abs() < EPS);
    }

    #[tokio::test]
    async fn test_daily_cap_blocks_further_signals() {
        let mut config = test_config();
        config.cycle.daily_limits = vec![1];
        let h = harness(
            config,
            vec![
                ScriptedProvider::mcap(100_000.0),
                ScriptedProvider::mcap(150_000.0),
            ],
            Arc::new(SimulatedGateway::default()),
        )
        .await;

        h.controller.handle_signal("FirstCA").await.unwrap();
        h.controller.handle_signal("SecondCA").await.unwrap();

        assert_eq!(h.ledger.trade_count().await, 1);
        // the blocked address was never marked processed
        assert!(!h.ledger.is_processed("SecondCA").await);
    }
}
