//! Trade event notifications
//!
//! The controller emits one event per lifecycle milestone (buy confirmed,
//! position closed, failure needing attention) into a [`Notifier`] sink.
//! Delivery is strictly best-effort: a dead Telegram API must never stall
//! or fail the trading pipeline, so `notify` cannot return an error and
//! sinks log their own delivery problems.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::TelegramConfig;
use crate::position::{Position, PositionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Buy,
    Close,
    Error,
}

/// Snapshot of a lifecycle milestone, carrying the position as it looked
/// at that moment
#[derive(Debug, Clone)]
pub struct TradeEvent {
    pub kind: EventKind,
    pub position: Position,
    pub balance_after: Option<f64>,
    pub detail: Option<String>,
}

impl TradeEvent {
    pub fn buy(position: &Position) -> Self {
        Self {
            kind: EventKind::Buy,
            position: position.clone(),
            balance_after: None,
            detail: None,
        }
    }

    pub fn closed(position: &Position, balance_after: f64) -> Self {
        Self {
            kind: EventKind::Close,
            position: position.clone(),
            balance_after: Some(balance_after),
            detail: None,
        }
    }

    pub fn error(position: &Position, detail: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            position: position.clone(),
            balance_after: None,
            detail: Some(detail.into()),
        }
    }

    /// Human-readable summary used by every sink
    pub fn summary(&self) -> String {
        let pos = &self.position;
        match self.kind {
            EventKind::Buy => format!(
                "BUY {} | ${:.2} in (${:.2} after fees) | ref {}",
                pos.address,
                pos.invested_gross,
                pos.invested_net,
                pos.buy_reference.as_deref().unwrap_or("-"),
            ),
            EventKind::Close => {
                let outcome = match pos.state {
                    PositionState::ClosedWin => "WIN",
                    PositionState::ClosedLoss => "LOSS",
                    _ => "CLOSED",
                };
                let trigger = pos
                    .exit_trigger
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".into());
                format!(
                    "{} {} | {} | P/L ${:+.2} | balance ${:.2}",
                    outcome,
                    pos.address,
                    trigger,
                    pos.realized_profit,
                    self.balance_after.unwrap_or_default(),
                )
            }
            EventKind::Error => format!(
                "ERROR {} | {}",
                pos.address,
                self.detail.as_deref().unwrap_or("unknown"),
            ),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &TradeEvent);
}

/// Writes every event to the log; always present so a headless run still
/// leaves a trail
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &TradeEvent) {
        match event.kind {
            EventKind::Error => error!("{}", event.summary()),
            _ => info!("{}", event.summary()),
        }
    }
}

/// Fans one event out to several sinks
pub struct FanoutNotifier {
    sinks: Vec<Box<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(sinks: Vec<Box<dyn Notifier>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn notify(&self, event: &TradeEvent) {
        for sink in &self.sinks {
            sink.notify(event).await;
        }
    }
}

/// Pushes events to a Telegram chat via the Bot API
pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, event: &TradeEvent) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let text = escape_markdown(&event.summary());
        let result = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": text,
                "parse_mode": "MarkdownV2",
            }))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => warn!("Telegram notification rejected: status {}", resp.status()),
            Err(e) => warn!("Telegram notification failed: {}", e),
        }
    }
}

/// Escape the characters MarkdownV2 reserves; everything we send is plain
/// text, so every reserved character gets a backslash
pub fn escape_markdown(text: &str) -> String {
    const RESERVED: &[char] = &[
        '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
    ];
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::Mutex;

    /// Captures events for assertions
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub events: Mutex<Vec<TradeEvent>>,
    }

    impl RecordingNotifier {
        pub async fn kinds(&self) -> Vec<EventKind> {
            self.events.lock().await.iter().map(|e| e.kind).collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, event: &TradeEvent) {
            self.events.lock().await.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::ExitTrigger;

    #[test]
    fn test_escape_markdown() {
        assert_eq!(
            escape_markdown("P/L $+1.25 (take-profit)"),
            r"P/L $\+1\.25 \(take\-profit\)"
        );
        assert_eq!(escape_markdown("plain text"), "plain text");
    }

    #[test]
    fn test_close_summary() {
        let mut pos = Position::new("MintCA".into(), 10.0, 9.8);
        pos.transition(PositionState::Bought).unwrap();
        pos.transition(PositionState::Monitoring).unwrap();
        pos.transition(PositionState::ClosedWin).unwrap();
        pos.realized_profit = 4.9;
        pos.exit_trigger = Some(ExitTrigger::TakeProfit);

        let summary = TradeEvent::closed(&pos, 14.9).summary();
        assert!(summary.starts_with("WIN MintCA"));
        assert!(summary.contains("take-profit"));
        assert!(summary.contains("$+4.90"));
        assert!(summary.contains("$14.90"));
    }

    #[test]
    fn test_error_summary_carries_detail() {
        let pos = Position::new("MintCA".into(), 10.0, 9.8);
        let summary = TradeEvent::error(&pos, "sell failed: slippage").summary();
        assert!(summary.contains("ERROR MintCA"));
        assert!(summary.contains("sell failed: slippage"));
    }
}
