//! Position record and its state machine
//!
//! A position moves strictly forward: PENDING -> BOUGHT -> MONITORING ->
//! CLOSED_WIN / CLOSED_LOSS, with PENDING -> FAILED when the buy never
//! lands. Terminal states accept no further transitions; every state
//! change goes through [`Position::transition`] so an illegal hop is an
//! error rather than silent corruption.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionState {
    Pending,
    Bought,
    Monitoring,
    ClosedWin,
    ClosedLoss,
    Failed,
}

impl PositionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PositionState::ClosedWin | PositionState::ClosedLoss | PositionState::Failed
        )
    }

    /// Legal forward edges of the lifecycle
    pub fn can_transition_to(&self, next: PositionState) -> bool {
        use PositionState::*;
        matches!(
            (self, next),
            (Pending, Bought)
                | (Pending, Failed)
                | (Bought, Monitoring)
                | (Monitoring, ClosedWin)
                | (Monitoring, ClosedLoss)
        )
    }
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PositionState::Pending => "PENDING",
            PositionState::Bought => "BOUGHT",
            PositionState::Monitoring => "MONITORING",
            PositionState::ClosedWin => "CLOSED_WIN",
            PositionState::ClosedLoss => "CLOSED_LOSS",
            PositionState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Why a monitored position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitTrigger {
    TakeProfit,
    StopLoss,
    /// No entry reference ever became available; settled at break-even
    EntryTimeout,
    MaxHold,
}

impl std::fmt::Display for ExitTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitTrigger::TakeProfit => "take-profit",
            ExitTrigger::StopLoss => "stop-loss",
            ExitTrigger::EntryTimeout => "entry-timeout",
            ExitTrigger::MaxHold => "max-hold",
        };
        f.write_str(s)
    }
}

/// One token position from signal to settlement. Amounts are USD: `gross`
/// is what left the bankroll, `net` is what actually went into the swap
/// after fees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub address: String,
    pub state: PositionState,
    pub invested_gross: f64,
    pub invested_net: f64,
    pub entry_price: Option<f64>,
    pub entry_market_cap: Option<f64>,
    pub exit_price: Option<f64>,
    pub exit_market_cap: Option<f64>,
    pub proceeds: Option<f64>,
    #[serde(default)]
    pub realized_profit: f64,
    pub buy_reference: Option<String>,
    pub sell_reference: Option<String>,
    pub exit_trigger: Option<ExitTrigger>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn new(address: String, invested_gross: f64, invested_net: f64) -> Self {
        Self {
            address,
            state: PositionState::Pending,
            invested_gross,
            invested_net,
            entry_price: None,
            entry_market_cap: None,
            exit_price: None,
            exit_market_cap: None,
            proceeds: None,
            realized_profit: 0.0,
            buy_reference: None,
            sell_reference: None,
            exit_trigger: None,
            opened_at: Utc::now(),
            closed_at: None,
        }
    }

    /// Advance the lifecycle, rejecting any edge the state machine does not
    /// allow
    pub fn transition(&mut self, next: PositionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// True while no entry reference (price or market cap) has been captured
    pub fn entry_unknown(&self) -> bool {
        self.entry_price.is_none() && self.entry_market_cap.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut pos = Position::new("CA".into(), 10.0, 9.8);
        assert_eq!(pos.state, PositionState::Pending);

        pos.transition(PositionState::Bought).unwrap();
        pos.transition(PositionState::Monitoring).unwrap();
        pos.transition(PositionState::ClosedWin).unwrap();
        assert!(pos.state.is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            PositionState::ClosedWin,
            PositionState::ClosedLoss,
            PositionState::Failed,
        ] {
            for next in [
                PositionState::Pending,
                PositionState::Bought,
                PositionState::Monitoring,
                PositionState::ClosedWin,
                PositionState::ClosedLoss,
                PositionState::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_illegal_edges_rejected() {
        let mut pos = Position::new("CA".into(), 10.0, 9.8);

        // cannot close a position that was never bought
        let err = pos.transition(PositionState::ClosedWin).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(pos.state, PositionState::Pending);

        // cannot skip monitoring
        pos.transition(PositionState::Bought).unwrap();
        assert!(pos.transition(PositionState::ClosedLoss).is_err());

        // failure only applies before the buy landed
        assert!(pos.transition(PositionState::Failed).is_err());
    }

    #[test]
    fn test_state_serializes_as_wire_names() {
        let json = serde_json::to_string(&PositionState::ClosedWin).unwrap();
        assert_eq!(json, r#""CLOSED_WIN""#);
        let back: PositionState = serde_json::from_str(r#""PENDING""#).unwrap();
        assert_eq!(back, PositionState::Pending);
    }

    #[test]
    fn test_entry_unknown() {
        let mut pos = Position::new("CA".into(), 10.0, 9.8);
        assert!(pos.entry_unknown());
        pos.entry_market_cap = Some(50_000.0);
        assert!(!pos.entry_unknown());
    }
}
