//! Daily position caps over a rotating cycle plan
//!
//! A configured sequence of per-day limits (e.g. [5, 4]) rotates as the
//! cycle index advances at each UTC day boundary. Day rollover is detected
//! by a heartbeat date comparison rather than sleep-until-midnight, so it
//! survives process restarts. A limit of 0 disables both the cap and the
//! resets.

use chrono::NaiveDate;
use tracing::info;

use crate::config::CycleConfig;
use crate::ledger::BankrollState;

/// Enforces the per-day position cap and advances the cycle at day
/// boundaries. All counter state lives in [`BankrollState`]; the scheduler
/// itself is immutable, so the caller's single-writer lock on the bankroll
/// makes check-then-increment atomic.
#[derive(Debug, Clone)]
pub struct CycleScheduler {
    daily_limits: Vec<u32>,
}

impl CycleScheduler {
    pub fn new(config: CycleConfig) -> Self {
        Self {
            daily_limits: config.daily_limits,
        }
    }

    /// Positions allowed on the given cycle day (0 = unlimited)
    pub fn daily_limit(&self, cycle_index: u32) -> u32 {
        if self.daily_limits.is_empty() {
            return 0;
        }
        self.daily_limits[cycle_index as usize % self.daily_limits.len()]
    }

    /// Whether another position may be opened today
    pub fn can_open_position(&self, state: &BankrollState) -> bool {
        let limit = self.daily_limit(state.cycle_index);
        limit == 0 || state.positions_opened_today < limit
    }

    /// Count a newly opened position against today's cap
    pub fn record_position_opened(&self, state: &mut BankrollState) {
        state.positions_opened_today += 1;
    }

    /// Zero the counter and rotate to the next cycle day
    pub fn reset_for_new_day(&self, state: &mut BankrollState, today: NaiveDate) {
        state.positions_opened_today = 0;
        state.cycle_index = if self.daily_limits.is_empty() {
            state.cycle_index.wrapping_add(1)
        } else {
            (state.cycle_index + 1) % self.daily_limits.len() as u32
        };
        state.last_reset_date = today;
        info!(
            "Cycle reset: day index {}, today's limit {}",
            state.cycle_index,
            self.daily_limit(state.cycle_index)
        );
    }

    /// Heartbeat check: reset when the UTC date has rolled past the last
    /// reset. Returns true when a reset happened (the caller then clears
    /// the processed-address set and persists the bankroll).
    pub fn maybe_reset(&self, state: &mut BankrollState, today: NaiveDate) -> bool {
        if self.daily_limit(state.cycle_index) == 0 {
            // cycles disabled
            return false;
        }
        if today > state.last_reset_date {
            self.reset_for_new_day(state, today);
            true
        } else {
            false
        }
    }
}
