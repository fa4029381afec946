//! Exit rule evaluation
//!
//! Pure functions deciding whether a monitored position should close.
//! Market cap is the preferred reference (pump.fun tokens redenominate
//! price across pools; mcap stays comparable), price is the fallback, and
//! an unknown quote never triggers anything.

use super::types::{ExitTrigger, Position};
use crate::oracle::TokenQuote;

/// Percent change from `entry` to `current`
pub fn change_pct(entry: f64, current: f64) -> f64 {
    (current - entry) / entry * 100.0
}

/// Observed move against the position's entry reference, if any pair of
/// comparable observations exists. Market cap beats price when both sides
/// have it.
pub fn observed_change(position: &Position, quote: &TokenQuote) -> Option<f64> {
    if let (Some(entry), Some(current)) = (position.entry_market_cap, quote.market_cap) {
        if entry > 0.0 {
            return Some(change_pct(entry, current));
        }
    }
    if let (Some(entry), Some(current)) = (position.entry_price, quote.price) {
        if entry > 0.0 {
            return Some(change_pct(entry, current));
        }
    }
    None
}

/// Evaluate take-profit and stop-loss against a fresh quote. Thresholds are
/// inclusive; an unobservable move holds the position.
pub fn check_exit(
    position: &Position,
    quote: &TokenQuote,
    take_profit_pct: f64,
    stop_loss_pct: f64,
) -> Option<ExitTrigger> {
    let change = observed_change(position, quote)?;
    if change >= take_profit_pct {
        Some(ExitTrigger::TakeProfit)
    } else if change <= -stop_loss_pct {
        Some(ExitTrigger::StopLoss)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position_with_entry(mcap: Option<f64>, price: Option<f64>) -> Position {
        let mut pos = Position::new("CA".into(), 10.0, 9.8);
        pos.entry_market_cap = mcap;
        pos.entry_price = price;
        pos
    }

    fn quote(mcap: Option<f64>, price: Option<f64>) -> TokenQuote {
        TokenQuote {
            price,
            market_cap: mcap,
            liquidity: None,
            source: "test".into(),
        }
    }

    #[test]
    fn test_take_profit_inclusive_threshold() {
        let pos = position_with_entry(Some(100_000.0), None);
        // exactly +50% fires
        assert_eq!(
            check_exit(&pos, &quote(Some(150_000.0), None), 50.0, 20.0),
            Some(ExitTrigger::TakeProfit)
        );
        assert_eq!(
            check_exit(&pos, &quote(Some(149_999.0), None), 50.0, 20.0),
            None
        );
    }

    #[test]
    fn test_stop_loss_inclusive_threshold() {
        let pos = position_with_entry(Some(100_000.0), None);
        assert_eq!(
            check_exit(&pos, &quote(Some(80_000.0), None), 50.0, 20.0),
            Some(ExitTrigger::StopLoss)
        );
        assert_eq!(
            check_exit(&pos, &quote(Some(80_001.0), None), 50.0, 20.0),
            None
        );
    }

    #[test]
    fn test_unknown_quote_never_triggers() {
        let pos = position_with_entry(Some(100_000.0), Some(0.001));
        assert_eq!(check_exit(&pos, &quote(None, None), 50.0, 20.0), None);
    }

    #[test]
    fn test_price_fallback_when_no_mcap_pair() {
        // entry captured only price; quote carries only price
        let pos = position_with_entry(None, Some(0.0010));
        assert_eq!(
            check_exit(&pos, &quote(None, Some(0.0015)), 50.0, 20.0),
            Some(ExitTrigger::TakeProfit)
        );
    }

    #[test]
    fn test_mcap_preferred_over_price() {
        // mcap says flat, price says moon: mcap wins
        let pos = position_with_entry(Some(100_000.0), Some(0.0010));
        assert_eq!(
            check_exit(&pos, &quote(Some(101_000.0), Some(0.0100)), 50.0, 20.0),
            None
        );
    }

    #[test]
    fn test_mismatched_observations_hold() {
        // entry has only mcap, quote has only price: no comparable pair
        let pos = position_with_entry(Some(100_000.0), None);
        assert_eq!(
            check_exit(&pos, &quote(None, Some(0.5)), 50.0, 20.0),
            None
        );
    }
}
