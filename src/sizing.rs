//! Trade sizing
//!
//! Computes the capital allocated to the next position from the current
//! bankroll: withhold a gas-reserve fraction, then subtract estimated swap
//! fees. Pure arithmetic; the controller decides whether to proceed.

use crate::config::FeeConfig;
use crate::gateway::{TradeSide, Urgency};

/// Estimated total cost of one swap: a percentage of the traded amount plus
/// a flat priority tip already converted to quote currency (USD)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeEstimate {
    pub percent: f64,
    pub flat_quote: f64,
}

impl FeeConfig {
    /// Estimate the fee for one side of a trade at the given SOL price
    pub fn estimate(&self, side: TradeSide, urgency: Urgency, sol_price_usd: f64) -> FeeEstimate {
        let percent = match side {
            TradeSide::Buy => self.buy_fee_pct,
            TradeSide::Sell => self.sell_fee_pct,
        };
        let tip_sol = match urgency {
            Urgency::Normal => self.normal_tip_sol,
            Urgency::High => self.high_tip_sol,
        };
        FeeEstimate {
            percent,
            flat_quote: tip_sol * sol_price_usd,
        }
    }
}

/// Sizes the next investment off the compounding bankroll
#[derive(Debug, Clone, Copy)]
pub struct RiskSizer {
    reserve_fraction: f64,
    floor_amount: f64,
}

impl RiskSizer {
    pub fn new(reserve_fraction: f64, floor_amount: f64) -> Self {
        Self {
            reserve_fraction,
            floor_amount,
        }
    }

    /// Capital for the next trade: balance minus the gas reserve, never
    /// below the floor. The reserve is skimmed here exactly once per trade
    /// cycle; settlement does not skim again.
    pub fn next_investment(&self, balance: f64) -> f64 {
        (balance * (1.0 - self.reserve_fraction)).max(self.floor_amount)
    }

    /// Subtract an estimated swap fee from an amount and re-clamp to the floor
    pub fn adjust_for_fees(&self, amount: f64, fee: FeeEstimate) -> f64 {
        (amount - amount * fee.percent / 100.0 - fee.flat_quote).max(self.floor_amount)
    }

    /// Whether the balance can fund at least the floor after the reserve.
    /// When false the caller should not open a position.
    pub fn can_sustain(&self, balance: f64) -> bool {
        balance * (1.0 - self.reserve_fraction) >= self.floor_amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_next_investment_reserves_gas() {
        let sizer = RiskSizer::new(0.009, 0.01);
        assert!((sizer.next_investment(100.0) - 99.1).abs() < EPS);
    }

    #[test]
    fn test_next_investment_clamps_to_floor() {
        let sizer = RiskSizer::new(0.5, 0.01);
        let amount = sizer.next_investment(0.005);
        assert!((amount - 0.01).abs() < EPS);
        assert!(amount > 0.0);
        assert!(!sizer.can_sustain(0.005));
    }

    #[test]
    fn test_can_sustain_boundary() {
        let sizer = RiskSizer::new(0.009, 0.01);
        assert!(sizer.can_sustain(25.0));
        assert!(!sizer.can_sustain(0.01)); // reserve pushes it under the floor
    }

    #[test]
    fn test_adjust_for_fees() {
        let sizer = RiskSizer::new(0.009, 0.01);
        // 1% of 100 plus a $2.25 tip
        let adjusted = sizer.adjust_for_fees(
            100.0,
            FeeEstimate {
                percent: 1.0,
                flat_quote: 2.25,
            },
        );
        assert!((adjusted - 96.75).abs() < EPS);
    }

    #[test]
    fn test_adjust_for_fees_clamps() {
        let sizer = RiskSizer::new(0.009, 0.01);
        let adjusted = sizer.adjust_for_fees(
            1.0,
            FeeEstimate {
                percent: 1.0,
                flat_quote: 5.0,
            },
        );
        assert!((adjusted - 0.01).abs() < EPS);
    }

    #[test]
    fn test_fee_estimate_from_config() {
        let fees = crate::config::FeeConfig::default();
        let est = fees.estimate(TradeSide::Buy, Urgency::Normal, 150.0);
        assert!((est.percent - 1.0).abs() < EPS);
        assert!((est.flat_quote - 2.25).abs() < EPS);

        let est = fees.estimate(TradeSide::Sell, Urgency::High, 150.0);
        assert!((est.flat_quote - 15.0).abs() < EPS);
    }
}
