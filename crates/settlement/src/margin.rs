//! Margin pricing for option sellers.

use rust_decimal::Decimal;

/// Pricing rule for the capital a broker must confirm is reserved from an
/// option seller before the trade activates. Injected into the engine so a
/// deployment can swap the rule without touching settlement code.
pub trait MarginRule: Send + Sync {
    fn margin_required(&self, strike: Decimal, lot_size: u64, lots: u64) -> Decimal;
}

/// Flat fraction of contract notional (`strike x lot_size x lots x rate`).
#[derive(Debug, Clone)]
pub struct ProportionalMargin {
    rate: Decimal,
}

impl ProportionalMargin {
    #[must_use]
    pub const fn new(rate: Decimal) -> Self {
        Self { rate }
    }
}

impl MarginRule for ProportionalMargin {
    fn margin_required(&self, strike: Decimal, lot_size: u64, lots: u64) -> Decimal {
        strike * Decimal::from(lot_size) * Decimal::from(lots) * self.rate
    }
}
