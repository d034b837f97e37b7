//! The authoritative per-team ledger.
//!
//! Every settlement flow mutates accounts through the methods here; the
//! methods validate before they write, so a failed operation leaves the
//! account untouched. Debits are checked against *free* capital
//! (cash minus reserved option margin) so a margin lock cannot be spent
//! out from under a verified trade.

use mockstock_core::config::RosterEntry;
use mockstock_core::{normalize_team, Role, SettlementError, SettlementResult};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// A long stock holding. `reserved` counts shares committed to open sell
/// orders; only `qty - reserved` is available to new orders.
#[derive(Debug, Clone, Default)]
pub struct Holding {
    pub qty: u64,
    pub reserved: u64,
    pub avg_price: Decimal,
}

impl Holding {
    #[must_use]
    pub const fn available(&self) -> u64 {
        self.qty - self.reserved
    }
}

#[derive(Debug, Clone)]
pub struct TeamAccount {
    pub id: String,
    pub role: Role,
    pub cash_balance: Decimal,
    pub starting_capital: Decimal,
    /// Margin locked against verified option sales.
    pub reserved_margin: Decimal,
    pub holdings: HashMap<String, Holding>,
}

impl TeamAccount {
    fn new(id: String, role: Role, starting_capital: Decimal) -> Self {
        Self {
            id,
            role,
            cash_balance: starting_capital,
            starting_capital,
            reserved_margin: Decimal::ZERO,
            holdings: HashMap::new(),
        }
    }

    /// Cash not committed to margin locks.
    #[must_use]
    pub fn free_capital(&self) -> Decimal {
        self.cash_balance - self.reserved_margin
    }

    /// Fails without mutating when free capital cannot fund the debit.
    pub fn debit(&mut self, amount: Decimal) -> SettlementResult<()> {
        if self.free_capital() < amount {
            return Err(SettlementError::InsufficientCapital {
                required: amount,
                available: self.free_capital(),
            });
        }
        self.cash_balance -= amount;
        Ok(())
    }

    pub fn credit(&mut self, amount: Decimal) {
        self.cash_balance += amount;
    }

    /// Locks margin out of free capital.
    pub fn lock_margin(&mut self, amount: Decimal) -> SettlementResult<()> {
        if self.free_capital() < amount {
            return Err(SettlementError::InsufficientCapital {
                required: amount,
                available: self.free_capital(),
            });
        }
        self.reserved_margin += amount;
        Ok(())
    }

    /// Adds shares at `price` with a weighted-average cost update.
    pub fn apply_buy(&mut self, ticker: &str, qty: u64, price: Decimal) {
        let holding = self.holdings.entry(ticker.to_string()).or_default();
        let old_qty = Decimal::from(holding.qty);
        let new_qty = Decimal::from(holding.qty + qty);
        holding.avg_price = (old_qty * holding.avg_price + Decimal::from(qty) * price) / new_qty;
        holding.qty += qty;
    }

    /// Commits shares to an open sell order.
    pub fn reserve_shares(&mut self, ticker: &str, qty: u64) -> SettlementResult<()> {
        let available = self.holdings.get(ticker).map_or(0, Holding::available);
        if available < qty {
            return Err(SettlementError::InsufficientPosition {
                ticker: ticker.to_string(),
                requested: qty,
                available,
            });
        }
        if let Some(holding) = self.holdings.get_mut(ticker) {
            holding.reserved += qty;
        }
        Ok(())
    }

    /// Returns reserved shares to the available pool (cancelled order).
    pub fn release_shares(&mut self, ticker: &str, qty: u64) {
        if let Some(holding) = self.holdings.get_mut(ticker) {
            holding.reserved = holding.reserved.saturating_sub(qty);
        }
    }

    /// Removes settled shares; the reservation travels with them.
    pub fn settle_sale(&mut self, ticker: &str, qty: u64) {
        if let Some(holding) = self.holdings.get_mut(ticker) {
            holding.qty = holding.qty.saturating_sub(qty);
            holding.reserved = holding.reserved.saturating_sub(qty);
            if holding.qty == 0 {
                self.holdings.remove(ticker);
            }
        }
    }
}

/// All team accounts, keyed by normalized team name.
#[derive(Debug, Default)]
pub struct Ledger {
    accounts: HashMap<String, TeamAccount>,
}

impl Ledger {
    #[must_use]
    pub fn seed(roster: &[RosterEntry], starting_capital: Decimal) -> Self {
        let accounts = roster
            .iter()
            .map(|entry| {
                let id = normalize_team(&entry.team);
                (
                    id.clone(),
                    TeamAccount::new(id, entry.role, starting_capital),
                )
            })
            .collect();
        Self { accounts }
    }

    /// Looks up a team; unknown names are a validation failure, not a
    /// missing-order failure.
    pub fn account(&self, team: &str) -> SettlementResult<&TeamAccount> {
        self.accounts
            .get(team)
            .ok_or_else(|| SettlementError::validation(format!("unknown team: {team}")))
    }

    pub fn account_mut(&mut self, team: &str) -> SettlementResult<&mut TeamAccount> {
        self.accounts
            .get_mut(team)
            .ok_or_else(|| SettlementError::validation(format!("unknown team: {team}")))
    }

    pub fn role_of(&self, team: &str) -> SettlementResult<Role> {
        Ok(self.account(team)?.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account() -> TeamAccount {
        TeamAccount::new("team_alpha".to_string(), Role::User, dec!(10_000_000))
    }

    #[test]
    fn debit_rejects_overdraw_without_mutating() {
        let mut acct = account();
        let err = acct.debit(dec!(10_000_001)).unwrap_err();
        assert_eq!(err.kind(), "INSUFFICIENT_CAPITAL");
        assert_eq!(acct.cash_balance, dec!(10_000_000));
    }

    #[test]
    fn margin_lock_shrinks_free_capital() {
        let mut acct = account();
        acct.lock_margin(dec!(4_000_000)).unwrap();
        assert_eq!(acct.cash_balance, dec!(10_000_000));
        assert_eq!(acct.free_capital(), dec!(6_000_000));

        // A debit beyond free capital fails even though cash covers it.
        let err = acct.debit(dec!(7_000_000)).unwrap_err();
        assert_eq!(err.kind(), "INSUFFICIENT_CAPITAL");
    }

    #[test]
    fn buys_update_weighted_average() {
        let mut acct = account();
        acct.apply_buy("RELIANCE", 10, dec!(2500));
        acct.apply_buy("RELIANCE", 10, dec!(2600));
        let holding = &acct.holdings["RELIANCE"];
        assert_eq!(holding.qty, 20);
        assert_eq!(holding.avg_price, dec!(2550));
    }

    #[test]
    fn reservation_blocks_overlapping_sells() {
        let mut acct = account();
        acct.apply_buy("TCS", 10, dec!(3800));
        acct.reserve_shares("TCS", 8).unwrap();

        let err = acct.reserve_shares("TCS", 5).unwrap_err();
        assert_eq!(err.kind(), "INSUFFICIENT_POSITION");
        assert_eq!(acct.holdings["TCS"].available(), 2);

        acct.release_shares("TCS", 8);
        assert_eq!(acct.holdings["TCS"].available(), 10);
    }

    #[test]
    fn settled_sale_consumes_reservation_and_shares() {
        let mut acct = account();
        acct.apply_buy("INFY", 10, dec!(1450));
        acct.reserve_shares("INFY", 10).unwrap();
        acct.settle_sale("INFY", 10);
        assert!(acct.holdings.get("INFY").is_none());
    }

    #[test]
    fn ledger_normalizes_roster_names() {
        let roster = vec![RosterEntry {
            team: "Team_Alpha".to_string(),
            access_code: "1111".to_string(),
            role: Role::User,
        }];
        let ledger = Ledger::seed(&roster, dec!(10_000_000));
        assert!(ledger.account("team_alpha").is_ok());
        assert!(ledger.account("team_beta").is_err());
    }
}
