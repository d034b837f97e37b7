//! The short position manager.
//!
//! Opening a short credits the sale proceeds immediately and caps exposure
//! at a multiple of the team's cash at open time. The PIN here is
//! single-party escrow: it authenticates the same team's later cover call,
//! not a counterparty.

use crate::engine::{Exchange, ExchangeState};
use crate::escrow::OrderRef;
use crate::stocks::{ensure_positive_qty, normalize_ticker};
use mockstock_core::{
    normalize_team, LockKind, Pin, SettlementError, SettlementResult, ShortStatus,
};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// A borrowed-and-sold holding awaiting cover.
#[derive(Debug, Clone)]
pub struct ShortPosition {
    pub id: Uuid,
    pub pin: Pin,
    pub team: String,
    pub ticker: String,
    pub qty: u64,
    pub sell_rate: Decimal,
    pub open_round: u32,
    pub status: ShortStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortOpenReceipt {
    pub pin: String,
    pub ticker: String,
    pub qty: u64,
    pub sell_rate: Decimal,
    pub proceeds: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverReceipt {
    pub ticker: String,
    pub qty: u64,
    pub cover_price: Decimal,
    pub pnl: Decimal,
    pub remaining_qty: u64,
    pub status: ShortStatus,
    pub balance: Decimal,
}

impl Exchange {
    /// Opens a short: credits `price x qty` in proceeds, subject to the
    /// leverage cap against cash at this moment.
    pub async fn open_short(
        &self,
        team: &str,
        ticker: &str,
        qty: u64,
    ) -> SettlementResult<ShortOpenReceipt> {
        let team = normalize_team(team);
        let ticker = normalize_ticker(ticker);
        ensure_positive_qty(qty)?;

        let mut state = self.state.write().await;
        let snapshot = state.session.snapshot();
        snapshot.ensure_peer_round()?;
        let role = state.ledger.role_of(&team)?;
        snapshot.ensure_unlocked(LockKind::Shorts, role)?;
        self.ensure_tradable(&ticker)?;

        let price = self.quoted_price(snapshot.round, &ticker)?;
        let exposure = price * Decimal::from(qty);
        let cash = state.ledger.account(&team)?.cash_balance;
        let limit = self.policy.leverage_cap * cash;
        if exposure > limit {
            return Err(SettlementError::LeverageExceeded { exposure, limit });
        }

        let id = Uuid::new_v4();
        let ExchangeState { pins, rng, .. } = &mut *state;
        let pin = pins.issue(rng, OrderRef::Short(id))?;

        let account = state.ledger.account_mut(&team)?;
        account.credit(exposure);
        let balance = account.cash_balance;

        state.shorts.insert(
            id,
            ShortPosition {
                id,
                pin,
                team: team.clone(),
                ticker: ticker.clone(),
                qty,
                sell_rate: price,
                open_round: snapshot.round,
                status: ShortStatus::Open,
            },
        );

        tracing::info!(%team, %ticker, qty, %exposure, %pin, "short opened");
        Ok(ShortOpenReceipt {
            pin: pin.to_string(),
            ticker,
            qty,
            sell_rate: price,
            proceeds: exposure,
            balance,
        })
    }

    /// Buys back `qty` units of the position identified by
    /// `(team, ticker, pin)` at the current round price. Partial covers
    /// keep the PIN; the final cover closes the position and releases it.
    pub async fn cover_short(
        &self,
        team: &str,
        ticker: &str,
        pin: Pin,
        qty: u64,
    ) -> SettlementResult<CoverReceipt> {
        let team = normalize_team(team);
        let ticker = normalize_ticker(ticker);
        ensure_positive_qty(qty)?;

        let mut state = self.state.write().await;
        let round = state.session.round();

        let Some(OrderRef::Short(id)) = state.pins.lookup(pin) else {
            return Err(SettlementError::NotFound);
        };
        let position = state.shorts.get(&id).ok_or(SettlementError::NotFound)?;
        if position.team != team || position.ticker != ticker || !position.status.is_active() {
            return Err(SettlementError::NotFound);
        }
        if qty > position.qty {
            return Err(SettlementError::OverCover {
                requested: qty,
                remaining: position.qty,
            });
        }

        let sell_rate = position.sell_rate;
        let cover_price = self.quoted_price(round, &ticker)?;
        let cost = cover_price * Decimal::from(qty);
        let pnl = (sell_rate - cover_price) * Decimal::from(qty);

        // The buy-back debit is the only mutation that can fail; do it first.
        state.ledger.account_mut(&team)?.debit(cost)?;
        let balance = state.ledger.account(&team)?.cash_balance;

        let position = state.shorts.get_mut(&id).ok_or(SettlementError::NotFound)?;
        position.qty -= qty;
        let (remaining_qty, status) = if position.qty == 0 {
            position.status = ShortStatus::Closed;
            (0, ShortStatus::Closed)
        } else {
            position.status = ShortStatus::PartiallyCovered;
            (position.qty, ShortStatus::PartiallyCovered)
        };
        if status == ShortStatus::Closed {
            state.pins.release(pin);
        }

        tracing::info!(%team, %ticker, qty, %cover_price, %pnl, remaining_qty, "short covered");
        Ok(CoverReceipt {
            ticker,
            qty,
            cover_price,
            pnl,
            remaining_qty,
            status,
            balance,
        })
    }
}
