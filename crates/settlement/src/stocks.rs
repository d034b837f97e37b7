//! Stock settlement: the round-0 system purchase and the peer-to-peer
//! sell/match flow.
//!
//! A seller generates a PIN and hands it to the buyer out of band; the
//! buyer's match call consumes the PIN and settles both ledgers in one
//! transaction. Sell orders reserve their shares at creation, so a team
//! cannot float two overlapping orders against the same holding.

use crate::engine::{Exchange, ExchangeState};
use crate::escrow::OrderRef;
use mockstock_core::{
    normalize_team, Pin, SettlementError, SettlementResult, StockOrderStatus,
};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// An open or settled peer-to-peer sell order.
#[derive(Debug, Clone)]
pub struct PendingStockOrder {
    pub id: Uuid,
    pub pin: Pin,
    pub seller: String,
    pub ticker: String,
    pub qty: u64,
    pub price: Decimal,
    pub round: u32,
    pub status: StockOrderStatus,
}

/// Receipt for a round-0 purchase from the system. No PIN: there is no
/// counterparty.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemBuyReceipt {
    pub ticker: String,
    pub qty: u64,
    pub price: Decimal,
    pub total: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellOrderReceipt {
    pub pin: String,
    pub ticker: String,
    pub qty: u64,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMatchReceipt {
    pub ticker: String,
    pub qty: u64,
    pub price: Decimal,
    pub total: Decimal,
    pub seller: String,
    pub buyer: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSellReceipt {
    pub ticker: String,
    pub qty: u64,
}

impl Exchange {
    /// Round-0 purchase at the system price.
    pub async fn buy_from_system(
        &self,
        buyer: &str,
        ticker: &str,
        qty: u64,
    ) -> SettlementResult<SystemBuyReceipt> {
        let buyer = normalize_team(buyer);
        let ticker = normalize_ticker(ticker);
        ensure_positive_qty(qty)?;

        let mut state = self.state.write().await;
        state.session.snapshot().ensure_system_round()?;
        self.ensure_tradable(&ticker)?;

        let price = self.quoted_price(0, &ticker)?;
        let total = price * Decimal::from(qty);

        let account = state.ledger.account_mut(&buyer)?;
        account.debit(total)?;
        account.apply_buy(&ticker, qty, price);
        let balance = account.cash_balance;

        tracing::info!(team = %buyer, %ticker, qty, %total, "system purchase settled");
        Ok(SystemBuyReceipt {
            ticker,
            qty,
            price,
            total,
            balance,
        })
    }

    /// Creates a sell order, reserves the shares, and issues the PIN the
    /// seller shares with their buyer.
    pub async fn create_stock_sell_order(
        &self,
        seller: &str,
        ticker: &str,
        qty: u64,
        price: Decimal,
    ) -> SettlementResult<SellOrderReceipt> {
        let seller = normalize_team(seller);
        let ticker = normalize_ticker(ticker);
        ensure_positive_qty(qty)?;
        ensure_positive_price(price)?;

        let mut state = self.state.write().await;
        let snapshot = state.session.snapshot();
        snapshot.ensure_peer_round()?;
        self.ensure_tradable(&ticker)?;

        let id = Uuid::new_v4();
        state.ledger.account_mut(&seller)?.reserve_shares(&ticker, qty)?;

        let ExchangeState { pins, rng, ledger, .. } = &mut *state;
        let pin = match pins.issue(rng, OrderRef::StockSell(id)) {
            Ok(pin) => pin,
            Err(err) => {
                // Roll the reservation back so the failed create leaves no trace.
                if let Ok(account) = ledger.account_mut(&seller) {
                    account.release_shares(&ticker, qty);
                }
                return Err(err);
            }
        };

        state.stock_orders.insert(
            id,
            PendingStockOrder {
                id,
                pin,
                seller: seller.clone(),
                ticker: ticker.clone(),
                qty,
                price,
                round: snapshot.round,
                status: StockOrderStatus::Open,
            },
        );

        tracing::info!(team = %seller, %ticker, qty, %price, %pin, "sell order opened");
        Ok(SellOrderReceipt {
            pin: pin.to_string(),
            ticker,
            qty,
            price,
        })
    }

    /// Consumes a seller's PIN and settles the trade atomically: buyer
    /// debit, seller credit, share transfer, order flip. Any failure
    /// leaves the order open and both ledgers untouched.
    pub async fn match_stock_buy_order(
        &self,
        buyer: &str,
        pin: Pin,
        ticker: &str,
        qty: u64,
        price: Decimal,
    ) -> SettlementResult<StockMatchReceipt> {
        let buyer = normalize_team(buyer);
        let ticker = normalize_ticker(ticker);

        let mut state = self.state.write().await;
        state.session.snapshot().ensure_peer_round()?;

        let Some(OrderRef::StockSell(id)) = state.pins.lookup(pin) else {
            return Err(SettlementError::NotFound);
        };
        let order = state
            .stock_orders
            .get(&id)
            .ok_or(SettlementError::NotFound)?;
        if order.status != StockOrderStatus::Open {
            return Err(SettlementError::ConcurrentConflict);
        }
        // A wrong guess must not burn the order: mismatches leave it open.
        if order.ticker != ticker || order.qty != qty || order.price != price {
            return Err(SettlementError::PinMismatch);
        }
        if order.seller == buyer {
            return Err(SettlementError::validation(
                "cannot match your own sell order",
            ));
        }

        let seller = order.seller.clone();
        let total = price * Decimal::from(qty);

        // Validate the debit before touching anything.
        let buyer_account = state.ledger.account(&buyer)?;
        if buyer_account.free_capital() < total {
            return Err(SettlementError::InsufficientCapital {
                required: total,
                available: buyer_account.free_capital(),
            });
        }

        state.ledger.account_mut(&buyer)?.debit(total)?;
        {
            let seller_account = state.ledger.account_mut(&seller)?;
            seller_account.credit(total);
            seller_account.settle_sale(&ticker, qty);
        }
        state.ledger.account_mut(&buyer)?.apply_buy(&ticker, qty, price);

        if let Some(order) = state.stock_orders.get_mut(&id) {
            order.status = StockOrderStatus::Settled;
        }
        state.pins.release(pin);

        tracing::info!(%buyer, %seller, %ticker, qty, %total, %pin, "stock trade settled");
        Ok(StockMatchReceipt {
            ticker,
            qty,
            price,
            total,
            seller,
            buyer,
        })
    }

    /// Creator-only cancel of an open sell order; releases the shares and
    /// the PIN.
    pub async fn cancel_stock_sell_order(
        &self,
        seller: &str,
        pin: Pin,
    ) -> SettlementResult<CancelSellReceipt> {
        let seller = normalize_team(seller);

        let mut state = self.state.write().await;
        let Some(OrderRef::StockSell(id)) = state.pins.lookup(pin) else {
            return Err(SettlementError::NotFound);
        };
        let order = state
            .stock_orders
            .get(&id)
            .ok_or(SettlementError::NotFound)?;
        if order.status != StockOrderStatus::Open {
            return Err(SettlementError::ConcurrentConflict);
        }
        if order.seller != seller {
            return Err(SettlementError::validation(
                "only the order creator can cancel it",
            ));
        }

        let (ticker, qty) = (order.ticker.clone(), order.qty);
        state.ledger.account_mut(&seller)?.release_shares(&ticker, qty);
        if let Some(order) = state.stock_orders.get_mut(&id) {
            order.status = StockOrderStatus::Cancelled;
        }
        state.pins.release(pin);

        tracing::info!(team = %seller, %ticker, qty, %pin, "sell order cancelled");
        Ok(CancelSellReceipt { ticker, qty })
    }

    pub(crate) fn ensure_tradable(&self, ticker: &str) -> SettlementResult<()> {
        if self.market.is_tradable(ticker) {
            Ok(())
        } else {
            Err(SettlementError::validation(format!(
                "{ticker} is not tradable"
            )))
        }
    }

    pub(crate) fn quoted_price(&self, round: u32, ticker: &str) -> SettlementResult<Decimal> {
        self.market.price(round, ticker).ok_or_else(|| {
            SettlementError::validation(format!("{ticker} has no price in round {round}"))
        })
    }
}

pub(crate) fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

pub(crate) fn ensure_positive_qty(qty: u64) -> SettlementResult<()> {
    if qty == 0 {
        return Err(SettlementError::validation("quantity must be positive"));
    }
    Ok(())
}

pub(crate) fn ensure_positive_price(price: Decimal) -> SettlementResult<()> {
    if price <= Decimal::ZERO {
        return Err(SettlementError::validation("price must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockstock_core::AppConfig;
    use rust_decimal_macros::dec;

    async fn exchange_in_round(round: u32) -> Exchange {
        let exchange = Exchange::with_seed(&AppConfig::default(), 42);
        if round > 0 {
            exchange.set_round("admin", round).await.unwrap();
        }
        exchange
    }

    /// Round-0 purchase so a team has shares to sell in later tests.
    async fn seed_holding(exchange: &Exchange, team: &str, ticker: &str, qty: u64) {
        let round = exchange.active_round().await;
        if round != 0 {
            exchange.set_round("admin", 0).await.unwrap();
        }
        exchange.buy_from_system(team, ticker, qty).await.unwrap();
        if round != 0 {
            exchange.set_round("admin", round).await.unwrap();
        }
    }

    #[tokio::test]
    async fn system_buy_debits_and_credits_holding() {
        let exchange = exchange_in_round(0).await;
        let receipt = exchange
            .buy_from_system("Team_Alpha", "RELIANCE", 10)
            .await
            .unwrap();
        assert_eq!(receipt.total, dec!(25_000));
        assert_eq!(receipt.balance, dec!(9_975_000));

        let portfolio = exchange.portfolio("team_alpha").await.unwrap();
        assert_eq!(portfolio.len(), 1);
        assert_eq!(portfolio[0].qty, 10);
        assert_eq!(portfolio[0].avg_price, dec!(2500));
    }

    #[tokio::test]
    async fn system_buy_requires_round_zero() {
        let exchange = exchange_in_round(1).await;
        let err = exchange
            .buy_from_system("team_alpha", "RELIANCE", 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "INVALID_ROUND");
    }

    #[tokio::test]
    async fn system_buy_rejects_unaffordable_order() {
        let exchange = exchange_in_round(0).await;
        let err = exchange
            .buy_from_system("team_alpha", "RELIANCE", 10_000)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "INSUFFICIENT_CAPITAL");
        assert_eq!(
            exchange.user_balance("team_alpha").await.unwrap(),
            dec!(10_000_000)
        );
    }

    #[tokio::test]
    async fn display_only_instruments_never_settle() {
        let exchange = exchange_in_round(0).await;
        let err = exchange
            .buy_from_system("team_alpha", "INDEX", 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");
    }

    #[tokio::test]
    async fn sell_orders_are_blocked_in_round_zero() {
        let exchange = exchange_in_round(0).await;
        exchange
            .buy_from_system("team_alpha", "RELIANCE", 10)
            .await
            .unwrap();
        let err = exchange
            .create_stock_sell_order("team_alpha", "RELIANCE", 10, dec!(2500))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "INVALID_ROUND");
    }

    #[tokio::test]
    async fn sell_order_requires_unreserved_holdings() {
        let exchange = exchange_in_round(1).await;
        seed_holding(&exchange, "team_alpha", "RELIANCE", 10).await;

        exchange
            .create_stock_sell_order("team_alpha", "RELIANCE", 8, dec!(2600))
            .await
            .unwrap();

        // The second order overlaps the reservation and must fail.
        let err = exchange
            .create_stock_sell_order("team_alpha", "RELIANCE", 5, dec!(2600))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "INSUFFICIENT_POSITION");
    }

    #[tokio::test]
    async fn match_settles_both_ledgers_atomically() {
        let exchange = exchange_in_round(1).await;
        seed_holding(&exchange, "team_alpha", "RELIANCE", 10).await;
        let alpha_after_seed = exchange.user_balance("team_alpha").await.unwrap();

        let order = exchange
            .create_stock_sell_order("team_alpha", "RELIANCE", 10, dec!(2500))
            .await
            .unwrap();
        let pin: Pin = order.pin.parse().unwrap();

        let receipt = exchange
            .match_stock_buy_order("team_beta", pin, "RELIANCE", 10, dec!(2500))
            .await
            .unwrap();
        assert_eq!(receipt.total, dec!(25_000));

        assert_eq!(
            exchange.user_balance("team_alpha").await.unwrap(),
            alpha_after_seed + dec!(25_000)
        );
        assert_eq!(
            exchange.user_balance("team_beta").await.unwrap(),
            dec!(9_975_000)
        );
        let beta_portfolio = exchange.portfolio("team_beta").await.unwrap();
        assert_eq!(beta_portfolio[0].ticker, "RELIANCE");
        assert_eq!(beta_portfolio[0].qty, 10);
        assert!(exchange.portfolio("team_alpha").await.unwrap().is_empty());

        // The PIN is spent: a second match finds nothing.
        let err = exchange
            .match_stock_buy_order("team_gamma", pin, "RELIANCE", 10, dec!(2500))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn wrong_details_leave_the_order_matchable() {
        let exchange = exchange_in_round(1).await;
        seed_holding(&exchange, "team_alpha", "RELIANCE", 10).await;
        let order = exchange
            .create_stock_sell_order("team_alpha", "RELIANCE", 10, dec!(2500))
            .await
            .unwrap();
        let pin: Pin = order.pin.parse().unwrap();

        let err = exchange
            .match_stock_buy_order("team_beta", pin, "RELIANCE", 5, dec!(2500))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "PIN_MISMATCH");

        // The later correct match still succeeds.
        exchange
            .match_stock_buy_order("team_beta", pin, "RELIANCE", 10, dec!(2500))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn underfunded_buyer_aborts_the_whole_match() {
        let exchange = exchange_in_round(1).await;
        seed_holding(&exchange, "team_alpha", "TCS", 10).await;
        let order = exchange
            .create_stock_sell_order("team_alpha", "TCS", 10, dec!(2_000_000))
            .await
            .unwrap();
        let pin: Pin = order.pin.parse().unwrap();

        let err = exchange
            .match_stock_buy_order("team_beta", pin, "TCS", 10, dec!(2_000_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "INSUFFICIENT_CAPITAL");

        // Nothing moved; the order is still open for a funded buyer.
        assert_eq!(
            exchange.user_balance("team_beta").await.unwrap(),
            dec!(10_000_000)
        );
        assert!(exchange.portfolio("team_beta").await.unwrap().is_empty());
        let err = exchange
            .match_stock_buy_order("team_beta", pin, "TCS", 10, dec!(2_000_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "INSUFFICIENT_CAPITAL");
    }

    #[tokio::test]
    async fn self_matching_is_rejected() {
        let exchange = exchange_in_round(1).await;
        seed_holding(&exchange, "team_alpha", "INFY", 5).await;
        let order = exchange
            .create_stock_sell_order("team_alpha", "INFY", 5, dec!(1500))
            .await
            .unwrap();
        let pin: Pin = order.pin.parse().unwrap();

        let err = exchange
            .match_stock_buy_order("Team_Alpha", pin, "INFY", 5, dec!(1500))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");
    }

    #[tokio::test]
    async fn cancel_releases_shares_and_pin() {
        let exchange = exchange_in_round(1).await;
        seed_holding(&exchange, "team_alpha", "RELIANCE", 10).await;
        let order = exchange
            .create_stock_sell_order("team_alpha", "RELIANCE", 10, dec!(2500))
            .await
            .unwrap();
        let pin: Pin = order.pin.parse().unwrap();

        // Only the creator can cancel.
        let err = exchange
            .cancel_stock_sell_order("team_beta", pin)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");

        exchange
            .cancel_stock_sell_order("team_alpha", pin)
            .await
            .unwrap();

        // The PIN no longer resolves and the shares are sellable again.
        let err = exchange
            .match_stock_buy_order("team_beta", pin, "RELIANCE", 10, dec!(2500))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");
        exchange
            .create_stock_sell_order("team_alpha", "RELIANCE", 10, dec!(2550))
            .await
            .unwrap();
    }
}
