//! Option settlement and broker verification.
//!
//! Two-sided flow: the buyer pays the premium up front and generates a PIN;
//! the seller's match consumes it and parks the trade in one broker's
//! verification queue; the broker's decision either locks the seller's
//! margin (VERIFIED) or rejects. Terminal transitions are a compare-and-set
//! on the stored status, so a racing second verify or reject fails instead
//! of double-settling.

use crate::engine::{Exchange, ExchangeState};
use crate::escrow::OrderRef;
use crate::stocks::ensure_positive_qty;
use mockstock_core::{
    normalize_team, LockKind, OptionOrderStatus, OptionType, Pin, Role, SettlementError,
    SettlementResult,
};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// A two-sided option order working through the verification state machine.
#[derive(Debug, Clone)]
pub struct PendingOptionOrder {
    pub trade_id: Uuid,
    pub pin: Pin,
    pub buyer: String,
    pub option_type: OptionType,
    pub strike: Decimal,
    pub lot_size: u64,
    pub lots: u64,
    pub premium_per_unit: Decimal,
    pub premium_paid: Decimal,
    pub status: OptionOrderStatus,
    pub seller: Option<String>,
    pub margin_required: Option<Decimal>,
    pub assigned_broker: Option<String>,
    pub sheet: Option<String>,
    pub round_created: u32,
    pub round_matched: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionBuyReceipt {
    pub trade_id: Uuid,
    pub pin: String,
    #[serde(rename = "type")]
    pub option_type: String,
    pub strike: Decimal,
    pub lot_size: u64,
    pub lots: u64,
    pub premium_paid: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionMatchReceipt {
    pub trade_id: Uuid,
    pub buyer: String,
    pub seller: String,
    pub margin_required: Decimal,
    pub broker: String,
    pub sheet: Option<String>,
    pub status: OptionOrderStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReceipt {
    pub trade_id: Uuid,
    pub buyer: String,
    pub seller: String,
    pub margin_locked: Decimal,
    pub status: OptionOrderStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectReceipt {
    pub trade_id: Uuid,
    pub buyer: String,
    pub seller: Option<String>,
    pub premium_refunded: Option<Decimal>,
    pub status: OptionOrderStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOptionReceipt {
    pub trade_id: Uuid,
    pub premium_refunded: Decimal,
}

impl Exchange {
    /// Buyer side: pays the premium unconditionally and receives the PIN to
    /// share with a seller. The quoted premium must match the active
    /// round's chain.
    pub async fn create_option_buy_order(
        &self,
        buyer: &str,
        option_type: OptionType,
        strike: Decimal,
        lot_size: u64,
        lots: u64,
        premium: Decimal,
    ) -> SettlementResult<OptionBuyReceipt> {
        let buyer = normalize_team(buyer);
        ensure_positive_qty(lot_size)?;
        ensure_positive_qty(lots)?;

        let mut state = self.state.write().await;
        let snapshot = state.session.snapshot();
        snapshot.ensure_peer_round()?;
        let role = state.ledger.role_of(&buyer)?;
        snapshot.ensure_unlocked(LockKind::Options, role)?;

        let quoted = self
            .market
            .premium(snapshot.round, strike, option_type)
            .ok_or_else(|| {
                SettlementError::validation(format!(
                    "strike {strike} is not quoted in round {}",
                    snapshot.round
                ))
            })?;
        if premium != quoted {
            return Err(SettlementError::validation(format!(
                "premium {premium} does not match the quoted {quoted}"
            )));
        }

        let cost = premium * Decimal::from(lots) * Decimal::from(lot_size);
        let available = state.ledger.account(&buyer)?.free_capital();
        if available < cost {
            return Err(SettlementError::InsufficientCapital {
                required: cost,
                available,
            });
        }

        let trade_id = Uuid::new_v4();
        let ExchangeState { pins, rng, .. } = &mut *state;
        let pin = pins.issue(rng, OrderRef::OptionBuy(trade_id))?;
        state.ledger.account_mut(&buyer)?.debit(cost)?;

        state.option_orders.insert(
            trade_id,
            PendingOptionOrder {
                trade_id,
                pin,
                buyer: buyer.clone(),
                option_type,
                strike,
                lot_size,
                lots,
                premium_per_unit: premium,
                premium_paid: cost,
                status: OptionOrderStatus::AwaitingSeller,
                seller: None,
                margin_required: None,
                assigned_broker: None,
                sheet: None,
                round_created: snapshot.round,
                round_matched: None,
            },
        );

        tracing::info!(
            %buyer, %option_type, %strike, lot_size, lots, premium_paid = %cost, %pin,
            "option buy order opened"
        );
        Ok(OptionBuyReceipt {
            trade_id,
            pin: pin.to_string(),
            option_type: option_type.to_string(),
            strike,
            lot_size,
            lots,
            premium_paid: cost,
        })
    }

    /// Seller side: consumes the buyer's PIN on a full field match,
    /// computes the margin the broker must confirm, and parks the trade in
    /// the assigned broker's queue.
    pub async fn match_option_order(
        &self,
        seller: &str,
        pin: Pin,
        option_type: OptionType,
        strike: Decimal,
        lot_size: u64,
        lots: u64,
    ) -> SettlementResult<OptionMatchReceipt> {
        let seller = normalize_team(seller);

        let mut state = self.state.write().await;
        let snapshot = state.session.snapshot();
        snapshot.ensure_peer_round()?;
        let role = state.ledger.role_of(&seller)?;
        snapshot.ensure_unlocked(LockKind::Options, role)?;

        let Some(OrderRef::OptionBuy(trade_id)) = state.pins.lookup(pin) else {
            return Err(SettlementError::NotFound);
        };
        let order = state
            .option_orders
            .get(&trade_id)
            .ok_or(SettlementError::NotFound)?;
        if order.status != OptionOrderStatus::AwaitingSeller {
            return Err(SettlementError::ConcurrentConflict);
        }
        // Mismatched tickets leave the order open for the right seller.
        if order.option_type != option_type
            || order.strike != strike
            || order.lot_size != lot_size
            || order.lots != lots
        {
            return Err(SettlementError::PinMismatch);
        }
        if order.buyer == seller {
            return Err(SettlementError::validation(
                "cannot take the sell side of your own order",
            ));
        }

        let buyer = order.buyer.clone();
        let margin = self.margin_rule.margin_required(strike, lot_size, lots);
        let assignment = self.routing.assign(&seller, snapshot.round);

        let order = state
            .option_orders
            .get_mut(&trade_id)
            .ok_or(SettlementError::NotFound)?;
        order.seller = Some(seller.clone());
        order.margin_required = Some(margin);
        order.assigned_broker = Some(assignment.broker.clone());
        order.sheet = assignment.sheet.clone();
        order.round_matched = Some(snapshot.round);
        order.status = OptionOrderStatus::AwaitingBroker;
        state.pins.release(pin);

        tracing::info!(
            %buyer, %seller, %strike, lots, margin_required = %margin,
            broker = %assignment.broker, "option order matched, awaiting broker"
        );
        Ok(OptionMatchReceipt {
            trade_id,
            buyer,
            seller,
            margin_required: margin,
            broker: assignment.broker,
            sheet: assignment.sheet,
            status: OptionOrderStatus::AwaitingBroker,
        })
    }

    /// Broker decision: re-checks the seller's *current* free capital
    /// against the margin. Insufficient capital auto-rejects in the same
    /// transaction and surfaces `INSUFFICIENT_MARGIN` so both parties can
    /// be told; sufficient capital locks the margin and verifies.
    pub async fn finalize_option_trade(
        &self,
        caller: &str,
        trade_id: Uuid,
    ) -> SettlementResult<VerifyReceipt> {
        let caller = normalize_team(caller);

        let mut state = self.state.write().await;
        let role = state.ledger.role_of(&caller)?;
        let ExchangeState { ledger, option_orders, .. } = &mut *state;

        ensure_verifier(role, &caller)?;
        let order = option_orders
            .get_mut(&trade_id)
            .ok_or(SettlementError::NotFound)?;
        match order.status {
            OptionOrderStatus::AwaitingBroker => {}
            OptionOrderStatus::AwaitingSeller => return Err(SettlementError::NotFound),
            _ => return Err(SettlementError::ConcurrentConflict),
        }
        ensure_broker_scope(role, &caller, order)?;

        let buyer = order.buyer.clone();
        let Some(seller) = order.seller.clone() else {
            return Err(SettlementError::NotFound);
        };
        let Some(margin) = order.margin_required else {
            return Err(SettlementError::NotFound);
        };

        let free = ledger.account(&seller)?.free_capital();
        if free < margin {
            order.status = OptionOrderStatus::Rejected;
            let refunded = if self.policy.refund_premium_on_reject {
                ledger.account_mut(&buyer)?.credit(order.premium_paid);
                true
            } else {
                false
            };
            tracing::warn!(
                %buyer, %seller, margin_required = %margin, free_capital = %free, refunded,
                "margin check failed, trade auto-rejected"
            );
            return Err(SettlementError::InsufficientMargin {
                buyer,
                seller,
                margin_required: margin,
                free_capital: free,
            });
        }

        // Lock and flip in the same critical section; VERIFIED implies the
        // margin lock exists.
        ledger.account_mut(&seller)?.lock_margin(margin)?;
        order.status = OptionOrderStatus::Verified;

        tracing::info!(%caller, %buyer, %seller, margin_locked = %margin, "option trade verified");
        Ok(VerifyReceipt {
            trade_id,
            buyer,
            seller,
            margin_locked: margin,
            status: OptionOrderStatus::Verified,
        })
    }

    /// Explicit manual rejection; same terminal effect as the failed
    /// margin check, minus the margin detail.
    pub async fn reject_option_trade(
        &self,
        caller: &str,
        trade_id: Uuid,
    ) -> SettlementResult<RejectReceipt> {
        let caller = normalize_team(caller);

        let mut state = self.state.write().await;
        let role = state.ledger.role_of(&caller)?;
        let ExchangeState { ledger, option_orders, .. } = &mut *state;

        ensure_verifier(role, &caller)?;
        let order = option_orders
            .get_mut(&trade_id)
            .ok_or(SettlementError::NotFound)?;
        match order.status {
            OptionOrderStatus::AwaitingBroker => {}
            OptionOrderStatus::AwaitingSeller => return Err(SettlementError::NotFound),
            _ => return Err(SettlementError::ConcurrentConflict),
        }
        ensure_broker_scope(role, &caller, order)?;

        order.status = OptionOrderStatus::Rejected;
        let premium_refunded = if self.policy.refund_premium_on_reject {
            ledger
                .account_mut(&order.buyer.clone())?
                .credit(order.premium_paid);
            Some(order.premium_paid)
        } else {
            None
        };

        tracing::info!(%caller, buyer = %order.buyer, trade_id = %trade_id, "option trade rejected");
        Ok(RejectReceipt {
            trade_id,
            buyer: order.buyer.clone(),
            seller: order.seller.clone(),
            premium_refunded,
            status: OptionOrderStatus::Rejected,
        })
    }

    /// Creator-only cancel while no seller has matched; refunds the premium
    /// and releases the PIN.
    pub async fn cancel_option_buy_order(
        &self,
        buyer: &str,
        pin: Pin,
    ) -> SettlementResult<CancelOptionReceipt> {
        let buyer = normalize_team(buyer);

        let mut state = self.state.write().await;
        let Some(OrderRef::OptionBuy(trade_id)) = state.pins.lookup(pin) else {
            return Err(SettlementError::NotFound);
        };
        let ExchangeState { ledger, option_orders, pins, .. } = &mut *state;
        let order = option_orders
            .get_mut(&trade_id)
            .ok_or(SettlementError::NotFound)?;
        if order.status != OptionOrderStatus::AwaitingSeller {
            return Err(SettlementError::ConcurrentConflict);
        }
        if order.buyer != buyer {
            return Err(SettlementError::validation(
                "only the order creator can cancel it",
            ));
        }

        order.status = OptionOrderStatus::Cancelled;
        ledger.account_mut(&buyer)?.credit(order.premium_paid);
        pins.release(pin);

        tracing::info!(%buyer, trade_id = %trade_id, "option buy order cancelled");
        Ok(CancelOptionReceipt {
            trade_id,
            premium_refunded: order.premium_paid,
        })
    }
}

/// Only brokers and admins may act on the verification queue.
fn ensure_verifier(role: Role, caller: &str) -> SettlementResult<()> {
    if role.can_verify() {
        Ok(())
    } else {
        Err(SettlementError::validation(format!(
            "{caller} is not authorized to verify trades"
        )))
    }
}

/// Brokers act only on trades routed to them; admins see everything.
fn ensure_broker_scope(
    role: Role,
    caller: &str,
    order: &PendingOptionOrder,
) -> SettlementResult<()> {
    if role == Role::Broker && order.assigned_broker.as_deref() != Some(caller) {
        return Err(SettlementError::validation(format!(
            "trade is assigned to {}",
            order.assigned_broker.as_deref().unwrap_or("another broker")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockstock_core::{AppConfig, LockState};
    use rust_decimal_macros::dec;

    async fn exchange() -> Exchange {
        let exchange = Exchange::with_seed(&AppConfig::default(), 23);
        exchange.set_round("admin", 1).await.unwrap();
        exchange
    }

    fn quoted_call_premium(exchange: &Exchange, round: u32, strike: Decimal) -> Decimal {
        exchange
            .option_premium(round, strike, OptionType::Call)
            .unwrap()
    }

    /// Drives a buy + match through to AWAITING_BROKER and returns
    /// (trade_id, assigned broker, margin).
    async fn matched_order(exchange: &Exchange) -> (Uuid, String, Decimal) {
        let premium = quoted_call_premium(exchange, 1, dec!(22000));
        let buy = exchange
            .create_option_buy_order("team_delta", OptionType::Call, dec!(22000), 50, 2, premium)
            .await
            .unwrap();
        let pin: Pin = buy.pin.parse().unwrap();
        let matched = exchange
            .match_option_order("team_echo", pin, OptionType::Call, dec!(22000), 50, 2)
            .await
            .unwrap();
        (matched.trade_id, matched.broker, matched.margin_required)
    }

    #[tokio::test]
    async fn buy_order_debits_premium_up_front() {
        let exchange = exchange().await;
        let premium = quoted_call_premium(&exchange, 1, dec!(22000));
        let receipt = exchange
            .create_option_buy_order("team_delta", OptionType::Call, dec!(22000), 50, 2, premium)
            .await
            .unwrap();

        assert_eq!(receipt.premium_paid, premium * dec!(100));
        assert_eq!(
            exchange.user_balance("team_delta").await.unwrap(),
            dec!(10_000_000) - receipt.premium_paid
        );

        let trades = exchange.active_option_trades("team_delta").await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].action, "BUY");
        assert_eq!(trades[0].status, OptionOrderStatus::AwaitingSeller);
    }

    #[tokio::test]
    async fn premium_must_match_the_chain() {
        let exchange = exchange().await;
        let err = exchange
            .create_option_buy_order(
                "team_delta",
                OptionType::Call,
                dec!(22000),
                50,
                2,
                dec!(1),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");

        let err = exchange
            .create_option_buy_order(
                "team_delta",
                OptionType::Call,
                dec!(12345),
                50,
                2,
                dec!(30),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");
    }

    #[tokio::test]
    async fn option_lock_gates_order_creation() {
        let exchange = exchange().await;
        exchange
            .set_lock("admin", LockKind::Options, LockState::Closed)
            .await
            .unwrap();
        let premium = quoted_call_premium(&exchange, 1, dec!(22000));
        let err = exchange
            .create_option_buy_order("team_delta", OptionType::Call, dec!(22000), 50, 2, premium)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "LOCK_CLOSED");
    }

    #[tokio::test]
    async fn match_computes_margin_and_routes_to_one_broker() {
        let exchange = exchange().await;
        let (trade_id, broker, margin) = matched_order(&exchange).await;

        // 20% of 22000 * 50 * 2.
        assert_eq!(margin, dec!(440_000));
        // Round 1 routes to the R4 sheet.
        assert!(broker == "broker_01" || broker == "broker_02");

        let queue = exchange.pending_option_trades(Some(&broker)).await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].trade_id, trade_id);
        assert_eq!(queue[0].sheet.as_deref(), Some("R4"));

        // Other brokers see an empty queue; the admin union sees it.
        let other = if broker == "broker_01" {
            "broker_02"
        } else {
            "broker_01"
        };
        assert!(exchange.pending_option_trades(Some(other)).await.is_empty());
        assert_eq!(exchange.pending_option_trades(None).await.len(), 1);
    }

    #[tokio::test]
    async fn mismatched_ticket_leaves_order_open() {
        let exchange = exchange().await;
        let premium = quoted_call_premium(&exchange, 1, dec!(22000));
        let buy = exchange
            .create_option_buy_order("team_delta", OptionType::Call, dec!(22000), 50, 2, premium)
            .await
            .unwrap();
        let pin: Pin = buy.pin.parse().unwrap();

        let err = exchange
            .match_option_order("team_echo", pin, OptionType::Put, dec!(22000), 50, 2)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "PIN_MISMATCH");
        let err = exchange
            .match_option_order("team_echo", pin, OptionType::Call, dec!(22000), 50, 3)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "PIN_MISMATCH");

        // The correct ticket still matches.
        exchange
            .match_option_order("team_echo", pin, OptionType::Call, dec!(22000), 50, 2)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn verify_locks_margin_and_is_single_shot() {
        let exchange = exchange().await;
        let (trade_id, broker, margin) = matched_order(&exchange).await;

        let receipt = exchange
            .finalize_option_trade(&broker, trade_id)
            .await
            .unwrap();
        assert_eq!(receipt.margin_locked, margin);
        assert_eq!(receipt.status, OptionOrderStatus::Verified);

        // Margin is locked out of the seller's free capital, not spent.
        assert_eq!(
            exchange.user_balance("team_echo").await.unwrap(),
            dec!(10_000_000)
        );
        assert_eq!(
            exchange.free_cash("team_echo").await.unwrap(),
            dec!(10_000_000) - margin
        );

        let verified = exchange.verified_option_trades(Some(&broker)).await;
        assert_eq!(verified.len(), 1);
        assert!(exchange.pending_option_trades(Some(&broker)).await.is_empty());

        // The CAS refuses a second decision.
        let err = exchange
            .finalize_option_trade(&broker, trade_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "CONCURRENT_CONFLICT");
        let err = exchange
            .reject_option_trade(&broker, trade_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "CONCURRENT_CONFLICT");
    }

    #[tokio::test]
    async fn verify_is_scoped_to_the_assigned_broker() {
        let exchange = exchange().await;
        let (trade_id, broker, _) = matched_order(&exchange).await;
        let other = if broker == "broker_01" {
            "broker_02"
        } else {
            "broker_01"
        };

        let err = exchange
            .finalize_option_trade(other, trade_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");
        let err = exchange
            .finalize_option_trade("team_alpha", trade_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");

        // Admin bypasses the scoping.
        exchange.finalize_option_trade("admin", trade_id).await.unwrap();
    }

    #[tokio::test]
    async fn margin_shortfall_auto_rejects_with_detail() {
        let exchange = exchange().await;
        let (trade_id, broker, margin) = matched_order(&exchange).await;

        // Capital moved after matching: a round-0 purchase drains the
        // seller below the margin requirement.
        exchange.set_round("admin", 0).await.unwrap();
        exchange
            .buy_from_system("team_echo", "TCS", 2_600)
            .await
            .unwrap();
        exchange.set_round("admin", 1).await.unwrap();

        let free_before = exchange.free_cash("team_echo").await.unwrap();
        assert!(free_before < margin);
        let buyer_before = exchange.user_balance("team_delta").await.unwrap();

        let err = exchange
            .finalize_option_trade(&broker, trade_id)
            .await
            .unwrap_err();
        match err {
            SettlementError::InsufficientMargin {
                ref buyer,
                ref seller,
                margin_required,
                free_capital,
            } => {
                assert_eq!(buyer, "team_delta");
                assert_eq!(seller, "team_echo");
                assert_eq!(margin_required, margin);
                assert_eq!(free_capital, free_before);
            }
            other => panic!("expected InsufficientMargin, got {other:?}"),
        }

        // Auto-reject committed: order terminal, no margin lock, premium
        // refunded under the default policy.
        assert!(exchange.pending_option_trades(None).await.is_empty());
        assert!(exchange.verified_option_trades(None).await.is_empty());
        assert_eq!(
            exchange.free_cash("team_echo").await.unwrap(),
            free_before
        );
        let refunded = exchange.user_balance("team_delta").await.unwrap();
        assert!(refunded > buyer_before);
    }

    #[tokio::test]
    async fn manual_reject_refunds_premium_by_default() {
        let exchange = exchange().await;
        let (trade_id, broker, _) = matched_order(&exchange).await;

        let receipt = exchange
            .reject_option_trade(&broker, trade_id)
            .await
            .unwrap();
        assert_eq!(receipt.status, OptionOrderStatus::Rejected);
        assert!(receipt.premium_refunded.is_some());
        assert_eq!(
            exchange.user_balance("team_delta").await.unwrap(),
            dec!(10_000_000)
        );
        assert_eq!(
            exchange.free_cash("team_echo").await.unwrap(),
            dec!(10_000_000)
        );
    }

    #[tokio::test]
    async fn forfeit_policy_keeps_premium_on_reject() {
        let mut config = AppConfig::default();
        config.session.refund_premium_on_reject = false;
        let exchange = Exchange::with_seed(&config, 23);
        exchange.set_round("admin", 1).await.unwrap();

        let (trade_id, broker, _) = matched_order(&exchange).await;
        let receipt = exchange
            .reject_option_trade(&broker, trade_id)
            .await
            .unwrap();
        assert_eq!(receipt.premium_refunded, None);
        assert!(exchange.user_balance("team_delta").await.unwrap() < dec!(10_000_000));
    }

    #[tokio::test]
    async fn cancel_refunds_premium_before_a_match() {
        let exchange = exchange().await;
        let premium = exchange
            .option_premium(1, dec!(21500), OptionType::Put)
            .unwrap();
        let buy = exchange
            .create_option_buy_order("team_delta", OptionType::Put, dec!(21500), 50, 1, premium)
            .await
            .unwrap();
        let pin: Pin = buy.pin.parse().unwrap();

        let err = exchange
            .cancel_option_buy_order("team_echo", pin)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");

        exchange
            .cancel_option_buy_order("team_delta", pin)
            .await
            .unwrap();
        assert_eq!(
            exchange.user_balance("team_delta").await.unwrap(),
            dec!(10_000_000)
        );
        assert!(exchange
            .active_option_trades("team_delta")
            .await
            .unwrap()
            .is_empty());
    }
}
