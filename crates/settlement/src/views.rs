//! Read models for display polling.
//!
//! Clients poll these every few seconds; they are built under the read
//! guard and may trail in-flight writers. Field names follow the wire
//! contract the trading clients already speak.

use crate::options::PendingOptionOrder;
use crate::shorts::ShortPosition;
use mockstock_core::{OptionOrderStatus, Role, ShortStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Outcome of a roster login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginReceipt {
    pub team: String,
    pub role: Role,
    pub balance: Decimal,
    pub starting_capital: Decimal,
}

/// One row of a team's holdings table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingView {
    pub ticker: String,
    pub qty: u64,
    pub reserved: u64,
    pub avg_price: Decimal,
}

/// One row of the active-shorts table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortView {
    pub stock: String,
    pub qty: u64,
    pub sell_rate: Decimal,
    pub pin: String,
    pub status: ShortStatus,
}

impl ShortView {
    pub(crate) fn from_position(position: &ShortPosition) -> Self {
        Self {
            stock: position.ticker.clone(),
            qty: position.qty,
            sell_rate: position.sell_rate,
            pin: position.pin.to_string(),
            status: position.status,
        }
    }
}

/// One row of a team's active option trades.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionPositionView {
    pub action: &'static str,
    #[serde(rename = "type")]
    pub option_type: String,
    pub strike: Decimal,
    pub lot_size: u64,
    pub lots: u64,
    pub value: Decimal,
    pub pin: String,
    pub status: OptionOrderStatus,
}

impl OptionPositionView {
    /// The same order renders differently for its two sides: the buyer's
    /// row values the premium paid, the seller's the margin at stake.
    pub(crate) fn for_team(order: &PendingOptionOrder, team: &str) -> Option<Self> {
        let (action, value) = if order.buyer == team {
            ("BUY", order.premium_paid)
        } else if order.seller.as_deref() == Some(team) {
            ("SELL", order.margin_required.unwrap_or(Decimal::ZERO))
        } else {
            return None;
        };

        Some(Self {
            action,
            option_type: order.option_type.to_string(),
            strike: order.strike,
            lot_size: order.lot_size,
            lots: order.lots,
            value,
            pin: order.pin.to_string(),
            status: order.status,
        })
    }
}

/// One row of a broker's verification queue (or the admin union).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerQueueView {
    pub trade_id: Uuid,
    pub pin: String,
    pub trade: String,
    pub buyer: String,
    pub seller: Option<String>,
    pub strike: Decimal,
    pub lot_size: u64,
    pub lots: u64,
    pub margin_required: Option<Decimal>,
    pub broker: Option<String>,
    pub sheet: Option<String>,
    pub status: OptionOrderStatus,
}

impl BrokerQueueView {
    pub(crate) fn from_order(order: &PendingOptionOrder) -> Self {
        Self {
            trade_id: order.trade_id,
            pin: order.pin.to_string(),
            trade: order.option_type.to_string(),
            buyer: order.buyer.clone(),
            seller: order.seller.clone(),
            strike: order.strike,
            lot_size: order.lot_size,
            lots: order.lots,
            margin_required: order.margin_required,
            broker: order.assigned_broker.clone(),
            sheet: order.sheet.clone(),
            status: order.status,
        }
    }
}
