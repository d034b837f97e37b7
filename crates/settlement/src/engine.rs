//! The exchange facade.
//!
//! One `Exchange` owns the authoritative state aggregate behind a single
//! `RwLock`. Every mutating operation takes the write guard, validates
//! completely, then applies its writes, which is what makes each operation
//! a serializable transaction: either everything it describes happens, or
//! nothing does. Display reads take the read guard and may trail writers.

use crate::escrow::PinRegistry;
use crate::ledger::Ledger;
use crate::margin::{MarginRule, ProportionalMargin};
use crate::options::PendingOptionOrder;
use crate::session::{SessionSnapshot, SessionState};
use crate::shorts::ShortPosition;
use crate::stocks::PendingStockOrder;
use crate::views::{
    BrokerQueueView, HoldingView, LoginReceipt, OptionPositionView, ShortView,
};
use mockstock_core::market::{Quote, StrikeRow};
use mockstock_core::{
    normalize_team, AppConfig, BrokerAssignment, LockKind, LockState, MarketData,
    OptionOrderStatus, OptionType, Role, SettlementError, SettlementResult,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Session-wide settlement parameters lifted out of configuration.
#[derive(Debug, Clone)]
pub struct SettlementPolicy {
    pub leverage_cap: Decimal,
    pub refund_premium_on_reject: bool,
}

/// The single shared mutable store: ledger, escrow registry, session gates,
/// and every live or settled order record.
pub(crate) struct ExchangeState {
    pub(crate) ledger: Ledger,
    pub(crate) session: SessionState,
    pub(crate) pins: PinRegistry,
    pub(crate) stock_orders: HashMap<Uuid, PendingStockOrder>,
    pub(crate) option_orders: HashMap<Uuid, PendingOptionOrder>,
    pub(crate) shorts: HashMap<Uuid, ShortPosition>,
    pub(crate) rng: StdRng,
}

pub struct Exchange {
    pub(crate) state: RwLock<ExchangeState>,
    pub(crate) market: MarketData,
    pub(crate) routing: BrokerAssignment,
    pub(crate) margin_rule: Box<dyn MarginRule>,
    pub(crate) policy: SettlementPolicy,
    auth: HashMap<String, String>,
    starting_capital: Decimal,
}

impl Exchange {
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        Self::build(config, StdRng::from_entropy())
    }

    /// Deterministic PIN sequence for tests.
    #[must_use]
    pub fn with_seed(config: &AppConfig, seed: u64) -> Self {
        Self::build(config, StdRng::seed_from_u64(seed))
    }

    fn build(config: &AppConfig, rng: StdRng) -> Self {
        let auth = config
            .roster
            .iter()
            .map(|entry| (normalize_team(&entry.team), entry.access_code.clone()))
            .collect();

        Self {
            state: RwLock::new(ExchangeState {
                ledger: Ledger::seed(&config.roster, config.session.starting_capital),
                session: SessionState::new(config.session.max_round),
                pins: PinRegistry::default(),
                stock_orders: HashMap::new(),
                option_orders: HashMap::new(),
                shorts: HashMap::new(),
                rng,
            }),
            market: MarketData::from_config(&config.market),
            routing: BrokerAssignment::from_config(&config.brokers),
            margin_rule: Box::new(ProportionalMargin::new(config.session.margin_rate)),
            policy: SettlementPolicy {
                leverage_cap: config.session.leverage_cap,
                refund_premium_on_reject: config.session.refund_premium_on_reject,
            },
            auth,
            starting_capital: config.session.starting_capital,
        }
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    /// Roster lookup: team name plus access code yield the role. Session
    /// mechanics beyond this check live outside the core.
    pub async fn login(&self, team: &str, access_code: &str) -> SettlementResult<LoginReceipt> {
        let team = normalize_team(team);
        let expected = self
            .auth
            .get(&team)
            .ok_or_else(|| SettlementError::validation(format!("unknown team: {team}")))?;
        if expected != access_code.trim() {
            return Err(SettlementError::validation("invalid access code"));
        }

        let state = self.state.read().await;
        let account = state.ledger.account(&team)?;
        tracing::info!(%team, role = %account.role, "login");
        Ok(LoginReceipt {
            team: account.id.clone(),
            role: account.role,
            balance: account.cash_balance,
            starting_capital: account.starting_capital,
        })
    }

    // ------------------------------------------------------------------
    // Round & lock controller
    // ------------------------------------------------------------------

    pub async fn active_round(&self) -> u32 {
        self.state.read().await.session.round()
    }

    pub async fn session_snapshot(&self) -> SessionSnapshot {
        self.state.read().await.session.snapshot()
    }

    /// Admin-only round change.
    pub async fn set_round(&self, caller: &str, round: u32) -> SettlementResult<u32> {
        let caller = normalize_team(caller);
        let mut state = self.state.write().await;
        self.ensure_admin(&state, &caller)?;
        let round = state.session.set_round(round)?;
        tracing::info!(%caller, round, "active round changed");
        Ok(round)
    }

    pub async fn lock_state(&self, kind: LockKind) -> LockState {
        self.state.read().await.session.lock(kind)
    }

    /// Admin-only lock change.
    pub async fn set_lock(
        &self,
        caller: &str,
        kind: LockKind,
        lock: LockState,
    ) -> SettlementResult<LockState> {
        let caller = normalize_team(caller);
        let mut state = self.state.write().await;
        self.ensure_admin(&state, &caller)?;
        let lock = state.session.set_lock(kind, lock);
        tracing::info!(%caller, %kind, state = %lock, "lock changed");
        Ok(lock)
    }

    fn ensure_admin(&self, state: &ExchangeState, caller: &str) -> SettlementResult<()> {
        match state.ledger.role_of(caller)? {
            Role::Admin => Ok(()),
            role => Err(SettlementError::validation(format!(
                "{caller} ({role}) is not authorized for admin controls"
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Market data
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn starting_capital(&self) -> Decimal {
        self.starting_capital
    }

    /// Market table for `round`, defaulting to the active round.
    pub async fn quotes(&self, round: Option<u32>) -> Vec<Quote> {
        let round = match round {
            Some(round) => round,
            None => self.active_round().await,
        };
        self.market.quotes(round)
    }

    #[must_use]
    pub fn stock_price(&self, ticker: &str, round: u32) -> Option<Decimal> {
        self.market.price(round, &ticker.trim().to_uppercase())
    }

    #[must_use]
    pub fn option_chain(&self, round: u32) -> Vec<StrikeRow> {
        self.market.chain(round).to_vec()
    }

    #[must_use]
    pub fn option_premium(
        &self,
        round: u32,
        strike: Decimal,
        option_type: OptionType,
    ) -> Option<Decimal> {
        self.market.premium(round, strike, option_type)
    }

    // ------------------------------------------------------------------
    // Account reads
    // ------------------------------------------------------------------

    pub async fn user_balance(&self, team: &str) -> SettlementResult<Decimal> {
        let team = normalize_team(team);
        let state = self.state.read().await;
        Ok(state.ledger.account(&team)?.cash_balance)
    }

    /// Cash minus reserved margin.
    pub async fn free_cash(&self, team: &str) -> SettlementResult<Decimal> {
        let team = normalize_team(team);
        let state = self.state.read().await;
        Ok(state.ledger.account(&team)?.free_capital())
    }

    pub async fn portfolio(&self, team: &str) -> SettlementResult<Vec<HoldingView>> {
        let team = normalize_team(team);
        let state = self.state.read().await;
        let account = state.ledger.account(&team)?;
        let mut rows: Vec<HoldingView> = account
            .holdings
            .iter()
            .map(|(ticker, holding)| HoldingView {
                ticker: ticker.clone(),
                qty: holding.qty,
                reserved: holding.reserved,
                avg_price: holding.avg_price,
            })
            .collect();
        rows.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        Ok(rows)
    }

    pub async fn active_shorts(&self, team: &str) -> SettlementResult<Vec<ShortView>> {
        let team = normalize_team(team);
        let state = self.state.read().await;
        state.ledger.account(&team)?;
        let mut rows: Vec<ShortView> = state
            .shorts
            .values()
            .filter(|position| position.team == team && position.status.is_active())
            .map(ShortView::from_position)
            .collect();
        rows.sort_by(|a, b| a.stock.cmp(&b.stock).then(a.pin.cmp(&b.pin)));
        Ok(rows)
    }

    /// Option orders the team is party to and that are still in flight
    /// (anything not rejected or cancelled).
    pub async fn active_option_trades(
        &self,
        team: &str,
    ) -> SettlementResult<Vec<OptionPositionView>> {
        let team = normalize_team(team);
        let state = self.state.read().await;
        state.ledger.account(&team)?;
        let mut rows: Vec<OptionPositionView> = state
            .option_orders
            .values()
            .filter(|order| {
                !matches!(
                    order.status,
                    OptionOrderStatus::Rejected | OptionOrderStatus::Cancelled
                )
            })
            .filter_map(|order| OptionPositionView::for_team(order, &team))
            .collect();
        rows.sort_by(|a, b| a.pin.cmp(&b.pin));
        Ok(rows)
    }

    /// Verification queue for one broker, or the union for `None` (admin).
    pub async fn pending_option_trades(&self, broker: Option<&str>) -> Vec<BrokerQueueView> {
        self.queue_view(broker, OptionOrderStatus::AwaitingBroker).await
    }

    /// Verified (active) trades, scoped the same way as the pending queue.
    pub async fn verified_option_trades(&self, broker: Option<&str>) -> Vec<BrokerQueueView> {
        self.queue_view(broker, OptionOrderStatus::Verified).await
    }

    async fn queue_view(
        &self,
        broker: Option<&str>,
        status: OptionOrderStatus,
    ) -> Vec<BrokerQueueView> {
        let broker = broker.map(normalize_team);
        let state = self.state.read().await;
        let mut rows: Vec<BrokerQueueView> = state
            .option_orders
            .values()
            .filter(|order| order.status == status)
            .filter(|order| match &broker {
                Some(broker) => order.assigned_broker.as_deref() == Some(broker.as_str()),
                None => true,
            })
            .map(BrokerQueueView::from_order)
            .collect();
        rows.sort_by(|a, b| a.pin.cmp(&b.pin));
        rows
    }
}
