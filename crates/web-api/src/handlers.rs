//! HTTP handlers mapping the operation surface onto the settlement engine.
//!
//! Mutating calls answer with the `{success, error?, message?, ...}`
//! envelope the trading clients already parse; display reads return their
//! payloads bare. Business-rule failures are HTTP 200 with `success: false`
//! so clients distinguish them from transport faults.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use mockstock_core::market::{Quote, StrikeRow};
use mockstock_core::{LockKind, LockState, OptionType, Pin, SettlementError};
use mockstock_settlement::views::{
    BrokerQueueView, HoldingView, LoginReceipt, OptionPositionView, ShortView,
};
use mockstock_settlement::Exchange;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    #[serde(flatten)]
    pub data: Option<T>,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        error: None,
        message: None,
        detail: None,
        data: Some(data),
    })
}

fn fail<T: Serialize>(err: &SettlementError) -> Json<Envelope<T>> {
    Json(Envelope {
        success: false,
        error: Some(err.kind()),
        message: Some(err.to_string()),
        detail: error_detail(err),
        data: None,
    })
}

fn respond<T: Serialize>(result: Result<T, SettlementError>) -> Json<Envelope<T>> {
    match result {
        Ok(data) => ok(data),
        Err(err) => fail(&err),
    }
}

/// Structured counterpart detail for failures the caller must relay to
/// both parties.
fn error_detail(err: &SettlementError) -> Option<Value> {
    match err {
        SettlementError::InsufficientMargin {
            buyer,
            seller,
            margin_required,
            free_capital,
        } => Some(json!({
            "buyer": buyer,
            "seller": seller,
            "marginRequired": margin_required,
            "freeCapital": free_capital,
        })),
        _ => None,
    }
}

fn parse_pin(raw: &str) -> Result<Pin, SettlementError> {
    raw.parse()
        .map_err(|_| SettlementError::validation(format!("invalid PIN: {raw}")))
}

fn parse_option_type(raw: &str) -> Result<OptionType, SettlementError> {
    raw.parse()
        .map_err(|_| SettlementError::validation(format!("unknown option type: {raw}")))
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_name: String,
    pub pin: String,
}

pub async fn login(
    State(exchange): State<Arc<Exchange>>,
    Json(req): Json<LoginRequest>,
) -> Json<Envelope<LoginReceipt>> {
    respond(exchange.login(&req.user_name, &req.pin).await)
}

// ---------------------------------------------------------------------------
// Round & locks
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct RoundResponse {
    pub round: u32,
}

pub async fn get_active_round(State(exchange): State<Arc<Exchange>>) -> Json<RoundResponse> {
    Json(RoundResponse {
        round: exchange.active_round().await,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRoundRequest {
    pub caller: String,
    pub round: u32,
}

pub async fn set_round(
    State(exchange): State<Arc<Exchange>>,
    Json(req): Json<SetRoundRequest>,
) -> Json<Envelope<RoundResponse>> {
    respond(
        exchange
            .set_round(&req.caller, req.round)
            .await
            .map(|round| RoundResponse { round }),
    )
}

#[derive(Serialize)]
pub struct LockResponse {
    pub state: LockState,
}

/// # Errors
/// Returns `StatusCode::BAD_REQUEST` for an unknown lock kind.
pub async fn get_lock_state(
    State(exchange): State<Arc<Exchange>>,
    Path(kind): Path<String>,
) -> Result<Json<LockResponse>, StatusCode> {
    let kind: LockKind = kind.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok(Json(LockResponse {
        state: exchange.lock_state(kind).await,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLockRequest {
    pub caller: String,
    pub state: LockState,
}

pub async fn set_lock_state(
    State(exchange): State<Arc<Exchange>>,
    Path(kind): Path<String>,
    Json(req): Json<SetLockRequest>,
) -> Json<Envelope<LockResponse>> {
    let kind: LockKind = match kind.parse() {
        Ok(kind) => kind,
        Err(_) => {
            return fail(&SettlementError::validation(format!(
                "unknown lock kind: {kind}"
            )))
        }
    };
    respond(
        exchange
            .set_lock(&req.caller, kind, req.state)
            .await
            .map(|state| LockResponse { state }),
    )
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RoundQuery {
    pub round: Option<u32>,
}

pub async fn get_market_prices(
    State(exchange): State<Arc<Exchange>>,
    Query(query): Query<RoundQuery>,
) -> Json<Vec<Quote>> {
    Json(exchange.quotes(query.round).await)
}

#[derive(Deserialize)]
pub struct PriceQuery {
    pub stock: String,
    pub round: u32,
}

#[derive(Serialize)]
pub struct PriceResponse {
    pub price: Option<Decimal>,
}

pub async fn get_stock_price(
    State(exchange): State<Arc<Exchange>>,
    Query(query): Query<PriceQuery>,
) -> Json<PriceResponse> {
    Json(PriceResponse {
        price: exchange.stock_price(&query.stock, query.round),
    })
}

#[derive(Deserialize)]
pub struct ChainQuery {
    pub round: u32,
}

pub async fn get_option_chain(
    State(exchange): State<Arc<Exchange>>,
    Query(query): Query<ChainQuery>,
) -> Json<Vec<StrikeRow>> {
    Json(exchange.option_chain(query.round))
}

#[derive(Deserialize)]
pub struct PremiumQuery {
    pub round: u32,
    pub strike: Decimal,
    #[serde(rename = "type")]
    pub option_type: String,
}

#[derive(Serialize)]
pub struct PremiumResponse {
    pub premium: Option<Decimal>,
}

/// # Errors
/// Returns `StatusCode::BAD_REQUEST` for an unknown option type.
pub async fn get_option_premium(
    State(exchange): State<Arc<Exchange>>,
    Query(query): Query<PremiumQuery>,
) -> Result<Json<PremiumResponse>, StatusCode> {
    let option_type =
        parse_option_type(&query.option_type).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok(Json(PremiumResponse {
        premium: exchange.option_premium(query.round, query.strike, option_type),
    }))
}

#[derive(Serialize)]
pub struct CapitalResponse {
    pub capital: Decimal,
}

pub async fn get_starting_capital(State(exchange): State<Arc<Exchange>>) -> Json<CapitalResponse> {
    Json(CapitalResponse {
        capital: exchange.starting_capital(),
    })
}

// ---------------------------------------------------------------------------
// Account reads
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct BalanceResponse {
    pub balance: Decimal,
}

/// # Errors
/// Returns `StatusCode::NOT_FOUND` for an unknown team.
pub async fn get_user_balance(
    State(exchange): State<Arc<Exchange>>,
    Path(team): Path<String>,
) -> Result<Json<BalanceResponse>, StatusCode> {
    let balance = exchange
        .user_balance(&team)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Json(BalanceResponse { balance }))
}

/// Cash net of locked option margin.
///
/// # Errors
/// Returns `StatusCode::NOT_FOUND` for an unknown team.
pub async fn get_free_cash(
    State(exchange): State<Arc<Exchange>>,
    Path(team): Path<String>,
) -> Result<Json<BalanceResponse>, StatusCode> {
    let balance = exchange
        .free_cash(&team)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Json(BalanceResponse { balance }))
}

/// # Errors
/// Returns `StatusCode::NOT_FOUND` for an unknown team.
pub async fn get_portfolio_holdings(
    State(exchange): State<Arc<Exchange>>,
    Path(team): Path<String>,
) -> Result<Json<Vec<HoldingView>>, StatusCode> {
    let rows = exchange
        .portfolio(&team)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Json(rows))
}

/// # Errors
/// Returns `StatusCode::NOT_FOUND` for an unknown team.
pub async fn get_active_shorts(
    State(exchange): State<Arc<Exchange>>,
    Path(team): Path<String>,
) -> Result<Json<Vec<ShortView>>, StatusCode> {
    let rows = exchange
        .active_shorts(&team)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Json(rows))
}

/// # Errors
/// Returns `StatusCode::NOT_FOUND` for an unknown team.
pub async fn get_active_option_trades(
    State(exchange): State<Arc<Exchange>>,
    Path(team): Path<String>,
) -> Result<Json<Vec<OptionPositionView>>, StatusCode> {
    let rows = exchange
        .active_option_trades(&team)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Json(rows))
}

// ---------------------------------------------------------------------------
// Stock settlement
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemBuyRequest {
    pub buyer: String,
    pub stock: String,
    pub qty: u64,
}

pub async fn buy_from_system(
    State(exchange): State<Arc<Exchange>>,
    Json(req): Json<SystemBuyRequest>,
) -> Json<Envelope<mockstock_settlement::stocks::SystemBuyReceipt>> {
    respond(
        exchange
            .buy_from_system(&req.buyer, &req.stock, req.qty)
            .await,
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSellOrderRequest {
    pub seller: String,
    pub stock: String,
    pub qty: u64,
    pub price: Decimal,
}

pub async fn create_stock_sell_order(
    State(exchange): State<Arc<Exchange>>,
    Json(req): Json<CreateSellOrderRequest>,
) -> Json<Envelope<mockstock_settlement::stocks::SellOrderReceipt>> {
    respond(
        exchange
            .create_stock_sell_order(&req.seller, &req.stock, req.qty, req.price)
            .await,
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStockRequest {
    pub buyer: String,
    pub pin: String,
    pub stock: String,
    pub qty: u64,
    pub price: Decimal,
}

pub async fn match_stock_buy_order(
    State(exchange): State<Arc<Exchange>>,
    Json(req): Json<MatchStockRequest>,
) -> Json<Envelope<mockstock_settlement::stocks::StockMatchReceipt>> {
    let pin = match parse_pin(&req.pin) {
        Ok(pin) => pin,
        Err(err) => return fail(&err),
    };
    respond(
        exchange
            .match_stock_buy_order(&req.buyer, pin, &req.stock, req.qty, req.price)
            .await,
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSellOrderRequest {
    pub seller: String,
    pub pin: String,
}

pub async fn cancel_stock_sell_order(
    State(exchange): State<Arc<Exchange>>,
    Json(req): Json<CancelSellOrderRequest>,
) -> Json<Envelope<mockstock_settlement::stocks::CancelSellReceipt>> {
    let pin = match parse_pin(&req.pin) {
        Ok(pin) => pin,
        Err(err) => return fail(&err),
    };
    respond(exchange.cancel_stock_sell_order(&req.seller, pin).await)
}

// ---------------------------------------------------------------------------
// Short selling
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortStockRequest {
    pub team: String,
    pub stock: String,
    pub qty: u64,
}

pub async fn short_stock(
    State(exchange): State<Arc<Exchange>>,
    Json(req): Json<ShortStockRequest>,
) -> Json<Envelope<mockstock_settlement::shorts::ShortOpenReceipt>> {
    respond(exchange.open_short(&req.team, &req.stock, req.qty).await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverStockRequest {
    pub team: String,
    pub stock: String,
    pub pin: String,
    pub qty: u64,
}

pub async fn cover_stock(
    State(exchange): State<Arc<Exchange>>,
    Json(req): Json<CoverStockRequest>,
) -> Json<Envelope<mockstock_settlement::shorts::CoverReceipt>> {
    let pin = match parse_pin(&req.pin) {
        Ok(pin) => pin,
        Err(err) => return fail(&err),
    };
    respond(
        exchange
            .cover_short(&req.team, &req.stock, pin, req.qty)
            .await,
    )
}

// ---------------------------------------------------------------------------
// Option settlement & broker verification
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionBuyRequest {
    pub buyer: String,
    pub trade: String,
    pub strike: Decimal,
    pub lot_size: u64,
    pub lots: u64,
    pub premium: Decimal,
}

pub async fn create_option_buy_order(
    State(exchange): State<Arc<Exchange>>,
    Json(req): Json<OptionBuyRequest>,
) -> Json<Envelope<mockstock_settlement::options::OptionBuyReceipt>> {
    let option_type = match parse_option_type(&req.trade) {
        Ok(option_type) => option_type,
        Err(err) => return fail(&err),
    };
    respond(
        exchange
            .create_option_buy_order(
                &req.buyer,
                option_type,
                req.strike,
                req.lot_size,
                req.lots,
                req.premium,
            )
            .await,
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionMatchRequest {
    pub user: String,
    pub pin: String,
    pub trade: String,
    pub strike: Decimal,
    pub lot_size: u64,
    pub lots: u64,
}

pub async fn match_option_order(
    State(exchange): State<Arc<Exchange>>,
    Json(req): Json<OptionMatchRequest>,
) -> Json<Envelope<mockstock_settlement::options::OptionMatchReceipt>> {
    let pin = match parse_pin(&req.pin) {
        Ok(pin) => pin,
        Err(err) => return fail(&err),
    };
    let option_type = match parse_option_type(&req.trade) {
        Ok(option_type) => option_type,
        Err(err) => return fail(&err),
    };
    respond(
        exchange
            .match_option_order(
                &req.user,
                pin,
                option_type,
                req.strike,
                req.lot_size,
                req.lots,
            )
            .await,
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOptionOrderRequest {
    pub buyer: String,
    pub pin: String,
}

pub async fn cancel_option_buy_order(
    State(exchange): State<Arc<Exchange>>,
    Json(req): Json<CancelOptionOrderRequest>,
) -> Json<Envelope<mockstock_settlement::options::CancelOptionReceipt>> {
    let pin = match parse_pin(&req.pin) {
        Ok(pin) => pin,
        Err(err) => return fail(&err),
    };
    respond(exchange.cancel_option_buy_order(&req.buyer, pin).await)
}

#[derive(Deserialize)]
pub struct BrokerQuery {
    pub broker: Option<String>,
}

pub async fn get_pending_option_trades(
    State(exchange): State<Arc<Exchange>>,
    Query(query): Query<BrokerQuery>,
) -> Json<Vec<BrokerQueueView>> {
    Json(
        exchange
            .pending_option_trades(query.broker.as_deref())
            .await,
    )
}

pub async fn get_verified_option_trades(
    State(exchange): State<Arc<Exchange>>,
    Query(query): Query<BrokerQuery>,
) -> Json<Vec<BrokerQueueView>> {
    Json(
        exchange
            .verified_option_trades(query.broker.as_deref())
            .await,
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerDecisionRequest {
    pub caller: String,
    pub trade_id: Uuid,
}

pub async fn finalize_option_trade(
    State(exchange): State<Arc<Exchange>>,
    Json(req): Json<BrokerDecisionRequest>,
) -> Json<Envelope<mockstock_settlement::options::VerifyReceipt>> {
    respond(
        exchange
            .finalize_option_trade(&req.caller, req.trade_id)
            .await,
    )
}

pub async fn reject_option_trade(
    State(exchange): State<Arc<Exchange>>,
    Json(req): Json<BrokerDecisionRequest>,
) -> Json<Envelope<mockstock_settlement::options::RejectReceipt>> {
    respond(
        exchange
            .reject_option_trade(&req.caller, req.trade_id)
            .await,
    )
}
