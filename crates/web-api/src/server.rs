use crate::handlers;
use axum::{
    routing::{get, post, put},
    Router,
};
use mockstock_settlement::Exchange;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct ApiServer {
    exchange: Arc<Exchange>,
}

impl ApiServer {
    #[must_use]
    pub const fn new(exchange: Arc<Exchange>) -> Self {
        Self { exchange }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/api/login", post(handlers::login))
            .route("/api/session/round", get(handlers::get_active_round))
            .route("/api/session/round", put(handlers::set_round))
            .route("/api/session/locks/:kind", get(handlers::get_lock_state))
            .route("/api/session/locks/:kind", put(handlers::set_lock_state))
            .route(
                "/api/session/starting-capital",
                get(handlers::get_starting_capital),
            )
            .route("/api/market/prices", get(handlers::get_market_prices))
            .route("/api/market/price", get(handlers::get_stock_price))
            .route("/api/market/chain", get(handlers::get_option_chain))
            .route("/api/market/premium", get(handlers::get_option_premium))
            .route("/api/teams/:team/balance", get(handlers::get_user_balance))
            .route("/api/teams/:team/free-cash", get(handlers::get_free_cash))
            .route(
                "/api/teams/:team/portfolio",
                get(handlers::get_portfolio_holdings),
            )
            .route("/api/teams/:team/shorts", get(handlers::get_active_shorts))
            .route(
                "/api/teams/:team/options",
                get(handlers::get_active_option_trades),
            )
            .route("/api/stocks/system-buy", post(handlers::buy_from_system))
            .route(
                "/api/stocks/sell-orders",
                post(handlers::create_stock_sell_order),
            )
            .route(
                "/api/stocks/sell-orders/cancel",
                post(handlers::cancel_stock_sell_order),
            )
            .route("/api/stocks/match", post(handlers::match_stock_buy_order))
            .route("/api/shorts", post(handlers::short_stock))
            .route("/api/shorts/cover", post(handlers::cover_stock))
            .route(
                "/api/options/buy-orders",
                post(handlers::create_option_buy_order),
            )
            .route(
                "/api/options/buy-orders/cancel",
                post(handlers::cancel_option_buy_order),
            )
            .route("/api/options/match", post(handlers::match_option_order))
            .route(
                "/api/options/pending",
                get(handlers::get_pending_option_trades),
            )
            .route(
                "/api/options/verified",
                get(handlers::get_verified_option_trades),
            )
            .route(
                "/api/options/verify",
                post(handlers::finalize_option_trade),
            )
            .route("/api/options/reject", post(handlers::reject_option_trade))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.exchange.clone())
    }

    /// Starts the web server listening on the specified address.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the address or serve
    /// requests.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Settlement API listening on {}", addr);

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}
