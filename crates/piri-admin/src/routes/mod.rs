//! The admin route table (spec.md §6), assembled the way
//! `ferrex-server`'s `routes::create_api_router` composes its route
//! groups: one module per concern, merged into a single router and put
//! behind the bearer-auth layer.

mod config;
mod log;
mod payment;
mod status;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

use crate::auth::bearer_auth;
use crate::state::{AdminState, PaymentApi};

/// Builds the full `/admin` router, gated end to end by the bearer-token
/// filter (spec.md §6: "All routes are under a common root").
pub fn build_router<P, L>(state: AdminState<P, L>) -> Router
where
    P: PaymentApi,
    L: Send + Sync + 'static,
{
    let routes = Router::new()
        .route("/log/list", get(log::list))
        .route("/log/set", post(log::set))
        .route("/log/set-regex", post(log::set_regex))
        .route("/config", get(config::get).patch(config::patch))
        .route("/config/reload", post(config::reload))
        .route("/payment/account", get(payment::account))
        .route("/payment/settle/{id}/estimate", get(payment::settle_estimate))
        .route("/payment/settle/{id}", post(payment::settle))
        .route("/payment/settle/{id}/status", get(payment::settle_status))
        .route("/payment/withdraw/estimate", post(payment::withdraw_estimate))
        .route("/payment/withdraw", post(payment::withdraw))
        .route("/payment/withdraw/status", get(payment::withdraw_status))
        .route("/status", get(status::get))
        .route_layer(middleware::from_fn_with_state(state.clone(), bearer_auth::<P, L>))
        .with_state(state);

    Router::new().nest("/admin", routes)
}
