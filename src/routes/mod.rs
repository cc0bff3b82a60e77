pub mod bids;
pub mod health;
pub mod me;
pub mod orders;
pub mod providers;

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;
use crate::realtime::socket::ws_route_handler;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        // Realtime
        .route("/ws", get(ws_route_handler))
        // Protected routes
        .route("/me", get(me::get_me))
        // Providers
        .route("/providers", post(providers::create_provider))
        .route("/providers/me", get(providers::my_provider))
        // Orders
        .route(
            "/orders",
            post(orders::create_order).get(orders::list_orders),
        )
        .route("/orders/available", get(orders::available_orders))
        .route("/orders/:order_id", get(orders::get_order))
        .route("/orders/:order_id/decline", post(orders::decline_order))
        .route(
            "/orders/:order_id/status",
            patch(orders::update_order_status),
        )
        // Bids
        .route("/bids", post(bids::create_bid))
        .route("/bids/order/:order_id", get(bids::list_order_bids))
        .route("/bids/accept/:bid_id", post(bids::accept_bid))
        .route("/bids/reject/:bid_id", post(bids::reject_bid))
        .route("/bids/counter-offer/:bid_id", post(bids::counter_offer))
        .route(
            "/bids/provider/:provider_id/counter-offers",
            get(bids::provider_counter_offers),
        )
}
