use axum::{http::HeaderValue, Router};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::auth::TokenVerifier;
use crate::config::Settings;
use crate::middleware::request_id_layer;
use crate::realtime::RoomHub;
use crate::repository::SharedStore;
use crate::routes;
use crate::services::{BiddingService, OrdersService, RedisRelay};

/// Shared application state
pub struct AppState {
    pub store: SharedStore,
    pub settings: Settings,
    pub tokens: TokenVerifier,
    /// Publishes to local sockets, and to Redis when the relay is running
    pub hub: RoomHub,
    pub relay: Option<RedisRelay>,
}

impl AppState {
    pub fn new(
        store: SharedStore,
        settings: Settings,
        hub: RoomHub,
        relay: Option<RedisRelay>,
    ) -> Arc<Self> {
        let tokens = TokenVerifier::new(&settings.jwt_secret, settings.jwt_issuer.as_deref());
        Arc::new(Self {
            store,
            settings,
            tokens,
            hub,
            relay,
        })
    }

    pub fn bidding(&self) -> BiddingService<'_> {
        BiddingService::new(self.store.as_ref(), &self.hub)
    }

    pub fn orders(&self) -> OrdersService<'_> {
        OrdersService::new(self.store.as_ref(), &self.hub)
    }
}

/// Build the complete application with all middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.settings);

    // Build trace layer (use DEBUG for spans to reduce overhead at INFO level)
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    let (set_request_id, propagate_request_id) = request_id_layer();

    Router::new()
        .merge(routes::api_router())
        // Middleware stack (applied bottom-up)
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let max_age = if settings.env.is_dev() {
        std::time::Duration::from_secs(86400)
    } else {
        std::time::Duration::from_secs(3600)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PATCH,
            axum::http::Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static(crate::middleware::X_REQUEST_ID),
        ]))
        .allow_credentials(true)
        .max_age(max_age)
}
