//! Bid routes
//!
//! Submission, listing and the accept/reject/counter decisions.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, Success};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::{
    BidAction, BidBody, BidListBody, CounterOfferListBody, CounterOfferRequest, CreateBidRequest,
    DecisionBody,
};
use crate::error::ApiResult;

/// POST /bids
pub async fn create_bid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBidRequest>,
) -> ApiResult<Created<BidBody>> {
    let bid = state.bidding().submit(auth.user_id, req).await?;
    Ok(Created(BidBody { bid }))
}

/// GET /bids/order/:order_id
pub async fn list_order_bids(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Success<BidListBody>> {
    let bids = state.bidding().bids_for_order(auth.user_id, order_id).await?;
    Ok(Success::new(BidListBody { bids }))
}

/// POST /bids/accept/:bid_id
pub async fn accept_bid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
) -> ApiResult<Success<DecisionBody>> {
    let bid = state
        .bidding()
        .decide(auth.user_id, bid_id, BidAction::Accept)
        .await?;
    Ok(Success::new(DecisionBody {
        message: Some("Bid accepted".to_string()),
        bid,
    }))
}

/// POST /bids/reject/:bid_id
pub async fn reject_bid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
) -> ApiResult<Success<DecisionBody>> {
    let bid = state
        .bidding()
        .decide(auth.user_id, bid_id, BidAction::Reject)
        .await?;
    Ok(Success::new(DecisionBody {
        message: Some("Bid rejected".to_string()),
        bid,
    }))
}

/// POST /bids/counter-offer/:bid_id
pub async fn counter_offer(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<Uuid>,
    Json(req): Json<CounterOfferRequest>,
) -> ApiResult<Success<DecisionBody>> {
    let bid = state
        .bidding()
        .decide(
            auth.user_id,
            bid_id,
            BidAction::CounterOffer(req.counter_offer_price),
        )
        .await?;
    Ok(Success::new(DecisionBody {
        message: Some("Counter offer sent".to_string()),
        bid,
    }))
}

/// GET /bids/provider/:provider_id/counter-offers
pub async fn provider_counter_offers(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<Uuid>,
) -> ApiResult<Success<CounterOfferListBody>> {
    let counter_offers = state
        .bidding()
        .counter_offers(auth.user_id, provider_id)
        .await?;
    Ok(Success::new(CounterOfferListBody { counter_offers }))
}
