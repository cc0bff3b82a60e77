//! Order routes

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, MessageBody, Paginated, PaginationParams, Success};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::{CreateOrderRequest, OrderBody, OrderListBody, UpdateOrderStatusRequest};
use crate::error::ApiResult;

/// Optional body of a decline; the provider defaults to the caller's profile
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclineOrderRequest {
    #[serde(default)]
    pub provider_id: Option<Uuid>,
}

/// POST /orders
pub async fn create_order(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<Created<OrderBody>> {
    let order = state.orders().create(auth.user_id, req).await?;
    Ok(Created(OrderBody { order }))
}

/// GET /orders
pub async fn list_orders(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Success<Paginated<OrderListBody>>> {
    let (orders, total) = state
        .orders()
        .list(auth.user_id, params.limit(), params.offset())
        .await?;
    Ok(Success::new(Paginated::new(
        OrderListBody { orders },
        &params,
        total,
    )))
}

/// GET /orders/available
pub async fn available_orders(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Success<OrderListBody>> {
    let orders = state.orders().available(auth.user_id).await?;
    Ok(Success::new(OrderListBody { orders }))
}

/// GET /orders/:order_id
pub async fn get_order(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Success<OrderBody>> {
    let order = state.orders().get(auth.user_id, order_id).await?;
    Ok(Success::new(OrderBody { order }))
}

/// POST /orders/:order_id/decline
pub async fn decline_order(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    body: Option<Json<DeclineOrderRequest>>,
) -> ApiResult<Success<MessageBody>> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let recorded = state
        .orders()
        .decline(auth.user_id, order_id, req.provider_id)
        .await?;

    let message = if recorded {
        "Order declined"
    } else {
        "Order was already declined"
    };
    Ok(Success::new(MessageBody::new(message)))
}

/// PATCH /orders/:order_id/status
pub async fn update_order_status(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> ApiResult<Success<OrderBody>> {
    let svc = state.orders();
    svc.update_status(auth.user_id, order_id, req.status).await?;
    let order = svc.get(auth.user_id, order_id).await?;
    Ok(Success::new(OrderBody { order }))
}
