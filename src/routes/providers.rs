//! Provider profile routes

use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;

use crate::api::{Created, Success};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::{CreateProviderRequest, ProviderBody};
use crate::error::{ApiError, ApiResult};
use crate::repository::MarketplaceStore;
use crate::services::bidding::PROVIDER_NOT_LOADED;

/// POST /providers
pub async fn create_provider(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProviderRequest>,
) -> ApiResult<Created<ProviderBody>> {
    let provider = req
        .into_provider(auth.user_id, Utc::now())
        .map_err(ApiError::bad_request)?;
    let provider = state.store.insert_provider(provider).await?;

    tracing::info!(
        user_id = %auth.user_id,
        provider_id = %provider.id,
        "Provider profile created"
    );

    Ok(Created(ProviderBody { provider }))
}

/// GET /providers/me
pub async fn my_provider(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Success<ProviderBody>> {
    let provider = state
        .store
        .provider_by_user(auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found(PROVIDER_NOT_LOADED))?;
    Ok(Success::new(ProviderBody { provider }))
}
