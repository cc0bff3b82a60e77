use axum::extract::State;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::Success;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::ServiceProvider;
use crate::error::ApiResult;
use crate::repository::MarketplaceStore;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeBody {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: Option<String>,
    /// Set when the user also operates as a service provider
    pub provider: Option<ServiceProvider>,
}

/// Get current authenticated user info
pub async fn get_me(auth: RequireAuth, State(state): State<Arc<AppState>>) -> ApiResult<Success<MeBody>> {
    let provider = state.store.provider_by_user(auth.user_id).await?;
    Ok(Success::new(MeBody {
        user_id: auth.user_id,
        email: auth.email.clone(),
        role: auth.role.clone(),
        provider,
    }))
}
