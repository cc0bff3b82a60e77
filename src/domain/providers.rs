use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Service provider profile, owned by one user account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProvider {
    pub id: Uuid,
    pub user_id: Uuid,
    pub business_name: String,
    pub phone: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Provider details attached to realtime bid events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub id: Uuid,
    pub business_name: String,
    pub phone: Option<String>,
}

impl From<&ServiceProvider> for ProviderSummary {
    fn from(p: &ServiceProvider) -> Self {
        Self {
            id: p.id,
            business_name: p.business_name.clone(),
            phone: p.phone.clone(),
        }
    }
}

/// Request DTO for registering a provider profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProviderRequest {
    pub business_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CreateProviderRequest {
    pub fn into_provider(self, user_id: Uuid, now: DateTime<Utc>) -> Result<ServiceProvider, &'static str> {
        let business_name = self.business_name.trim().to_string();
        if business_name.is_empty() {
            return Err("Business name is required");
        }

        Ok(ServiceProvider {
            id: Uuid::new_v4(),
            user_id,
            business_name,
            phone: self.phone,
            description: self.description,
            is_active: true,
            created_at: now,
        })
    }
}

/// `{provider}` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderBody {
    pub provider: ServiceProvider,
}
