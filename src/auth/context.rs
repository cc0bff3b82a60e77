use uuid::Uuid;

use super::Claims;

/// The caller behind a verified token.
///
/// Whether they act as customer or provider is not part of the token; it is
/// decided per request from who owns the order and who placed the bid.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: Option<String>,
    /// Role claim from the auth service, informational only
    pub role: Option<String>,
}

impl TryFrom<&Claims> for AuthContext {
    type Error = &'static str;

    fn try_from(claims: &Claims) -> Result<Self, Self::Error> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| "Invalid user ID in token")?;

        Ok(Self {
            user_id,
            email: claims.email.clone(),
            role: claims.role.clone(),
        })
    }
}
