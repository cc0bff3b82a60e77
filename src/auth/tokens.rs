//! HS256 verification for marketplace access tokens

use anyhow::{Context, Result};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::sync::Arc;

use super::{AuthContext, Claims};

/// Verifies bearer tokens against the shared signing secret
#[derive(Clone)]
pub struct TokenVerifier {
    key: Arc<DecodingKey>,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            validation,
        }
    }

    /// Verify a JWT token and return the claims
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .context("JWT validation failed")?;
        Ok(data.claims)
    }

    /// Verify a token and build the caller's context
    pub fn authenticate(&self, token: &str) -> Result<AuthContext> {
        let claims = self.verify(token)?;
        AuthContext::try_from(&claims).map_err(anyhow::Error::msg)
    }
}
