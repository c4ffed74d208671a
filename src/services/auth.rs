//! Bearer token verification
//!
//! Tokens are issued elsewhere; this side only checks them.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// JWT claims accepted by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username of the staff account
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
}

#[cfg_attr(test, mockall::automock)]
pub trait Identity: Send + Sync {
    fn verify(&self, token: &str) -> AppResult<Principal>;
}

/// HS256 tokens signed with a shared secret
pub struct JwtIdentity {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentity {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

impl Identity for JwtIdentity {
    fn verify(&self, token: &str) -> AppResult<Principal> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(Principal {
            username: data.claims.sub,
        })
    }
}
