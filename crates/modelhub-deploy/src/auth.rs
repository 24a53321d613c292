//! Bearer token authentication.
//!
//! Every deployment route resolves its caller from an HS256 JWT whose `sub`
//! claim is the numeric user ID.

use std::time::Duration;

use axum::extract::{FromRef, FromRequestParts};
use http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::api::ApiError;
use crate::config::AuthConfig;
use crate::error::{HubError, HubResult};
use crate::types::UserId;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID, as a decimal string.
    pub sub: String,
    /// Expiry, seconds since the epoch.
    pub exp: u64,
    /// Issue time.
    #[serde(default)]
    pub iat: Option<u64>,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
}

/// Validates and issues access tokens.
#[derive(Clone)]
pub struct Authenticator {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
    issuer: Option<String>,
}

impl Authenticator {
    /// Create an authenticator from configuration.
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation.validate_aud = false;

        Self {
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
        }
    }

    /// Resolve the caller from a raw token.
    pub fn verify(&self, token: &str) -> HubResult<UserId> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "JWT validation failed");
            HubError::unauthorized("could not validate credentials")
        })?;

        data.claims
            .sub
            .parse::<i64>()
            .map(UserId::new)
            .map_err(|_| HubError::unauthorized("token subject is not a user id"))
    }

    /// Issue a token for `user` valid for `ttl`.
    pub fn issue(&self, user: UserId, ttl: Duration) -> HubResult<String> {
        let now = jsonwebtoken::get_current_timestamp();
        let claims = Claims {
            sub: user.to_string(),
            exp: now + ttl.as_secs(),
            iat: Some(now),
            iss: self.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| HubError::internal(format!("failed to sign token: {e}")))
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

/// The authenticated user making a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub UserId);

impl<S> FromRequestParts<S> for Caller
where
    Authenticator: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| HubError::unauthorized("missing bearer token"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| HubError::unauthorized("missing bearer token"))?;

        let user = Authenticator::from_ref(state).verify(token)?;
        tracing::debug!(user_id = %user, "caller authenticated");

        Ok(Self(user))
    }
}
