/*!
 * # Authentication
 *
 * Customers and administrators sign in with an external identity provider
 * which issues HS256 bearer tokens. This module verifies those tokens and
 * exposes them to handlers through the [`AuthUser`], [`MaybeAuthUser`] and
 * [`AdminUser`] extractors.
 *
 * Guest checkouts have no account; [`GuestIdentity`] derives a stable,
 * non-reversible customer id for them from their contact details.
 */

use crate::{config::AppConfig, errors::ServiceError};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::{Duration as ChronoDuration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const ADMIN_ROLE: &str = "admin";
pub const CUSTOMER_ROLE: &str = "customer";

type HmacSha256 = Hmac<Sha256>;

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,           // User id
    pub name: Option<String>,  // Display name
    pub email: Option<String>, // Email address
    #[serde(default)]
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No authentication token provided")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InsufficientPermissions => ServiceError::Forbidden(err.to_string()),
            AuthError::TokenCreation(msg) => ServiceError::InternalError(msg),
            other => ServiceError::Unauthorized(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ServiceError::from(self).into_response()
    }
}

/// Issues and verifies bearer tokens.
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    expiration: ChronoDuration,
}

impl AuthService {
    pub fn new(secret: &str, issuer: &str, audience: &str, expiration_secs: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            expiration: ChronoDuration::seconds(expiration_secs),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            &config.jwt_issuer,
            &config.jwt_audience,
            config.jwt_expiration_secs,
        )
    }

    /// Mints a token. Used by the CLI and tests; production tokens come from
    /// the identity provider.
    pub fn issue_token(
        &self,
        user_id: Uuid,
        email: Option<String>,
        name: Option<String>,
        roles: Vec<String>,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            name,
            email,
            roles,
            iat: now.timestamp(),
            exp: (now + self.expiration).timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => {
                    debug!(error = %e, "Rejected bearer token");
                    AuthError::InvalidToken
                }
            })
    }

    /// Resolves the bearer token in `parts`, if one was sent.
    fn authenticate(&self, parts: &Parts) -> Result<Option<AuthUser>, AuthError> {
        let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
            return Ok(None);
        };
        let value = value.to_str().map_err(|_| AuthError::InvalidToken)?;
        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidToken)?;

        let claims = self.verify(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(Some(AuthUser {
            user_id,
            name: claims.name,
            email: claims.email,
            roles: claims.roles,
        }))
    }
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);
        auth.authenticate(parts)?.ok_or(AuthError::MissingToken)
    }
}

/// Optional authentication: guests pass through as `None`, but a token that
/// is present and invalid is still rejected.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);
        Ok(MaybeAuthUser(auth.authenticate(parts)?))
    }
}

/// An authenticated user holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AuthError::InsufficientPermissions);
        }
        Ok(AdminUser(user))
    }
}

/// Derives customer ids for guest checkouts.
///
/// The id is `guest_` followed by the first 24 hex characters of
/// HMAC-SHA256 over the normalized email and phone, so the same contact
/// details always map to the same guest without exposing them.
#[derive(Clone)]
pub struct GuestIdentity {
    mac: HmacSha256,
}

impl GuestIdentity {
    pub fn new(secret: &str) -> Self {
        let mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
            .expect("HMAC-SHA256 accepts keys of any length");
        Self { mac }
    }

    pub fn customer_id(&self, email: &str, phone: &str) -> String {
        let email = email.trim().to_lowercase();
        let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
        // country prefix ignored: +91 98765 43210 and 9876543210 are one guest
        let phone = &digits[digits.len().saturating_sub(10)..];

        let mut mac = self.mac.clone();
        mac.update(email.as_bytes());
        mac.update(b"|");
        mac.update(phone.as_bytes());
        let digest = hex::encode(mac.finalize().into_bytes());
        format!("guest_{}", &digest[..24])
    }
}

impl std::fmt::Debug for GuestIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestIdentity").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn service() -> AuthService {
        AuthService::new("test_secret_that_is_long_enough_123", "iss", "aud", 3600)
    }

    #[test]
    fn issued_tokens_verify() {
        let auth = service();
        let id = Uuid::new_v4();
        let token = auth
            .issue_token(id, Some("a@b.test".into()), None, vec![ADMIN_ROLE.into()])
            .unwrap();
        let claims = auth.verify(&token).unwrap();
        assert_eq!(claims.sub, id.to_string());
        assert_eq!(claims.roles, vec!["admin".to_string()]);
    }

    #[test]
    fn wrong_audience_is_rejected() {
        let other = AuthService::new("test_secret_that_is_long_enough_123", "iss", "other", 3600);
        let token = other
            .issue_token(Uuid::new_v4(), None, None, vec![])
            .unwrap();
        assert_matches!(service().verify(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let auth = AuthService::new("test_secret_that_is_long_enough_123", "iss", "aud", -3600);
        let token = auth.issue_token(Uuid::new_v4(), None, None, vec![]).unwrap();
        assert_matches!(auth.verify(&token), Err(AuthError::TokenExpired));
    }

    #[test]
    fn guest_ids_are_stable_and_normalized() {
        let guests = GuestIdentity::new("guest-secret");
        let a = guests.customer_id("Asha@Example.com ", "98765 43210");
        let b = guests.customer_id("asha@example.com", "9876543210");
        let c = guests.customer_id("asha@example.com", "+91 98765 43210");
        assert_eq!(b, c);
        assert_eq!(a, b);
        assert!(a.starts_with("guest_"));
        assert_eq!(a.len(), "guest_".len() + 24);
        assert_ne!(a, guests.customer_id("asha@example.com", "9876543211"));
        assert_ne!(a, GuestIdentity::new("other").customer_id("asha@example.com", "9876543210"));
    }

    #[test]
    fn guest_ids_are_deterministic_for_any_key_length() {
        let long_secret = "k".repeat(200);
        for secret in ["", "x", long_secret.as_str()] {
            let first = GuestIdentity::new(secret).customer_id("asha@example.com", "9876543210");
            let second = GuestIdentity::new(secret).customer_id("asha@example.com", "9876543210");
            assert_eq!(first, second);
            assert!(first.starts_with("guest_"));
            assert_eq!(first.len(), "guest_".len() + 24);
        }
    }
}
