use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::{audit::AuditEntry, carts::CartOwner},
    AppState, PaginatedResponse,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use serde::Deserialize;
use std::convert::Infallible;
use utoipa::IntoParams;

pub const SESSION_HEADER: &str = "x-session-id";

const MAX_LIMIT: u64 = 100;

/// Pagination parameters for list endpoints
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    20
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl ListQuery {
    /// Page clamped to 1.. and limit to 1..=100
    pub fn normalized(&self) -> (u64, u64) {
        (self.page.max(1), self.limit.clamp(1, MAX_LIMIT))
    }

    pub fn paginate<T>(&self, items: Vec<T>, total: u64) -> PaginatedResponse<T> {
        let (page, limit) = self.normalized();
        PaginatedResponse::new(items, total, page, limit)
    }
}

/// Caller address and agent, for the audit trail. Never rejects.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_str = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let ip_address = header_str("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
            .or_else(|| header_str("x-real-ip"));
        Ok(ClientInfo {
            ip_address,
            user_agent: header_str(header::USER_AGENT.as_str()),
        })
    }
}

/// Guest cart session from the `x-session-id` header.
#[derive(Debug, Clone, Default)]
pub struct CartSession(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for CartSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= 128)
            .map(str::to_string);
        Ok(CartSession(session))
    }
}

/// Signed-in users own their cart; guests need a session header.
pub fn cart_owner(user: Option<&AuthUser>, session: &CartSession) -> Result<CartOwner, ServiceError> {
    match (user, &session.0) {
        (Some(user), _) => Ok(CartOwner::User(user.user_id)),
        (None, Some(session)) => Ok(CartOwner::Guest(session.clone())),
        (None, None) => Err(ServiceError::ValidationError(format!(
            "{} header is required for guest carts",
            SESSION_HEADER
        ))),
    }
}

/// Records an admin action and refreshes the admin's open sessions.
/// Best-effort: never fails the request.
pub async fn audit<T>(
    state: &AppState,
    admin: &AuthUser,
    client: &ClientInfo,
    entry: AuditEntry,
    outcome: &Result<T, ServiceError>,
) {
    let entry = entry
        .client(client.ip_address.clone(), client.user_agent.clone())
        .succeeded(outcome.is_ok());
    state.services.audit.log_action(entry).await;
    if let Err(e) = state.services.audit.touch_sessions(admin.user_id).await {
        tracing::debug!(error = %e, "Could not refresh admin sessions");
    }
}
