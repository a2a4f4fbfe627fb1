//! Token authentication.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::state::SharedState;
use crate::user_models::User;

/// The user behind the request's `Authorization` header.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Extracts the key from `Token <key>` (or `Bearer <key>`).
fn extract_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, key) = value.trim().split_once(' ')?;
    let key = key.trim();

    let known = scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer");
    (known && !key.is_empty()).then_some(key)
}

#[async_trait]
impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let key = extract_token(parts)
            .ok_or(AppError::NotAuthenticated("Authentication credentials were not provided."))?;

        let user = state
            .users
            .user_for_token(key)
            .await
            .ok_or(AppError::NotAuthenticated("Invalid token."))?;

        if !user.is_active {
            tracing::debug!(user_id = user.id, "Rejected token of inactive user");
            return Err(AppError::NotAuthenticated("User inactive or deleted."));
        }

        Ok(CurrentUser(user))
    }
}
