use std::convert::Infallible;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use super::services::{bearer_token, probe_principal, resolve_principal};
use crate::{
    error::{AppError, NOT_AUTHENTICATED},
    state::AppState,
    users::repo_types::User,
};

/// Authenticated principal; rejects with 401 when the bearer token is
/// missing, invalid, or names a deleted user.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers);
        resolve_principal(state.store.as_ref(), &state.keys, token)
            .await?
            .map(CurrentUser)
            .ok_or(AppError::Unauthorized(NOT_AUTHENTICATED))
    }
}

/// Principal if a valid token is presented, anonymous otherwise. Never rejects.
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers);
        Ok(MaybeUser(
            probe_principal(state.store.as_ref(), &state.keys, token).await,
        ))
    }
}
