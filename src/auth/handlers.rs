use axum::{extract::State, routing::post, Json, Router};
use tracing::instrument;

use crate::{
    auth::{
        dto::{TokenRequest, TokenResponse},
        services::authenticate,
    },
    error::AppResult,
    extract::AppForm,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/users/token", post(login_for_access_token))
}

#[instrument(skip(state, form), fields(email = %form.username))]
pub async fn login_for_access_token(
    State(state): State<AppState>,
    AppForm(form): AppForm<TokenRequest>,
) -> AppResult<Json<TokenResponse>> {
    let token = authenticate(
        state.store.as_ref(),
        &state.keys,
        &form.username,
        &form.password,
    )
    .await?;
    Ok(Json(TokenResponse::bearer(token)))
}
