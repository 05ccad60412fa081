use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::instrument;

use crate::{
    auth::extractors::{CurrentUser, MaybeUser},
    error::AppResult,
    extract::{AppJson, AppPath, AppQuery},
    state::AppState,
};

use super::{
    dto::{Pagination, UserCreate, UserRead, UserUpdate},
    repo_types::Page,
    services,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user)
                .put(update_user)
                .patch(partial_update_user)
                .delete(delete_user),
        )
}

#[instrument(skip(state, caller, payload), fields(email = %payload.email))]
pub async fn create_user(
    State(state): State<AppState>,
    MaybeUser(caller): MaybeUser,
    AppJson(payload): AppJson<UserCreate>,
) -> AppResult<(StatusCode, Json<UserRead>)> {
    let user = services::create_user(state.store.as_ref(), caller.as_ref(), payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, principal))]
pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<Json<UserRead>> {
    let user = services::get_user(state.store.as_ref(), &principal, id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, principal))]
pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    AppQuery(p): AppQuery<Pagination>,
) -> AppResult<Json<Vec<UserRead>>> {
    let page = Page::new(p.skip, p.limit)?;
    let users = services::list_users(state.store.as_ref(), &principal, page).await?;
    Ok(Json(users.into_iter().map(UserRead::from).collect()))
}

#[instrument(skip(state, principal, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<UserUpdate>,
) -> AppResult<Json<UserRead>> {
    let user = services::update_user(state.store.as_ref(), &principal, id, payload).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, principal, payload))]
pub async fn partial_update_user(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<UserUpdate>,
) -> AppResult<Json<UserRead>> {
    let user = services::update_user(state.store.as_ref(), &principal, id, payload).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, principal))]
pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<StatusCode> {
    services::delete_user(state.store.as_ref(), &principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
