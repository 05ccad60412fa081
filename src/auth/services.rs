use axum::http::{header, HeaderMap};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::{
    auth::{jwt::JwtKeys, password},
    error::{AppError, AppResult, ADMIN_ONLY, BAD_LOGIN, INVALID_CREDENTIALS, USER_NOT_FOUND},
    users::{
        repo::UserStore,
        repo_types::{Role, User},
    },
};

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn validate_email(email: &str) -> AppResult<()> {
    if !is_valid_email(email) {
        return Err(AppError::Validation("value is not a valid email address".into()));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must have at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Pulls the token out of `Authorization: Bearer <token>`. Other schemes
/// count as no token.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Exchanges credentials for an access token.
pub async fn authenticate(
    store: &dyn UserStore,
    keys: &JwtKeys,
    email: &str,
    password: &str,
) -> AppResult<String> {
    let Some(user) = store.get_by_email(email).await? else {
        warn!(%email, "login unknown email");
        return Err(AppError::Unauthorized(BAD_LOGIN));
    };

    let ok = password::verify_password_blocking(password.to_owned(), user.password_hash.clone())
        .await?;
    if !ok {
        warn!(%email, user_id = user.id, "login invalid password");
        return Err(AppError::Unauthorized(BAD_LOGIN));
    }

    let token = keys.sign_access(&user).map_err(anyhow::Error::from)?;
    info!(user_id = user.id, %email, "user logged in");
    Ok(token)
}

/// `None` token means anonymous. A present token must verify and name a user
/// that still exists.
pub async fn resolve_principal(
    store: &dyn UserStore,
    keys: &JwtKeys,
    token: Option<&str>,
) -> AppResult<Option<User>> {
    let Some(token) = token else {
        return Ok(None);
    };

    let claims = keys.verify(token).map_err(|e| {
        warn!(error = %e, "token rejected");
        AppError::Unauthorized(INVALID_CREDENTIALS)
    })?;
    let user_id = claims
        .user_id()
        .ok_or(AppError::Unauthorized(INVALID_CREDENTIALS))?;

    match store.get_by_id(user_id).await? {
        Some(user) => Ok(Some(user)),
        None => {
            warn!(user_id, "token subject no longer exists");
            Err(AppError::Unauthorized(USER_NOT_FOUND))
        }
    }
}

/// Optional probe: any resolution failure degrades to anonymous.
pub async fn probe_principal(
    store: &dyn UserStore,
    keys: &JwtKeys,
    token: Option<&str>,
) -> Option<User> {
    resolve_principal(store, keys, token).await.ok().flatten()
}

/// Exact role match, no hierarchy.
pub fn require_role(principal: &User, role: Role) -> AppResult<()> {
    if principal.role == role {
        return Ok(());
    }
    warn!(user_id = principal.id, required = %role, actual = %principal.role, "forbidden");
    match role {
        Role::Admin => Err(AppError::Forbidden(ADMIN_ONLY)),
        Role::User => Err(AppError::Forbidden("Insufficient permissions")),
    }
}
