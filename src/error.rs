use axum::{
    extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use crate::users::repo::StoreError;

pub const NOT_AUTHENTICATED: &str = "Not authenticated";
pub const INVALID_CREDENTIALS: &str = "Invalid credentials";
pub const BAD_LOGIN: &str = "Incorrect email or password";
pub const USER_NOT_FOUND: &str = "User not found";
pub const ADMIN_ONLY: &str = "Admin only";
pub const ADMIN_CREATE_FORBIDDEN: &str = "Seul un admin peut créer un autre admin";
pub const EMAIL_TAKEN: &str = "Email already registered";
pub const INVALID_BODY: &str = "Invalid request body";
pub const INVALID_QUERY: &str = "Invalid query parameters";
pub const INVALID_PATH: &str = "Invalid path parameter";

pub type AppResult<T> = Result<T, AppError>;

/// Failures surfaced to HTTP callers. Every variant maps to one fixed status.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("conflict: {0}")]
    Conflict(&'static str),
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            // duplicate email is a 400 on the wire
            Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::Unauthorized(m) | Self::Forbidden(m) | Self::Conflict(m) | Self::NotFound(m) => {
                (*m).to_string()
            }
            Self::Validation(m) => m.clone(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => AppError::Conflict(EMAIL_TAKEN),
            StoreError::NotFound => AppError::NotFound(USER_NOT_FOUND),
            StoreError::AdminExists => AppError::Forbidden(ADMIN_CREATE_FORBIDDEN),
            other => AppError::Internal(other.into()),
        }
    }
}

// Extractor rejections carry serde internals; log them and answer with a fixed message.
impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        debug!(error = %e.body_text(), "json body rejected");
        AppError::Validation(INVALID_BODY.into())
    }
}

impl From<FormRejection> for AppError {
    fn from(e: FormRejection) -> Self {
        debug!(error = %e.body_text(), "form body rejected");
        AppError::Validation(INVALID_BODY.into())
    }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self {
        debug!(error = %e.body_text(), "query rejected");
        AppError::Validation(INVALID_QUERY.into())
    }
}

impl From<PathRejection> for AppError {
    fn from(e: PathRejection) -> Self {
        debug!(error = %e.body_text(), "path rejected");
        AppError::Validation(INVALID_PATH.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Self::Internal(e) = &self {
            error!(error = ?e, "internal error");
        }
        let status = self.status();
        let body = Json(json!({ "detail": self.detail() }));
        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}
