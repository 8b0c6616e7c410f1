use std::any::Any;

use axum::{
    BoxError, Json,
    extract::{
        Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use plaza_crypto::CryptoError;
use plaza_db::StoreError;
use plaza_mail::MailError;
use plaza_types::api::ErrorBody;
use thiserror::Error;
use tower_http::request_id::RequestId;
use tracing::{error, warn};

/// Every failure a handler can produce. The `Display` text is what the
/// client sees; the cause strings are only logged.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized(String),

    #[error("forbidden")]
    Forbidden,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("request timed out")]
    Timeout,

    #[error("the server encountered a problem and could not process your request")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn cause(&self) -> String {
        match self {
            ApiError::Unauthorized(cause) | ApiError::Internal(cause) => cause.clone(),
            other => other.to_string(),
        }
    }
}

/// Internal cause of an error response, picked up by [`log_errors`].
#[derive(Debug, Clone)]
pub struct ErrorCause(pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        let mut response = (self.status(), Json(body)).into_response();
        response.extensions_mut().insert(ErrorCause(self.cause()));
        response
    }
}

/// Logs every 4xx/5xx with the request id, method, path and internal cause.
pub async fn log_errors(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("-")
        .to_string();
    let response = next.run(req).await;

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let cause = response
            .extensions()
            .get::<ErrorCause>()
            .map(|c| c.0.as_str())
            .unwrap_or("-");
        if status.is_server_error() {
            error!(%request_id, %method, %path, status = status.as_u16(), "Request failed: {}", cause);
        } else {
            warn!(%request_id, %method, %path, status = status.as_u16(), "Request rejected: {}", cause);
        }
    }
    response
}

/// Turns a handler panic into the usual JSON 500.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    };
    ApiError::Internal(format!("handler panicked: {}", detail)).into_response()
}

/// Errors from the request-deadline layer.
pub async fn handle_timeout(err: BoxError) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        ApiError::Timeout
    } else {
        ApiError::Internal(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound("resource not found"),
            StoreError::InvalidToken => ApiError::NotFound("invalid activation token"),
            StoreError::InvitationExpired => ApiError::NotFound("invitation expired"),
            StoreError::DuplicateUsername => ApiError::Conflict("username already taken"),
            StoreError::DuplicateEmail => ApiError::Conflict("email already registered"),
            StoreError::AlreadyFollows => ApiError::Conflict("already following this user"),
            StoreError::EmailNotConfirmed => ApiError::Unauthorized(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::PasswordTooLong { .. } => ApiError::BadRequest(err.to_string()),
            CryptoError::InvalidCredentials
            | CryptoError::TokenInvalid(_)
            | CryptoError::TokenExpired
            | CryptoError::TokenAudienceMismatch => ApiError::Unauthorized(err.to_string()),
            CryptoError::Hash(_) | CryptoError::Signing(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
