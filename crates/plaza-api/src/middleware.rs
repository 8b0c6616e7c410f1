use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use plaza_db::StoreError;
use plaza_types::models::User;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller, inserted by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

fn authorization(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Validate the bearer token and load the user it names.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = authorization(&req)
        .ok_or_else(|| ApiError::Unauthorized("authorization header is missing".into()))?
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("authorization header is malformed".into()))?;

    let claims = state.auth.validate_token(token.trim())?;
    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| ApiError::Unauthorized(format!("token subject {:?} is not a user id", claims.sub)))?;

    let user = match state.users.user_by_id(user_id).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            return Err(ApiError::Unauthorized(format!("user {} no longer exists", user_id)));
        }
        Err(e) => return Err(e.into()),
    };
    if !user.is_active {
        return Err(ApiError::Unauthorized(format!("user {} is not active", user_id)));
    }

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// HTTP basic auth against the configured health-check credentials.
pub async fn basic_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let expected = &state.config.basic_auth;
    let supplied = authorization(&req)
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| B64.decode(encoded.trim()).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok());

    let ok = supplied
        .as_deref()
        .and_then(|creds| creds.split_once(':'))
        .is_some_and(|(user, pass)| user == expected.user && pass == expected.pass);

    if ok {
        return next.run(req).await;
    }

    let cause = if supplied.is_some() {
        "basic credentials do not match"
    } else {
        "basic credentials missing or malformed"
    };
    let mut response = ApiError::Unauthorized(cause.into()).into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"restricted\", charset=\"UTF-8\""),
    );
    response
}
