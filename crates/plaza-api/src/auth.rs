use axum::{Json, extract::State, http::StatusCode};
use plaza_crypto::ActivationToken;
use plaza_db::StoreError;
use plaza_db::models::NewUser;
use plaza_mail::{Recipient, Template};
use plaza_types::api::{RegisterRequest, RegisterResponse, TokenRequest, TokenResponse};
use plaza_types::models::roles;
use serde_json::json;
use tracing::{error, info};

use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::AppState;
use crate::validate;

/// Create an inactive account and mail its activation link. If the mail
/// cannot be sent the account is deleted again, since nobody could ever
/// activate it.
pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    validate::register(&req)?;

    let password = state.passwords.set_password(&req.password)?;
    let role_id = state
        .roles
        .id_for(roles::USER)
        .await
        .map_err(|e| ApiError::Internal(format!("resolving default role: {}", e)))?;

    let token = ActivationToken::generate();
    let user = state
        .storage
        .users
        .create_and_invite(
            NewUser {
                username: req.username,
                email: req.email,
                password,
                role_id,
            },
            token.hash.clone(),
            state.config.invitation_ttl,
        )
        .await?;

    let activation_url = format!("{}/activate/{}", state.config.external_url, token.plain);
    let recipient = Recipient {
        name: user.username.clone(),
        email: user.email.clone(),
    };
    let data = json!({ "username": user.username, "activation_url": activation_url });

    if let Err(mail_err) = state
        .mailer
        .send(Template::UserInvitation, &recipient, &data, !state.config.is_production())
        .await
    {
        error!(user_id = user.id, "Invitation mail failed, removing user: {}", mail_err);
        return match state.storage.users.delete(user.id).await {
            Ok(()) => Err(ApiError::Internal(format!("invitation mail: {}", mail_err))),
            Err(delete_err) => {
                error!(
                    user_id = user.id,
                    "Compensating delete failed, inactive user left behind: {}", delete_err
                );
                Err(ApiError::Internal(format!(
                    "invitation mail: {}; compensating delete: {}",
                    mail_err, delete_err
                )))
            }
        };
    }

    info!(user_id = user.id, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id,
            username: user.username,
            token: token.plain,
        }),
    ))
}

/// Exchange email and password for a bearer token.
pub async fn create_token(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<TokenRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    validate::token_request(&req)?;

    let found = match state.storage.users.get_by_email(&req.email).await {
        Ok(found) => found,
        Err(StoreError::NotFound) => {
            return Err(ApiError::Unauthorized(format!("no user with email {:?}", req.email)));
        }
        Err(StoreError::EmailNotConfirmed) => {
            return Err(ApiError::Unauthorized(format!("{:?} has not been activated", req.email)));
        }
        Err(e) => return Err(e.into()),
    };

    state.passwords.check_password(&found.password, &req.password)?;

    let claims = state.auth.claims_for(found.user.id);
    let token = state.auth.issue_token(&claims)?;

    info!(user_id = found.user.id, "Token issued");
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}
