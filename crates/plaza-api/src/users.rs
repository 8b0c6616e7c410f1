use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use plaza_types::api::FeedParams;
use plaza_types::models::{FeedItem, User};
use tracing::info;

use crate::error::ApiError;
use crate::extract::{PathParam, QueryParams};
use crate::middleware::CurrentUser;
use crate::state::AppState;
use crate::validate;

pub async fn activate_user(
    State(state): State<AppState>,
    PathParam(token): PathParam<String>,
) -> Result<StatusCode, ApiError> {
    state.storage.users.activate(&token).await?;
    Ok(StatusCode::OK)
}

pub async fn get_user(
    State(state): State<AppState>,
    PathParam(user_id): PathParam<i64>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.users.user_by_id(user_id).await?))
}

/// The caller starts following `user_id`.
pub async fn follow_user(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    PathParam(user_id): PathParam<i64>,
) -> Result<StatusCode, ApiError> {
    if user_id == me.id {
        return Err(ApiError::BadRequest("you cannot follow yourself".into()));
    }
    state.storage.users.add_follower(user_id, me.id).await?;
    info!(user_id, follower_id = me.id, "Followed");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unfollow_user(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    PathParam(user_id): PathParam<i64>,
) -> Result<StatusCode, ApiError> {
    state.storage.users.remove_follower(user_id, me.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_feed(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    QueryParams(params): QueryParams<FeedParams>,
) -> Result<Json<Vec<FeedItem>>, ApiError> {
    let query = validate::feed(params)?;
    Ok(Json(state.storage.posts.feed(me.id, &query).await?))
}
