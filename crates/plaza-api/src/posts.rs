use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use plaza_db::models::{NewPost, PostChanges};
use plaza_types::api::{CreatePostRequest, PostWithComments, UpdatePostRequest};
use plaza_types::models::Post;
use tracing::info;

use crate::error::ApiError;
use crate::extract::{JsonBody, LateJson, PathParam};
use crate::middleware::CurrentUser;
use crate::policy::{Operation, authorize_post};
use crate::state::AppState;
use crate::validate;

pub async fn create_post(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    JsonBody(req): JsonBody<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    validate::new_post(&req)?;

    let post = state
        .storage
        .posts
        .create(NewPost {
            user_id: me.id,
            title: req.title,
            content: req.content,
            tags: req.tags,
        })
        .await?;

    info!(post_id = post.id, user_id = me.id, "Post created");
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    PathParam(post_id): PathParam<i64>,
) -> Result<Json<PostWithComments>, ApiError> {
    let post = state.storage.posts.get_by_id(post_id).await?;
    authorize_post(&state, &me, &post, Operation::Read).await?;

    let comments = state.storage.comments.list_by_post(post.id).await?;
    Ok(Json(PostWithComments { post, comments }))
}

/// Partial update under optimistic concurrency. Without an explicit
/// `version` the write is checked against the version loaded here.
/// The body is only looked at once the post exists and the caller may edit it.
pub async fn update_post(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    PathParam(post_id): PathParam<i64>,
    body: LateJson<UpdatePostRequest>,
) -> Result<Json<Post>, ApiError> {
    let post = state.storage.posts.get_by_id(post_id).await?;
    authorize_post(&state, &me, &post, Operation::Update).await?;

    let req = body.parse()?;
    validate::post_update(&req)?;

    let expected_version = req.version.unwrap_or(post.version);
    let changes = PostChanges {
        title: req.title.unwrap_or(post.title),
        content: req.content.unwrap_or(post.content),
        tags: req.tags.unwrap_or(post.tags),
    };

    let updated = state
        .storage
        .posts
        .update(post.id, expected_version, changes)
        .await?;

    info!(post_id = updated.id, version = updated.version, user_id = me.id, "Post updated");
    Ok(Json(updated))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    PathParam(post_id): PathParam<i64>,
) -> Result<StatusCode, ApiError> {
    let post = state.storage.posts.get_by_id(post_id).await?;
    authorize_post(&state, &me, &post, Operation::Delete).await?;

    state.storage.posts.delete(post.id).await?;
    info!(post_id = post.id, user_id = me.id, "Post deleted");
    Ok(StatusCode::OK)
}
