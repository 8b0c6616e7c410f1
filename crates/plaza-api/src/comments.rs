use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use plaza_db::models::NewComment;
use plaza_types::api::CreateCommentRequest;
use plaza_types::models::Comment;

use crate::error::ApiError;
use crate::extract::{LateJson, PathParam};
use crate::middleware::CurrentUser;
use crate::state::AppState;
use crate::validate;

/// Comment on a post; a missing post is a 404, even with a bad body.
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    PathParam(post_id): PathParam<i64>,
    body: LateJson<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let post = state.storage.posts.get_by_id(post_id).await?;

    let req: CreateCommentRequest = body.parse()?;
    validate::comment(&req)?;

    // The post can still vanish before the insert; that is a 404 too.
    let comment = state
        .storage
        .comments
        .create(NewComment {
            post_id: post.id,
            user_id: me.id,
            content: req.content,
        })
        .await?;

    Ok((StatusCode::OK, Json(comment)))
}
