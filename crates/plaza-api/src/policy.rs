//! Who may do what to a post.
//!
//! [`evaluate`] is the whole rule and is pure. [`authorize_post`] feeds it
//! the current moderator and admin role ids, resolved by name.

use plaza_types::models::{Post, User, roles};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppStateInner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Role ids as currently stored in the roles table.
#[derive(Debug, Clone, Copy)]
pub struct RoleIds {
    pub moderator: i64,
    pub admin: i64,
}

pub fn evaluate(actor: &User, owner_id: i64, operation: Operation, roles: RoleIds) -> Decision {
    let allowed = operation == Operation::Read
        || actor.id == owner_id
        || (operation == Operation::Update && actor.role_id == roles.moderator)
        || actor.role_id == roles.admin;

    if allowed { Decision::Allow } else { Decision::Deny }
}

/// Allow or fail with `Forbidden`. The post must already be loaded, so a
/// missing post has been reported as 404 before this runs.
pub async fn authorize_post(
    state: &AppStateInner,
    actor: &User,
    post: &Post,
    operation: Operation,
) -> Result<(), ApiError> {
    // Reads and owners never need the role table.
    if operation == Operation::Read || actor.id == post.user_id {
        return Ok(());
    }

    let role_ids = RoleIds {
        moderator: role_id(state, roles::MODERATOR).await?,
        admin: role_id(state, roles::ADMIN).await?,
    };

    match evaluate(actor, post.user_id, operation, role_ids) {
        Decision::Allow => Ok(()),
        Decision::Deny => {
            debug!(user_id = actor.id, post_id = post.id, ?operation, "Policy denied");
            Err(ApiError::Forbidden)
        }
    }
}

async fn role_id(state: &AppStateInner, name: &str) -> Result<i64, ApiError> {
    state
        .roles
        .id_for(name)
        .await
        .map_err(|e| ApiError::Internal(format!("resolving role {:?}: {}", name, e)))
}
