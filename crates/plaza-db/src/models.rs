//! Write-side inputs for the stores, plus helpers that map SQLite rows
//! onto the shared plaza-types models.

use chrono::{DateTime, Utc};
use plaza_crypto::Password;
use plaza_types::models::{Post, User};
use rusqlite::Row;
use rusqlite::types::Type;

pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: Password,
    pub role_id: i64,
}

/// A user together with their stored credential, for sign-in only.
#[derive(Debug)]
pub struct UserCredentials {
    pub user: User,
    pub password: Password,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

/// Full replacement values for an update; merging with the stored post is
/// the caller's job.
#[derive(Debug, Clone)]
pub struct PostChanges {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub user_id: i64,
    pub content: String,
}

pub(crate) const USER_COLUMNS: &str = "id, username, email, role_id, is_active, created_at";

pub(crate) const POST_COLUMNS: &str =
    "id, user_id, title, content, tags, created_at, updated_at, version";

/// Maps `USER_COLUMNS` starting at `base`.
pub(crate) fn user_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(base)?,
        username: row.get(base + 1)?,
        email: row.get(base + 2)?,
        role_id: row.get(base + 3)?,
        is_active: row.get(base + 4)?,
        created_at: timestamp(row, base + 5)?,
    })
}

/// Maps `POST_COLUMNS` starting at `base`.
pub(crate) fn post_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(base)?,
        user_id: row.get(base + 1)?,
        title: row.get(base + 2)?,
        content: row.get(base + 3)?,
        tags: tags(row, base + 4)?,
        created_at: timestamp(row, base + 5)?,
        updated_at: timestamp(row, base + 6)?,
        version: row.get(base + 7)?,
    })
}

pub(crate) fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Tags are stored as a JSON array so `json_each` can filter on them.
pub(crate) fn tags(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
