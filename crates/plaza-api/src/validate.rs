use plaza_crypto::MAX_PASSWORD_BYTES;
use plaza_types::api::{
    CreateCommentRequest, CreatePostRequest, FeedParams, FeedQuery, RegisterRequest,
    SortDirection, TokenRequest, UpdatePostRequest,
};

use crate::error::ApiError;

pub const MAX_USERNAME: usize = 20;
pub const MAX_EMAIL: usize = 255;
pub const MIN_PASSWORD_BYTES: usize = 3;
pub const MAX_TITLE: usize = 100;
pub const MAX_CONTENT: usize = 1000;
pub const MAX_COMMENT: usize = 255;
pub const MAX_FEED_LIMIT: u32 = 20;
pub const MAX_SEARCH: usize = 100;
pub const MAX_TAGS: usize = 5;

fn bad(msg: impl Into<String>) -> ApiError {
    ApiError::BadRequest(msg.into())
}

/// Non-blank and at most `max` characters.
fn text(field: &str, value: &str, max: usize) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(bad(format!("{} is required", field)));
    }
    if value.chars().count() > max {
        return Err(bad(format!("{} must be at most {} characters", field, max)));
    }
    Ok(())
}

pub fn register(req: &RegisterRequest) -> Result<(), ApiError> {
    text("username", &req.username, MAX_USERNAME)?;
    email(&req.email)?;
    let len = req.password.len();
    if !(MIN_PASSWORD_BYTES..=MAX_PASSWORD_BYTES).contains(&len) {
        return Err(bad(format!(
            "password must be between {} and {} bytes",
            MIN_PASSWORD_BYTES, MAX_PASSWORD_BYTES
        )));
    }
    Ok(())
}

pub fn token_request(req: &TokenRequest) -> Result<(), ApiError> {
    email(&req.email)?;
    if req.password.is_empty() {
        return Err(bad("password is required"));
    }
    if req.password.len() > MAX_PASSWORD_BYTES {
        return Err(bad(format!("password must be at most {} bytes", MAX_PASSWORD_BYTES)));
    }
    Ok(())
}

fn email(value: &str) -> Result<(), ApiError> {
    text("email", value, MAX_EMAIL)?;
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(bad("email must be a valid address")),
    }
}

pub fn new_post(req: &CreatePostRequest) -> Result<(), ApiError> {
    text("title", &req.title, MAX_TITLE)?;
    text("content", &req.content, MAX_CONTENT)
}

pub fn post_update(req: &UpdatePostRequest) -> Result<(), ApiError> {
    if let Some(title) = &req.title {
        text("title", title, MAX_TITLE)?;
    }
    if let Some(content) = &req.content {
        text("content", content, MAX_CONTENT)?;
    }
    if req.version.is_some_and(|v| v < 0) {
        return Err(bad("version must not be negative"));
    }
    Ok(())
}

pub fn comment(req: &CreateCommentRequest) -> Result<(), ApiError> {
    text("content", &req.content, MAX_COMMENT)
}

/// Turn raw query parameters into a bounded [`FeedQuery`].
pub fn feed(params: FeedParams) -> Result<FeedQuery, ApiError> {
    let mut query = FeedQuery::default();

    if let Some(raw) = params.limit {
        query.limit = raw
            .parse()
            .ok()
            .filter(|n| (1..=MAX_FEED_LIMIT).contains(n))
            .ok_or_else(|| bad(format!("limit must be between 1 and {}", MAX_FEED_LIMIT)))?;
    }

    if let Some(raw) = params.offset {
        query.offset = raw
            .parse()
            .map_err(|_| bad("offset must be a non-negative integer"))?;
    }

    if let Some(raw) = params.sort {
        query.sort =
            SortDirection::parse(&raw).ok_or_else(|| bad("sort must be either asc or desc"))?;
    }

    if let Some(search) = params.search.filter(|s| !s.is_empty()) {
        if search.chars().count() > MAX_SEARCH {
            return Err(bad(format!("search must be at most {} characters", MAX_SEARCH)));
        }
        query.search = Some(search);
    }

    if let Some(raw) = params.tags {
        let mut tags: Vec<String> = Vec::new();
        for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if !tags.iter().any(|seen| seen == tag) {
                tags.push(tag.to_string());
            }
        }
        if tags.len() > MAX_TAGS {
            return Err(bad(format!("at most {} tags may be given", MAX_TAGS)));
        }
        query.tags = tags;
    }

    Ok(query)
}
