use plaza_types::api::FeedQuery;
use plaza_types::models::{FeedItem, Post};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use tracing::{debug, error};

use crate::error::OptionalExt;
use crate::models::{NewPost, POST_COLUMNS, PostChanges, post_from_row};
use crate::{Database, Result, StoreError};

#[derive(Clone)]
pub struct PostStore {
    db: Database,
}

impl PostStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, post: NewPost) -> Result<Post> {
        let tags = serde_json::to_string(&post.tags)?;
        self.db
            .call(move |conn| {
                let created = conn.query_row(
                    &format!(
                        "INSERT INTO posts (user_id, title, content, tags)
                         VALUES (?1, ?2, ?3, ?4)
                         RETURNING {}",
                        POST_COLUMNS
                    ),
                    rusqlite::params![post.user_id, post.title, post.content, tags],
                    |row| post_from_row(row, 0),
                )?;
                Ok(created)
            })
            .await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Post> {
        self.db
            .call(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS),
                    [id],
                    |row| post_from_row(row, 0),
                )
                .optional()?
                .ok_or(StoreError::NotFound)
            })
            .await
    }

    /// Optimistic update: the write lands only if the stored version still
    /// equals `expected_version`, and bumps it by one. A stale version and a
    /// deleted post both come back as `NotFound`; the caller should refetch.
    pub async fn update(&self, id: i64, expected_version: i64, changes: PostChanges) -> Result<Post> {
        let tags = serde_json::to_string(&changes.tags)?;
        self.db
            .call(move |conn| {
                conn.query_row(
                    &format!(
                        "UPDATE posts
                         SET title = ?1, content = ?2, tags = ?3, version = version + 1,
                             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?4 AND version = ?5
                         RETURNING {}",
                        POST_COLUMNS
                    ),
                    rusqlite::params![changes.title, changes.content, tags, id, expected_version],
                    |row| post_from_row(row, 0),
                )
                .optional()?
                .ok_or(StoreError::NotFound)
            })
            .await
    }

    /// Hard delete. More than one affected row is an integrity violation and
    /// is rolled back.
    pub async fn delete(&self, id: i64) -> Result<()> {
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                let affected = tx.execute("DELETE FROM posts WHERE id = ?1", [id])?;
                match affected {
                    0 => Err(StoreError::NotFound),
                    1 => {
                        tx.commit()?;
                        debug!(post_id = id, "Post deleted");
                        Ok(())
                    }
                    n => {
                        error!(post_id = id, rows = n, "Delete touched more than one post");
                        Err(StoreError::Integrity(format!(
                            "delete of post {} affected {} rows",
                            id, n
                        )))
                    }
                }
            })
            .await
    }

    /// One page of `user_id`'s feed: their own posts plus posts by everyone
    /// they follow, each with the author's name and comment count.
    pub async fn feed(&self, user_id: i64, query: &FeedQuery) -> Result<Vec<FeedItem>> {
        let (sql, values) = feed_sql(user_id, query);
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(values), |row| {
                        Ok(FeedItem {
                            post: post_from_row(row, 0)?,
                            username: row.get(8)?,
                            comments_count: row.get(9)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

/// Builds the feed statement. The sort direction comes from an enum, never
/// from caller text; every other input is a bound parameter.
fn feed_sql(user_id: i64, query: &FeedQuery) -> (String, Vec<Value>) {
    let mut values: Vec<Value> = vec![Value::Integer(user_id)];
    let mut filters = String::new();

    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        values.push(Value::Text(format!("%{}%", escape_like(search))));
        let n = values.len();
        filters.push_str(&format!(
            " AND (p.title LIKE ?{n} ESCAPE '\\' OR p.content LIKE ?{n} ESCAPE '\\')"
        ));
    }

    let mut tags: Vec<&str> = Vec::with_capacity(query.tags.len());
    for tag in &query.tags {
        if !tags.contains(&tag.as_str()) {
            tags.push(tag.as_str());
        }
    }
    if !tags.is_empty() {
        let mut placeholders = Vec::with_capacity(tags.len());
        for tag in &tags {
            values.push(Value::Text(tag.to_string()));
            placeholders.push(format!("?{}", values.len()));
        }
        // The count is over distinct tags on both sides.
        filters.push_str(&format!(
            " AND (SELECT COUNT(DISTINCT t.value) FROM json_each(p.tags) t WHERE t.value IN ({})) = {}",
            placeholders.join(", "),
            tags.len()
        ));
    }

    values.push(Value::Integer(i64::from(query.limit)));
    let limit = values.len();
    values.push(Value::Integer(i64::from(query.offset)));
    let offset = values.len();

    let direction = query.sort.as_sql();
    let sql = format!(
        "SELECT p.id, p.user_id, p.title, p.content, p.tags, p.created_at, p.updated_at, p.version,
                u.username, COUNT(c.id) AS comments_count
         FROM posts p
         JOIN users u ON u.id = p.user_id
         LEFT JOIN followers f ON f.user_id = p.user_id AND f.follower_id = ?1
         LEFT JOIN comments c ON c.post_id = p.id
         WHERE (p.user_id = ?1 OR f.follower_id IS NOT NULL){filters}
         GROUP BY p.id
         ORDER BY p.created_at {direction}, p.id {direction}
         LIMIT ?{limit} OFFSET ?{offset}"
    );
    (sql, values)
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
