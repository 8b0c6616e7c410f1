use plaza_types::models::Comment;

use crate::error::{Constraint, translate};
use crate::models::{NewComment, timestamp};
use crate::{Database, Result, StoreError};

#[derive(Clone)]
pub struct CommentStore {
    db: Database,
}

impl CommentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a comment; a missing post or author is `NotFound`.
    pub async fn create(&self, comment: NewComment) -> Result<Comment> {
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                let (id, created_at) = tx
                    .query_row(
                        "INSERT INTO comments (post_id, user_id, content)
                         VALUES (?1, ?2, ?3)
                         RETURNING id, created_at",
                        rusqlite::params![comment.post_id, comment.user_id, comment.content],
                        |row| Ok((row.get::<_, i64>(0)?, timestamp(row, 1)?)),
                    )
                    .map_err(|e| {
                        translate(e, |c| match c {
                            Constraint::ForeignKey => Some(StoreError::NotFound),
                            Constraint::Unique(_) => None,
                        })
                    })?;
                let username: String = tx.query_row(
                    "SELECT username FROM users WHERE id = ?1",
                    [comment.user_id],
                    |row| row.get(0),
                )?;
                tx.commit()?;

                Ok(Comment {
                    id,
                    post_id: comment.post_id,
                    user_id: comment.user_id,
                    username,
                    content: comment.content,
                    created_at,
                })
            })
            .await
    }

    /// Comments on a post, newest first, each with its author's name.
    pub async fn list_by_post(&self, post_id: i64) -> Result<Vec<Comment>> {
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT c.id, c.post_id, c.user_id, u.username, c.content, c.created_at
                     FROM comments c
                     JOIN users u ON u.id = c.user_id
                     WHERE c.post_id = ?1
                     ORDER BY c.created_at DESC, c.id DESC",
                )?;
                let comments = stmt
                    .query_map([post_id], |row| {
                        Ok(Comment {
                            id: row.get(0)?,
                            post_id: row.get(1)?,
                            user_id: row.get(2)?,
                            username: row.get(3)?,
                            content: row.get(4)?,
                            created_at: timestamp(row, 5)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(comments)
            })
            .await
    }
}
