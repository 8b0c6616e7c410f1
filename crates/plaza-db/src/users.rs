use chrono::{Duration, Utc};
use plaza_crypto::{Password, hash_token};
use plaza_types::models::User;
use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::error::{Constraint, OptionalExt, translate};
use crate::models::{NewUser, USER_COLUMNS, UserCredentials, user_from_row};
use crate::{Database, Result, StoreError};

#[derive(Clone)]
pub struct UserStore {
    db: Database,
}

impl UserStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a user without an invitation. Used by seeding and by callers
    /// that activate accounts out of band.
    pub async fn create(&self, user: NewUser, active: bool) -> Result<User> {
        self.db
            .call(move |conn| insert_user(conn, &user, active))
            .await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User> {
        self.db
            .call(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                    [id],
                    |row| user_from_row(row, 0),
                )
                .optional()?
                .ok_or(StoreError::NotFound)
            })
            .await
    }

    /// Fails with `EmailNotConfirmed` while the account is still inactive.
    pub async fn get_by_email(&self, email: &str) -> Result<UserCredentials> {
        let email = email.to_string();
        self.db
            .call(move |conn| {
                let found = conn
                    .query_row(
                        &format!("SELECT {}, password FROM users WHERE email = ?1", USER_COLUMNS),
                        [&email],
                        |row| {
                            Ok(UserCredentials {
                                user: user_from_row(row, 0)?,
                                password: Password::from_hash(row.get::<_, String>(6)?),
                            })
                        },
                    )
                    .optional()?
                    .ok_or(StoreError::NotFound)?;

                if !found.user.is_active {
                    return Err(StoreError::EmailNotConfirmed);
                }
                Ok(found)
            })
            .await
    }

    /// Record that `follower_id` follows `user_id`.
    pub async fn add_follower(&self, user_id: i64, follower_id: i64) -> Result<()> {
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO followers (user_id, follower_id) VALUES (?1, ?2)",
                    [user_id, follower_id],
                )
                .map_err(|e| {
                    translate(e, |c| match c {
                        Constraint::Unique(_) => Some(StoreError::AlreadyFollows),
                        Constraint::ForeignKey => Some(StoreError::NotFound),
                    })
                })?;
                Ok(())
            })
            .await
    }

    /// Removing an edge that does not exist is not an error.
    pub async fn remove_follower(&self, user_id: i64, follower_id: i64) -> Result<()> {
        self.db
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM followers WHERE user_id = ?1 AND follower_id = ?2",
                    [user_id, follower_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Create an inactive user and its invitation in one transaction.
    /// Either both rows exist afterwards or neither does.
    pub async fn create_and_invite(
        &self,
        user: NewUser,
        token_hash: String,
        ttl: Duration,
    ) -> Result<User> {
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                let created = insert_user(&tx, &user, false)?;
                tx.execute(
                    "INSERT INTO user_invitations (token, user_id, expiry) VALUES (?1, ?2, ?3)",
                    params![token_hash, created.id, (Utc::now() + ttl).timestamp()],
                )?;
                tx.commit()?;

                info!(user_id = created.id, "User created with pending invitation");
                Ok(created)
            })
            .await
    }

    /// Redeem an invitation. The plain token is hashed before lookup.
    pub async fn activate(&self, plain_token: &str) -> Result<()> {
        let hash = hash_token(plain_token);
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;

                let (user_id, expiry): (i64, i64) = tx
                    .query_row(
                        "SELECT user_id, expiry FROM user_invitations WHERE token = ?1",
                        [&hash],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?
                    .ok_or(StoreError::InvalidToken)?;

                if Utc::now().timestamp() > expiry {
                    return Err(StoreError::InvitationExpired);
                }

                let updated = tx.execute("UPDATE users SET is_active = 1 WHERE id = ?1", [user_id])?;
                if updated == 0 {
                    return Err(StoreError::NotFound);
                }

                tx.execute("DELETE FROM user_invitations WHERE token = ?1", [&hash])?;
                tx.commit()?;

                info!(user_id, "User activated");
                Ok(())
            })
            .await
    }

    /// Delete a user and their invitations. Both steps must remove at least
    /// one row, otherwise nothing is deleted and `NotFound` is returned.
    pub async fn delete(&self, user_id: i64) -> Result<()> {
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;

                let invitations =
                    tx.execute("DELETE FROM user_invitations WHERE user_id = ?1", [user_id])?;
                if invitations == 0 {
                    return Err(StoreError::NotFound);
                }

                let users = tx.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
                if users == 0 {
                    return Err(StoreError::NotFound);
                }

                tx.commit()?;
                debug!(user_id, "User deleted");
                Ok(())
            })
            .await
    }
}

fn insert_user(conn: &Connection, user: &NewUser, active: bool) -> Result<User> {
    conn.query_row(
        &format!(
            "INSERT INTO users (username, email, password, role_id, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING {}",
            USER_COLUMNS
        ),
        params![
            user.username,
            user.email,
            user.password.hash(),
            user.role_id,
            active
        ],
        |row| user_from_row(row, 0),
    )
    .map_err(|e| {
        translate(e, |c| match c {
            Constraint::Unique(msg) if msg.contains("users.username") => {
                Some(StoreError::DuplicateUsername)
            }
            Constraint::Unique(msg) if msg.contains("users.email") => {
                Some(StoreError::DuplicateEmail)
            }
            _ => None,
        })
    })
}
