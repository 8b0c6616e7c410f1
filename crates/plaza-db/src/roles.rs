use std::time::Duration;

use moka::future::Cache;
use plaza_types::models::Role;
use tracing::debug;

use crate::error::OptionalExt;
use crate::{Database, Result, StoreError};

#[derive(Clone)]
pub struct RoleStore {
    db: Database,
}

impl RoleStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Role> {
        let name = name.to_string();
        self.db
            .call(move |conn| {
                conn.query_row(
                    "SELECT id, name FROM roles WHERE name = ?1",
                    [&name],
                    |row| {
                        Ok(Role {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    },
                )
                .optional()?
                .ok_or(StoreError::NotFound)
            })
            .await
    }

    pub async fn get_id_by_name(&self, name: &str) -> Result<i64> {
        Ok(self.get_by_name(name).await?.id)
    }
}

/// Only a handful of role names exist.
const ROLE_CACHE_CAPACITY: u64 = 64;

/// Role name to id, refreshed from the store on a miss or once an entry is
/// older than the TTL. Policy checks go through here so that renumbering the
/// roles table takes effect without a restart.
#[derive(Clone)]
pub struct RoleCache {
    store: RoleStore,
    ids: Cache<String, i64>,
}

impl RoleCache {
    pub fn new(store: RoleStore, ttl: Duration) -> Self {
        Self {
            store,
            ids: Cache::builder()
                .max_capacity(ROLE_CACHE_CAPACITY)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Fails with `NotFound` for a name the roles table does not have.
    /// Failures are not cached.
    pub async fn id_for(&self, name: &str) -> Result<i64> {
        if let Some(id) = self.ids.get(name).await {
            return Ok(id);
        }

        let id = self.store.get_id_by_name(name).await?;
        debug!(role = name, id, "Role id refreshed");
        self.ids.insert(name.to_string(), id).await;
        Ok(id)
    }
}
