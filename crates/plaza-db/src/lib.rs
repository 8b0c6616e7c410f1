pub mod cache;
pub mod comments;
pub mod error;
pub mod migrations;
pub mod models;
pub mod posts;
pub mod roles;
pub mod users;

#[cfg(test)]
mod testutil;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, InterruptHandle};
use tracing::{info, warn};

pub use comments::CommentStore;
pub use error::{Result, StoreError};
pub use posts::PostStore;
pub use roles::{RoleCache, RoleStore};
pub use users::UserStore;

/// Upper bound on a single store operation, lock wait included.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// A small pool of SQLite connections. Every statement runs on the blocking
/// thread pool under a deadline; if the deadline passes or the calling future
/// is dropped, the running statement is interrupted.
#[derive(Clone)]
pub struct Database {
    pool: Arc<Pool>,
    timeout: Duration,
}

struct Pool {
    conns: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path, pool_size: usize) -> Result<Self> {
        let first = Connection::open(path)?;
        configure(&first)?;
        // WAL mode for concurrent readers across the pool
        first.pragma_update(None, "journal_mode", "WAL")?;
        migrations::run(&first)?;

        let mut conns = vec![Mutex::new(first)];
        for _ in 1..pool_size.max(1) {
            let conn = Connection::open(path)?;
            configure(&conn)?;
            conns.push(Mutex::new(conn));
        }

        info!("Database opened at {} ({} connections)", path.display(), conns.len());
        Ok(Self::from_conns(conns))
    }

    /// Single-connection in-memory database; each call gets a fresh, empty schema.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn)?;
        migrations::run(&conn)?;
        Ok(Self::from_conns(vec![Mutex::new(conn)]))
    }

    fn from_conns(conns: Vec<Mutex<Connection>>) -> Self {
        Self {
            pool: Arc::new(Pool {
                conns,
                next: AtomicUsize::new(0),
            }),
            timeout: QUERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `f` against a pooled connection, bounded by the deadline.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        let slot = pool.next.fetch_add(1, Ordering::Relaxed) % pool.conns.len();

        let state = Arc::new(CallState::default());
        let mut guard = CancelOnDrop(Some(state.clone()));

        let task = tokio::task::spawn_blocking(move || {
            let mut conn = pool.conns[slot]
                .lock()
                .map_err(|e| StoreError::Pool(format!("connection lock poisoned: {}", e)))?;
            if !state.begin(conn.get_interrupt_handle()) {
                return Err(StoreError::Cancelled);
            }
            let result = f(&mut *conn);
            state.finish();
            result
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => {
                guard.0 = None;
                joined.map_err(|e| StoreError::Task(e.to_string()))?
            }
            Err(_) => {
                warn!("Query exceeded {:?}, interrupting", self.timeout);
                Err(StoreError::Timeout)
            }
        }
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(QUERY_TIMEOUT)?;
    Ok(())
}

#[derive(Default)]
struct CallState {
    phase: Mutex<Phase>,
}

#[derive(Default)]
enum Phase {
    #[default]
    Pending,
    Running(InterruptHandle),
    Done,
    Cancelled,
}

impl CallState {
    /// Returns false if the caller already gave up.
    fn begin(&self, handle: InterruptHandle) -> bool {
        let Ok(mut phase) = self.phase.lock() else {
            return false;
        };
        if matches!(*phase, Phase::Cancelled) {
            return false;
        }
        *phase = Phase::Running(handle);
        true
    }

    fn finish(&self) {
        if let Ok(mut phase) = self.phase.lock() {
            *phase = Phase::Done;
        }
    }

    fn cancel(&self) {
        if let Ok(mut phase) = self.phase.lock() {
            if let Phase::Running(handle) = &*phase {
                handle.interrupt();
            }
            if !matches!(*phase, Phase::Done) {
                *phase = Phase::Cancelled;
            }
        }
    }
}

/// Interrupts the in-flight statement unless disarmed by a completed call.
struct CancelOnDrop(Option<Arc<CallState>>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(state) = self.0.take() {
            state.cancel();
        }
    }
}

/// All entity stores over one database.
#[derive(Clone)]
pub struct Storage {
    pub users: UserStore,
    pub posts: PostStore,
    pub comments: CommentStore,
    pub roles: RoleStore,
}

impl Storage {
    pub fn new(db: Database) -> Self {
        Self {
            users: UserStore::new(db.clone()),
            posts: PostStore::new(db.clone()),
            comments: CommentStore::new(db.clone()),
            roles: RoleStore::new(db),
        }
    }
}
