use std::sync::Arc;
use std::time::Duration;

use plaza_crypto::{Authenticator, CryptoError, JwtAuthenticator, PasswordService};
use plaza_db::cache::{CachedUserLookup, MemoryCache, StoreUserLookup, UserLookup};
use plaza_db::{Database, RoleCache, Storage};
use plaza_mail::Mailer;

use crate::config::Config;

/// How long a resolved role id is trusted before it is looked up again.
pub const ROLE_CACHE_TTL: Duration = Duration::from_secs(60);

/// Most users the acting-user cache holds at once.
pub const USER_CACHE_CAPACITY: u64 = 10_000;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub config: Config,
    pub storage: Storage,
    pub auth: Arc<dyn Authenticator>,
    pub passwords: PasswordService,
    /// Acting-user lookup used by the bearer middleware.
    pub users: Arc<dyn UserLookup>,
    pub roles: RoleCache,
    pub mailer: Arc<dyn Mailer>,
}

impl AppStateInner {
    /// Default wiring: JWT tokens from the config, cache-aside user lookup
    /// over an in-process cache.
    pub fn new(config: Config, db: Database, mailer: Arc<dyn Mailer>) -> Result<Self, CryptoError> {
        let storage = Storage::new(db);
        let auth = JwtAuthenticator::new(
            config.token.secret.as_bytes(),
            config.token.issuer.clone(),
            config.token.audience.clone(),
            config.token.ttl,
        )?;
        let users = CachedUserLookup::new(
            Arc::new(MemoryCache::new(USER_CACHE_CAPACITY)),
            Arc::new(StoreUserLookup::new(storage.users.clone())),
            config.cache_ttl,
        );
        let roles = RoleCache::new(storage.roles.clone(), ROLE_CACHE_TTL);

        Ok(Self {
            config,
            auth: Arc::new(auth),
            passwords: PasswordService::default(),
            users: Arc::new(users),
            roles,
            mailer,
            storage,
        })
    }
}
