use std::fmt;

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand_core::OsRng;

use crate::error::{CryptoError, Result};

/// Longest password accepted, in bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// A one-way password credential.
///
/// Only the PHC-formatted Argon2id hash is ever persisted. The plain text is
/// kept in memory for the lifetime of the value that set it (so the request
/// that registered the account can still read it) and is never serialized.
#[derive(Clone)]
pub struct Password {
    hash: String,
    text: Option<String>,
}

impl Password {
    /// Wraps a hash loaded from storage.
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            text: None,
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn plain_text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Password").field("hash", &"<redacted>").finish()
    }
}

/// Hashes and verifies passwords with a cost fixed at construction.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl Default for PasswordService {
    fn default() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }
}

impl PasswordService {
    /// Argon2id with explicit memory (KiB) and iteration cost.
    pub fn with_cost(memory_kib: u32, iterations: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| CryptoError::Hash(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn set_password(&self, plain: &str) -> Result<Password> {
        if plain.len() > MAX_PASSWORD_BYTES {
            return Err(CryptoError::PasswordTooLong {
                max: MAX_PASSWORD_BYTES,
            });
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| CryptoError::Hash(e.to_string()))?
            .to_string();

        Ok(Password {
            hash,
            text: Some(plain.to_string()),
        })
    }

    /// Returns false on mismatch or on a stored hash that cannot be parsed.
    /// The digest comparison inside argon2 is constant time.
    pub fn verify_password(&self, credential: &Password, plain: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(&credential.hash) else {
            return false;
        };
        self.argon2
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    }

    /// Like [`verify_password`](Self::verify_password) but as a `Result`.
    pub fn check_password(&self, credential: &Password, plain: &str) -> Result<()> {
        if self.verify_password(credential, plain) {
            Ok(())
        } else {
            Err(CryptoError::InvalidCredentials)
        }
    }
}
