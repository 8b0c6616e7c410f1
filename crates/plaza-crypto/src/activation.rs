use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A freshly minted invitation token. The plain value goes to the user by
/// mail; only `hash` is stored.
#[derive(Debug, Clone)]
pub struct ActivationToken {
    pub plain: String,
    pub hash: String,
}

impl ActivationToken {
    pub fn generate() -> Self {
        let plain = Uuid::new_v4().to_string();
        let hash = hash_token(&plain);
        Self { plain, hash }
    }
}

/// Hex-encoded SHA-256 of a plain activation token.
pub fn hash_token(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}
