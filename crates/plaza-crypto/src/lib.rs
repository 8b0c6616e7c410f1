//! Plaza credential and token service.
//!
//! - `password`: Argon2id password credentials
//! - `token`: HS256 bearer tokens with issuer/audience/expiry checks
//! - `activation`: invitation tokens, stored only as SHA-256 digests

pub mod activation;
pub mod error;
pub mod password;
pub mod token;

pub use activation::{ActivationToken, hash_token};
pub use error::CryptoError;
pub use password::{MAX_PASSWORD_BYTES, Password, PasswordService};
pub use token::{Authenticator, JwtAuthenticator};
