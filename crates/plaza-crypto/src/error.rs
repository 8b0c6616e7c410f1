use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("password exceeds {max} bytes")]
    PasswordTooLong { max: usize },

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("token expired")]
    TokenExpired,

    #[error("token audience mismatch")]
    TokenAudienceMismatch,
}

pub type Result<T> = std::result::Result<T, CryptoError>;
