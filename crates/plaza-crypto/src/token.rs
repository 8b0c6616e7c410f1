use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use plaza_types::api::Claims;

use crate::error::{CryptoError, Result};

/// The only algorithm tokens may be signed with. Anything else in the header,
/// including "none", is rejected.
pub const ALGORITHM: Algorithm = Algorithm::HS256;

/// Issues and verifies bearer tokens.
pub trait Authenticator: Send + Sync {
    /// Claims for a token that starts being valid now.
    fn claims_for(&self, user_id: i64) -> Claims;
    fn issue_token(&self, claims: &Claims) -> Result<String>;
    fn validate_token(&self, token: &str) -> Result<Claims>;
}

/// HMAC-SHA256 signed JWTs bound to one issuer and one audience.
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl JwtAuthenticator {
    pub fn new(
        secret: &[u8],
        issuer: impl Into<String>,
        audience: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self> {
        if secret.is_empty() {
            return Err(CryptoError::Signing("signing secret is empty".into()));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl,
        })
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation
    }
}

impl Authenticator for JwtAuthenticator {
    fn claims_for(&self, user_id: i64) -> Claims {
        let now = Utc::now();
        Claims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        }
    }

    fn issue_token(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(ALGORITHM), claims, &self.encoding)
            .map_err(|e| CryptoError::Signing(e.to_string()))
    }

    fn validate_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => CryptoError::TokenExpired,
                ErrorKind::InvalidAudience => CryptoError::TokenAudienceMismatch,
                _ => CryptoError::TokenInvalid(e.to_string()),
            })
    }
}
