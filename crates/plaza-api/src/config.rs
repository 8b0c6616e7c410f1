use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("{name}={value:?} is not valid: {reason}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
    pub reason: String,
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: String,
    pub env: String,
    /// Base for links that leave the server, e.g. activation links.
    pub external_url: String,
    pub db: DbConfig,
    pub token: TokenConfig,
    pub invitation_ttl: chrono::Duration,
    pub mail: MailConfig,
    pub basic_auth: BasicAuthConfig,
    pub cache_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: String,
    pub pool_size: usize,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub audience: String,
    pub issuer: String,
    pub ttl: chrono::Duration,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Takes precedence over `smtp`. Neither set means mail is only logged.
    pub api_url: Option<String>,
    pub api_key: String,
    pub smtp: Option<SmtpConfig>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct BasicAuthConfig {
    pub user: String,
    pub pass: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unset variables take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let string = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        Ok(Self {
            addr: string("PLAZA_ADDR", "0.0.0.0:8080"),
            env: string("PLAZA_ENV", "development"),
            external_url: string("PLAZA_EXTERNAL_URL", "http://localhost:8080")
                .trim_end_matches('/')
                .to_string(),
            db: DbConfig {
                path: string("PLAZA_DB_PATH", "plaza.db"),
                pool_size: number(&lookup, "PLAZA_DB_POOL_SIZE", 4)?,
            },
            token: TokenConfig {
                secret: string("PLAZA_TOKEN_SECRET", "dev-secret-change-me"),
                audience: string("PLAZA_TOKEN_AUDIENCE", "plaza"),
                issuer: string("PLAZA_TOKEN_ISSUER", "plaza"),
                ttl: chrono::Duration::hours(number(&lookup, "PLAZA_TOKEN_TTL_HOURS", 72)?),
            },
            invitation_ttl: chrono::Duration::hours(number(
                &lookup,
                "PLAZA_INVITATION_TTL_HOURS",
                24,
            )?),
            mail: MailConfig {
                api_url: lookup("PLAZA_MAIL_API_URL").filter(|url| !url.is_empty()),
                api_key: string("PLAZA_MAIL_API_KEY", ""),
                smtp: match lookup("PLAZA_SMTP_HOST").filter(|host| !host.is_empty()) {
                    Some(host) => Some(SmtpConfig {
                        host,
                        port: number(&lookup, "PLAZA_SMTP_PORT", 587)?,
                        username: string("PLAZA_SMTP_USERNAME", ""),
                        password: string("PLAZA_SMTP_PASSWORD", ""),
                    }),
                    None => None,
                },
                from: string("PLAZA_MAIL_FROM", "no-reply@plaza.local"),
            },
            basic_auth: BasicAuthConfig {
                user: string("PLAZA_BASIC_USER", "admin"),
                pass: string("PLAZA_BASIC_PASS", "admin"),
            },
            cache_ttl: Duration::from_secs(number(&lookup, "PLAZA_CACHE_TTL_SECS", 600)?),
        })
    }

    pub fn is_production(&self) -> bool {
        self.env == "production"
    }
}

fn number<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return Ok(default);
    };
    let value: T = raw.trim().parse().map_err(|e: T::Err| ConfigError {
        name,
        value: raw.clone(),
        reason: e.to_string(),
    })?;
    if value <= T::default() {
        return Err(ConfigError {
            name,
            value: raw,
            reason: "must be positive".into(),
        });
    }
    Ok(value)
}
