use rusqlite::ffi;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("duplicate username")]
    DuplicateUsername,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("user already follows")]
    AlreadyFollows,

    #[error("email not confirmed")]
    EmailNotConfirmed,

    #[error("invalid token")]
    InvalidToken,

    #[error("invitation expired")]
    InvitationExpired,

    /// A write touched more rows than it can legitimately touch.
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("query timed out")]
    Timeout,

    #[error("query cancelled")]
    Cancelled,

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("pool: {0}")]
    Pool(String),

    #[error("blocking task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Which kind of constraint a failed statement tripped, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Constraint<'a> {
    /// UNIQUE or PRIMARY KEY; carries sqlite's message, e.g.
    /// `UNIQUE constraint failed: users.email`.
    Unique(&'a str),
    ForeignKey,
}

pub(crate) fn constraint(err: &rusqlite::Error) -> Option<Constraint<'_>> {
    match err {
        rusqlite::Error::SqliteFailure(e, msg) => match e.extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                Some(Constraint::Unique(msg.as_deref().unwrap_or_default()))
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some(Constraint::ForeignKey),
            _ => None,
        },
        _ => None,
    }
}

/// Map a constraint failure to a domain error; anything `classify` declines
/// stays a raw sqlite error.
pub(crate) fn translate(
    err: rusqlite::Error,
    classify: impl FnOnce(Constraint<'_>) -> Option<StoreError>,
) -> StoreError {
    let mapped = constraint(&err).and_then(classify);
    mapped.unwrap_or_else(|| err.into())
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
