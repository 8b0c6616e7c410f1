use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("template {template}: {reason}")]
    Template {
        template: &'static str,
        reason: String,
    },

    #[error("transport: {0}")]
    Transport(String),

    #[error("mail not delivered after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl From<reqwest::Error> for MailError {
    fn from(err: reqwest::Error) -> Self {
        MailError::Transport(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for MailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        MailError::Transport(err.to_string())
    }
}

impl From<lettre::address::AddressError> for MailError {
    fn from(err: lettre::address::AddressError) -> Self {
        MailError::Transport(format!("bad address: {}", err))
    }
}

impl From<lettre::error::Error> for MailError {
    fn from(err: lettre::error::Error) -> Self {
        MailError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MailError>;
