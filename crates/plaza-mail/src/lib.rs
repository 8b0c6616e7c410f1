//! Plaza mail capability.
//!
//! Callers only see [`Mailer::send`]. Rendering, retry and the actual
//! transport (an HTTP mail API, an SMTP relay, or the log in development) live behind it.

pub mod error;
pub mod mailer;
pub mod template;
pub mod transport;

pub use error::{MailError, Result};
pub use mailer::{MailClient, Mailer, Recipient};
pub use template::Template;
pub use transport::{HttpTransport, LogTransport, Message, SmtpTransport, Transport};
