use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{MailError, Result};
use crate::mailer::Recipient;

/// A fully rendered mail, ready to hand to a transport.
#[derive(Debug, Clone)]
pub struct Message {
    pub from_name: String,
    pub from_email: String,
    pub to: Recipient,
    pub subject: String,
    pub body: String,
    /// Ask the provider to accept but not deliver.
    pub sandbox: bool,
}

/// One delivery attempt. Retrying is the caller's business.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, message: &Message) -> Result<()>;
}

/// Posts to a SendGrid-style v3 `mail/send` endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(&self, message: &Message) -> Result<()> {
        let payload = json!({
            "personalizations": [{
                "to": [{ "email": message.to.email, "name": message.to.name }],
            }],
            "from": { "email": message.from_email, "name": message.from_name },
            "subject": message.subject,
            "content": [{ "type": "text/html", "value": message.body }],
            "mail_settings": { "sandbox_mode": { "enable": message.sandbox } },
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Transport(format!("mail API answered {}", status)));
        }
        debug!(status = status.as_u16(), to = %message.to.email, "Mail accepted");
        Ok(())
    }
}

/// Hands the mail to an SMTP relay over STARTTLS.
///
/// SMTP has no sandbox switch; point the relay at a test inbox instead.
pub struct SmtpTransport {
    relay: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
            .port(port)
            .timeout(Some(Duration::from_secs(10)));
        if !username.is_empty() {
            builder = builder.credentials(Credentials::new(username.to_string(), password.to_string()));
        }
        Ok(Self {
            relay: builder.build(),
        })
    }

    fn envelope(message: &Message) -> Result<lettre::Message> {
        let from = Mailbox::new(Some(message.from_name.clone()), message.from_email.parse()?);
        let to = Mailbox::new(Some(message.to.name.clone()), message.to.email.parse()?);
        Ok(lettre::Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(message.body.clone())?)
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn deliver(&self, message: &Message) -> Result<()> {
        let envelope = Self::envelope(message)?;
        let response = self.relay.send(envelope).await?;
        debug!(code = %response.code(), to = %message.to.email, "Mail accepted by relay");
        Ok(())
    }
}

/// Development transport: writes the mail to the log instead of sending it.
#[derive(Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn deliver(&self, message: &Message) -> Result<()> {
        info!(
            to = %message.to.email,
            subject = %message.subject,
            sandbox = message.sandbox,
            "Mail (not sent):\n{}",
            message.body
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str) -> Message {
        Message {
            from_name: "Plaza".into(),
            from_email: "no-reply@plaza.local".into(),
            to: Recipient {
                name: "alice".into(),
                email: to.into(),
            },
            subject: "Finish registration with Plaza, alice".into(),
            body: "<p>Hi alice,</p>".into(),
            sandbox: false,
        }
    }

    #[test]
    fn smtp_envelope_carries_headers_and_html_body() {
        let envelope = SmtpTransport::envelope(&message("alice@x.com")).unwrap();
        let raw = String::from_utf8(envelope.formatted()).unwrap();
        assert!(raw.contains("<alice@x.com>"));
        assert!(raw.contains("Subject: Finish registration with Plaza, alice"));
        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains("<p>Hi alice,</p>"));
    }

    #[test]
    fn smtp_envelope_rejects_a_bad_address() {
        let err = SmtpTransport::envelope(&message("not-an-address")).unwrap_err();
        assert!(matches!(err, MailError::Transport(_)));
    }

    #[tokio::test]
    async fn smtp_transport_builds_without_connecting() {
        assert!(SmtpTransport::new("localhost", 2525, "user", "secret").is_ok());
        assert!(SmtpTransport::new("localhost", 2525, "", "").is_ok());
    }
}
