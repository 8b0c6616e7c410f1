use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{MailError, Result};
use crate::template::Template;
use crate::transport::{Message, Transport};

pub const FROM_NAME: &str = "Plaza";
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub email: String,
}

/// The mail capability handlers depend on.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, template: Template, to: &Recipient, data: &Value, sandbox: bool) -> Result<()>;
}

/// Renders a template and pushes it through a [`Transport`], retrying
/// failed deliveries with a linearly growing pause.
pub struct MailClient<T> {
    transport: T,
    from_email: String,
    max_attempts: u32,
    base_delay: Duration,
}

impl<T: Transport> MailClient<T> {
    pub fn new(transport: T, from_email: impl Into<String>) -> Self {
        Self {
            transport,
            from_email: from_email.into(),
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Attempt `n` (from 1) that fails waits `n * base_delay` before the next one.
    pub fn with_retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_delay = base_delay;
        self
    }
}

#[async_trait]
impl<T: Transport> Mailer for MailClient<T> {
    async fn send(&self, template: Template, to: &Recipient, data: &Value, sandbox: bool) -> Result<()> {
        let rendered = template.render(data)?;
        let message = Message {
            from_name: FROM_NAME.to_string(),
            from_email: self.from_email.clone(),
            to: to.clone(),
            subject: rendered.subject,
            body: rendered.body,
            sandbox,
        };

        let mut last = String::new();
        for attempt in 1..=self.max_attempts {
            match self.transport.deliver(&message).await {
                Ok(()) => {
                    info!(template = template.name(), to = %to.email, attempt, "Mail sent");
                    return Ok(());
                }
                Err(e) => {
                    warn!(template = template.name(), to = %to.email, attempt, "Mail delivery failed: {}", e);
                    last = e.to_string();
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.base_delay * attempt).await;
                    }
                }
            }
        }

        Err(MailError::RetriesExhausted {
            attempts: self.max_attempts,
            last,
        })
    }
}
