use askama::Template as _;
use serde_json::Value;

use crate::error::{MailError, Result};

/// Mails the server knows how to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// Sent after registration. Needs `username` and `activation_url`.
    UserInvitation,
}

pub struct Rendered {
    pub subject: String,
    pub body: String,
}

#[derive(askama::Template)]
#[template(path = "user_invitation_subject.txt")]
struct InvitationSubject<'a> {
    username: &'a str,
}

#[derive(askama::Template)]
#[template(path = "user_invitation.html")]
struct InvitationBody<'a> {
    username: &'a str,
    activation_url: &'a str,
}

impl Template {
    pub fn name(self) -> &'static str {
        match self {
            Template::UserInvitation => "user_invitation",
        }
    }

    pub fn render(self, data: &Value) -> Result<Rendered> {
        match self {
            Template::UserInvitation => {
                let username = field(self, data, "username")?;
                let activation_url = field(self, data, "activation_url")?;

                let subject = InvitationSubject { username }
                    .render()
                    .map_err(|e| self.failed(e))?;
                let body = InvitationBody {
                    username,
                    activation_url,
                }
                .render()
                .map_err(|e| self.failed(e))?;

                Ok(Rendered {
                    subject: subject.trim().to_string(),
                    body,
                })
            }
        }
    }

    fn failed(self, err: askama::Error) -> MailError {
        MailError::Template {
            template: self.name(),
            reason: err.to_string(),
        }
    }
}

fn field<'a>(template: Template, data: &'a Value, key: &str) -> Result<&'a str> {
    data.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| MailError::Template {
            template: template.name(),
            reason: format!("missing string field `{}`", key),
        })
}
