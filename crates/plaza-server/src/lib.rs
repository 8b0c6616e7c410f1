//! Startup wiring shared by the `plaza` and `plaza-seed` binaries.

use std::path::Path;
use std::sync::Arc;

use plaza_api::Config;
use plaza_db::Database;
use plaza_mail::{HttpTransport, LogTransport, MailClient, Mailer, SmtpTransport};
use tracing::{info, warn};

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plaza=debug,tower_http=debug".into()),
        )
        .init();
}

/// `:memory:` gets a single private connection, anything else a pool.
pub fn open_database(config: &Config) -> anyhow::Result<Database> {
    if config.db.path == ":memory:" {
        warn!("Using an in-memory database; nothing will be persisted");
        return Ok(Database::open_in_memory()?);
    }
    Ok(Database::open(Path::new(&config.db.path), config.db.pool_size)?)
}

/// HTTP mail API if configured, else an SMTP relay, else the log.
pub fn mailer(config: &Config) -> anyhow::Result<Arc<dyn Mailer>> {
    let from = config.mail.from.clone();
    if let Some(url) = &config.mail.api_url {
        info!("Sending mail through {}", url);
        let transport = HttpTransport::new(url.clone(), config.mail.api_key.clone())?;
        return Ok(Arc::new(MailClient::new(transport, from)));
    }
    if let Some(smtp) = &config.mail.smtp {
        info!("Sending mail through SMTP relay {}:{}", smtp.host, smtp.port);
        let transport = SmtpTransport::new(&smtp.host, smtp.port, &smtp.username, &smtp.password)?;
        return Ok(Arc::new(MailClient::new(transport, from)));
    }
    info!("No mail transport configured, mail will only be logged");
    Ok(Arc::new(MailClient::new(LogTransport, from)))
}
