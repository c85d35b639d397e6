use std::time::Duration;

use lettre::{
    message::{
        header::{HeaderName, HeaderValue},
        Mailbox, MultiPart,
    },
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{Email, MailError, MailProvider};
use crate::config::SmtpConfig;

const SMTP_TIMEOUT: Duration = Duration::from_secs(20);
const IMPLICIT_TLS_PORT: u16 = 465;

pub struct SmtpProvider {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpProvider {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        // 465 speaks TLS from the first byte, everything else upgrades
        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| MailError::ConfigError(format!("Failed to create SMTP transport: {}", e)))?;

        let mailer = builder
            .port(config.port)
            .credentials(creds)
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        let from = config
            .from
            .parse()
            .map_err(|e| MailError::ConfigError(format!("Invalid from address: {}", e)))?;

        Ok(Self { mailer, from })
    }

    fn build_message(&self, email: &Email) -> Result<Message, MailError> {
        let mut builder = Message::builder().from(self.from.clone()).subject(&email.subject);

        for to in email.to.iter().filter(|to| !to.trim().is_empty()) {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|e| MailError::Permanent(format!("Invalid to address {}: {}", to, e)))?;
            builder = builder.to(mailbox);
        }

        if let Some(reply_to) = &email.reply_to {
            let mailbox: Mailbox = reply_to
                .parse()
                .map_err(|e| MailError::ConfigError(format!("Invalid reply-to address: {}", e)))?;
            builder = builder.reply_to(mailbox);
        }

        for (name, value) in &email.headers {
            builder = builder.raw_header(HeaderValue::new(
                HeaderName::new_from_ascii_str(*name),
                value.clone(),
            ));
        }

        builder
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))
            .map_err(|e| MailError::Permanent(format!("Failed to build email: {}", e)))
    }
}

/// Sort SMTP failures into the ones worth another attempt and the ones
/// that will fail the same way again.
fn classify(e: lettre::transport::smtp::Error) -> MailError {
    if e.is_permanent() || e.is_client() {
        MailError::Permanent(e.to_string())
    } else {
        MailError::Transient(e.to_string())
    }
}

#[async_trait::async_trait]
impl MailProvider for SmtpProvider {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let message = self.build_message(email)?;

        self.mailer.send(message).await.map_err(classify)?;

        tracing::info!("Email '{}' sent to {}", email.subject, email.to.join(", "));
        Ok(())
    }
}
