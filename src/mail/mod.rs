mod smtp;
pub mod templates;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::MailConfig;
pub use smtp::SmtpProvider;
pub use templates::TransactionNotice;

/// A rendered message ready for a provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Email {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub reply_to: Option<String>,
    pub headers: Vec<(&'static str, String)>,
}

/// Mail provider trait - implement this to add new email providers (AWS SES, SendGrid, etc.)
#[async_trait::async_trait]
pub trait MailProvider: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MailError {
    /// Worth retrying: connection drops, timeouts, 4xx replies
    #[error("Temporary delivery failure: {0}")]
    Transient(String),
    /// Retrying will not help: bad credentials, rejected recipient
    #[error("Delivery failed: {0}")]
    Permanent(String),
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl MailError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, MailError::Transient(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Wait after the given failed attempt (1-based): base * 2^(attempt-1), capped
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempts: u32,
    pub delivered: bool,
    pub error: Option<MailError>,
}

/// Mail service wrapper - holds the active provider
#[derive(Clone)]
pub struct MailService {
    provider: Arc<dyn MailProvider>,
    retry: RetryPolicy,
    reply_to: Option<String>,
}

impl MailService {
    pub fn new(provider: impl MailProvider + 'static) -> Self {
        Self {
            provider: Arc::new(provider),
            retry: RetryPolicy::default(),
            reply_to: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_reply_to(mut self, reply_to: Option<String>) -> Self {
        self.reply_to = reply_to;
        self
    }

    pub async fn send_with_retry(&self, email: &Email) -> DeliveryReport {
        if email.to.iter().all(|to| to.trim().is_empty()) {
            tracing::warn!("Skipping email '{}': no recipients", email.subject);
            return DeliveryReport {
                attempts: 0,
                delivered: false,
                error: None,
            };
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.send(email).await {
                Ok(()) => {
                    tracing::debug!("Email '{}' delivered on attempt {}", email.subject, attempt);
                    return DeliveryReport {
                        attempts: attempt,
                        delivered: true,
                        error: None,
                    };
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        "Email '{}' attempt {}/{} failed: {}; retrying in {:?}",
                        email.subject,
                        attempt,
                        self.retry.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        "Email '{}' to {:?} failed after {} attempt(s): {}",
                        email.subject,
                        email.to,
                        attempt,
                        e
                    );
                    return DeliveryReport {
                        attempts: attempt,
                        delivered: false,
                        error: Some(e),
                    };
                }
            }
        }
    }

    /// Render and send a transaction notice in the background. Delivery
    /// problems are logged; the caller's request has already succeeded.
    pub fn notify_transaction(&self, to: &str, notice: TransactionNotice) -> JoinHandle<DeliveryReport> {
        let mut email = notice.render(to);
        email.reply_to = self.reply_to.clone();
        let service = self.clone();
        tokio::spawn(async move { service.send_with_retry(&email).await })
    }
}

/// Console provider for development - just logs to stdout
pub struct ConsoleProvider;

#[async_trait::async_trait]
impl MailProvider for ConsoleProvider {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        tracing::info!("========================================");
        tracing::info!("Mail to {}: {}", email.to.join(", "), email.subject);
        for (name, value) in &email.headers {
            tracing::info!("{}: {}", name, value);
        }
        tracing::info!("{}", email.text);
        tracing::info!("========================================");
        Ok(())
    }
}

/// Create the mail service for the configured provider
pub fn create_mail_service(config: &MailConfig) -> Result<MailService, MailError> {
    match config {
        MailConfig::Smtp(smtp) => {
            tracing::info!("Mail provider: SMTP ({}:{})", smtp.host, smtp.port);
            Ok(MailService::new(SmtpProvider::new(smtp)?).with_reply_to(smtp.reply_to.clone()))
        }
        MailConfig::Console => {
            tracing::info!("Mail provider: Console (emails will be logged)");
            Ok(MailService::new(ConsoleProvider))
        }
    }
}
