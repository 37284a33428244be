use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::models::reset::CODE_TTL_MINUTES;

/// Outbound-mail capability consumed by the reset flow. The production
/// implementation talks SMTP; tests substitute a recording fake.
#[async_trait]
pub trait ResetMailer: Send + Sync {
    async fn send_reset_code(&self, to: &str, code: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct MailService {
    transport: SmtpTransport,
    from: Mailbox,
}

impl MailService {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let from = format!("{} <{}>", config.mail_from_name, config.mail_from)
            .parse::<Mailbox>()
            .map_err(|e| AppError::configuration(format!("Invalid MAIL_FROM address: {}", e)))?;

        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.clone(),
        );

        let transport = SmtpTransport::starttls_relay(&config.smtp_host)
            .map_err(|e| AppError::configuration(format!("Failed to create SMTP transport: {}", e)))?
            .port(config.smtp_port)
            .credentials(credentials)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl ResetMailer for MailService {
    async fn send_reset_code(&self, to: &str, code: &str) -> Result<()> {
        let recipient = to
            .parse::<Mailbox>()
            .map_err(|_| AppError::InvalidEmailFormat)?;

        let body = format!(
            "Your password reset code is: {}. It expires in {} minutes.\n\n\
             If you did not request a password reset, you can ignore this email.",
            code, CODE_TTL_MINUTES
        );

        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject("Your password reset code")
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AppError::service(format!("Failed to build message: {}", e)))?;

        // lettre's SMTP transport is blocking; keep it off the runtime threads
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || {
            transport
                .send(&message)
                .map(|_| ())
                .map_err(|e| AppError::delivery(e.to_string()))
        })
        .await
        .map_err(|e| AppError::service(format!("Task join error: {}", e)))??;

        tracing::info!("Reset code email sent to {}", to);
        Ok(())
    }
}
