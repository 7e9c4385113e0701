//! Outbound email for the auth flows (verification codes, password resets,
//! welcome messages) over SMTP via lettre.
//!
//! When SMTP is not configured the mailer runs in a disabled mode that
//! logs the message instead of sending it, so local development and tests
//! never need a mail server. Send failures are never retried; callers
//! decide whether a failure is fatal for their request.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

const DEFAULT_FROM: &str = "Altiplano Coffee <no-reply@altiplano.example>";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

#[derive(Clone)]
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl Mailer {
    /// Configure from SMTP_HOST / SMTP_USERNAME / SMTP_PASSWORD / SMTP_FROM.
    /// Without SMTP_HOST the mailer is disabled and only logs.
    pub fn from_env() -> Self {
        let from = std::env::var("SMTP_FROM")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| {
                DEFAULT_FROM
                    .parse()
                    .unwrap_or_else(|_| Mailbox::new(None, "no-reply@localhost".parse().unwrap()))
            });

        let transport = match std::env::var("SMTP_HOST") {
            Ok(host) => match AsyncSmtpTransport::<Tokio1Executor>::relay(&host) {
                Ok(builder) => {
                    let builder = match (
                        std::env::var("SMTP_USERNAME"),
                        std::env::var("SMTP_PASSWORD"),
                    ) {
                        (Ok(user), Ok(pass)) => builder.credentials(Credentials::new(user, pass)),
                        _ => builder,
                    };
                    tracing::info!("SMTP transport configured for {}", host);
                    Some(builder.build())
                }
                Err(e) => {
                    tracing::error!("Invalid SMTP_HOST {}: {}. Email disabled.", host, e);
                    None
                }
            },
            Err(_) => {
                tracing::info!("SMTP_HOST not set. Email delivery disabled (log only).");
                None
            }
        };

        Self { transport, from }
    }

    /// Log-only mailer for tests and offline development.
    pub fn disabled() -> Self {
        Self {
            transport: None,
            from: DEFAULT_FROM
                .parse()
                .unwrap_or_else(|_| Mailbox::new(None, "no-reply@localhost".parse().unwrap())),
        }
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        match &self.transport {
            Some(transport) => {
                transport.send(message).await?;
                tracing::info!("Email sent to {}: {}", to, subject);
                Ok(())
            }
            None => {
                tracing::info!("Email delivery disabled; would send to {}: {}", to, subject);
                Ok(())
            }
        }
    }

    pub async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), MailError> {
        self.send(
            to,
            "Verify your Altiplano admin account",
            format!(
                "Welcome to the Altiplano admin panel.\n\n\
                 Your verification code is: {}\n\n\
                 The code expires in 24 hours. If you did not expect this \
                 invitation you can ignore this message.\n",
                code
            ),
        )
        .await
    }

    pub async fn send_welcome(&self, to: &str, name: &str) -> Result<(), MailError> {
        self.send(
            to,
            "Welcome to Altiplano",
            format!(
                "Hi {},\n\nYour email address is verified and your admin \
                 account is ready to use.\n",
                name
            ),
        )
        .await
    }

    pub async fn send_reset_code(&self, to: &str, code: &str) -> Result<(), MailError> {
        self.send(
            to,
            "Altiplano password reset",
            format!(
                "A password reset was requested for this account.\n\n\
                 Your reset code is: {}\n\n\
                 The code expires in 24 hours. If you did not request a \
                 reset you can ignore this message.\n",
                code
            ),
        )
        .await
    }

    pub async fn send_reset_confirmation(&self, to: &str) -> Result<(), MailError> {
        self.send(
            to,
            "Your Altiplano password was changed",
            "Your password has been updated. If this wasn't you, contact \
             the site owner immediately.\n"
                .to_string(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_mailer_accepts_valid_recipient() {
        let mailer = Mailer::disabled();
        let result = mailer
            .send_verification_code("admin@example.com", "123456")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_mailer_still_rejects_invalid_recipient() {
        let mailer = Mailer::disabled();
        let result = mailer.send_welcome("not-an-address", "X").await;
        assert!(matches!(result, Err(MailError::Address(_))));
    }
}
