use std::sync::Arc;

use anyhow::{Context, Result};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::{error, info};

use crate::{config::SmtpConfig, error::ApiError};

struct Relay {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

/// Fire-and-forget SMTP relay client. Cloning is cheap; a mailer built
/// without relay settings refuses to send.
#[derive(Clone)]
pub struct Mailer {
    relay: Option<Arc<Relay>>,
}

impl Mailer {
    pub fn from_config(smtp: Option<&SmtpConfig>) -> Result<Self> {
        let Some(smtp) = smtp else {
            return Ok(Self::disabled());
        };

        let builder = if smtp.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        }
        .with_context(|| format!("Invalid SMTP host {}", smtp.host))?
        .port(smtp.port);

        let builder = match (&smtp.username, &smtp.password) {
            (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
            _ => builder,
        };

        let from: Mailbox = smtp
            .from
            .parse()
            .with_context(|| format!("MAIL_FROM is not a valid address: {}", smtp.from))?;

        Ok(Self {
            relay: Some(Arc::new(Relay {
                transport: builder.build(),
                from,
            })),
        })
    }

    pub fn disabled() -> Self {
        Self { relay: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.relay.is_some()
    }

    fn build(relay: &Relay, to: &str, subject: &str, html: String) -> Result<Message, ApiError> {
        let to: Mailbox = to
            .trim()
            .parse()
            .map_err(|_| ApiError::bad_request(format!("Invalid recipient address: {to}")))?;

        Message::builder()
            .from(relay.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)
            .map_err(|e| ApiError::internal(e.to_string()))
    }

    /// Validates and queues one message; delivery happens on a spawned task
    /// and failures are only logged.
    pub fn send_in_background(&self, to: &str, subject: &str, html: String) -> Result<(), ApiError> {
        let relay = self
            .relay
            .clone()
            .ok_or_else(|| ApiError::internal("Mail relay not configured"))?;

        let message = Self::build(&relay, to, subject, html)?;
        let recipient = to.trim().to_string();

        actix_web::rt::spawn(async move {
            match relay.transport.send(message).await {
                Ok(_) => info!(to = %recipient, "Mail delivered to relay"),
                Err(e) => error!(error = %e, to = %recipient, "Mail delivery failed"),
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: Some("mailer".to_string()),
            password: Some("pw".to_string()),
            from: "Back Office <noreply@example.com>".to_string(),
        }
    }

    #[test]
    fn disabled_mailer_refuses_to_send() {
        let mailer = Mailer::from_config(None).unwrap();
        assert!(!mailer.is_enabled());
        let err = mailer
            .send_in_background("a@example.com", "Hi", "<p>x</p>".into())
            .unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[test]
    fn invalid_sender_is_a_config_error() {
        let mut cfg = smtp();
        cfg.from = "not an address".to_string();
        assert!(Mailer::from_config(Some(&cfg)).is_err());
    }

    #[actix_web::test]
    async fn invalid_recipient_is_bad_request() {
        let mailer = Mailer::from_config(Some(&smtp())).unwrap();
        assert!(mailer.is_enabled());
        let err = mailer
            .send_in_background("nobody", "Hi", "<p>x</p>".into())
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
