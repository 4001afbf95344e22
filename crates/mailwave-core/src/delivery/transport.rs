//! Outbound send transport.
//!
//! The dispatcher treats sending as a black box behind `SendTransport`:
//! hand over a rendered email, get back a classified outcome. The SMTP
//! implementation relays through a configured smarthost via lettre.

use async_trait::async_trait;
use chrono::Utc;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use mailwave_common::config::SmtpConfig;
use std::time::Duration as StdDuration;
use tracing::debug;
use uuid::Uuid;

/// Result of a delivery attempt
#[derive(Debug)]
pub enum DeliveryResult {
    /// Successfully sent
    Sent { message_id: String },
    /// Temporarily failed, should retry
    TemporaryFailure { error: String },
    /// Permanently failed, should not retry
    PermanentFailure { error: String },
    /// Bounced by the receiving side
    Bounced { reason: String },
}

/// A fully rendered email ready for the wire
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Black-box send capability
#[async_trait]
pub trait SendTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> DeliveryResult;
}

/// Classify an SMTP error string into a delivery outcome
pub(crate) fn classify_send_error(error: &str) -> DeliveryResult {
    if error.contains("5.1.1")
        || error.contains("550")
        || error.contains("User unknown")
        || error.contains("does not exist")
    {
        DeliveryResult::Bounced {
            reason: error.to_string(),
        }
    } else if error.contains("4")
        || error.contains("temporarily")
        || error.contains("try again")
        || error.contains("timed out")
    {
        DeliveryResult::TemporaryFailure {
            error: error.to_string(),
        }
    } else {
        DeliveryResult::PermanentFailure {
            error: error.to_string(),
        }
    }
}

/// SMTP relay sender
pub struct SmtpSender {
    config: SmtpConfig,
}

impl SmtpSender {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_message(email: &OutgoingEmail, msg_id: &str) -> Result<Message, String> {
        let from: Mailbox = email
            .from
            .parse()
            .map_err(|e| format!("Invalid from address: {}", e))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| format!("Invalid to address: {}", e))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(&email.subject)
            .message_id(Some(msg_id.to_string()))
            .header(ContentType::TEXT_HTML)
            .body(email.html_body.clone())
            .map_err(|e| format!("Failed to build email: {}", e))
    }
}

#[async_trait]
impl SendTransport for SmtpSender {
    async fn send(&self, email: &OutgoingEmail) -> DeliveryResult {
        let msg_id = format!("<{}.{}@mailwave>", Uuid::new_v4(), Utc::now().timestamp());

        let message = match Self::build_message(email, &msg_id) {
            Ok(m) => m,
            Err(error) => return DeliveryResult::PermanentFailure { error },
        };

        let transport_result = if self.config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
        } else {
            Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                &self.config.host,
            ))
        };

        let mut transport = match transport_result {
            Ok(t) => t.port(self.config.port),
            Err(e) => {
                return DeliveryResult::TemporaryFailure {
                    error: format!("Failed to create SMTP transport: {}", e),
                };
            }
        };

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            transport = transport.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let mailer = transport
            .timeout(Some(StdDuration::from_secs(self.config.timeout_secs)))
            .build();

        match mailer.send(message).await {
            Ok(response) => {
                debug!("Email sent: {:?}", response);
                DeliveryResult::Sent { message_id: msg_id }
            }
            Err(e) => classify_send_error(&e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_bounce_classification() {
        assert!(matches!(
            classify_send_error("550 5.1.1 User unknown"),
            DeliveryResult::Bounced { .. }
        ));
        assert!(matches!(
            classify_send_error("recipient does not exist"),
            DeliveryResult::Bounced { .. }
        ));
    }

    #[test]
    fn test_temporary_failure_classification() {
        assert!(matches!(
            classify_send_error("451 try again later"),
            DeliveryResult::TemporaryFailure { .. }
        ));
        assert!(matches!(
            classify_send_error("connection timed out"),
            DeliveryResult::TemporaryFailure { .. }
        ));
    }

    #[test]
    fn test_permanent_failure_classification() {
        assert!(matches!(
            classify_send_error("message rejected by policy"),
            DeliveryResult::PermanentFailure { .. }
        ));
    }
}
