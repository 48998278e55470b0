//! Outbound email delivery for alert notifications
//!
//! The alerting engine only needs one capability: deliver a composed
//! message to a recipient and report whether delivery worked. The
//! cooldown flag is set strictly after a successful send, so senders
//! must return errors instead of swallowing them.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Result type alias for email operations
pub type EmailResult<T> = Result<T, EmailError>;

/// Errors that can occur during email delivery
#[derive(Debug)]
pub enum EmailError {
    /// The message never reached the delivery service
    SendFailed(String),

    /// The delivery service answered with a non-success status
    Rejected(u16),
}

impl fmt::Display for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailError::SendFailed(msg) => write!(f, "failed to send email: {}", msg),
            EmailError::Rejected(status) => {
                write!(f, "email delivery rejected with status: {}", status)
            }
        }
    }
}

impl std::error::Error for EmailError {}

/// A composed alert email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// Recipient address
    pub to: String,

    /// Subject line
    pub subject: String,

    /// Plain-text body
    pub body: String,
}

/// Trait for outbound email delivery
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared across
/// concurrent alert evaluations behind an `Arc`.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver one message, returning an error if delivery did not happen
    async fn send(&self, message: &EmailMessage) -> EmailResult<()>;
}

/// Delivers mail by posting JSON to an HTTP webhook
///
/// Stands in for a transactional mail provider: the webhook receives
/// the from/to/subject/body fields and is responsible for the actual
/// SMTP leg.
pub struct WebhookMailer {
    client: Client,
    url: String,
    from: String,
}

impl WebhookMailer {
    pub fn new(client: Client, url: String, from: String) -> Self {
        Self { client, url, from }
    }
}

#[async_trait]
impl EmailSender for WebhookMailer {
    async fn send(&self, message: &EmailMessage) -> EmailResult<()> {
        let payload = json!({
            "from": self.from,
            "to": message.to,
            "subject": message.subject,
            "body": message.body,
            "timestamp": Utc::now().to_rfc3339(),
        });

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("sent alert email to {}", message.to);
                    Ok(())
                } else {
                    error!("alert email rejected with status: {}", response.status());
                    Err(EmailError::Rejected(response.status().as_u16()))
                }
            }
            Err(e) => {
                error!("failed to send alert email: {}", e);
                Err(EmailError::SendFailed(e.to_string()))
            }
        }
    }
}

/// Records messages instead of delivering them
///
/// Used by tests and the demo binary when no webhook is configured.
/// Can be flipped into a failing mode to exercise the send-failure
/// path of the alerting engine.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<EmailMessage>>,
    failing: AtomicBool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Messages accepted so far, in send order.
    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl EmailSender for MemoryMailer {
    async fn send(&self, message: &EmailMessage) -> EmailResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmailError::SendFailed("mailer is failing".to_string()));
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> EmailMessage {
        EmailMessage {
            to: "owner@example.com".to_string(),
            subject: "Website alert: https://one.test is DOWN".to_string(),
            body: "details".to_string(),
        }
    }

    #[tokio::test]
    async fn test_webhook_mailer_posts_message_fields() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mail"))
            .and(body_partial_json(json!({
                "from": "alerts@sitewatch.test",
                "to": "owner@example.com",
                "subject": "Website alert: https://one.test is DOWN",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mailer = WebhookMailer::new(
            Client::new(),
            format!("{}/mail", mock_server.uri()),
            "alerts@sitewatch.test".to_string(),
        );

        mailer.send(&message()).await.unwrap();
    }

    #[tokio::test]
    async fn test_webhook_mailer_surfaces_rejection() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let mailer = WebhookMailer::new(
            Client::new(),
            mock_server.uri(),
            "alerts@sitewatch.test".to_string(),
        );

        assert_matches!(
            mailer.send(&message()).await,
            Err(EmailError::Rejected(503))
        );
    }

    #[tokio::test]
    async fn test_memory_mailer_records_and_fails_on_demand() {
        let mailer = MemoryMailer::new();
        mailer.send(&message()).await.unwrap();
        assert_eq!(mailer.sent().await, vec![message()]);

        mailer.set_failing(true);
        assert_matches!(
            mailer.send(&message()).await,
            Err(EmailError::SendFailed(_))
        );
        assert_eq!(mailer.sent().await.len(), 1);
    }
}
