//! Email provider port and adapters.

use std::collections::HashSet;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::ProviderError;

/// An outbound email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Provider-side send report. A recipient can be rejected without the whole
/// send failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReport {
    pub message_id: String,
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
}

/// Email provider port.
#[async_trait::async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<SendReport, ProviderError>;

    async fn verify_connection(&self) -> Result<(), ProviderError>;
}

/// Production adapter: HTTP email API (`/messages`), bearer-token auth.
pub struct ApiEmailProvider {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl ApiEmailProvider {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_token: api_token.into(),
        }
    }
}

#[async_trait::async_trait]
impl EmailProvider for ApiEmailProvider {
    async fn send(&self, message: &EmailMessage) -> Result<SendReport, ProviderError> {
        let report: SendReport = self
            .client
            .post(format!("{}/messages", self.base_url))
            .bearer_auth(&self.api_token)
            .json(message)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(report)
    }

    async fn verify_connection(&self) -> Result<(), ProviderError> {
        self.client
            .get(format!("{}/account", self.base_url))
            .bearer_auth(&self.api_token)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// In-memory mock. Records every sent message; addresses added to the
/// reject list bounce instead of being accepted.
#[derive(Default)]
pub struct MockEmailProvider {
    sent: RwLock<Vec<EmailMessage>>,
    reject_addresses: RwLock<HashSet<String>>,
}

impl MockEmailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounce every send to this address.
    pub fn reject_address(&self, email: &str) {
        self.reject_addresses.write().insert(email.to_string());
    }

    pub fn sent_messages(&self) -> Vec<EmailMessage> {
        self.sent.read().clone()
    }
}

#[async_trait::async_trait]
impl EmailProvider for MockEmailProvider {
    async fn send(&self, message: &EmailMessage) -> Result<SendReport, ProviderError> {
        let reject = self.reject_addresses.read();
        let (rejected, accepted): (Vec<String>, Vec<String>) = message
            .to
            .iter()
            .cloned()
            .partition(|addr| reject.contains(addr));
        drop(reject);

        if !accepted.is_empty() {
            self.sent.write().push(message.clone());
        }
        Ok(SendReport {
            message_id: Uuid::new_v4().to_string(),
            accepted,
            rejected,
        })
    }

    async fn verify_connection(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Logging-only adapter. Accepts everything with a synthetic message id.
#[derive(Default)]
pub struct LoggingEmailProvider;

#[async_trait::async_trait]
impl EmailProvider for LoggingEmailProvider {
    async fn send(&self, message: &EmailMessage) -> Result<SendReport, ProviderError> {
        info!(to = ?message.to, subject = %message.subject, "email: send");
        Ok(SendReport {
            message_id: "msg-log".into(),
            accepted: message.to.clone(),
            rejected: Vec::new(),
        })
    }

    async fn verify_connection(&self) -> Result<(), ProviderError> {
        info!("email: verify_connection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message(to: &str) -> EmailMessage {
        EmailMessage {
            from: "noreply@example-platform.com".into(),
            to: vec![to.into()],
            subject: "You're invited".into(),
            html: "<p>Join</p>".into(),
            text: "Join".into(),
        }
    }

    #[tokio::test]
    async fn mock_rejects_listed_addresses() {
        let provider = MockEmailProvider::new();
        provider.reject_address("bad@acme.com");

        let report = provider.send(&message("bad@acme.com")).await.unwrap();
        assert!(report.accepted.is_empty());
        assert_eq!(report.rejected, vec!["bad@acme.com".to_string()]);
        assert!(provider.sent_messages().is_empty());

        let report = provider.send(&message("good@acme.com")).await.unwrap();
        assert_eq!(report.accepted, vec!["good@acme.com".to_string()]);
        assert_eq!(provider.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn api_provider_sends() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message_id": "m1",
                "accepted": ["a@acme.com"],
                "rejected": []
            })))
            .mount(&server)
            .await;

        let provider = ApiEmailProvider::new(server.uri(), "token");
        let report = provider.send(&message("a@acme.com")).await.unwrap();
        assert_eq!(report.message_id, "m1");
        assert_eq!(report.accepted.len(), 1);
    }

    #[tokio::test]
    async fn api_provider_verifies_connection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/account"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let provider = ApiEmailProvider::new(server.uri(), "token");
        provider.verify_connection().await.unwrap();
    }

    #[tokio::test]
    async fn api_provider_classifies_rate_limits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let provider = ApiEmailProvider::new(server.uri(), "token");
        let err = provider.send(&message("a@acme.com")).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
