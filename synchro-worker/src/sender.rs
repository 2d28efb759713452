/// Email delivery backends
///
/// The dispatcher is written against the `NotificationSender` trait so
/// tests can swap in a failing or recording sender. Production uses
/// the HTTP sender against the transactional email API; deployments
/// without an email API run the log sender, which records instead of
/// delivering.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;
use thiserror::Error;

use crate::render::RenderedEmail;

/// Email delivery error
#[derive(Debug, Error)]
pub enum SendError {
    /// The request never completed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The email API rejected the message.
    #[error("rejected by email API ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// A delivery backend for rendered emails.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Delivers one email.
    async fn send(&self, email: &RenderedEmail) -> Result<(), SendError>;
}

/// Sender that logs instead of delivering. Also records every email
/// so tests can assert on what would have been sent.
#[derive(Default)]
pub struct LogSender {
    sent: Mutex<Vec<RenderedEmail>>,
}

impl LogSender {
    pub fn new() -> Self {
        LogSender::default()
    }

    /// Everything "sent" so far.
    pub fn sent(&self) -> Vec<RenderedEmail> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl NotificationSender for LogSender {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, email: &RenderedEmail) -> Result<(), SendError> {
        tracing::info!(
            to = %email.recipient_email,
            subject = %email.subject,
            kind = email.kind.as_str(),
            "email (log-only sender)"
        );
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(email.clone());
        Ok(())
    }
}

/// Sender that posts to a transactional email HTTP API.
pub struct HttpSender {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpSender {
    pub fn new(api_url: impl Into<String>, from: impl Into<String>) -> Self {
        HttpSender {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: None,
            from: from.into(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl NotificationSender for HttpSender {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, email: &RenderedEmail) -> Result<(), SendError> {
        let mut request = self.client.post(&self.api_url).json(&json!({
            "from": self.from,
            "to": email.recipient_email,
            "subject": email.subject,
            "html": email.html_body,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(SendError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synchro_core::entities::NotificationKind;

    fn email() -> RenderedEmail {
        RenderedEmail {
            recipient_email: "a@b.c".to_string(),
            subject: "s".to_string(),
            html_body: "<p>b</p>".to_string(),
            kind: NotificationKind::Invitation,
        }
    }

    #[tokio::test]
    async fn test_log_sender_records() {
        let sender = LogSender::new();
        sender.send(&email()).await.unwrap();
        sender.send(&email()).await.unwrap();
        assert_eq!(sender.sent().len(), 2);
        assert_eq!(sender.name(), "log");
    }
}
