//! Outgoing mail.
//!
//! The domain builds [`EmailMessage`]s and decides when to send them; the
//! transport sits behind [`NotificationDispatcher`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, instrument};

use crate::config::MailConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Notification dispatch errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError>;
}

/// Writes messages to the log instead of a mail relay. Development only:
/// the body, including codes, ends up in the log.
#[derive(Debug, Clone, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    #[instrument(skip(self, message), fields(to = %message.to))]
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        if !message.to.contains('@') {
            return Err(NotificationError::InvalidRecipient(message.to));
        }
        info!(subject = %message.subject, body = %message.body, "Email dispatched");
        Ok(())
    }
}

/// Keeps every message in memory; can be switched to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn last(&self) -> Option<EmailMessage> {
        self.sent().last().cloned()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(NotificationError::Transport("relay unavailable".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
        Ok(())
    }
}

/// Builds the mail carrying a one-time code.
pub fn otp_message(
    mail: &MailConfig,
    to: &str,
    recipient_name: &str,
    code: &str,
    ttl_minutes: i64,
) -> EmailMessage {
    EmailMessage {
        from: mail.from_address.clone(),
        to: to.to_string(),
        subject: format!("{} - verification code", mail.shop_name),
        body: format!(
            "Hello {recipient_name},\n\n\
             Your verification code is {code}. It expires in {ttl_minutes} minutes.\n\n\
             If you did not request it, ignore this message.\n\n{}",
            mail.shop_name
        ),
    }
}
