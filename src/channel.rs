//! Message channel abstraction
//!
//! A [`MessageChannel`] hands out batches of [`Message`]s from one
//! subscription. Every message must end in exactly one terminal action,
//! [`Message::ack`] or [`Message::nack`]; both take `self`, so a second
//! action does not compile. A message dropped without either stays
//! outstanding until the backend's ack deadline passes and is redelivered.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("pub/sub API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("pub/sub request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("pub/sub authentication failed: {0}")]
    Auth(String),

    #[error("subscription closed")]
    Closed,
}

impl ChannelError {
    /// Whether the failure is worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status == 429 || (500..=599).contains(status),
            Self::Request(e) => e.is_timeout() || e.is_connect(),
            Self::Auth(_) => true,
            Self::Closed => false,
        }
    }
}

/// Backend side of the terminal actions of a message
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self, ack_id: &str) -> Result<(), ChannelError>;
    async fn nack(&self, ack_id: &str) -> Result<(), ChannelError>;
}

/// A delivered message
pub struct Message {
    pub id: String,
    pub data: Vec<u8>,
    pub attributes: HashMap<String, String>,
    pub publish_time: Option<DateTime<Utc>>,
    /// Set when the subscription has a dead-letter policy
    pub delivery_attempt: Option<u32>,
    ack_id: String,
    acker: Arc<dyn Acknowledger>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        data: impl Into<Vec<u8>>,
        ack_id: impl Into<String>,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
            attributes: HashMap::new(),
            publish_time: None,
            delivery_attempt: None,
            ack_id: ack_id.into(),
            acker,
        }
    }

    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_publish_time(mut self, publish_time: Option<DateTime<Utc>>) -> Self {
        self.publish_time = publish_time;
        self
    }

    pub fn with_delivery_attempt(mut self, attempt: Option<u32>) -> Self {
        self.delivery_attempt = attempt;
        self
    }

    pub fn ack_id(&self) -> &str {
        &self.ack_id
    }

    /// Confirm processing; the message will not be redelivered.
    pub async fn ack(self) -> Result<(), ChannelError> {
        self.acker.ack(&self.ack_id).await
    }

    /// Reject the message so the backend redelivers it under its own policy.
    pub async fn nack(self) -> Result<(), ChannelError> {
        self.acker.nack(&self.ack_id).await
    }
}

// Manual Debug implementation since the acknowledger is a trait object
impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("data_len", &self.data.len())
            .field("attributes", &self.attributes)
            .field("publish_time", &self.publish_time)
            .field("delivery_attempt", &self.delivery_attempt)
            .field("ack_id", &self.ack_id)
            .finish_non_exhaustive()
    }
}

/// Source of messages for one subscription
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Subscription this channel reads from
    fn subscription(&self) -> &str;

    /// Wait for up to `max_messages` messages.
    ///
    /// An empty batch is not an error; callers simply ask again. An `Err` is
    /// terminal for the receive loop.
    async fn receive(&self, max_messages: usize) -> Result<Vec<Message>, ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        actions: Mutex<Vec<(String, &'static str)>>,
    }

    #[async_trait]
    impl Acknowledger for Recorder {
        async fn ack(&self, ack_id: &str) -> Result<(), ChannelError> {
            self.actions.lock().unwrap().push((ack_id.to_string(), "ack"));
            Ok(())
        }

        async fn nack(&self, ack_id: &str) -> Result<(), ChannelError> {
            self.actions.lock().unwrap().push((ack_id.to_string(), "nack"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_terminal_actions_reach_acknowledger() {
        let recorder = Arc::new(Recorder::default());

        Message::new("m1", b"{}".to_vec(), "a1", recorder.clone())
            .ack()
            .await
            .unwrap();
        Message::new("m2", b"{}".to_vec(), "a2", recorder.clone())
            .nack()
            .await
            .unwrap();

        let actions = recorder.actions.lock().unwrap().clone();
        assert_eq!(
            actions,
            vec![("a1".to_string(), "ack"), ("a2".to_string(), "nack")]
        );
    }

    #[test]
    fn test_retryable_classification() {
        let api = |status| ChannelError::Api {
            status,
            message: String::new(),
        };
        assert!(api(429).is_retryable());
        assert!(api(503).is_retryable());
        assert!(!api(403).is_retryable());
        assert!(!api(404).is_retryable());
        assert!(!ChannelError::Closed.is_retryable());
    }

    #[test]
    fn test_debug_omits_payload() {
        let msg = Message::new("m1", b"secret".to_vec(), "a1", Arc::new(Recorder::default()));
        let rendered = format!("{msg:?}");
        assert!(rendered.contains("data_len: 6"));
        assert!(!rendered.contains("secret"));
    }
}
