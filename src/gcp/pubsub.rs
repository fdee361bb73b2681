//! Pub/Sub REST client for a single subscription
//!
//! Messages are pulled with `subscriptions.pull`, acknowledged with
//! `subscriptions.acknowledge`, and rejected by setting their ack deadline
//! to zero with `subscriptions.modifyAckDeadline`, which makes them
//! eligible for redelivery right away.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{error_message, http_client, resolve_endpoint, TokenSource};
use crate::channel::{Acknowledger, ChannelError, Message, MessageChannel};
use crate::error::Result;

/// Default Pub/Sub endpoint
pub const DEFAULT_PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";

/// Environment variable naming a Pub/Sub emulator (`host:port`)
pub const PUBSUB_EMULATOR_HOST: &str = "PUBSUB_EMULATOR_HOST";

const PUBSUB_SCOPES: &[&str] = &["https://www.googleapis.com/auth/pubsub"];

// Pull is a long poll; leave room for the server to hold the request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    max_messages: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<ReceivedMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivedMessage {
    ack_id: String,
    message: PubsubMessage,
    #[serde(default)]
    delivery_attempt: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PubsubMessage {
    /// Base64-encoded payload; absent for attribute-only messages
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    attributes: HashMap<String, String>,
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    publish_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcknowledgeRequest<'a> {
    ack_ids: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyAckDeadlineRequest<'a> {
    ack_ids: Vec<&'a str>,
    ack_deadline_seconds: u32,
}

/// Full resource path of a subscription.
///
/// Accepts a bare subscription id or an already qualified
/// `projects/{project}/subscriptions/{id}` path.
pub fn subscription_path(project_id: &str, subscription: &str) -> String {
    if subscription.starts_with("projects/") {
        subscription.to_string()
    } else {
        format!("projects/{project_id}/subscriptions/{subscription}")
    }
}

/// REST calls bound to one subscription
#[derive(Debug)]
struct SubscriptionApi {
    client: reqwest::Client,
    endpoint: String,
    tokens: TokenSource,
    path: String,
}

impl SubscriptionApi {
    fn url(&self, verb: &str) -> String {
        format!("{}/v1/{}:{}", self.endpoint, self.path, verb)
    }

    async fn post<B>(&self, verb: &str, body: &B) -> std::result::Result<reqwest::Response, ChannelError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let mut request = self.client.post(self.url(verb)).json(body);
        if let Some(token) = self
            .tokens
            .bearer(PUBSUB_SCOPES)
            .await
            .map_err(ChannelError::Auth)?
        {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Api {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        Ok(response)
    }

    async fn pull(
        &self,
        max_messages: usize,
    ) -> std::result::Result<Vec<ReceivedMessage>, ChannelError> {
        let response = self.post("pull", &PullRequest { max_messages }).await?;
        let body: PullResponse = response.json().await?;
        Ok(body.received_messages)
    }
}

#[async_trait]
impl Acknowledger for SubscriptionApi {
    async fn ack(&self, ack_id: &str) -> std::result::Result<(), ChannelError> {
        self.post(
            "acknowledge",
            &AcknowledgeRequest {
                ack_ids: vec![ack_id],
            },
        )
        .await?;
        Ok(())
    }

    async fn nack(&self, ack_id: &str) -> std::result::Result<(), ChannelError> {
        self.post(
            "modifyAckDeadline",
            &ModifyAckDeadlineRequest {
                ack_ids: vec![ack_id],
                ack_deadline_seconds: 0,
            },
        )
        .await?;
        Ok(())
    }
}

/// Turn a pulled message into a [`Message`], decoding its payload
fn into_message(
    received: ReceivedMessage,
    acker: Arc<dyn Acknowledger>,
) -> std::result::Result<Message, (String, base64::DecodeError)> {
    let ReceivedMessage {
        ack_id,
        message,
        delivery_attempt,
    } = received;

    let data = match message.data.as_deref() {
        Some(encoded) => match base64::engine::general_purpose::STANDARD.decode(encoded) {
            Ok(bytes) => bytes,
            Err(e) => return Err((ack_id, e)),
        },
        None => Vec::new(),
    };

    Ok(Message::new(message.message_id, data, ack_id, acker)
        .with_attributes(message.attributes)
        .with_publish_time(message.publish_time)
        .with_delivery_attempt(delivery_attempt))
}

/// Pub/Sub subscriber using the REST API
#[derive(Debug, Clone)]
pub struct PubSubClient {
    api: Arc<SubscriptionApi>,
}

impl PubSubClient {
    /// Create a client with explicit parts
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        tokens: TokenSource,
        project_id: &str,
        subscription: &str,
    ) -> Self {
        Self {
            api: Arc::new(SubscriptionApi {
                client,
                endpoint: endpoint.into().trim_end_matches('/').to_string(),
                tokens,
                path: subscription_path(project_id, subscription),
            }),
        }
    }

    /// Create a client from the environment.
    ///
    /// Uses the emulator named by `PUBSUB_EMULATOR_HOST` without credentials
    /// when set, otherwise the public endpoint with discovered credentials.
    pub async fn from_env(project_id: &str, subscription: &str) -> Result<Self> {
        let (endpoint, emulated) = resolve_endpoint(
            std::env::var(PUBSUB_EMULATOR_HOST).ok(),
            DEFAULT_PUBSUB_ENDPOINT,
        );

        let tokens = if emulated {
            info!(endpoint = %endpoint, "Using pub/sub emulator");
            TokenSource::Anonymous
        } else {
            TokenSource::discover().await?
        };

        Ok(Self::new(
            http_client(REQUEST_TIMEOUT)?,
            endpoint,
            tokens,
            project_id,
            subscription,
        ))
    }
}

#[async_trait]
impl MessageChannel for PubSubClient {
    fn subscription(&self) -> &str {
        &self.api.path
    }

    async fn receive(&self, max_messages: usize) -> std::result::Result<Vec<Message>, ChannelError> {
        let received = self.api.pull(max_messages).await?;
        debug!(subscription = %self.api.path, count = received.len(), "Pulled messages");

        let acker: Arc<dyn Acknowledger> = self.api.clone();
        let mut messages = Vec::with_capacity(received.len());
        for item in received {
            match into_message(item, Arc::clone(&acker)) {
                Ok(message) => messages.push(message),
                Err((ack_id, e)) => {
                    // Corrupt envelope, not a payload problem: hand it straight back.
                    warn!(subscription = %self.api.path, error = %e, "Cannot decode message envelope");
                    if let Err(e) = acker.nack(&ack_id).await {
                        warn!(subscription = %self.api.path, error = %e, "Cannot reject message");
                    }
                }
            }
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopAcker;

    #[async_trait]
    impl Acknowledger for NoopAcker {
        async fn ack(&self, _ack_id: &str) -> std::result::Result<(), ChannelError> {
            Ok(())
        }

        async fn nack(&self, _ack_id: &str) -> std::result::Result<(), ChannelError> {
            Ok(())
        }
    }

    #[test]
    fn test_subscription_path() {
        assert_eq!(
            subscription_path("my-project", "bucket-events"),
            "projects/my-project/subscriptions/bucket-events"
        );
        assert_eq!(
            subscription_path("ignored", "projects/other/subscriptions/bucket-events"),
            "projects/other/subscriptions/bucket-events"
        );
    }

    #[test]
    fn test_verb_urls() {
        let client = PubSubClient::new(
            reqwest::Client::new(),
            "http://localhost:8085/",
            TokenSource::Anonymous,
            "p",
            "s",
        );
        assert_eq!(client.subscription(), "projects/p/subscriptions/s");
        assert_eq!(
            client.api.url("pull"),
            "http://localhost:8085/v1/projects/p/subscriptions/s:pull"
        );
        assert_eq!(
            client.api.url("modifyAckDeadline"),
            "http://localhost:8085/v1/projects/p/subscriptions/s:modifyAckDeadline"
        );
    }

    #[test]
    fn test_request_bodies() {
        let pull = serde_json::to_value(PullRequest { max_messages: 100 }).unwrap();
        assert_eq!(pull, serde_json::json!({ "maxMessages": 100 }));

        let nack = serde_json::to_value(ModifyAckDeadlineRequest {
            ack_ids: vec!["a1"],
            ack_deadline_seconds: 0,
        })
        .unwrap();
        assert_eq!(
            nack,
            serde_json::json!({ "ackIds": ["a1"], "ackDeadlineSeconds": 0 })
        );
    }

    #[test]
    fn test_pull_response_decoding() {
        // {"bucket":"b1","name":"obj.png"}
        let body = r#"{
            "receivedMessages": [{
                "ackId": "ack-1",
                "message": {
                    "data": "eyJidWNrZXQiOiJiMSIsIm5hbWUiOiJvYmoucG5nIn0=",
                    "attributes": {"eventType": "OBJECT_FINALIZE", "bucketId": "b1"},
                    "messageId": "42",
                    "publishTime": "2024-01-15T10:30:00.123Z"
                },
                "deliveryAttempt": 3
            }]
        }"#;

        let response: PullResponse = serde_json::from_str(body).unwrap();
        let received = response.received_messages.into_iter().next().unwrap();
        let message = into_message(received, Arc::new(NoopAcker)).unwrap();

        assert_eq!(message.id, "42");
        assert_eq!(message.ack_id(), "ack-1");
        assert_eq!(message.data, br#"{"bucket":"b1","name":"obj.png"}"#);
        assert_eq!(
            message.attributes.get("eventType").map(String::as_str),
            Some("OBJECT_FINALIZE")
        );
        assert_eq!(message.delivery_attempt, Some(3));
        assert!(message.publish_time.is_some());
    }

    #[test]
    fn test_empty_pull_response() {
        let response: PullResponse = serde_json::from_str("{}").unwrap();
        assert!(response.received_messages.is_empty());
    }

    #[test]
    fn test_invalid_base64_returns_ack_id() {
        let received = ReceivedMessage {
            ack_id: "ack-9".to_string(),
            message: PubsubMessage {
                data: Some("!!not base64!!".to_string()),
                attributes: HashMap::new(),
                message_id: "9".to_string(),
                publish_time: None,
            },
            delivery_attempt: None,
        };

        let (ack_id, _) = into_message(received, Arc::new(NoopAcker)).unwrap_err();
        assert_eq!(ack_id, "ack-9");
    }
}
