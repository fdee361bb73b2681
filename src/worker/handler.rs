//! Per-message handling

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::channel::Message;
use crate::event::Event;
use crate::store::{MetadataUpdate, ObjectStore, StoreError};
use crate::worker::WorkerConfig;

/// Terminal action taken for a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Acked,
    Rejected,
}

/// Applies the configured Cache-Control to the object named by each message.
///
/// Holds only read-only state, so one handler is shared by every
/// concurrently running message task.
pub struct EventHandler {
    config: Arc<WorkerConfig>,
    store: Arc<dyn ObjectStore>,
    update: MetadataUpdate,
}

impl EventHandler {
    pub fn new(config: Arc<WorkerConfig>, store: Arc<dyn ObjectStore>) -> Self {
        let update = MetadataUpdate::cache_control(config.cache_control.clone());
        Self {
            config,
            store,
            update,
        }
    }

    /// Handle one message and take exactly one terminal action on it.
    ///
    /// `stop` abandons a pending store call; the message is then rejected.
    pub async fn handle(&self, message: Message, stop: &CancellationToken) -> Outcome {
        let topic = self.config.topic.as_str();
        let message_id = message.id.clone();
        let delivery_attempt = message.delivery_attempt;

        let event = match Event::decode(&message.data) {
            Ok(event) => event,
            Err(e) => {
                error!(
                    topic = %topic,
                    message_id = %message_id,
                    delivery_attempt,
                    error = %e,
                    "cannot decode message"
                );
                self.reject(message).await;
                return Outcome::Rejected;
            }
        };

        let result = tokio::select! {
            biased;
            _ = stop.cancelled() => Err(StoreError::Cancelled),
            result = self.store.update_metadata(&event.bucket, &event.name, &self.update) => result,
        };

        if let Err(e) = result {
            error!(
                topic = %topic,
                message_id = %message_id,
                delivery_attempt,
                bucket = %event.bucket,
                name = %event.name,
                error = %e,
                "cannot update object attributes"
            );
            self.reject(message).await;
            return Outcome::Rejected;
        }

        debug!(
            topic = %topic,
            bucket = %event.bucket,
            name = %event.name,
            cache_control = %self.config.cache_control,
            "object attributes updated"
        );

        if let Err(e) = message.ack().await {
            warn!(topic = %topic, message_id = %message_id, error = %e, "cannot acknowledge message");
        }
        Outcome::Acked
    }

    async fn reject(&self, message: Message) {
        let message_id = message.id.clone();
        if let Err(e) = message.nack().await {
            warn!(
                topic = %self.config.topic,
                message_id = %message_id,
                error = %e,
                "cannot reject message"
            );
        }
    }
}
