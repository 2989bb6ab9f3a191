use async_trait::async_trait;
use rabbitmq::RabbitMQError;
use thiserror::Error;

use crate::domain::models::Event;

pub mod event_publisher;

pub use event_publisher::{BATCH_CHUNK_SIZE, EventPublisher};

/// Errors raised while handing events to the broker.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The envelope could not be encoded as JSON
    #[error("Failed to serialise envelope: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker or the channel refused the message
    #[error("Broker error: {0}")]
    Broker(#[from] RabbitMQError),

    /// A batch chunk failed; earlier chunks stay published
    #[error("Batch aborted after {published} of {total} events: {source}")]
    BatchAborted {
        published: usize,
        total: usize,
        #[source]
        source: Box<PublishError>,
    },
}

/// Publishes single events to the queue.
///
/// Implemented by [`EventPublisher`]; the migration publishers depend on this
/// trait rather than on the concrete publisher.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    /// Publishes `event` and returns the id of the envelope that carried it.
    ///
    /// # Errors
    /// * `PublishError::Serialization` - If the envelope cannot be encoded
    /// * `PublishError::Broker` - If the channel rejects the publish
    async fn publish(&self, event: Event) -> Result<String, PublishError>;
}

#[cfg(test)]
use mockall::*;

#[cfg(test)]
mock! {
    pub QueuePublisher {}

    #[async_trait]
    impl QueuePublisher for QueuePublisher {
        async fn publish(&self, event: Event) -> Result<String, PublishError>;
    }
}
