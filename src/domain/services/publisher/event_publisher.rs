//--------------------------------------------------------------------------------------------------
// STRUCTS
//--------------------------------------------------------------------------------------------------
// | Name            | Description                                             | Key Methods           |
// |-----------------|---------------------------------------------------------|-----------------------|
// | EventPublisher  | Wraps events in envelopes and writes them to `events`   | publish, publish_batch|
// | ServerEndpoint  | Address a game server was registered with               |                       |
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use rabbitmq::topology::EVENTS_EXCHANGE;
use rabbitmq::{ChannelProvider, MessageChannel, PublishOptions};
use tracing::{debug, error, info};

use super::{PublishError, QueuePublisher};
use crate::domain::models::{Event, EventMessage, ReceivedEnvelope, SourceInfo};
use crate::domain::services::events::{EmitResult, EventEmitter};
use crate::domain::services::routing::{EventRouter, StaticRoutingTable};

/// Events per chunk in [`EventPublisher::publish_batch`].
pub const BATCH_CHUNK_SIZE: usize = 50;

const PUBLISHER_CHANNEL: &str = "publisher";
const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub address: String,
    pub port: u16,
}

/// Publishes events to the topic exchange through one dedicated channel.
pub struct EventPublisher {
    channel: Arc<dyn MessageChannel>,
    router: Arc<dyn EventRouter>,
    exchange: String,
    servers: RwLock<HashMap<i64, ServerEndpoint>>,
}

impl EventPublisher {
    pub fn new(channel: Arc<dyn MessageChannel>, router: Arc<dyn EventRouter>) -> Self {
        Self {
            channel,
            router,
            exchange: EVENTS_EXCHANGE.to_owned(),
            servers: RwLock::new(HashMap::new()),
        }
    }

    /// Opens the publisher's own channel on `provider` and routes with the
    /// built-in routing table.
    pub async fn connect(provider: &dyn ChannelProvider) -> Result<Self, PublishError> {
        let channel = provider.create_channel(PUBLISHER_CHANNEL).await?;
        Ok(Self::new(channel, Arc::new(StaticRoutingTable)))
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    /// Records where `server_id` lives; subsequent envelopes from that server
    /// carry the address and port in `metadata.source`.
    pub fn register_server(&self, server_id: i64, address: impl Into<String>, port: u16) {
        let endpoint = ServerEndpoint {
            address: address.into(),
            port,
        };
        info!(server_id, address = %endpoint.address, port, "game server registered");
        self.servers.write().insert(server_id, endpoint);
    }

    /// Wraps `event` in a new envelope, generating the event's ids if absent.
    pub fn build_envelope(&self, mut event: Event) -> EventMessage {
        event.ensure_ids();
        let correlation_id = event.correlation_id.clone().unwrap_or_default();
        let endpoint = self.servers.read().get(&event.server_id).cloned();
        let source = SourceInfo {
            server_id: event.server_id,
            server_address: endpoint.as_ref().map(|endpoint| endpoint.address.clone()),
            server_port: endpoint.map(|endpoint| endpoint.port),
        };
        let routing_key = self.router.routing_key(event.event_type);
        let priority = self.router.priority(event.event_type);

        EventMessage::new(event, correlation_id, source, routing_key, priority)
    }

    /// Publishes a single event and returns the envelope id.
    pub async fn publish(&self, event: Event) -> Result<String, PublishError> {
        let envelope = self.build_envelope(event);
        publish_envelope(self.channel.as_ref(), &self.exchange, &envelope, PublishOptions::persistent())
            .await?;
        debug!(
            message_id = %envelope.id,
            correlation_id = %envelope.correlation_id,
            routing_key = %envelope.routing_key(),
            "event published"
        );
        Ok(envelope.id)
    }

    /// Publishes `events` in chunks of [`BATCH_CHUNK_SIZE`].
    ///
    /// Events of one chunk are published concurrently, chunks one after the
    /// other in input order. A failing chunk stops the batch; chunks already
    /// published stay published and the error reports how many events made it.
    pub async fn publish_batch(&self, events: Vec<Event>) -> Result<usize, PublishError> {
        let total = events.len();
        let mut published = 0;

        for chunk in events.chunks(BATCH_CHUNK_SIZE) {
            let results = join_all(chunk.iter().cloned().map(|event| self.publish(event))).await;

            let mut first_error = None;
            for result in results {
                match result {
                    Ok(_) => published += 1,
                    Err(err) if first_error.is_none() => first_error = Some(err),
                    Err(err) => error!("additional batch publish failure: {}", err),
                }
            }

            if let Some(err) = first_error {
                error!(published, total, "batch publish aborted: {}", err);
                return Err(PublishError::BatchAborted {
                    published,
                    total,
                    source: Box::new(err),
                });
            }
        }

        info!(published, "batch published");
        Ok(published)
    }
}

/// Serialises `envelope` and publishes it at its routing key and priority.
pub(crate) async fn publish_envelope(
    channel: &dyn MessageChannel,
    exchange: &str,
    envelope: &EventMessage,
    options: PublishOptions,
) -> Result<(), PublishError> {
    let content = serde_json::to_vec(envelope)?;
    publish_encoded(
        channel,
        exchange,
        envelope,
        envelope.payload.event_type.as_str(),
        content,
        options,
    )
    .await
}

/// Republishes a delivered envelope from the JSON it arrived as.
///
/// Used by the consumer for retries on its own channel.
pub(crate) async fn publish_received(
    channel: &dyn MessageChannel,
    exchange: &str,
    received: &ReceivedEnvelope,
    options: PublishOptions,
) -> Result<(), PublishError> {
    let content = received.to_vec()?;
    publish_encoded(
        channel,
        exchange,
        &received.envelope,
        received.event_type_name(),
        content,
        options,
    )
    .await
}

async fn publish_encoded(
    channel: &dyn MessageChannel,
    exchange: &str,
    envelope: &EventMessage,
    event_type: &str,
    content: Vec<u8>,
    options: PublishOptions,
) -> Result<(), PublishError> {
    let options = options
        .with_priority(envelope.priority().amqp_priority())
        .with_message_id(envelope.id.clone())
        .with_correlation_id(envelope.correlation_id.clone())
        .with_content_type(JSON_CONTENT_TYPE)
        .with_header("correlationId", envelope.correlation_id.clone())
        .with_header("eventType", event_type)
        .with_header("serverId", envelope.payload.server_id.to_string())
        .with_header("routingKey", envelope.routing_key());

    channel
        .publish(exchange, envelope.routing_key(), content, options)
        .await
        .map_err(PublishError::from)
}

#[async_trait]
impl QueuePublisher for EventPublisher {
    async fn publish(&self, event: Event) -> Result<String, PublishError> {
        EventPublisher::publish(self, event).await
    }
}

#[async_trait]
impl EventEmitter for EventPublisher {
    async fn emit(&self, event: Event) -> EmitResult<()> {
        EventPublisher::publish(self, event).await?;
        Ok(())
    }
}
