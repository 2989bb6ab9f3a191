use std::{collections::BTreeMap, sync::Arc};

use amqprs::{
    BasicProperties, FieldTable,
    channel::{
        BasicAckArguments, BasicConsumeArguments, BasicNackArguments, BasicPublishArguments,
        Channel, QueueDeclareArguments,
    },
};
use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, warn};

use crate::{RabbitMQError, topology::short_str};

/// Stream of deliveries for one consumed queue.
pub type DeliveryStream = UnboundedReceiver<Delivery>;

/// One message handed to a consumer with manual acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub routing_key: String,
    pub redelivered: bool,
    pub content: Vec<u8>,
}

/// Per-message publish properties.
///
/// The message's own fields (id, priority, correlation) travel in AMQP
/// properties; `headers` are copied into the header table verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub persistent: bool,
    pub priority: u8,
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl PublishOptions {
    pub fn persistent() -> Self {
        Self {
            persistent: true,
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Converts the options into AMQP message properties
    ///
    /// # Arguments
    /// * `app_id` - Application identifier stamped on every message
    ///
    /// # Errors
    /// Returns `RabbitMQError::HeaderError` if a header name is longer than an AMQP short string
    fn into_basic_props(self, app_id: &str) -> Result<BasicProperties, RabbitMQError> {
        let mut props = BasicProperties::default();
        props
            .with_app_id(app_id)
            .with_delivery_mode(if self.persistent { 2 } else { 1 })
            .with_priority(self.priority);

        if let Some(message_id) = &self.message_id {
            props.with_message_id(message_id);
        }
        if let Some(correlation_id) = &self.correlation_id {
            props.with_correlation_id(correlation_id);
        }
        if let Some(content_type) = &self.content_type {
            props.with_content_type(content_type);
        }

        let mut headers = FieldTable::new();
        for (name, value) in self.headers {
            headers.insert(short_str(&name)?, value.into());
        }
        props.with_headers(headers);

        Ok(props.finish())
    }
}

/// Operations the publisher and the consumer need from one broker channel.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Name the channel was created under
    fn name(&self) -> &str;

    /// Whether the underlying channel can still be used
    fn is_open(&self) -> bool;

    /// Publishes `content` to `exchange` with `routing_key`
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content: Vec<u8>,
        options: PublishOptions,
    ) -> Result<(), RabbitMQError>;

    /// Starts consuming `queue` with manual acknowledgement
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, RabbitMQError>;

    async fn ack(&self, delivery_tag: u64) -> Result<(), RabbitMQError>;

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), RabbitMQError>;

    /// Number of ready messages in `queue`
    async fn message_count(&self, queue: &str) -> Result<u32, RabbitMQError>;

    async fn close(&self) -> Result<(), RabbitMQError>;
}

/// Hands out named channels.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Returns the channel cached under `name`, opening it on first use
    async fn create_channel(&self, name: &str) -> Result<Arc<dyn MessageChannel>, RabbitMQError>;
}

/// [`MessageChannel`] backed by an `amqprs` channel.
pub struct AmqpChannel {
    name: String,
    app_id: String,
    channel: Channel,
}

impl AmqpChannel {
    pub(crate) fn new(name: &str, app_id: &str, channel: Channel) -> Self {
        Self {
            name: name.to_owned(),
            app_id: app_id.to_owned(),
            channel,
        }
    }
}

#[async_trait]
impl MessageChannel for AmqpChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content: Vec<u8>,
        options: PublishOptions,
    ) -> Result<(), RabbitMQError> {
        if !self.channel.is_open() {
            return Err(RabbitMQError::PublishError(format!(
                "channel {} is closed",
                self.name
            )));
        }

        let props = options.into_basic_props(&self.app_id)?;
        self.channel
            .basic_publish(props, content, BasicPublishArguments::new(exchange, routing_key))
            .await
            .map_err(|err| RabbitMQError::PublishError(err.to_string()))
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, RabbitMQError> {
        let (ctag, mut rx) = self
            .channel
            .basic_consume_rx(
                BasicConsumeArguments::new(queue, consumer_tag)
                    .auto_ack(false)
                    .finish(),
            )
            .await
            .map_err(|err| RabbitMQError::SubscriptionError(err.to_string()))?;

        debug!(queue, consumer_tag = %ctag, "consumer registered");

        let (tx, deliveries) = mpsc::unbounded_channel();
        let queue = queue.to_owned();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let Some(deliver) = message.deliver else {
                    warn!(%queue, "message without delivery information dropped");
                    continue;
                };
                let delivery = Delivery {
                    delivery_tag: deliver.delivery_tag(),
                    routing_key: deliver.routing_key().to_owned(),
                    redelivered: deliver.redelivered(),
                    content: message.content.unwrap_or_default(),
                };
                if tx.send(delivery).is_err() {
                    debug!(%queue, "delivery stream dropped");
                    break;
                }
            }
            debug!(%queue, "consumer stream ended");
        });

        Ok(deliveries)
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), RabbitMQError> {
        self.channel
            .basic_ack(BasicAckArguments::new(delivery_tag, false))
            .await
            .map_err(|err| RabbitMQError::AckMessageError(err.to_string()))
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), RabbitMQError> {
        self.channel
            .basic_nack(BasicNackArguments::new(delivery_tag, false, requeue))
            .await
            .map_err(|err| RabbitMQError::NackMessageError(err.to_string()))
    }

    async fn message_count(&self, queue: &str) -> Result<u32, RabbitMQError> {
        let declared = self
            .channel
            .queue_declare(QueueDeclareArguments::new(queue).passive(true).finish())
            .await
            .map_err(|err| RabbitMQError::QueueDeclarationError(err.to_string()))?;

        Ok(declared.map(|(_, message_count, _)| message_count).unwrap_or(0))
    }

    async fn close(&self) -> Result<(), RabbitMQError> {
        if !self.channel.is_open() {
            return Ok(());
        }
        self.channel
            .clone()
            .close()
            .await
            .map_err(|err| RabbitMQError::CloseChannelError(err.to_string()))
    }
}
