//! Exchange, queue and binding layout of the event queue.
//!
//! ```text
//!   publish ──▶ [events] (topic) ──┬──▶ priority ─┐
//!                                  ├──▶ standard ─┼─ rejected ──▶ [events.dlx] (topic) ──#──▶ events.dlq
//!                                  └──▶ bulk ─────┘
//! ```
//!
//! Every declaration is idempotent, so [`Topology::assert`] runs again on
//! every (re)connect.

use amqprs::{
    FieldTable, FieldValue, ShortStr,
    channel::{Channel, ExchangeDeclareArguments, QueueBindArguments, QueueDeclareArguments},
};
use tracing::{debug, info};

use crate::RabbitMQError;

pub const EVENTS_EXCHANGE: &str = "events";
pub const DEAD_LETTER_EXCHANGE: &str = "events.dlx";
pub const DEAD_LETTER_QUEUE: &str = "events.dlq";

/// Highest AMQP priority the main queues honour.
pub const MAX_PRIORITY: i32 = 10;

const TOPIC: &str = "topic";

/// A durable main queue and the routing-key patterns bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub bindings: Vec<String>,
}

impl QueueSpec {
    pub fn new(name: impl Into<String>, bindings: Vec<String>) -> Self {
        Self {
            name: name.into(),
            bindings,
        }
    }
}

/// Full broker layout: one topic exchange for traffic, one for dead letters,
/// the main queues, and a single wildcard-bound DLQ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub dead_letter_exchange: String,
    pub dead_letter_queue: String,
    pub queues: Vec<QueueSpec>,
}

impl Topology {
    pub fn new(queues: Vec<QueueSpec>) -> Self {
        Self {
            exchange: EVENTS_EXCHANGE.to_owned(),
            dead_letter_exchange: DEAD_LETTER_EXCHANGE.to_owned(),
            dead_letter_queue: DEAD_LETTER_QUEUE.to_owned(),
            queues,
        }
    }

    pub fn queue_names(&self) -> impl Iterator<Item = &str> {
        self.queues.iter().map(|queue| queue.name.as_str())
    }

    /// Declares exchanges, queues and bindings on `channel`.
    pub async fn assert(&self, channel: &Channel) -> Result<(), RabbitMQError> {
        info!(
            exchange = %self.exchange,
            queues = self.queues.len(),
            "asserting broker topology"
        );

        for exchange in [&self.exchange, &self.dead_letter_exchange] {
            channel
                .exchange_declare(
                    ExchangeDeclareArguments::new(exchange, TOPIC)
                        .durable(true)
                        .auto_delete(false)
                        .finish(),
                )
                .await
                .map_err(|err| RabbitMQError::ExchangeDeclarationError(err.to_string()))?;
        }

        let queue_arguments = self.main_queue_arguments()?;
        for queue in &self.queues {
            channel
                .queue_declare(
                    QueueDeclareArguments::new(&queue.name)
                        .durable(true)
                        .auto_delete(false)
                        .arguments(queue_arguments.clone())
                        .finish(),
                )
                .await
                .map_err(|err| RabbitMQError::QueueDeclarationError(err.to_string()))?;

            for pattern in &queue.bindings {
                channel
                    .queue_bind(QueueBindArguments::new(&queue.name, &self.exchange, pattern))
                    .await
                    .map_err(|err| RabbitMQError::QueueBindingError(err.to_string()))?;
            }
            debug!(queue = %queue.name, bindings = queue.bindings.len(), "queue declared");
        }

        channel
            .queue_declare(
                QueueDeclareArguments::new(&self.dead_letter_queue)
                    .durable(true)
                    .auto_delete(false)
                    .finish(),
            )
            .await
            .map_err(|err| RabbitMQError::QueueDeclarationError(err.to_string()))?;
        channel
            .queue_bind(QueueBindArguments::new(
                &self.dead_letter_queue,
                &self.dead_letter_exchange,
                "#",
            ))
            .await
            .map_err(|err| RabbitMQError::QueueBindingError(err.to_string()))?;

        info!("broker topology asserted");
        Ok(())
    }

    fn main_queue_arguments(&self) -> Result<FieldTable, RabbitMQError> {
        let mut arguments = FieldTable::new();
        arguments.insert(
            short_str("x-dead-letter-exchange")?,
            self.dead_letter_exchange.clone().into(),
        );
        arguments.insert(short_str("x-max-priority")?, FieldValue::I(MAX_PRIORITY));
        Ok(arguments)
    }
}

pub(crate) fn short_str(value: &str) -> Result<ShortStr, RabbitMQError> {
    ShortStr::try_from(value).map_err(|err| RabbitMQError::HeaderError(format!("{value}: {err}")))
}
