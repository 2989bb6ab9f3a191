//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Multi-queue consumer. Every delivery runs through the same pipeline:
//
//   paused? ──yes──▶ nack + requeue
//     │no
//   parse ──fail──▶ reject (no requeue, never retried)
//     │
//   validate ─┐
//   process ──┴─fail──▶ retry_count < max_retries ? ack + republish later : reject ▶ DLQ
//     │ok
//   ack + latency sample
//
// A delivery stream ended by the broker halts the whole consumer: state() reads
// Stopped and start() may be called again.
//
// | Component         | Description                                                        |
// |-------------------|--------------------------------------------------------------------|
// | EventConsumer     | start / stop / pause / resume / stats over N queues                |
// | ConsumerConfig    | Queues, retry policy and concurrency                               |
// | ConsumerStats     | Counters, rolling average latency and queue depth                  |
// | MessageValidator  | Pluggable envelope check run before processing                     |
// | retry             | Backoff with upward-only jitter                                    |
//--------------------------------------------------------------------------------------------------

mod event_consumer;
pub mod retry;
mod stats;
mod validator;


use std::time::Duration;

use rabbitmq::RabbitMQError;
use rabbitmq::topology::EVENTS_EXCHANGE;
use thiserror::Error;

use crate::domain::services::processor::ProcessingError;
use crate::domain::services::routing::{BULK_QUEUE, PRIORITY_QUEUE, STANDARD_QUEUE};

pub use event_consumer::EventConsumer;
pub use stats::{ConsumerState, ConsumerStats};
pub use validator::{DefaultMessageValidator, MessageValidator, ValidationError};

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("Consumer is already running")]
    AlreadyRunning,

    #[error("Broker error: {0}")]
    Broker(#[from] RabbitMQError),
}

/// Why a delivery was not acknowledged.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The body is not a valid envelope
    #[error("Malformed envelope: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid envelope: {0}")]
    Validation(#[from] ValidationError),

    #[error("Processing failed: {0}")]
    Processing(#[from] ProcessingError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Queues to consume, one channel each
    pub queues: Vec<String>,
    /// Exchange retries are republished to
    pub exchange: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// Deliveries processed at the same time across all queues
    pub concurrency: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            queues: vec![
                PRIORITY_QUEUE.to_owned(),
                STANDARD_QUEUE.to_owned(),
                BULK_QUEUE.to_owned(),
            ],
            exchange: EVENTS_EXCHANGE.to_owned(),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            concurrency: 10,
        }
    }
}
