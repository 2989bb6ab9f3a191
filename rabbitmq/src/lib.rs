//! Broker plumbing for the event queue.
//!
//! This crate owns everything that talks AMQP 0-9-1 through `amqprs`:
//!
//! - [`ConnectionManager`]: connection lifecycle, reconnect with backoff,
//!   per-name channel cache and topology assertion
//! - [`Topology`]: the exchanges, queues and bindings the event queue relies on
//! - [`MessageChannel`] / [`ChannelProvider`]: the seam the publisher and the
//!   consumer talk to, so their pipelines can run against an in-memory channel
//! - [`backoff`]: the exponential delay formula shared by reconnects and retries

pub mod backoff;
mod callbacks;
pub mod channel;
pub mod connection;
pub mod topology;

pub use channel::{AmqpChannel, ChannelProvider, Delivery, DeliveryStream, MessageChannel, PublishOptions};
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionRetry, ConnectionStats};
pub use topology::{QueueSpec, Topology};

/// Error types for RabbitMQ operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RabbitMQError {
    /// Error in the provided URI
    #[error("Provided URI Error: {0}")]
    UriError(String),
    /// Error establishing connection
    #[error("Connection error: {0}")]
    ConnectionError(String),
    /// A connection attempt is already running
    #[error("A connection attempt is already in progress")]
    ConnectionInProgress,
    /// The manager already holds an open connection
    #[error("Already connected to the broker")]
    AlreadyConnected,
    /// No open connection to work with
    #[error("Not connected to the broker")]
    NotConnected,
    /// Every connection attempt failed
    #[error("Failed to connect after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    /// Error opening a channel
    #[error("Error while opening a rabbitmq channel: {0}")]
    OpenChannelError(String),
    /// Error setting the channel prefetch
    #[error("Error while setting channel prefetch: {0}")]
    QosError(String),
    /// Error declaring a queue
    #[error("Error while declaring a queue: {0}")]
    QueueDeclarationError(String),
    /// Error declaring an exchange
    #[error("Error while declaring a exchange: {0}")]
    ExchangeDeclarationError(String),
    /// Error starting to consume from a subscription
    #[error("Error while starting to consume from a subscription: {0}")]
    SubscriptionError(String),
    /// Error binding a queue to an exchange
    #[error("Error while binding a queue to exchange: {0}")]
    QueueBindingError(String),
    /// Error closing a channel
    #[error("Error while closing a channel: {0}")]
    CloseChannelError(String),
    /// Error publishing a message
    #[error("Error while publishing a message: {0}")]
    PublishError(String),
    /// Error while acknowledging a message failed
    #[error("Error while acknowledging a message: {0}")]
    AckMessageError(String),
    /// Error while negatively acknowledging a message
    #[error("Error while rejecting a message: {0}")]
    NackMessageError(String),
    /// Header name or value could not be encoded as an AMQP field
    #[error("Invalid message header {0}")]
    HeaderError(String),
}
