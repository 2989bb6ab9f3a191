//! Event queue for game-server telemetry.
//!
//! Events are wrapped in versioned envelopes, published to a RabbitMQ topic
//! exchange by [`EventPublisher`], and consumed by [`EventConsumer`], which
//! retries failures with backoff before letting the broker dead-letter them.
//! [`DualEventPublisher`] and [`QueueFirstPublisher`] move producers off the
//! legacy in-process bus one event type at a time.

pub mod config;
pub mod domain;

pub use config::{ConfigError, QueueConfig};
pub use domain::models::{
    ENVELOPE_VERSION, Event, EventMessage, EventType, MessageHints, MessageMetadata, Priority,
    RoutingInfo, SourceInfo,
};
pub use domain::services::consumer::{
    ConsumerConfig, ConsumerError, ConsumerState, ConsumerStats, DefaultMessageValidator,
    DeliveryError, EventConsumer, MessageValidator, ValidationError,
};
pub use domain::services::events::{EmitError, EmitResult, EventEmitter, InProcessEventBus};
pub use domain::services::migration::{
    DualEventPublisher, DualWriteConfig, DualWriteMetrics, EventBucket, EventClassification,
    MigrationError, MigrationProgress, QueueFirstMetrics, QueueFirstPublisher,
};
pub use domain::services::processor::{
    Coordinator, EventHandler, EventProcessor, HandlerError, HandlerRegistry, HandlerResult,
    ModuleEventProcessor, ModuleRegistry, ProcessingError, RegisteredHandler,
};
pub use domain::services::publisher::{EventPublisher, PublishError, QueuePublisher};
pub use domain::services::routing::{EventRouter, StaticRoutingTable, build_topology};
