//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Publishers that move traffic from the legacy in-process bus to the queue without a flag day.
// Both implement `EventEmitter`, so producers do not know which strategy is active.
//
// | Component             | Description                                                     |
// |-----------------------|-----------------------------------------------------------------|
// | DualEventPublisher    | Writes every event to both sinks, degrades to the bus if asked  |
// | QueueFirstPublisher   | Sends each event type to exactly one sink per classification    |
// | EventClassification   | Injected table: event type to queue-only / bus-fallback         |
//--------------------------------------------------------------------------------------------------

mod classification;
mod dual_publisher;
mod queue_first_publisher;

use thiserror::Error;

use crate::domain::models::EventType;
use crate::domain::services::events::EmitError;
use crate::domain::services::publisher::PublishError;

pub use classification::{EventBucket, EventClassification, MigrationProgress};
pub use dual_publisher::{DualEventPublisher, DualWriteConfig, DualWriteMetrics};
pub use queue_first_publisher::{QueueFirstMetrics, QueueFirstPublisher};

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Neither the event bus nor the queue is enabled")]
    NoSinkEnabled,

    #[error("Event type {0} must go through the event bus but none is configured")]
    EventBusNotConfigured(EventType),

    #[error("Event bus delivery failed: {0}")]
    EventBus(#[source] EmitError),

    #[error("Queue delivery failed: {0}")]
    Queue(#[source] PublishError),

    #[error("Both sinks failed (event bus: {event_bus}; queue: {queue})")]
    BothFailed { event_bus: EmitError, queue: PublishError },

    /// A batch stopped at its first failure; earlier events stay delivered
    #[error("Batch aborted after {published} of {total} events: {source}")]
    BatchAborted {
        published: usize,
        total: usize,
        #[source]
        source: Box<MigrationError>,
    },
}
