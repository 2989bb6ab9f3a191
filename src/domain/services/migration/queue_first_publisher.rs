use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::{EventBucket, EventClassification, MigrationError, MigrationProgress};
use crate::domain::models::{Event, EventType};
use crate::domain::services::events::{EmitResult, EventEmitter};
use crate::domain::services::publisher::QueuePublisher;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFirstMetrics {
    pub total_events: u64,
    pub queue_only_events: u64,
    pub event_bus_fallback_events: u64,
    pub failed_events: u64,
}

impl QueueFirstMetrics {
    /// Percentage of events delivered, rounded; 100 before any event.
    pub fn queue_only_success_rate(&self) -> u64 {
        if self.total_events == 0 {
            return 100;
        }
        let delivered = self.total_events.saturating_sub(self.failed_events);
        (delivered as f64 / self.total_events as f64 * 100.0).round() as u64
    }
}

/// Sends each event to exactly one sink, chosen by its type's classification.
///
/// Queue-only types go to the queue. Fallback types go to the legacy bus,
/// and so do types missing from the classification, with a warning, so new
/// event types never silently vanish.
pub struct QueueFirstPublisher {
    queue: Arc<dyn QueuePublisher>,
    event_bus: Option<Arc<dyn EventEmitter>>,
    classification: EventClassification,
    metrics: Mutex<QueueFirstMetrics>,
}

impl QueueFirstPublisher {
    pub fn new(
        queue: Arc<dyn QueuePublisher>,
        event_bus: Option<Arc<dyn EventEmitter>>,
        classification: EventClassification,
    ) -> Self {
        let progress = classification.progress();
        info!(
            queue_only_types = progress.queue_only_types,
            fallback_types = progress.event_bus_fallback_types,
            "queue-first publisher created, {:.0}% of classified types migrated",
            progress.percent_migrated
        );
        Self {
            queue,
            event_bus,
            classification,
            metrics: Mutex::new(QueueFirstMetrics::default()),
        }
    }

    /// # Errors
    /// * `MigrationError::EventBusNotConfigured` - If the event needs the legacy bus and there is none
    /// * `MigrationError::Queue` / `MigrationError::EventBus` - If the chosen sink failed
    pub async fn emit(&self, event: Event) -> Result<(), MigrationError> {
        self.metrics.lock().total_events += 1;

        let event_type = event.event_type;
        let bucket = match self.classification.classify(event_type) {
            EventBucket::Unknown => {
                warn!(%event_type, "unclassified event type, using the event bus");
                EventBucket::EventBusFallback
            }
            bucket => bucket,
        };

        let result = match bucket {
            EventBucket::QueueOnly => self
                .queue
                .publish(event)
                .await
                .map(|_| ())
                .map_err(MigrationError::Queue),
            _ => match &self.event_bus {
                Some(event_bus) => event_bus.emit(event).await.map_err(MigrationError::EventBus),
                None => Err(MigrationError::EventBusNotConfigured(event_type)),
            },
        };

        let mut metrics = self.metrics.lock();
        match &result {
            Ok(()) if bucket == EventBucket::QueueOnly => metrics.queue_only_events += 1,
            Ok(()) => metrics.event_bus_fallback_events += 1,
            Err(err) => {
                metrics.failed_events += 1;
                error!(%event_type, "queue-first delivery failed: {}", err);
            }
        }
        debug!(%event_type, ?bucket, "queue-first emit finished");
        result
    }

    /// Emits `events` in order, stopping at the first failure.
    pub async fn emit_batch(&self, events: Vec<Event>) -> Result<usize, MigrationError> {
        let total = events.len();
        for (published, event) in events.into_iter().enumerate() {
            if let Err(err) = self.emit(event).await {
                return Err(MigrationError::BatchAborted {
                    published,
                    total,
                    source: Box::new(err),
                });
            }
        }
        Ok(total)
    }

    pub fn classification(&self) -> &EventClassification {
        &self.classification
    }

    pub fn migration_progress(&self) -> MigrationProgress {
        self.classification.progress()
    }

    /// Records the intent to move `event_type` to the queue.
    ///
    /// Reclassification is a deliberate manual step: it takes a new
    /// [`EventClassification`] at construction, not a runtime toggle.
    pub fn migrate_event_to_queue_only(&self, event_type: EventType) {
        let current = self.classification.classify(event_type);
        info!(
            %event_type,
            ?current,
            "migration to queue-only requested; update the classification to apply it"
        );
    }

    pub fn metrics(&self) -> QueueFirstMetrics {
        *self.metrics.lock()
    }

    pub fn reset_metrics(&self) {
        *self.metrics.lock() = QueueFirstMetrics::default();
    }
}

#[async_trait]
impl EventEmitter for QueueFirstPublisher {
    async fn emit(&self, event: Event) -> EmitResult<()> {
        QueueFirstPublisher::emit(self, event).await?;
        Ok(())
    }
}
