use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::MigrationError;
use crate::domain::models::Event;
use crate::domain::services::events::{EmitResult, EventEmitter};
use crate::domain::services::publisher::{PublishError, QueuePublisher};

/// Which sinks the dual-write publisher uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DualWriteConfig {
    pub enable_event_bus: bool,
    pub enable_queue: bool,
    /// Treat an event as delivered when only the event bus took it
    pub graceful_fallback: bool,
}

impl Default for DualWriteConfig {
    fn default() -> Self {
        Self {
            enable_event_bus: true,
            enable_queue: true,
            graceful_fallback: true,
        }
    }
}

/// Running migration-health counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DualWriteMetrics {
    pub event_bus_success: u64,
    pub event_bus_failures: u64,
    pub queue_success: u64,
    pub queue_failures: u64,
    /// Both sinks took the event
    pub dual_success: u64,
    /// Queue failed, event kept only on the bus
    pub fallback_to_event_bus: u64,
}

/// Writes every event to the legacy bus and to the queue at the same time.
///
/// | Event bus | Queue  | Result                                              |
/// |-----------|--------|-----------------------------------------------------|
/// | ok        | ok     | delivered                                           |
/// | ok        | failed | delivered if `graceful_fallback`, error otherwise   |
/// | failed    | ok     | delivered, bus failure logged                       |
/// | failed    | failed | error                                               |
///
/// With a single sink enabled the result is that sink's result.
pub struct DualEventPublisher {
    event_bus: Option<Arc<dyn EventEmitter>>,
    queue: Option<Arc<dyn QueuePublisher>>,
    config: DualWriteConfig,
    metrics: Mutex<DualWriteMetrics>,
}

impl DualEventPublisher {
    pub fn new(
        event_bus: Option<Arc<dyn EventEmitter>>,
        queue: Option<Arc<dyn QueuePublisher>>,
        config: DualWriteConfig,
    ) -> Self {
        info!(
            event_bus = event_bus.is_some() && config.enable_event_bus,
            queue = queue.is_some() && config.enable_queue,
            graceful_fallback = config.graceful_fallback,
            "dual-write publisher created"
        );
        Self {
            event_bus,
            queue,
            config,
            metrics: Mutex::new(DualWriteMetrics::default()),
        }
    }

    fn event_bus_sink(&self) -> Option<&Arc<dyn EventEmitter>> {
        self.event_bus.as_ref().filter(|_| self.config.enable_event_bus)
    }

    fn queue_sink(&self) -> Option<&Arc<dyn QueuePublisher>> {
        self.queue.as_ref().filter(|_| self.config.enable_queue)
    }

    /// Delivers `event` to every enabled sink concurrently.
    ///
    /// # Errors
    /// * `MigrationError::NoSinkEnabled` - If neither sink is enabled
    /// * `MigrationError::EventBus` / `MigrationError::Queue` - If the only enabled sink failed
    /// * `MigrationError::Queue` - If the queue failed and `graceful_fallback` is off
    /// * `MigrationError::BothFailed` - If both sinks failed
    pub async fn publish(&self, mut event: Event) -> Result<(), MigrationError> {
        let event_bus = self.event_bus_sink();
        let queue = self.queue_sink();
        if event_bus.is_none() && queue.is_none() {
            return Err(MigrationError::NoSinkEnabled);
        }

        event.ensure_ids();
        let bus_event = event.clone();
        let bus_write = async move {
            match event_bus {
                Some(bus) => Some(bus.emit(bus_event).await),
                None => None,
            }
        };
        let event_type = event.event_type;
        let event_id = event.event_id.clone().unwrap_or_default();
        let queue_write = async move {
            match queue {
                Some(queue) => Some(queue.publish(event).await.map(|_| ())),
                None => None,
            }
        };
        let (bus_result, queue_result) = tokio::join!(bus_write, queue_write);

        self.record(&bus_result, &queue_result);

        match (bus_result, queue_result) {
            (Some(Ok(())), Some(Ok(()))) | (Some(Ok(())), None) | (None, Some(Ok(()))) => {
                debug!(%event_type, %event_id, "event delivered");
                Ok(())
            }
            (Some(Ok(())), Some(Err(queue_err))) => {
                if self.config.graceful_fallback {
                    warn!(
                        %event_type,
                        %event_id,
                        "queue write failed, event delivered through the event bus only: {}",
                        queue_err
                    );
                    self.metrics.lock().fallback_to_event_bus += 1;
                    Ok(())
                } else {
                    error!(%event_type, %event_id, "queue write failed: {}", queue_err);
                    Err(MigrationError::Queue(queue_err))
                }
            }
            (Some(Err(bus_err)), Some(Ok(()))) => {
                warn!(
                    %event_type,
                    %event_id,
                    "event bus write failed, event delivered through the queue only: {}",
                    bus_err
                );
                Ok(())
            }
            (Some(Err(bus_err)), Some(Err(queue_err))) => {
                error!(%event_type, %event_id, "both sinks failed");
                Err(MigrationError::BothFailed {
                    event_bus: bus_err,
                    queue: queue_err,
                })
            }
            (Some(Err(bus_err)), None) => Err(MigrationError::EventBus(bus_err)),
            (None, Some(Err(queue_err))) => Err(MigrationError::Queue(queue_err)),
            (None, None) => Err(MigrationError::NoSinkEnabled),
        }
    }

    /// Publishes `events` one after the other, keeping their relative order
    /// on both sinks. Stops at the first failing event.
    pub async fn publish_batch(&self, events: Vec<Event>) -> Result<usize, MigrationError> {
        let total = events.len();
        for (published, event) in events.into_iter().enumerate() {
            if let Err(err) = self.publish(event).await {
                return Err(MigrationError::BatchAborted {
                    published,
                    total,
                    source: Box::new(err),
                });
            }
        }
        Ok(total)
    }

    pub fn metrics(&self) -> DualWriteMetrics {
        *self.metrics.lock()
    }

    pub fn reset_metrics(&self) {
        *self.metrics.lock() = DualWriteMetrics::default();
        info!("dual-write metrics reset");
    }

    fn record(&self, bus: &Option<EmitResult<()>>, queue: &Option<Result<(), PublishError>>) {
        let mut metrics = self.metrics.lock();
        match bus {
            Some(Ok(())) => metrics.event_bus_success += 1,
            Some(Err(_)) => metrics.event_bus_failures += 1,
            None => {}
        }
        match queue {
            Some(Ok(())) => metrics.queue_success += 1,
            Some(Err(_)) => metrics.queue_failures += 1,
            None => {}
        }
        if matches!((bus, queue), (Some(Ok(())), Some(Ok(())))) {
            metrics.dual_success += 1;
        }
    }
}

#[async_trait]
impl EventEmitter for DualEventPublisher {
    async fn emit(&self, event: Event) -> EmitResult<()> {
        self.publish(event).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::EventType;
    use crate::domain::services::events::{EmitError, MockEventEmitter};
    use crate::domain::services::publisher::MockQueuePublisher;
    use rabbitmq::RabbitMQError;
    use serde_json::json;

    fn bus(ok: bool) -> Arc<dyn EventEmitter> {
        let mut bus = MockEventEmitter::new();
        bus.expect_emit().returning(move |_| {
            if ok {
                Ok(())
            } else {
                Err(EmitError::Bus("bus closed".into()))
            }
        });
        Arc::new(bus)
    }

    fn queue(ok: bool) -> Arc<dyn QueuePublisher> {
        let mut queue = MockQueuePublisher::new();
        queue.expect_publish().returning(move |_| {
            if ok {
                Ok("msg-1".into())
            } else {
                Err(PublishError::Broker(RabbitMQError::NotConnected))
            }
        });
        Arc::new(queue)
    }

    fn event() -> Event {
        Event::new(EventType::PlayerKill, 1, json!({"weapon": "BP_AK74"}))
    }

    fn config(graceful_fallback: bool) -> DualWriteConfig {
        DualWriteConfig {
            graceful_fallback,
            ..DualWriteConfig::default()
        }
    }

    #[tokio::test]
    async fn both_sinks_succeed() {
        let publisher = DualEventPublisher::new(Some(bus(true)), Some(queue(true)), config(true));

        publisher.publish(event()).await.unwrap();

        let metrics = publisher.metrics();
        assert_eq!(metrics.event_bus_success, 1);
        assert_eq!(metrics.queue_success, 1);
        assert_eq!(metrics.dual_success, 1);
        assert_eq!(metrics.fallback_to_event_bus, 0);
    }

    #[tokio::test]
    async fn queue_failure_degrades_to_event_bus() {
        // Setup
        let publisher = DualEventPublisher::new(Some(bus(true)), Some(queue(false)), config(true));

        // Execute
        let result = publisher.publish(event()).await;

        // Verify
        assert!(result.is_ok());
        let metrics = publisher.metrics();
        assert_eq!(metrics.fallback_to_event_bus, 1);
        assert_eq!(metrics.queue_failures, 1);
        assert_eq!(metrics.dual_success, 0);
    }

    #[tokio::test]
    async fn queue_failure_without_fallback_is_an_error() {
        let publisher = DualEventPublisher::new(Some(bus(true)), Some(queue(false)), config(false));

        let result = publisher.publish(event()).await;

        assert!(matches!(result, Err(MigrationError::Queue(_))));
        assert_eq!(publisher.metrics().fallback_to_event_bus, 0);
    }

    #[tokio::test]
    async fn event_bus_failure_is_tolerated_when_queue_succeeds() {
        let publisher = DualEventPublisher::new(Some(bus(false)), Some(queue(true)), config(false));

        assert!(publisher.publish(event()).await.is_ok());
        assert_eq!(publisher.metrics().event_bus_failures, 1);
    }

    #[tokio::test]
    async fn both_failing_is_an_error() {
        let publisher = DualEventPublisher::new(Some(bus(false)), Some(queue(false)), config(true));

        let result = publisher.publish(event()).await;

        assert!(matches!(result, Err(MigrationError::BothFailed { .. })));
    }

    #[tokio::test]
    async fn only_enabled_sink_failing_is_an_error() {
        let queue_only = DualWriteConfig {
            enable_event_bus: false,
            ..DualWriteConfig::default()
        };
        let publisher = DualEventPublisher::new(Some(bus(true)), Some(queue(false)), queue_only);

        let result = publisher.publish(event()).await;

        assert!(matches!(result, Err(MigrationError::Queue(_))));
        assert_eq!(publisher.metrics().event_bus_success, 0);
    }

    #[tokio::test]
    async fn no_sink_enabled() {
        let publisher = DualEventPublisher::new(None, None, DualWriteConfig::default());

        assert!(matches!(
            publisher.publish(event()).await,
            Err(MigrationError::NoSinkEnabled)
        ));
    }

    #[tokio::test]
    async fn batch_is_sequential_and_stops_at_first_failure() {
        let mut bus = MockEventEmitter::new();
        let mut sequence = mockall::Sequence::new();
        bus.expect_emit()
            .times(2)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));
        bus.expect_emit()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Err(EmitError::Bus("bus closed".into())));
        let publisher = DualEventPublisher::new(
            Some(Arc::new(bus)),
            None,
            DualWriteConfig {
                enable_queue: false,
                ..DualWriteConfig::default()
            },
        );

        let result = publisher.publish_batch(vec![event(), event(), event(), event()]).await;

        match result {
            Err(MigrationError::BatchAborted { published, total, .. }) => {
                assert_eq!(published, 2);
                assert_eq!(total, 4);
            }
            other => panic!("expected an aborted batch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn reset_clears_metrics() {
        let publisher = DualEventPublisher::new(Some(bus(true)), Some(queue(true)), config(true));
        publisher.publish(event()).await.unwrap();

        publisher.reset_metrics();

        assert_eq!(publisher.metrics(), DualWriteMetrics::default());
    }
}
