use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{debug, warn};

use super::{Coordinator, EventProcessor, ModuleRegistry, ProcessingError};
use crate::domain::models::Event;

/// Default [`EventProcessor`].
///
/// Phase one runs every module handler registered for the event type
/// concurrently; the first failure fails the whole call and handlers that
/// already ran are not compensated. Phase two runs the coordinators one by
/// one in registration order and stops at the first failure.
pub struct ModuleEventProcessor {
    registry: Arc<dyn ModuleRegistry>,
    coordinators: Vec<Arc<dyn Coordinator>>,
}

impl ModuleEventProcessor {
    pub fn new(registry: Arc<dyn ModuleRegistry>) -> Self {
        Self {
            registry,
            coordinators: Vec::new(),
        }
    }

    pub fn with_coordinator(mut self, coordinator: Arc<dyn Coordinator>) -> Self {
        self.coordinators.push(coordinator);
        self
    }

    async fn run_handlers(&self, event: &Event) -> Result<(), ProcessingError> {
        let handlers = self.registry.handlers_for_event(event.event_type);
        if handlers.is_empty() {
            warn!(event_type = %event.event_type, "no module handlers registered for event type");
            return Ok(());
        }

        let calls = handlers.iter().map(|registered| async move {
            registered
                .handler
                .handle_event(event)
                .await
                .map_err(|source| ProcessingError::Handler {
                    handler: registered.name.clone(),
                    source,
                })
        });
        try_join_all(calls).await?;

        debug!(
            event_type = %event.event_type,
            handlers = handlers.len(),
            "module handlers completed"
        );
        Ok(())
    }

    async fn run_coordinators(&self, event: &Event) -> Result<(), ProcessingError> {
        for coordinator in &self.coordinators {
            coordinator
                .coordinate_event(event)
                .await
                .map_err(|source| ProcessingError::Coordinator {
                    coordinator: coordinator.name().to_owned(),
                    source,
                })?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventProcessor for ModuleEventProcessor {
    async fn process_event(&self, mut event: Event) -> Result<(), ProcessingError> {
        event.ensure_ids();

        self.run_handlers(&event).await?;
        self.run_coordinators(&event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::EventType;
    use crate::domain::services::processor::{HandlerError, HandlerRegistry, HandlerResult};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingCoordinator {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl Coordinator for RecordingCoordinator {
        fn name(&self) -> &str {
            self.name
        }

        async fn coordinate_event(&self, _event: &Event) -> HandlerResult {
            self.log.lock().push(self.name.to_owned());
            if self.fail {
                return Err(HandlerError::new("saga step failed"));
            }
            Ok(())
        }
    }

    fn coordinator(name: &'static str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<dyn Coordinator> {
        Arc::new(RecordingCoordinator {
            name,
            log: log.clone(),
            fail,
        })
    }

    #[tokio::test]
    async fn no_handlers_and_no_coordinators_is_a_successful_no_op() {
        let processor = ModuleEventProcessor::new(Arc::new(HandlerRegistry::new()));

        let result = processor
            .process_event(Event::new(EventType::SquadCreated, 1, json!({})))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn handlers_see_generated_ids() {
        // Setup
        let registry = Arc::new(HandlerRegistry::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        registry.register_fn("ids", EventType::PlayerKill, move |event| {
            let sink = sink.clone();
            async move {
                sink.lock().push((event.event_id.clone(), event.correlation_id.clone()));
                Ok(())
            }
        });
        let processor = ModuleEventProcessor::new(registry);

        // Execute
        processor
            .process_event(Event::new(EventType::PlayerKill, 1, json!({})))
            .await
            .unwrap();

        // Verify
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.is_some());
        assert!(seen[0].1.is_some());
    }

    #[tokio::test]
    async fn every_matching_handler_runs() {
        let registry = Arc::new(HandlerRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        for name in ["player", "ranking", "action"] {
            let calls = calls.clone();
            registry.register_fn(name, EventType::PlayerWounded, move |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }
        let processor = ModuleEventProcessor::new(registry);

        processor
            .process_event(Event::new(EventType::PlayerWounded, 1, json!({})))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn handlers_of_one_event_run_concurrently() {
        // Setup
        let registry = Arc::new(HandlerRegistry::new());
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        for name in ["player", "ranking"] {
            let barrier = barrier.clone();
            registry.register_fn(name, EventType::PlayerKill, move |_| {
                let barrier = barrier.clone();
                async move {
                    barrier.wait().await;
                    Ok(())
                }
            });
        }
        let processor = ModuleEventProcessor::new(registry);

        // Execute
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            processor.process_event(Event::new(EventType::PlayerKill, 1, json!({}))),
        )
        .await;

        // Verify
        assert_eq!(result, Ok(Ok(())));
    }

    #[tokio::test]
    async fn failing_handler_skips_coordinators() {
        let registry = Arc::new(HandlerRegistry::new());
        registry.register_fn("ranking", EventType::PlayerDied, |_| async {
            Err(HandlerError::new("ranking store offline"))
        });
        let log = Arc::new(Mutex::new(Vec::new()));
        let processor = ModuleEventProcessor::new(registry).with_coordinator(coordinator("saga", &log, false));

        let result = processor
            .process_event(Event::new(EventType::PlayerDied, 1, json!({})))
            .await;

        assert_eq!(
            result,
            Err(ProcessingError::Handler {
                handler: "ranking".into(),
                source: HandlerError::new("ranking store offline"),
            })
        );
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn coordinators_run_in_order_and_stop_at_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let processor = ModuleEventProcessor::new(Arc::new(HandlerRegistry::new()))
            .with_coordinator(coordinator("first", &log, false))
            .with_coordinator(coordinator("second", &log, true))
            .with_coordinator(coordinator("third", &log, false));

        let result = processor
            .process_event(Event::new(EventType::RoundEnded, 1, json!({})))
            .await;

        assert!(matches!(result, Err(ProcessingError::Coordinator { ref coordinator, .. }) if coordinator == "second"));
        assert_eq!(*log.lock(), vec!["first".to_owned(), "second".to_owned()]);
    }
}
