use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::{EventHandler, HandlerResult, ModuleRegistry, RegisteredHandler};
use crate::domain::models::{Event, EventType};

/// Registry of module handlers keyed by event type.
///
/// Handlers are registered explicitly at startup, either as trait objects
/// (registered for every type they declare in `event_types()`) or as typed
/// closures bound to a single event type.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<EventType, Vec<RegisteredHandler>>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read();
        f.debug_struct("HandlerRegistry")
            .field("event_types", &handlers.len())
            .field("registrations", &handlers.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for each event type it declares.
    pub fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        let event_types = handler.event_types();
        let mut handlers = self.handlers.write();
        for event_type in &event_types {
            handlers.entry(*event_type).or_default().push(RegisteredHandler {
                name: handler.name().to_owned(),
                handler: Arc::clone(&handler),
            });
        }

        debug!(handler = handler.name(), "Registered handler for event types: {:?}", event_types);
    }

    /// Registers an async closure for exactly one event type.
    ///
    /// ```ignore
    /// registry.register_fn("kills", EventType::PlayerKill, |event| async move {
    ///     record_kill(event).await
    /// });
    /// ```
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, event_type: EventType, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler = FnHandler {
            name: name.into(),
            event_type,
            handler,
            _output: PhantomData,
        };
        self.register_handler(Arc::new(handler));
    }

    pub fn handler_count(&self, event_type: EventType) -> usize {
        self.handlers.read().get(&event_type).map_or(0, Vec::len)
    }
}

impl ModuleRegistry for HandlerRegistry {
    fn handlers_for_event(&self, event_type: EventType) -> Vec<RegisteredHandler> {
        self.handlers.read().get(&event_type).cloned().unwrap_or_default()
    }
}

struct FnHandler<F, Fut> {
    name: String,
    event_type: EventType,
    handler: F,
    _output: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F, Fut>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn event_types(&self) -> Vec<EventType> {
        vec![self.event_type]
    }

    async fn handle_event(&self, event: &Event) -> HandlerResult {
        (self.handler)(event.clone()).await
    }
}
