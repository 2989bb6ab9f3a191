//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Bridge between the consumer and the business handlers. The consumer hands every decoded event
// to an `EventProcessor`; the default one fans out to the module handlers registered for the
// event type, then runs the coordinators in order.
//
// | Component             | Description                                                    |
// |-----------------------|----------------------------------------------------------------|
// | EventProcessor        | The single entry point the consumer calls per message          |
// | ModuleEventProcessor  | Handlers concurrently, then coordinators sequentially          |
// | ModuleRegistry        | Lookup of the handlers interested in an event type             |
// | HandlerRegistry       | Default registry; trait-object or typed-closure registration   |
// | EventHandler          | One module's handler                                           |
// | Coordinator           | Cross-module orchestration step run after the handlers         |
//--------------------------------------------------------------------------------------------------

mod handler_registry;
mod module_processor;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::{Event, EventType};

pub use handler_registry::HandlerRegistry;
pub use module_processor::ModuleEventProcessor;

/// Failure reported by a handler or a coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type HandlerResult = Result<(), HandlerError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("Handler {handler} failed: {source}")]
    Handler {
        handler: String,
        #[source]
        source: HandlerError,
    },

    #[error("Coordinator {coordinator} failed: {source}")]
    Coordinator {
        coordinator: String,
        #[source]
        source: HandlerError,
    },
}

/// Processes one event on behalf of the consumer. An error makes the
/// consumer retry the message, then dead-letter it.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    async fn process_event(&self, event: Event) -> Result<(), ProcessingError>;
}

/// A module's handler for one or more event types.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Event types this handler is registered for
    fn event_types(&self) -> Vec<EventType>;

    async fn handle_event(&self, event: &Event) -> HandlerResult;
}

#[async_trait]
pub trait Coordinator: Send + Sync {
    fn name(&self) -> &str;

    async fn coordinate_event(&self, event: &Event) -> HandlerResult;
}

/// A handler together with the name it was registered under.
#[derive(Clone)]
pub struct RegisteredHandler {
    pub name: String,
    pub handler: Arc<dyn EventHandler>,
}

/// Read-only view the processor uses to find handlers.
pub trait ModuleRegistry: Send + Sync {
    fn handlers_for_event(&self, event_type: EventType) -> Vec<RegisteredHandler>;
}
