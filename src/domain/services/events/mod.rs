//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// The `emit` contract shared by the legacy in-process bus, the queue publisher and the migration
// publishers, so producers can be pointed at any of them through one trait object.
//
// | Component          | Description                                                  |
// |--------------------|--------------------------------------------------------------|
// | EventEmitter       | Anything that accepts an event for delivery                  |
// | EmitError          | Failure of one emit call, whichever sink produced it         |
// | InProcessEventBus  | Legacy broadcast bus, fire-and-forget to in-process readers  |
//--------------------------------------------------------------------------------------------------

mod event_bus;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::Event;
use crate::domain::services::migration::MigrationError;
use crate::domain::services::publisher::PublishError;

pub use event_bus::InProcessEventBus;

#[derive(Error, Debug)]
pub enum EmitError {
    /// The in-process bus refused the event
    #[error("Event bus error: {0}")]
    Bus(String),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Migration(Box<MigrationError>),
}

impl From<MigrationError> for EmitError {
    fn from(err: MigrationError) -> Self {
        EmitError::Migration(Box::new(err))
    }
}

pub type EmitResult<T> = Result<T, EmitError>;

/// Accepts events for delivery.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(&self, event: Event) -> EmitResult<()>;
}

#[cfg(test)]
use mockall::*;

#[cfg(test)]
mock! {
    pub EventEmitter {}

    #[async_trait]
    impl EventEmitter for EventEmitter {
        async fn emit(&self, event: Event) -> EmitResult<()>;
    }
}
