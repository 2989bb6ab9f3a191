use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use super::{EmitError, EmitResult, EventEmitter};
use crate::domain::models::Event;

/// Legacy in-process event bus on top of a tokio broadcast channel.
///
/// Every subscriber sees every event. Emitting with no subscriber attached is
/// not an error; the event is simply dropped, which is how the legacy bus
/// has always behaved.
#[derive(Debug, Clone)]
pub struct InProcessEventBus {
    sender: broadcast::Sender<Event>,
    capacity: usize,
}

impl InProcessEventBus {
    /// Creates a bus that buffers up to `capacity` events per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        info!("Created in-process event bus with capacity: {}", capacity);
        Self { sender, capacity }
    }

    pub fn publish(&self, event: Event) -> EmitResult<()> {
        if self.sender.receiver_count() == 0 {
            debug!(event_type = %event.event_type, "no subscribers for event");
            return Ok(());
        }

        match self.sender.send(event) {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Failed to publish event on the in-process bus: {}", e);
                Err(EmitError::Bus(e.to_string()))
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        debug!(
            "New subscriber added to the in-process bus (total: {})",
            self.sender.receiver_count() + 1
        );
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InProcessEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventEmitter for InProcessEventBus {
    async fn emit(&self, event: Event) -> EmitResult<()> {
        self.publish(event)
    }
}
