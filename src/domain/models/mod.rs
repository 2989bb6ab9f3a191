pub mod envelope;
pub mod event;

pub use envelope::{
    ENVELOPE_VERSION, EventMessage, MessageHints, MessageMetadata, Priority, ReceivedEnvelope,
    RoutingInfo, SourceInfo,
};
pub use event::{Event, EventType};
