//--------------------------------------------------------------------------------------------------
// STRUCTS & ENUMS
//--------------------------------------------------------------------------------------------------
// | Name             | Description                                              | Key Methods      |
// |------------------|----------------------------------------------------------|------------------|
// | Priority         | Delivery priority, carried as the AMQP priority          | amqp_priority    |
// | EventMessage     | Versioned transit wrapper around one event               | new, with_retry  |
// | MessageMetadata  | Source, routing and hint blocks of the envelope          |                  |
// | ReceivedEnvelope | Delivered envelope kept next to the JSON it arrived as   | from_slice       |
//--------------------------------------------------------------------------------------------------

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::event::Event;

/// Schema tag written into every envelope.
pub const ENVELOPE_VERSION: &str = "1.0";

/// Delivery priority of a message. Serialised as its AMQP priority number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn amqp_priority(&self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Normal => 5,
            Priority::High => 8,
            Priority::Critical => 10,
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.amqp_priority()
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::Low),
            5 => Ok(Priority::Normal),
            8 => Ok(Priority::High),
            10 => Ok(Priority::Critical),
            other => Err(format!("invalid message priority {other}")),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Low => "LOW",
            Priority::Normal => "NORMAL",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// Game server the event came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub server_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingInfo {
    pub key: String,
    pub priority: Priority,
    #[serde(default)]
    pub retry_count: u32,
}

/// Optional processing flags set by the producer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_ack: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_validation: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    pub source: SourceInfo,
    pub routing: RoutingInfo,
    #[serde(default)]
    pub hints: MessageHints,
}

/// Transit envelope of one event.
///
/// Envelopes are treated as immutable once published. The only field that
/// changes over a message's life is `metadata.routing.retry_count`, and it
/// changes by building a new envelope through [`EventMessage::with_retry`],
/// which keeps `id` and `correlation_id` so a retried message stays
/// traceable to its first delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage<T = Event> {
    pub id: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    pub metadata: MessageMetadata,
    pub payload: T,
}

impl<T> EventMessage<T> {
    /// Wraps `payload` in a fresh envelope with a new message id and a
    /// retry count of zero.
    pub fn new(
        payload: T,
        correlation_id: impl Into<String>,
        source: SourceInfo,
        routing_key: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            version: ENVELOPE_VERSION.to_owned(),
            timestamp: Utc::now(),
            correlation_id: correlation_id.into(),
            metadata: MessageMetadata {
                source,
                routing: RoutingInfo {
                    key: routing_key.into(),
                    priority,
                    retry_count: 0,
                },
                hints: MessageHints::default(),
            },
            payload,
        }
    }

    pub fn with_hints(mut self, hints: MessageHints) -> Self {
        self.metadata.hints = hints;
        self
    }

    pub fn retry_count(&self) -> u32 {
        self.metadata.routing.retry_count
    }

    pub fn routing_key(&self) -> &str {
        &self.metadata.routing.key
    }

    pub fn priority(&self) -> Priority {
        self.metadata.routing.priority
    }

    pub fn skips_validation(&self) -> bool {
        self.metadata.hints.skip_validation.unwrap_or(false)
    }
}

impl<T: Clone> EventMessage<T> {
    /// Copy of this envelope for the next delivery attempt.
    pub fn with_retry(&self) -> Self {
        let mut next = self.clone();
        next.metadata.routing.retry_count = self.metadata.routing.retry_count.saturating_add(1);
        next
    }
}

/// An envelope taken off a queue.
///
/// Retries are re-encoded from the JSON the message arrived as, so event type
/// names and fields this build does not model reach the next attempt and the
/// dead-letter queue unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedEnvelope {
    raw: Value,
    pub envelope: EventMessage,
}

impl ReceivedEnvelope {
    pub fn from_slice(content: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: Value = serde_json::from_slice(content)?;
        let envelope: EventMessage = Deserialize::deserialize(&raw)?;
        Ok(Self { raw, envelope })
    }

    /// Event type exactly as the producer wrote it.
    pub fn event_type_name(&self) -> &str {
        self.raw
            .pointer("/payload/eventType")
            .and_then(Value::as_str)
            .unwrap_or_else(|| self.envelope.payload.event_type.as_str())
    }

    /// Copy for the next delivery attempt; only `metadata.routing.retryCount` differs.
    pub fn with_retry(&self) -> Self {
        let envelope = self.envelope.with_retry();
        let mut raw = self.raw.clone();
        if let Some(routing) = raw
            .pointer_mut("/metadata/routing")
            .and_then(Value::as_object_mut)
        {
            routing.insert("retryCount".to_owned(), Value::from(envelope.retry_count()));
        }
        Self { raw, envelope }
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.raw)
    }
}
