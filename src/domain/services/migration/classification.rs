use std::collections::HashSet;

use crate::domain::models::EventType;

/// Sink an event type is sent to by the queue-first publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventBucket {
    /// Fully migrated, queue only
    QueueOnly,
    /// Not migrated yet, legacy bus only
    EventBusFallback,
    /// In neither set; handled like `EventBusFallback`
    Unknown,
}

/// Read-only report of how far the migration has come.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MigrationProgress {
    pub queue_only_types: usize,
    pub event_bus_fallback_types: usize,
    /// `queue_only / (queue_only + fallback) * 100`
    pub percent_migrated: f64,
}

/// Which event types have moved to the queue.
///
/// A type listed in both sets counts as queue-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventClassification {
    queue_only: HashSet<EventType>,
    event_bus_fallback: HashSet<EventType>,
}

impl EventClassification {
    pub fn new(
        queue_only: impl IntoIterator<Item = EventType>,
        event_bus_fallback: impl IntoIterator<Item = EventType>,
    ) -> Self {
        let queue_only: HashSet<EventType> = queue_only.into_iter().collect();
        let event_bus_fallback = event_bus_fallback
            .into_iter()
            .filter(|event_type| !queue_only.contains(event_type))
            .collect();
        Self {
            queue_only,
            event_bus_fallback,
        }
    }

    pub fn classify(&self, event_type: EventType) -> EventBucket {
        if self.queue_only.contains(&event_type) {
            EventBucket::QueueOnly
        } else if self.event_bus_fallback.contains(&event_type) {
            EventBucket::EventBusFallback
        } else {
            EventBucket::Unknown
        }
    }

    pub fn progress(&self) -> MigrationProgress {
        let queue_only_types = self.queue_only.len();
        let event_bus_fallback_types = self.event_bus_fallback.len();
        let classified = queue_only_types + event_bus_fallback_types;
        let percent_migrated = if classified == 0 {
            0.0
        } else {
            queue_only_types as f64 / classified as f64 * 100.0
        };
        MigrationProgress {
            queue_only_types,
            event_bus_fallback_types,
            percent_migrated,
        }
    }
}

impl Default for EventClassification {
    /// Gameplay telemetry is on the queue; administration and connectivity
    /// events still go through the legacy bus.
    fn default() -> Self {
        use EventType::*;

        Self::new(
            [
                PlayerConnected,
                PlayerDisconnected,
                PlayerJoinSucceeded,
                PlayerDamaged,
                PlayerWounded,
                PlayerKill,
                PlayerDied,
                PlayerRevived,
                PlayerSuicide,
                PlayerTeamkill,
                ChatMessage,
                NewGame,
                RoundStarted,
                RoundEnded,
                RoundWinner,
            ],
            [
                ChatCommand,
                AdminBroadcast,
                AdminCameraPossessed,
                AdminCameraUnpossessed,
                PlayerWarned,
                PlayerKicked,
                PlayerBanned,
                ServerInfoUpdated,
                PlayerListUpdated,
                SquadListUpdated,
                RconConnected,
                RconDisconnected,
                LogReaderConnected,
                LogReaderDisconnected,
            ],
        )
    }
}
