//--------------------------------------------------------------------------------------------------
// STRUCTS & ENUMS
//--------------------------------------------------------------------------------------------------
// | Name          | Description                                             | Key Methods        |
// |---------------|---------------------------------------------------------|--------------------|
// | EventType     | Every telemetry event a game server can emit            | as_str, ALL        |
// | Event         | One ingested event: type, origin server and raw data    | new, ensure_ids    |
//--------------------------------------------------------------------------------------------------

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Telemetry event kinds, serialised in SCREAMING_SNAKE_CASE.
///
/// Names this build does not know deserialize to [`EventType::Unknown`]
/// instead of failing, so newer producers never poison the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // Player lifecycle
    PlayerConnected,
    PlayerDisconnected,
    PlayerJoinSucceeded,
    PlayerPossess,
    PlayerUnpossess,
    PlayerTeamChange,
    PlayerSquadChange,
    PlayerRoleChange,

    // Combat
    PlayerDamaged,
    PlayerWounded,
    PlayerKill,
    PlayerDied,
    PlayerRevived,
    PlayerSuicide,
    PlayerTeamkill,
    DeployableDamaged,
    DeployableDestroyed,
    VehicleDamaged,
    VehicleDestroyed,

    // Chat
    ChatMessage,
    ChatCommand,

    // Administration
    AdminBroadcast,
    AdminCameraPossessed,
    AdminCameraUnpossessed,
    PlayerWarned,
    PlayerKicked,
    PlayerBanned,

    // Squads
    SquadCreated,
    SquadDisbanded,

    // Game flow
    NewGame,
    RoundStarted,
    RoundEnded,
    RoundTickets,
    RoundWinner,
    MapChanged,

    // Server state
    ServerInfoUpdated,
    ServerTickRate,
    PlayerListUpdated,
    SquadListUpdated,

    // Ingestion connectivity
    RconConnected,
    RconDisconnected,
    LogReaderConnected,
    LogReaderDisconnected,

    #[serde(other)]
    Unknown,
}

impl EventType {
    /// Every known event type, `Unknown` excluded.
    pub const ALL: [EventType; 43] = [
        EventType::PlayerConnected,
        EventType::PlayerDisconnected,
        EventType::PlayerJoinSucceeded,
        EventType::PlayerPossess,
        EventType::PlayerUnpossess,
        EventType::PlayerTeamChange,
        EventType::PlayerSquadChange,
        EventType::PlayerRoleChange,
        EventType::PlayerDamaged,
        EventType::PlayerWounded,
        EventType::PlayerKill,
        EventType::PlayerDied,
        EventType::PlayerRevived,
        EventType::PlayerSuicide,
        EventType::PlayerTeamkill,
        EventType::DeployableDamaged,
        EventType::DeployableDestroyed,
        EventType::VehicleDamaged,
        EventType::VehicleDestroyed,
        EventType::ChatMessage,
        EventType::ChatCommand,
        EventType::AdminBroadcast,
        EventType::AdminCameraPossessed,
        EventType::AdminCameraUnpossessed,
        EventType::PlayerWarned,
        EventType::PlayerKicked,
        EventType::PlayerBanned,
        EventType::SquadCreated,
        EventType::SquadDisbanded,
        EventType::NewGame,
        EventType::RoundStarted,
        EventType::RoundEnded,
        EventType::RoundTickets,
        EventType::RoundWinner,
        EventType::MapChanged,
        EventType::ServerInfoUpdated,
        EventType::ServerTickRate,
        EventType::PlayerListUpdated,
        EventType::SquadListUpdated,
        EventType::RconConnected,
        EventType::RconDisconnected,
        EventType::LogReaderConnected,
        EventType::LogReaderDisconnected,
    ];

    /// Wire name of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PlayerConnected => "PLAYER_CONNECTED",
            EventType::PlayerDisconnected => "PLAYER_DISCONNECTED",
            EventType::PlayerJoinSucceeded => "PLAYER_JOIN_SUCCEEDED",
            EventType::PlayerPossess => "PLAYER_POSSESS",
            EventType::PlayerUnpossess => "PLAYER_UNPOSSESS",
            EventType::PlayerTeamChange => "PLAYER_TEAM_CHANGE",
            EventType::PlayerSquadChange => "PLAYER_SQUAD_CHANGE",
            EventType::PlayerRoleChange => "PLAYER_ROLE_CHANGE",
            EventType::PlayerDamaged => "PLAYER_DAMAGED",
            EventType::PlayerWounded => "PLAYER_WOUNDED",
            EventType::PlayerKill => "PLAYER_KILL",
            EventType::PlayerDied => "PLAYER_DIED",
            EventType::PlayerRevived => "PLAYER_REVIVED",
            EventType::PlayerSuicide => "PLAYER_SUICIDE",
            EventType::PlayerTeamkill => "PLAYER_TEAMKILL",
            EventType::DeployableDamaged => "DEPLOYABLE_DAMAGED",
            EventType::DeployableDestroyed => "DEPLOYABLE_DESTROYED",
            EventType::VehicleDamaged => "VEHICLE_DAMAGED",
            EventType::VehicleDestroyed => "VEHICLE_DESTROYED",
            EventType::ChatMessage => "CHAT_MESSAGE",
            EventType::ChatCommand => "CHAT_COMMAND",
            EventType::AdminBroadcast => "ADMIN_BROADCAST",
            EventType::AdminCameraPossessed => "ADMIN_CAMERA_POSSESSED",
            EventType::AdminCameraUnpossessed => "ADMIN_CAMERA_UNPOSSESSED",
            EventType::PlayerWarned => "PLAYER_WARNED",
            EventType::PlayerKicked => "PLAYER_KICKED",
            EventType::PlayerBanned => "PLAYER_BANNED",
            EventType::SquadCreated => "SQUAD_CREATED",
            EventType::SquadDisbanded => "SQUAD_DISBANDED",
            EventType::NewGame => "NEW_GAME",
            EventType::RoundStarted => "ROUND_STARTED",
            EventType::RoundEnded => "ROUND_ENDED",
            EventType::RoundTickets => "ROUND_TICKETS",
            EventType::RoundWinner => "ROUND_WINNER",
            EventType::MapChanged => "MAP_CHANGED",
            EventType::ServerInfoUpdated => "SERVER_INFO_UPDATED",
            EventType::ServerTickRate => "SERVER_TICK_RATE",
            EventType::PlayerListUpdated => "PLAYER_LIST_UPDATED",
            EventType::SquadListUpdated => "SQUAD_LIST_UPDATED",
            EventType::RconConnected => "RCON_CONNECTED",
            EventType::RconDisconnected => "RCON_DISCONNECTED",
            EventType::LogReaderConnected => "LOG_READER_CONNECTED",
            EventType::LogReaderDisconnected => "LOG_READER_DISCONNECTED",
            EventType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A telemetry event as produced by ingestion.
///
/// `event_id` and `correlation_id` may be missing when the event is created;
/// the publisher and the processor bridge fill them in through
/// [`Event::ensure_ids`] before anything downstream sees the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: EventType,
    pub server_id: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Event {
    pub fn new(event_type: EventType, server_id: i64, data: serde_json::Value) -> Self {
        Self {
            event_type,
            server_id,
            timestamp: Utc::now(),
            event_id: None,
            correlation_id: None,
            data,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Generates whichever of `event_id` / `correlation_id` is missing.
    pub fn ensure_ids(&mut self) {
        if self.event_id.is_none() {
            self.event_id = Some(Uuid::new_v4().to_string());
        }
        if self.correlation_id.is_none() {
            self.correlation_id = Some(Uuid::new_v4().to_string());
        }
    }
}
