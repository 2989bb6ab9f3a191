//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Maps event types to routing keys and priorities, and derives the broker topology from that
// mapping so every routing key is bound to exactly one main queue.
//
// | Component           | Description                                                      |
// |---------------------|------------------------------------------------------------------|
// | EventRouter         | Pure, total mapping from event type to routing key and priority  |
// | StaticRoutingTable  | Default router backed by a fixed lookup table                    |
// | build_topology      | Exchange/queue/binding layout derived from a router              |
//--------------------------------------------------------------------------------------------------

use std::collections::BTreeSet;

use rabbitmq::{QueueSpec, Topology};

use crate::domain::models::{EventType, Priority};

pub const UNKNOWN_ROUTING_KEY: &str = "unknown";

pub const PRIORITY_QUEUE: &str = "priority";
pub const STANDARD_QUEUE: &str = "standard";
pub const BULK_QUEUE: &str = "bulk";

/// Decides where an event type is published.
///
/// Both methods must be pure and total: every event type, `Unknown`
/// included, maps to a routing key and a priority, and repeated calls
/// return the same answer.
pub trait EventRouter: Send + Sync {
    fn routing_key(&self, event_type: EventType) -> String;

    fn priority(&self, event_type: EventType) -> Priority;
}

/// Router backed by the built-in routing table.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticRoutingTable;

impl StaticRoutingTable {
    fn lookup(event_type: EventType) -> Option<(&'static str, Priority)> {
        use EventType::*;
        use Priority::*;

        let route = match event_type {
            PlayerConnected => ("player.connected", High),
            PlayerDisconnected => ("player.disconnected", High),
            PlayerJoinSucceeded => ("player.join.succeeded", Normal),
            PlayerPossess => ("player.possess", Normal),
            PlayerUnpossess => ("player.unpossess", Normal),
            PlayerTeamChange => ("player.team.change", Normal),
            PlayerSquadChange => ("player.squad.change", Normal),
            PlayerRoleChange => ("player.role.change", Normal),
            PlayerDamaged => ("player.damaged", Normal),
            PlayerWounded => ("player.wounded", High),
            PlayerKill => ("player.kill", High),
            PlayerDied => ("player.died", High),
            PlayerRevived => ("player.revived", Normal),
            PlayerSuicide => ("player.suicide", Normal),
            PlayerTeamkill => ("player.teamkill", High),
            DeployableDamaged => ("deployable.damaged", Low),
            DeployableDestroyed => ("deployable.destroyed", Normal),
            VehicleDamaged => ("vehicle.damaged", Low),
            VehicleDestroyed => ("vehicle.destroyed", Normal),
            ChatMessage => ("chat.message", Normal),
            ChatCommand => ("chat.command", High),
            AdminBroadcast => ("admin.broadcast", High),
            AdminCameraPossessed => ("admin.camera.possessed", Normal),
            AdminCameraUnpossessed => ("admin.camera.unpossessed", Normal),
            PlayerWarned => ("admin.player.warned", High),
            PlayerKicked => ("admin.player.kicked", Critical),
            PlayerBanned => ("admin.player.banned", Critical),
            SquadCreated => ("squad.created", Normal),
            SquadDisbanded => ("squad.disbanded", Normal),
            NewGame => ("game.new", High),
            RoundStarted => ("game.round.started", Normal),
            RoundEnded => ("game.round.ended", High),
            RoundTickets => ("game.round.tickets", Normal),
            RoundWinner => ("game.round.winner", High),
            MapChanged => ("game.map.changed", Normal),
            ServerInfoUpdated => ("server.info", Low),
            ServerTickRate => ("server.tickrate", Low),
            PlayerListUpdated => ("server.players", Low),
            SquadListUpdated => ("server.squads", Low),
            RconConnected => ("system.rcon.connected", Normal),
            RconDisconnected => ("system.rcon.disconnected", Critical),
            LogReaderConnected => ("system.logs.connected", Normal),
            LogReaderDisconnected => ("system.logs.disconnected", Critical),
            Unknown => return None,
        };
        Some(route)
    }
}

impl EventRouter for StaticRoutingTable {
    fn routing_key(&self, event_type: EventType) -> String {
        Self::lookup(event_type)
            .map(|(key, _)| key)
            .unwrap_or(UNKNOWN_ROUTING_KEY)
            .to_owned()
    }

    fn priority(&self, event_type: EventType) -> Priority {
        Self::lookup(event_type)
            .map(|(_, priority)| priority)
            .unwrap_or(Priority::Normal)
    }
}

/// Main queue that receives messages of the given priority.
pub fn queue_for_priority(priority: Priority) -> &'static str {
    match priority {
        Priority::Critical | Priority::High => PRIORITY_QUEUE,
        Priority::Normal => STANDARD_QUEUE,
        Priority::Low => BULK_QUEUE,
    }
}

/// Builds the broker topology for `router`.
///
/// Each routing key the router can produce, including the `unknown`
/// fallback, is bound by exact key to the queue of its priority.
pub fn build_topology(router: &dyn EventRouter) -> Topology {
    let mut priority = BTreeSet::new();
    let mut standard = BTreeSet::new();
    let mut bulk = BTreeSet::new();

    let event_types = EventType::ALL.into_iter().chain([EventType::Unknown]);
    for event_type in event_types {
        let key = router.routing_key(event_type);
        let bucket = match queue_for_priority(router.priority(event_type)) {
            PRIORITY_QUEUE => &mut priority,
            BULK_QUEUE => &mut bulk,
            _ => &mut standard,
        };
        bucket.insert(key);
    }

    Topology::new(vec![
        QueueSpec::new(PRIORITY_QUEUE, priority.into_iter().collect()),
        QueueSpec::new(STANDARD_QUEUE, standard.into_iter().collect()),
        QueueSpec::new(BULK_QUEUE, bulk.into_iter().collect()),
    ])
}
