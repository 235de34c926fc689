//! Integration hooks for the server's callbacks.
//!
//! Each hook turns one server callback (player join, damage, block break,
//! chunk load) into a [`HostEvent`]. Servers call these from their own event
//! listeners and feed the result to [`systems::dispatch`](crate::systems::dispatch).

use rush_core::{BlockPos, ChunkPos};

use crate::events::{AdminCommand, HostEvent};

/// A participant logged in.
#[must_use]
pub fn on_join(uid: u64, name: impl Into<String>) -> HostEvent {
    HostEvent::Joined { uid, name: name.into() }
}

/// A participant logged out.
#[must_use]
pub fn on_quit(uid: u64) -> HostEvent {
    HostEvent::Left { uid }
}

/// A participant finished eating or drinking.
#[must_use]
pub fn on_item_consume(uid: u64, item: impl Into<String>) -> HostEvent {
    HostEvent::Consumed { uid, item: item.into() }
}

/// Player-versus-player damage.
#[must_use]
pub fn on_player_damage(attacker: u64, victim: u64) -> HostEvent {
    HostEvent::Damaged { attacker, victim }
}

/// Player-versus-player kill.
#[must_use]
pub fn on_player_death(killer: u64, victim: u64) -> HostEvent {
    HostEvent::Killed { killer, victim }
}

/// A participant interacted with an actor.
#[must_use]
pub fn on_entity_interact(uid: u64, entity: u64) -> HostEvent {
    HostEvent::Interacted { uid, entity }
}

/// A non-participant actor died.
#[must_use]
pub fn on_entity_death(entity: u64, killer: Option<u64>) -> HostEvent {
    HostEvent::ActorDied { entity, killer }
}

/// A participant opened an inventory block.
#[must_use]
pub fn on_inventory_open(uid: u64, pos: BlockPos) -> HostEvent {
    HostEvent::ContainerOpened { uid, pos }
}

/// An inventory block was closed empty or broken.
#[must_use]
pub fn on_container_emptied(pos: BlockPos) -> HostEvent {
    HostEvent::ContainerEmptied { pos }
}

/// A chunk finished loading.
#[must_use]
pub fn on_chunk_load(chunk: ChunkPos) -> HostEvent {
    HostEvent::ChunkLoaded { chunk }
}

/// A participant clicked an armor slot or used an equippable item.
#[must_use]
pub fn on_equip(uid: u64, item: impl Into<String>) -> HostEvent {
    HostEvent::EquipAttempt { uid, item: item.into() }
}

/// Parse an operator command line such as `rush top 5`.
#[must_use]
pub fn on_command(line: &str) -> Option<HostEvent> {
    let mut words = line.split_whitespace();
    if words.next()? != "rush" {
        return None;
    }
    let command = match words.next()? {
        "start" => AdminCommand::Start,
        "cancel" => AdminCommand::Cancel,
        "status" => AdminCommand::Status,
        "top" => AdminCommand::Top(words.next().and_then(|n| n.parse().ok()).unwrap_or(10)),
        _ => return None,
    };
    Some(HostEvent::Admin(command))
}
