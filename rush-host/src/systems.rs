//! Dispatch systems: route [`HostEvent`]s to orchestrator entrypoints.
//!
//! Each event maps to exactly one entrypoint. The server keeps ownership of
//! its world; for joins and quits it must update what
//! `online_participants()` reports *before* dispatching, since the
//! orchestrator re-checks quorum against the environment.
//!
//! | Event              | Entrypoint                  |
//! |--------------------|-----------------------------|
//! | `Joined` / `Left`  | participant session hooks   |
//! | `Consumed`         | `consume_item`              |
//! | `Damaged`          | `trigger_punishment`        |
//! | `Killed`           | `record_aggression`         |
//! | `Interacted`       | `start_encounter`           |
//! | `ActorDied`        | `on_privileged_defeated`    |
//! | `ContainerOpened`  | `on_container_opened`       |
//! | `ContainerEmptied` | `on_container_consumed`     |
//! | `ChunkLoaded`      | `on_chunk_activated`        |
//! | `EquipAttempt`     | `check_equip`               |

use rush_core::containers::ContainerOpened;
use rush_core::encounter::EncounterStart;
use rush_core::ledger::PlayerProfile;
use rush_core::loot::ContainerKind;
use rush_core::orchestrator::{Credit, StatusSnapshot};
use rush_core::punishment::Punishment;
use rush_core::services::{Environment, RecordStore};
use rush_core::{Orchestrator, Phase, PlayerId, Rejection};
use tracing::{debug, trace};

use crate::bridge::{EntityRegistry, actor_handle};
use crate::events::{AdminCommand, HostEvent};

/// What a dispatched event did.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// A session or admin event; the phase afterwards.
    Phase(Phase),
    /// Points were credited.
    Credited(Credit),
    /// Punishment outcome of a hostile attack.
    Punished(Punishment),
    /// A kill was recorded.
    Recorded,
    /// A rescue encounter began.
    EncounterStarted(EncounterStart),
    /// A privileged encounter was defeated for this bonus.
    Bonus(i64),
    /// A game container was opened.
    Opened(ContainerOpened),
    /// A game container was consumed and queued for respawn.
    Consumed(ContainerKind),
    /// Stale placements removed from a loaded chunk.
    Cleaned(usize),
    /// The equip action may proceed.
    EquipAllowed,
    /// Status report.
    Status(Box<StatusSnapshot>),
    /// Leaderboard report.
    Leaderboard(Vec<PlayerProfile>),
    /// Nothing of ours was involved.
    Ignored,
}

/// Route one event.
///
/// # Errors
///
/// The entrypoint's [`Rejection`], or [`Rejection::UnknownPlayer`] when the
/// event names a uid the registry has never seen.
pub fn dispatch<E: Environment, S: RecordStore>(
    orch: &mut Orchestrator<E, S>,
    registry: &mut EntityRegistry,
    event: HostEvent,
) -> Result<Dispatched, Rejection> {
    let kind = event.kind();
    trace!(kind, "Dispatching host event");
    let result = route(orch, registry, event);
    if let Err(reason) = &result {
        debug!(kind, %reason, "Host event rejected");
    }
    result
}

fn route<E: Environment, S: RecordStore>(
    orch: &mut Orchestrator<E, S>,
    registry: &mut EntityRegistry,
    event: HostEvent,
) -> Result<Dispatched, Rejection> {
    match event {
        HostEvent::Joined { uid, name } => {
            let player = registry.player(uid);
            Ok(Dispatched::Phase(orch.on_participant_joined(player, &name)))
        }
        HostEvent::Left { uid } => {
            let player = known(registry, uid)?;
            Ok(Dispatched::Phase(orch.on_participant_left(player)))
        }
        HostEvent::Consumed { uid, item } => {
            let player = known(registry, uid)?;
            orch.consume_item(player, &item).map(Dispatched::Credited)
        }
        HostEvent::Damaged { attacker, victim } => {
            let (attacker, victim) = (known(registry, attacker)?, known(registry, victim)?);
            orch.trigger_punishment(attacker, victim).map(Dispatched::Punished)
        }
        HostEvent::Killed { killer, victim } => {
            let (killer, victim) = (known(registry, killer)?, known(registry, victim)?);
            orch.record_aggression(killer, victim).map(|()| Dispatched::Recorded)
        }
        HostEvent::Interacted { uid, entity } => {
            let player = known(registry, uid)?;
            let actor = actor_handle(entity);
            if orch.rescue().npcs().find(|npc| npc.actor == actor).is_none() {
                return Ok(Dispatched::Ignored);
            }
            orch.start_encounter(player, actor).map(Dispatched::EncounterStarted)
        }
        HostEvent::ActorDied { entity, killer } => {
            let actor = actor_handle(entity);
            if !orch.threshold().is_privileged(actor) {
                return Ok(Dispatched::Ignored);
            }
            // A kill nobody can be credited for still frees the slot.
            let by = killer.and_then(|uid| registry.lookup(uid)).unwrap_or(PlayerId(uuid::Uuid::nil()));
            orch.on_privileged_defeated(actor, by).map(Dispatched::Bonus)
        }
        HostEvent::ContainerOpened { uid, pos } => {
            let player = known(registry, uid)?;
            if orch.containers().get(pos).is_none() {
                return Ok(Dispatched::Ignored);
            }
            orch.on_container_opened(player, pos).map(Dispatched::Opened)
        }
        HostEvent::ContainerEmptied { pos } => {
            if orch.containers().get(pos).is_none() {
                return Ok(Dispatched::Ignored);
            }
            orch.on_container_consumed(pos).map(Dispatched::Consumed)
        }
        HostEvent::ChunkLoaded { chunk } => Ok(Dispatched::Cleaned(orch.on_chunk_activated(chunk))),
        HostEvent::EquipAttempt { uid, item } => {
            let player = known(registry, uid)?;
            orch.check_equip(player, &item).map(|()| Dispatched::EquipAllowed)
        }
        HostEvent::Admin(command) => admin(orch, command),
    }
}

fn admin<E: Environment, S: RecordStore>(
    orch: &mut Orchestrator<E, S>,
    command: AdminCommand,
) -> Result<Dispatched, Rejection> {
    match command {
        AdminCommand::Start => orch.try_advance_from_waiting().map(Dispatched::Phase),
        AdminCommand::Cancel => {
            orch.cancel_countdown()?;
            Ok(Dispatched::Phase(orch.current_phase()))
        }
        AdminCommand::Status => Ok(Dispatched::Status(Box::new(orch.status()))),
        AdminCommand::Top(limit) => Ok(Dispatched::Leaderboard(orch.top_players(limit))),
    }
}

fn known(registry: &EntityRegistry, uid: u64) -> Result<PlayerId, Rejection> {
    registry.lookup(uid).ok_or(Rejection::UnknownPlayer)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks;
    use rush_core::RushConfig;
    use rush_core::notify::NullNotifier;
    use rush_core::persistence::MemoryStore;
    use rush_core::sim::FlatWorld;

    type Orch = Orchestrator<FlatWorld, MemoryStore>;

    fn setup() -> (Orch, EntityRegistry) {
        let mut config = RushConfig::default();
        config.general.ticks_per_second = 1;
        config.general.seed = Some(3);
        config.round.countdown_seconds = 1;
        config.round.map_radius = 16;
        let orch = Orchestrator::new(config, FlatWorld::new(), MemoryStore::new(), NullNotifier);
        (orch, EntityRegistry::new())
    }

    fn join(orch: &mut Orch, registry: &mut EntityRegistry, uid: u64) -> Phase {
        let name = format!("p{uid}");
        let id = registry.player(uid);
        orch.env_mut().add_participant_with_id(id, &name);
        match dispatch(orch, registry, hooks::on_join(uid, name)) {
            Ok(Dispatched::Phase(phase)) => phase,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn joins_drive_the_phase_machine() {
        let (mut orch, mut registry) = setup();
        assert_eq!(join(&mut orch, &mut registry, 1), Phase::Waiting);
        assert_eq!(join(&mut orch, &mut registry, 2), Phase::Countdown);
        assert_eq!(
            dispatch(&mut orch, &mut registry, HostEvent::Admin(AdminCommand::Start)),
            Err(Rejection::WrongPhase)
        );
        assert_eq!(
            dispatch(&mut orch, &mut registry, HostEvent::Admin(AdminCommand::Cancel)),
            Ok(Dispatched::Phase(Phase::Waiting))
        );
        assert_eq!(
            dispatch(&mut orch, &mut registry, HostEvent::Admin(AdminCommand::Start)),
            Ok(Dispatched::Phase(Phase::Countdown))
        );
    }

    #[test]
    fn gameplay_events_reach_the_round() {
        let (mut orch, mut registry) = setup();
        join(&mut orch, &mut registry, 1);
        join(&mut orch, &mut registry, 2);
        orch.run_ticks(1);
        assert_eq!(orch.current_phase(), Phase::Active);

        let credited = dispatch(&mut orch, &mut registry, hooks::on_item_consume(1, "COOKED_BEEF"));
        assert_eq!(credited, Ok(Dispatched::Credited(Credit { amount: 20, balance: 20 })));

        let punished = dispatch(&mut orch, &mut registry, hooks::on_player_damage(1, 2));
        assert!(matches!(punished, Ok(Dispatched::Punished(Punishment::Marked { first: true, .. }))));
        assert_eq!(
            dispatch(&mut orch, &mut registry, hooks::on_equip(1, "IRON_HELMET")),
            Err(Rejection::GearLocked)
        );
        assert_eq!(
            dispatch(&mut orch, &mut registry, hooks::on_equip(2, "IRON_HELMET")),
            Ok(Dispatched::EquipAllowed)
        );
        assert_eq!(
            dispatch(&mut orch, &mut registry, hooks::on_player_death(2, 1)),
            Ok(Dispatched::Recorded)
        );
    }

    #[test]
    fn unknown_entities_are_ignored_or_rejected() {
        let (mut orch, mut registry) = setup();
        join(&mut orch, &mut registry, 1);
        assert_eq!(
            dispatch(&mut orch, &mut registry, hooks::on_item_consume(99, "BREAD")),
            Err(Rejection::UnknownPlayer)
        );
        assert_eq!(
            dispatch(&mut orch, &mut registry, hooks::on_entity_death(12345, Some(1))),
            Ok(Dispatched::Ignored)
        );
        assert_eq!(
            dispatch(&mut orch, &mut registry, hooks::on_entity_interact(1, 12345)),
            Ok(Dispatched::Ignored)
        );
        assert!(matches!(
            dispatch(&mut orch, &mut registry, HostEvent::Admin(AdminCommand::Status)),
            Ok(Dispatched::Status(status)) if status.online == 1
        ));
    }

    #[test]
    fn quit_keeps_the_uid_mapping() {
        let (mut orch, mut registry) = setup();
        join(&mut orch, &mut registry, 1);
        let id = registry.lookup(1).expect("registered");
        orch.env_mut().remove_participant(id);
        assert_eq!(
            dispatch(&mut orch, &mut registry, hooks::on_quit(1)),
            Ok(Dispatched::Phase(Phase::Waiting))
        );
        assert_eq!(registry.lookup(1), Some(id));
    }
}
