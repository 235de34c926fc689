//! Integration Tests: end-to-end round flows
//!
//! Drives a full [`Orchestrator`] over the headless [`FlatWorld`] with an
//! in-memory record store and a buffered notifier, the same way a host
//! would: session hooks, gameplay entrypoints, one `tick()` per server tick.

use rush_core::config::{RushConfig, TierConfig};
use rush_core::encounter::EncounterEnd;
use rush_core::notify::{BufferedNotifier, Notice, NullNotifier};
use rush_core::persistence::{MemoryStore, SqliteStore};
use rush_core::punishment::Punishment;
use rush_core::sim::FlatWorld;
use rush_core::{Orchestrator, Phase, PlayerId, Rejection, TeamColor};

type Orch = Orchestrator<FlatWorld, MemoryStore>;

/// Two ticks per second, short phases, a small map.
fn config() -> RushConfig {
    let mut config = RushConfig::default();
    config.general.ticks_per_second = 2;
    config.general.seed = Some(42);
    config.round.min_players = 2;
    config.round.countdown_seconds = 2;
    config.round.quorum_debounce_ticks = 3;
    config.round.duration_minutes = 5;
    config.round.cooldown_minutes = 1;
    config.round.map_radius = 24;
    config.containers.respawn_delay_seconds = 2;
    config.containers.sweep_interval_seconds = 1;
    config.rescue.npc_per_chunks = 1;
    config.rescue.probe_attempts = 10;
    config.rescue.elite_monsters.clear();
    config.rescue.tiers = vec![TierConfig {
        level: 1,
        npc_type: "EventNPC_T1".to_string(),
        monsters: vec!["GummyZombie".to_string()],
        reward_min: 50,
        reward_max: 100,
        threshold_points: 120,
        name_format: "[T1] {name}".to_string(),
        spawn_weight: 1,
        waves: Some(3),
        per_wave: Some(5),
        duration_seconds: Some(120),
        wave_interval_seconds: Some(5),
    }];
    config
}

fn setup() -> (Orch, BufferedNotifier) {
    let notices = BufferedNotifier::new();
    let orch = Orchestrator::new(config(), FlatWorld::new(), MemoryStore::new(), notices.clone());
    (orch, notices)
}

fn join(orch: &mut Orch, name: &str) -> PlayerId {
    let id = orch.env_mut().add_participant(name);
    orch.on_participant_joined(id, name);
    id
}

fn leave(orch: &mut Orch, player: PlayerId) -> Phase {
    orch.env_mut().remove_participant(player);
    orch.on_participant_left(player)
}

/// Three participants (one per playable team) in an Active round.
fn active_round(orch: &mut Orch) -> [PlayerId; 3] {
    let players = [join(orch, "ann"), join(orch, "bob"), join(orch, "cid")];
    assert_eq!(orch.current_phase(), Phase::Countdown);
    orch.run_ticks(4);
    assert_eq!(orch.current_phase(), Phase::Active);
    players
}

fn run_until(orch: &mut Orch, phase: Phase, max_ticks: u64) {
    for _ in 0..max_ticks {
        if orch.current_phase() == phase {
            return;
        }
        orch.tick();
    }
    assert_eq!(orch.current_phase(), phase, "phase not reached in {max_ticks} ticks");
}

// ---------------------------------------------------------------------------
// Quorum and countdown
// ---------------------------------------------------------------------------

#[test]
fn quorum_loss_reverts_after_debounce() {
    let (mut orch, notices) = setup();
    join(&mut orch, "ann");
    let bob = join(&mut orch, "bob");
    assert_eq!(orch.current_phase(), Phase::Countdown);
    notices.drain();

    assert_eq!(leave(&mut orch, bob), Phase::Countdown);
    orch.run_ticks(2);
    assert_eq!(orch.current_phase(), Phase::Countdown, "debounce still pending");
    orch.tick();
    assert_eq!(orch.current_phase(), Phase::Waiting);

    let seen = notices.drain();
    assert!(seen.iter().any(|n| matches!(n, Notice::InsufficientPlayers { online: 1, required: 2 })));
    assert!(seen.contains(&Notice::PhaseChanged { from: Phase::Countdown, to: Phase::Waiting }));

    // Nothing left running: the countdown does not complete later.
    orch.run_ticks(20);
    assert_eq!(orch.current_phase(), Phase::Waiting);
    assert!(orch.round().is_none());
}

#[test]
fn quorum_restored_within_debounce_keeps_countdown() {
    let (mut orch, _) = setup();
    join(&mut orch, "ann");
    let bob = join(&mut orch, "bob");
    leave(&mut orch, bob);
    orch.tick();

    orch.env_mut().add_participant_with_id(bob, "bob");
    assert_eq!(orch.on_participant_joined(bob, "bob"), Phase::Countdown);
    orch.run_ticks(3);
    assert_eq!(orch.current_phase(), Phase::Active);
}

#[test]
fn repeated_quorum_checks_are_idempotent() {
    let (mut orch, _) = setup();
    join(&mut orch, "ann");
    for _ in 0..3 {
        assert_eq!(orch.check_quorum(), Phase::Waiting);
    }
    join(&mut orch, "bob");
    for _ in 0..3 {
        assert_eq!(orch.check_quorum(), Phase::Countdown);
    }
    // A duplicated countdown timer would have finished after two ticks.
    orch.run_ticks(2);
    assert_eq!(orch.current_phase(), Phase::Countdown);
    orch.run_ticks(2);
    assert_eq!(orch.current_phase(), Phase::Active);
}

// ---------------------------------------------------------------------------
// Round lifecycle
// ---------------------------------------------------------------------------

#[test]
fn round_start_distributes_and_persists() {
    let (mut orch, notices) = setup();
    let players = active_round(&mut orch);

    let round = orch.round().expect("round");
    let id = round.id.expect("persisted");
    assert_eq!(round.total_players, 3);
    assert_eq!(orch.store().round(id).map(|r| r.total_players), Some(3));

    let mut teams: Vec<TeamColor> = players
        .iter()
        .map(|p| orch.ledger().team_of(*p).expect("assigned"))
        .collect();
    teams.sort();
    assert_eq!(teams, TeamColor::PLAYABLE.to_vec());
    for p in players {
        let sim = orch.env().participant(p).expect("online");
        assert_eq!(sim.team, orch.ledger().team_of(p));
        assert_eq!(sim.name_color, orch.ledger().team_of(p));
    }
    assert_eq!(orch.env().environment_resets(), 1);
    assert!(notices.snapshot().iter().any(|n| matches!(n, Notice::RoundStarted { players: 3, .. })));
}

#[test]
fn strict_leader_wins_and_standings_are_stored() {
    let (mut orch, notices) = setup();
    let [ann, bob, _] = active_round(&mut orch);
    let ann_team = orch.ledger().team_of(ann).expect("team");
    let id = orch.round().and_then(|r| r.id).expect("persisted");

    assert_eq!(orch.add_points(ann, 50).map(|c| c.balance), Ok(50));
    orch.consume_item(bob, "BREAD").expect("bread converts");

    run_until(&mut orch, Phase::Cooldown, 700);
    let stored = orch.store().round(id).expect("stored");
    assert_eq!(stored.winning_team, Some(ann_team));
    assert!(stored.ended_at.is_some());

    let scores = orch.store().team_scores(id);
    assert_eq!(scores.len(), 3);
    assert_eq!(scores[0].team, ann_team);
    assert_eq!(scores[0].points, 50);
    assert_eq!(scores[1].points, 10);

    assert!(notices.snapshot().iter().any(
        |n| matches!(n, Notice::RoundEnded { winner: Some(team), .. } if *team == ann_team)
    ));
    // Teardown: nothing placed survives the round, teams are empty.
    assert_eq!(orch.containers().active_count(), 0);
    assert_eq!(orch.env().container_count(), 0);
    assert!(orch.ledger().team_of(ann).is_none());
}

#[test]
fn tied_leaders_yield_no_winner() {
    let (mut orch, notices) = setup();
    let [ann, bob, _] = active_round(&mut orch);
    let id = orch.round().and_then(|r| r.id).expect("persisted");
    orch.add_points(ann, 20).expect("credit");
    orch.add_points(bob, 20).expect("credit");

    run_until(&mut orch, Phase::Cooldown, 700);
    assert_eq!(orch.store().round(id).and_then(|r| r.winning_team), None);
    assert!(notices.snapshot().iter().any(|n| matches!(n, Notice::RoundEnded { winner: None, .. })));
}

#[test]
fn cooldown_chains_back_into_countdown() {
    let (mut orch, notices) = setup();
    active_round(&mut orch);
    run_until(&mut orch, Phase::Cooldown, 700);
    assert!(orch.round().is_some());
    notices.drain();

    run_until(&mut orch, Phase::Countdown, 200);
    assert!(orch.round().is_none());
    let seen = notices.drain();
    assert!(seen.contains(&Notice::PhaseChanged { from: Phase::Cooldown, to: Phase::Waiting }));
    assert!(seen.contains(&Notice::PhaseChanged { from: Phase::Waiting, to: Phase::Countdown }));
}

#[test]
fn persistence_outage_does_not_stop_the_round() {
    let (mut orch, _) = setup();
    orch.store().set_failing(true);
    let [ann, ..] = active_round(&mut orch);
    assert!(orch.round().is_some_and(|r| r.id.is_none()));
    assert_eq!(orch.add_points(ann, 5).map(|c| c.balance), Ok(5));
    assert!(orch.counters().snapshot().store_failures > 0);
    run_until(&mut orch, Phase::Cooldown, 700);
}

#[test]
fn shutdown_flushes_and_stops_everything() {
    let (mut orch, _) = setup();
    let [ann, ..] = active_round(&mut orch);
    orch.add_points(ann, 30).expect("credit");
    orch.shutdown();
    assert_eq!(orch.current_phase(), Phase::Waiting);
    assert_eq!(orch.store().profile(ann).map(|p| p.points), Some(30));
    assert_eq!(orch.rescue().npcs().active_count(), 0);
    assert_eq!(orch.run_ticks(50), 0);
}

// ---------------------------------------------------------------------------
// Punishment
// ---------------------------------------------------------------------------

#[test]
fn punishment_announces_when_the_victim_changes() {
    let (mut orch, notices) = setup();
    let [att, a, b] = active_round(&mut orch);
    notices.drain();
    let cap = orch.config().punishment.cap_seconds * 2;

    let mut last_until = 0;
    for victim in [a, b, b, a] {
        let outcome = orch.trigger_punishment(att, victim).expect("hostile attack");
        let Punishment::Marked { until, .. } = outcome else {
            panic!("attacker should be marked");
        };
        assert!(until > last_until);
        assert!(until - orch.now() <= cap);
        last_until = until;
        orch.tick();
    }

    let announced: Vec<PlayerId> = notices
        .drain()
        .into_iter()
        .filter_map(|n| match n {
            Notice::PunishmentApplied { victim, .. } => Some(victim),
            _ => None,
        })
        .collect();
    assert_eq!(announced, vec![a, b, a]);

    let sim = orch.env().participant(att).expect("online");
    assert_eq!(sim.gear_strips, 1);
    assert_eq!(sim.name_color, Some(TeamColor::RESERVED));
    assert_eq!(orch.check_equip(att, "IRON_CHESTPLATE"), Err(Rejection::GearLocked));
    assert_eq!(orch.check_equip(att, "BREAD"), Ok(()));
    assert_eq!(orch.check_equip(a, "IRON_CHESTPLATE"), Ok(()));
}

#[test]
fn punishment_deadline_survives_a_restart() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("rush.db");
    let config = config();

    let (attacker, left_before) = {
        let store = SqliteStore::open(&path, &config.persistence).expect("open");
        let mut orch = Orchestrator::new(config.clone(), FlatWorld::new(), store, NullNotifier);
        let mut players = Vec::new();
        for name in ["ann", "bob", "cid"] {
            let id = orch.env_mut().add_participant(name);
            orch.on_participant_joined(id, name);
            players.push(id);
        }
        orch.run_ticks(4);
        assert_eq!(orch.current_phase(), Phase::Active);
        orch.trigger_punishment(players[0], players[1]).expect("hostile attack");
        orch.run_ticks(300);

        let until = orch.ledger().profile(players[0]).and_then(|p| p.punished_until).expect("punished");
        let left = until - orch.now();
        assert_eq!(left, 60);
        orch.shutdown();
        (players[0], left)
    };

    // The tick clock restarts at zero; the remaining time must not.
    let store = SqliteStore::open(&path, &config.persistence).expect("reopen");
    let mut orch = Orchestrator::new(config, FlatWorld::new(), store, NullNotifier);
    orch.env_mut().add_participant_with_id(attacker, "ann");
    orch.on_participant_joined(attacker, "ann");
    assert_eq!(orch.now(), 0);

    let until = orch.ledger().profile(attacker).and_then(|p| p.punished_until).expect("still punished");
    assert!(until <= left_before, "{until} ticks left after restart");
    assert!(until + 2 >= left_before, "{until} ticks left after restart");
    assert!(!orch.can_equip_protective(attacker));
}

#[test]
fn aggression_is_counted_for_both_sides() {
    let (mut orch, _) = setup();
    let [ann, bob, _] = active_round(&mut orch);
    orch.record_aggression(ann, bob).expect("kill");
    assert_eq!(orch.record_aggression(ann, ann), Err(Rejection::SelfTarget));
    assert_eq!(orch.ledger().profile(ann).map(|p| p.aggression), Some(1));
    assert_eq!(orch.ledger().profile(bob).map(|p| p.counter_aggression), Some(1));
    let team = orch.ledger().team_of(ann).and_then(|t| orch.ledger().team(t)).expect("team");
    assert_eq!(team.aggression, 1);
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

#[test]
fn consumed_container_respawns_at_the_same_block() {
    let (mut orch, _) = setup();
    let [ann, ..] = active_round(&mut orch);
    orch.run_ticks(150);
    let pos = *orch.containers().active().next().expect("containers placed").0;

    orch.on_container_opened(ann, pos).expect("game container");
    assert_eq!(orch.ledger().profile(ann).map(|p| p.containers_opened), Some(1));
    orch.on_container_consumed(pos).expect("consumed");
    assert!(!orch.env().has_container(pos));
    assert!(orch.containers().pending_fire_at(pos).is_some());
    assert_eq!(orch.on_container_consumed(pos), Err(Rejection::UnknownContainer));

    orch.run_ticks(6);
    assert!(orch.env().has_container(pos));
    assert_eq!(orch.containers().pending_fire_at(pos), None);
}

#[test]
fn unconvertible_items_are_rejected() {
    let (mut orch, _) = setup();
    let [ann, ..] = active_round(&mut orch);
    assert_eq!(orch.consume_item(ann, "DIRT"), Err(Rejection::NotConvertible));
    assert_eq!(orch.consume_item(ann, "GOLDEN_APPLE").map(|c| c.balance), Ok(50));
}

// ---------------------------------------------------------------------------
// Rescue encounters and privileged spawns
// ---------------------------------------------------------------------------

#[test]
fn rescue_victory_feeds_threshold_and_privileged_bonus() {
    let (mut orch, notices) = setup();
    let [ann, ..] = active_round(&mut orch);
    orch.run_ticks(150);

    let (npc_pos, npc) = orch
        .rescue()
        .npcs()
        .active()
        .next()
        .map(|(pos, npc)| (*pos, npc.actor))
        .expect("npcs placed");
    orch.env_mut().move_participant(ann, npc_pos.center());
    notices.drain();

    let start = orch.start_encounter(ann, npc).expect("encounter");
    assert_eq!((start.waves, start.first_wave), (3, 5));
    assert_eq!(orch.start_encounter(ann, npc), Err(Rejection::AlreadyEngaged));

    for _ in 0..60 {
        for monster in orch.env().actors_of_type("GummyZombie") {
            orch.env_mut().kill_actor(monster);
        }
        orch.tick();
        if orch.rescue().encounter(ann).is_none() {
            break;
        }
    }

    let seen = notices.drain();
    let rewards: Vec<i64> = seen
        .iter()
        .filter_map(|n| match n {
            Notice::EncounterWon { reward, .. } => Some(*reward),
            _ => None,
        })
        .collect();
    assert_eq!(rewards.len(), 1);
    let reward = rewards[0];
    assert!((50..=100).contains(&reward));
    assert_eq!(seen.iter().filter(|n| matches!(n, Notice::WaveSpawned { .. })).count(), 3);

    let profile = orch.ledger().profile(ann).expect("profile");
    assert_eq!(profile.encounters_completed, 1);
    assert_eq!(profile.points, reward);
    assert!(!orch.env().is_alive(npc));
    assert!(orch.rescue().npcs().pending_fire_at(npc_pos).is_some());

    // 120 threshold points against a threshold of 100 leaves 20 carried.
    assert_eq!(orch.threshold().accumulator(ann), 20);
    let privileged = seen
        .iter()
        .find_map(|n| match n {
            Notice::PrivilegedSpawned { actor, .. } => Some(*actor),
            _ => None,
        })
        .expect("privileged spawned");
    assert_eq!(orch.threshold().active_count(), 1);

    assert_eq!(orch.on_privileged_defeated(privileged, ann), Ok(500));
    assert_eq!(orch.ledger().profile(ann).map(|p| p.points), Some(reward + 500));
    assert_eq!(orch.threshold().active_count(), 0);
    assert_eq!(orch.on_privileged_defeated(privileged, ann), Err(Rejection::NotPrivileged));
}

#[test]
fn leaving_mid_encounter_abandons_it() {
    let (mut orch, notices) = setup();
    let [ann, ..] = active_round(&mut orch);
    orch.run_ticks(150);
    let (npc_pos, npc) = orch
        .rescue()
        .npcs()
        .active()
        .next()
        .map(|(pos, npc)| (*pos, npc.actor))
        .expect("npcs placed");
    orch.env_mut().move_participant(ann, npc_pos.center());
    orch.start_encounter(ann, npc).expect("encounter");

    leave(&mut orch, ann);
    assert!(orch.rescue().encounter(ann).is_none());
    assert!(notices.snapshot().contains(&Notice::EncounterLost { player: ann, end: EncounterEnd::Abandoned }));
    assert!(orch.env().actors_of_type("GummyZombie").is_empty());
    // Still Active: the profile stays cached for a rejoin.
    assert!(orch.ledger().contains(ann));
}
