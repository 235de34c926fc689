//! Round orchestrator: the phase machine and owner of every subsystem.
//!
//! ```text
//!   Waiting ──quorum──► Countdown ──timer──► Active ──timer──► Cooldown ──timer──┐
//!      ▲                    │                                                    │
//!      ├──quorum lost───────┘ (debounced)                                        │
//!      └─────────────────────────────── re-check quorum ◄────────────────────────┘
//! ```
//!
//! The host calls [`Orchestrator::tick`] once per external tick and the
//! gameplay entrypoints from its event handlers, all on the same thread.
//! Every timer is an entry in one [`TickScheduler`]; the orchestrator matches
//! on the payload to run the handler, so no handler ever runs concurrently
//! with another.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, debug_span, error, info, info_span, trace_span, warn};

use crate::config::RushConfig;
use crate::containers::{ContainerOpened, ContainerPlacer, ContainerScheduler};
use crate::encounter::{EncounterEnd, EncounterStart, EncounterUpdate, RescueEngine};
use crate::error::{Rejection, RushError};
use crate::ledger::{Ledger, PlayerProfile, TeamStanding};
use crate::loot::{ContainerKind, is_protective};
use crate::metrics::{CounterSnapshot, RushCounters, spans};
use crate::notify::{Notice, Notifier, PointSource};
use crate::punishment::{Punishment, PunishmentTracker};
use crate::respawn::{PopulationPlan, StepOutcome};
use crate::scheduler::{TaskHandle, TickScheduler};
use crate::services::{Environment, RecordStore};
use crate::threshold::{SpawnOutcome, ThresholdSpawner};
use crate::types::{ActorHandle, BlockPos, ChunkPos, Coordinate, PlayerId, Round, RoundId, TeamColor, Tick};

/// Scatter radius around the map center for participant spawn points.
const SPAWN_SCATTER: u32 = 16;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Lifecycle phase of the orchestrator. Exactly one is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Idle, waiting for enough participants.
    #[default]
    Waiting,
    /// Quorum reached; counting down to the round start.
    Countdown,
    /// A round is being played.
    Active,
    /// The round ended; results are shown before returning to Waiting.
    Cooldown,
}

impl Phase {
    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Countdown => "countdown",
            Self::Active => "active",
            Self::Cooldown => "cooldown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Scheduled work
// ---------------------------------------------------------------------------

/// Payload of every scheduler entry the orchestrator registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    PunishmentSweep,
    CountdownSecond,
    QuorumDebounce,
    RoundSecond,
    PopulateStep,
    ContainerSweep,
    NpcSweep,
    HelpSweep,
    EncounterSecond(PlayerId),
    CooldownEnd,
}

impl Task {
    /// Entries that only make sense while a round is active.
    fn is_round_scoped(&self) -> bool {
        matches!(
            self,
            Self::RoundSecond
                | Self::PopulateStep
                | Self::ContainerSweep
                | Self::NpcSweep
                | Self::HelpSweep
                | Self::EncounterSecond(_)
        )
    }

    fn is_countdown(&self) -> bool {
        matches!(self, Self::CountdownSecond | Self::QuorumDebounce)
    }
}

// ---------------------------------------------------------------------------
// Public results
// ---------------------------------------------------------------------------

/// Points credited by an entrypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Credit {
    /// Amount credited (may be negative for debits).
    pub amount: i64,
    /// Player balance afterwards.
    pub balance: i64,
}

/// Serializable view of the orchestrator for admin and dashboard surfaces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    /// Current phase.
    pub phase: Phase,
    /// Id of the current round, if one exists and was persisted.
    pub round: Option<RoundId>,
    /// Current tick.
    pub tick: Tick,
    /// Seconds until the current phase's timer expires (0 in Waiting).
    pub seconds_left: u64,
    /// Team standings, best first.
    pub standings: Vec<TeamStanding>,
    /// Containers currently placed.
    pub containers_active: usize,
    /// Container respawns waiting.
    pub containers_pending: usize,
    /// Idle rescue NPCs.
    pub npcs_active: usize,
    /// NPC respawns waiting.
    pub npcs_pending: usize,
    /// Running rescue encounters.
    pub encounters: usize,
    /// Live privileged encounters.
    pub privileged_active: usize,
    /// Participants online.
    pub online: usize,
    /// Counter values.
    pub counters: CounterSnapshot,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Owns the phase machine, the tick scheduler and every subsystem.
pub struct Orchestrator<E: Environment, S: RecordStore> {
    config: RushConfig,
    env: E,
    store: S,
    notifier: Box<dyn Notifier + Send>,
    scheduler: TickScheduler<Task>,
    phase: Phase,
    round: Option<Round>,
    ledger: Ledger,
    punishment: PunishmentTracker,
    threshold: ThresholdSpawner,
    containers: ContainerScheduler,
    rescue: RescueEngine,
    rescue_enabled: bool,
    rng: StdRng,
    counters: Arc<RushCounters>,
    countdown_left: u64,
    round_left: u64,
    cooldown_until: Tick,
    debounce: Option<TaskHandle>,
}

impl<E: Environment, S: RecordStore> fmt::Debug for Orchestrator<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("phase", &self.phase)
            .field("round", &self.round.as_ref().and_then(|r| r.id))
            .field("now", &self.scheduler.now())
            .field("scheduled", &self.scheduler.len())
            .field("players", &self.ledger.len())
            .field("rescue_enabled", &self.rescue_enabled)
            .finish_non_exhaustive()
    }
}

impl<E: Environment, S: RecordStore> Orchestrator<E, S> {
    /// Build the orchestrator in Waiting.
    ///
    /// Actor types named in the config are validated against `env` here;
    /// unknown ones are dropped with a warning and the feature depending on
    /// them is disabled.
    pub fn new(config: RushConfig, env: E, store: S, notifier: impl Notifier + Send + 'static) -> Self {
        let tps = config.general.ticks_per_second;

        let mut threshold = ThresholdSpawner::new(config.threshold.clone());
        let privileged_enabled = threshold.validate_types(&env);
        let mut rescue = RescueEngine::new(&config.rescue, tps);
        let rescue_enabled = rescue.validate_types(&env);
        let containers = ContainerScheduler::new(
            ContainerPlacer::new(&config.containers),
            config.ticks(config.containers.respawn_delay_seconds),
        );
        let rng = config
            .general
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

        let mut scheduler = TickScheduler::new();
        let sweep = config.ticks(config.punishment.sweep_interval_seconds).max(1);
        scheduler.schedule_repeating(sweep, sweep, Task::PunishmentSweep);

        info!(
            tps,
            min_players = config.round.min_players,
            rescue_enabled,
            privileged_enabled,
            "Orchestrator ready"
        );

        Self {
            punishment: PunishmentTracker::new(&config.punishment, tps),
            config,
            env,
            store,
            notifier: Box::new(notifier),
            scheduler,
            phase: Phase::Waiting,
            round: None,
            ledger: Ledger::new(),
            threshold,
            containers,
            rescue,
            rescue_enabled,
            rng,
            counters: Arc::new(RushCounters::new()),
            countdown_left: 0,
            round_left: 0,
            cooldown_until: 0,
            debounce: None,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Current phase.
    #[must_use]
    pub fn current_phase(&self) -> Phase {
        self.phase
    }

    /// Current tick.
    #[must_use]
    pub fn now(&self) -> Tick {
        self.scheduler.now()
    }

    /// Current round, from Active entry until Cooldown ends.
    #[must_use]
    pub fn round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &RushConfig {
        &self.config
    }

    /// Host environment.
    #[must_use]
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Mutable host environment, for hosts that own their world through it.
    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    /// Record store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Cached profiles and team aggregates.
    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Container scheduler.
    #[must_use]
    pub fn containers(&self) -> &ContainerScheduler {
        &self.containers
    }

    /// Rescue engine.
    #[must_use]
    pub fn rescue(&self) -> &RescueEngine {
        &self.rescue
    }

    /// Threshold spawner.
    #[must_use]
    pub fn threshold(&self) -> &ThresholdSpawner {
        &self.threshold
    }

    /// Shared counters, readable from other threads.
    #[must_use]
    pub fn counters(&self) -> Arc<RushCounters> {
        Arc::clone(&self.counters)
    }

    // ------------------------------------------------------------------
    // Tick loop
    // ------------------------------------------------------------------

    /// Advance one tick and run every due handler in (fire tick,
    /// registration) order. Returns the number of handlers run.
    pub fn tick(&mut self) -> usize {
        let now = self.scheduler.advance();
        let span = trace_span!(spans::TICK, now);
        let _enter = span.enter();
        RushCounters::bump(&self.counters.ticks);

        let mut fired = 0;
        // Popping one entry at a time lets a handler cancel entries that are
        // due later in the same tick.
        while let Some((handle, task)) = self.scheduler.pop_due() {
            self.run(handle, task);
            fired += 1;
        }
        self.flush();
        fired
    }

    /// Run `n` ticks. Returns the total number of handlers run.
    pub fn run_ticks(&mut self, n: u64) -> usize {
        (0..n).map(|_| self.tick()).sum()
    }

    fn run(&mut self, handle: TaskHandle, task: Task) {
        match task {
            Task::PunishmentSweep => self.on_punishment_sweep(),
            Task::CountdownSecond => self.on_countdown_second(),
            Task::QuorumDebounce => self.on_quorum_debounce(),
            Task::RoundSecond => self.on_round_second(),
            Task::PopulateStep => self.on_populate_step(handle),
            Task::ContainerSweep => self.on_container_sweep(),
            Task::NpcSweep => self.on_npc_sweep(),
            Task::HelpSweep => self.on_help_sweep(),
            Task::EncounterSecond(player) => self.on_encounter_second(handle, player),
            Task::CooldownEnd => self.on_cooldown_end(),
        }
    }

    // ------------------------------------------------------------------
    // Quorum & countdown
    // ------------------------------------------------------------------

    /// Participants online according to the host.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.env.online_participants().len()
    }

    /// Whether enough participants are online to start.
    #[must_use]
    pub fn quorum_met(&self) -> bool {
        self.online_count() >= self.config.round.min_players
    }

    /// Re-evaluate the participant count. Starts a countdown from Waiting,
    /// arms the revert debounce during Countdown, and is a no-op otherwise.
    /// Repeated calls without a state change reach the same decision.
    pub fn check_quorum(&mut self) -> Phase {
        match self.phase {
            Phase::Waiting if self.quorum_met() => self.begin_countdown(),
            Phase::Countdown if !self.quorum_met() => self.arm_debounce(),
            Phase::Countdown => self.disarm_debounce(),
            _ => {}
        }
        self.phase
    }

    /// Admin: start the countdown now if quorum holds.
    ///
    /// # Errors
    ///
    /// [`Rejection::WrongPhase`] outside Waiting; [`Rejection::NotEnoughPlayers`]
    /// without quorum.
    pub fn try_advance_from_waiting(&mut self) -> Result<Phase, Rejection> {
        if self.phase != Phase::Waiting {
            return Err(Rejection::WrongPhase);
        }
        if !self.quorum_met() {
            self.notify_insufficient();
            return Err(Rejection::NotEnoughPlayers);
        }
        self.begin_countdown();
        Ok(self.phase)
    }

    /// Admin: abort a running countdown and return to Waiting.
    ///
    /// # Errors
    ///
    /// [`Rejection::WrongPhase`] outside Countdown.
    pub fn cancel_countdown(&mut self) -> Result<(), Rejection> {
        if self.phase != Phase::Countdown {
            return Err(Rejection::WrongPhase);
        }
        self.stop_countdown();
        info!("Countdown cancelled");
        self.set_phase(Phase::Waiting);
        Ok(())
    }

    fn begin_countdown(&mut self) {
        let seconds = self.config.round.countdown_seconds;
        self.set_phase(Phase::Countdown);
        if seconds == 0 {
            self.start_round();
            return;
        }
        self.countdown_left = seconds;
        info!(seconds, online = self.online_count(), "Countdown started");
        self.notify(Notice::CountdownTick { seconds_left: seconds });
        let tps = self.config.ticks(1);
        self.scheduler.schedule_repeating(tps, tps, Task::CountdownSecond);
    }

    fn stop_countdown(&mut self) {
        self.scheduler.cancel_where(Task::is_countdown);
        self.debounce = None;
        self.countdown_left = 0;
    }

    fn arm_debounce(&mut self) {
        if self.debounce.is_some_and(|h| self.scheduler.is_scheduled(h)) {
            return;
        }
        let delay = self.config.round.quorum_debounce_ticks;
        debug!(delay, online = self.online_count(), "Quorum lost during countdown");
        self.debounce = Some(self.scheduler.schedule_once(delay, Task::QuorumDebounce));
    }

    fn disarm_debounce(&mut self) {
        if let Some(handle) = self.debounce.take() {
            if self.scheduler.cancel(handle) {
                debug!("Quorum restored during countdown");
            }
        }
    }

    fn on_quorum_debounce(&mut self) {
        self.debounce = None;
        if self.phase == Phase::Countdown && !self.quorum_met() {
            self.revert_to_waiting();
        }
    }

    fn revert_to_waiting(&mut self) {
        self.stop_countdown();
        info!(online = self.online_count(), required = self.config.round.min_players, "Not enough players, countdown reverted");
        self.notify_insufficient();
        self.set_phase(Phase::Waiting);
    }

    fn on_countdown_second(&mut self) {
        if self.phase != Phase::Countdown {
            return;
        }
        self.countdown_left = self.countdown_left.saturating_sub(1);
        if self.countdown_left == 0 {
            if self.quorum_met() {
                self.start_round();
            } else {
                self.revert_to_waiting();
            }
            return;
        }
        if self.config.round.countdown_announce.contains(&self.countdown_left) {
            self.notify(Notice::CountdownTick { seconds_left: self.countdown_left });
        }
    }

    // ------------------------------------------------------------------
    // Round lifecycle
    // ------------------------------------------------------------------

    fn start_round(&mut self) {
        let span = info_span!(spans::ROUND_START);
        let _enter = span.enter();
        self.stop_countdown();

        let mut participants: Vec<PlayerId> = self
            .env
            .online_participants()
            .into_iter()
            .filter(|p| self.ledger.contains(*p))
            .collect();
        participants.sort_unstable();

        let mut round = Round::begin(u32::try_from(participants.len()).unwrap_or(u32::MAX));
        match self.store.create_round(&round) {
            Ok(id) => round.id = Some(id),
            Err(e) => self.store_failed("create_round", &e),
        }
        let id = round.id;

        self.ledger.reset_balances();
        self.ledger.reset_teams();
        self.punishment.clear();
        self.threshold.clear(&mut self.env);
        self.rescue.clear(&mut self.env);
        self.containers.clear(&mut self.env);

        let assignments = self.ledger.distribute(&participants, &mut self.rng);
        for (player, team) in assignments {
            let spawn = self.spawn_point();
            self.env.prepare_participant(player, team, spawn);
            self.env.set_name_color(player, Some(team));
            self.notify(Notice::TeamAssigned { player, team });
        }

        let center = self.config.center();
        let radius = self.config.round.map_radius;
        self.env.reset_environment(center, radius);

        let plan = PopulationPlan {
            center,
            radius,
            stride: 1,
            per_chunk: self.config.containers.per_chunk,
            attempts: self.config.containers.probe_attempts,
        };
        self.containers.begin_population(plan, id);
        if self.rescue_enabled {
            let npc_plan = PopulationPlan {
                stride: self.config.rescue.npc_per_chunks,
                per_chunk: 1,
                attempts: self.config.rescue.probe_attempts,
                ..plan
            };
            self.rescue.npcs_mut().begin_population(npc_plan, id);
        }

        let tps = self.config.ticks(1);
        self.round_left = self.config.round.duration_minutes.saturating_mul(60);
        self.scheduler.schedule_repeating(1, 1, Task::PopulateStep);
        self.scheduler.schedule_repeating(tps, tps, Task::RoundSecond);
        let sweep = self.config.ticks(self.config.containers.sweep_interval_seconds).max(1);
        self.scheduler.schedule_repeating(sweep, sweep, Task::ContainerSweep);
        if self.rescue_enabled {
            let sweep = self.config.ticks(self.config.rescue.sweep_interval_seconds).max(1);
            self.scheduler.schedule_repeating(sweep, sweep, Task::NpcSweep);
            self.scheduler.schedule_repeating(tps, tps, Task::HelpSweep);
        }

        let players = round.total_players;
        self.round = Some(round);
        RushCounters::bump(&self.counters.rounds_started);
        self.set_phase(Phase::Active);
        info!(round = ?id, players, "Round started");
        self.notify(Notice::RoundStarted { round: id, players });
    }

    fn on_round_second(&mut self) {
        self.round_left = self.round_left.saturating_sub(1);
        if self.round_left == 0 {
            self.end_round();
            return;
        }
        if self.config.round.announce_remaining.contains(&self.round_left) {
            self.notify(Notice::TimeRemaining { seconds: self.round_left });
        }
    }

    fn end_round(&mut self) {
        let span = info_span!(spans::ROUND_END);
        let _enter = span.enter();
        self.scheduler.cancel_where(Task::is_round_scoped);

        let winner = self.ledger.winner();
        let standings = self.ledger.standings();
        let round = self.round.as_mut().map(|r| {
            r.finish(winner);
            r.clone()
        });
        let id = round.as_ref().and_then(|r| r.id);
        if let (Some(round), Some(id)) = (&round, id) {
            if let Err(e) = self.store.update_round(round) {
                self.store_failed("update_round", &e);
            }
            if let Err(e) = self.store.save_team_scores(id, &standings) {
                self.store_failed("save_team_scores", &e);
            }
        }

        self.teardown_round();
        self.ledger.reset_teams();
        let now = self.now();
        for player in self.env.online_participants() {
            let punished = self.ledger.profile(player).is_some_and(|p| p.is_punished_at(now));
            self.env.set_name_color(player, punished.then_some(TeamColor::RESERVED));
        }

        RushCounters::bump(&self.counters.rounds_completed);
        info!(round = ?id, winner = ?winner, "Round ended");
        self.notify(Notice::RoundEnded { round: id, winner, standings });
        self.evict_offline();

        let seconds = self.config.round.cooldown_minutes.saturating_mul(60);
        let delay = self.config.ticks(seconds);
        self.cooldown_until = now.saturating_add(delay);
        self.scheduler.schedule_once(delay, Task::CooldownEnd);
        self.set_phase(Phase::Cooldown);
        self.notify(Notice::CooldownStarted { seconds });
    }

    fn teardown_round(&mut self) {
        let encounters = self.rescue.clear(&mut self.env);
        let containers = self.containers.clear(&mut self.env);
        self.threshold.clear(&mut self.env);
        debug!(encounters, containers, "Round entities removed");
    }

    fn on_cooldown_end(&mut self) {
        self.round = None;
        self.set_phase(Phase::Waiting);
        self.check_quorum();
    }

    /// Stop everything: cancel every scheduled entry, end an active round
    /// without a result and flush every cached profile. The orchestrator is
    /// left in Waiting with no timers; it does not tick anything afterwards.
    pub fn shutdown(&mut self) {
        self.scheduler.cancel_all();
        self.debounce = None;
        if self.phase == Phase::Active {
            let round = self.round.as_mut().map(|r| {
                r.finish(None);
                r.clone()
            });
            if let Some(round) = round.filter(|r| r.id.is_some()) {
                if let Err(e) = self.store.update_round(&round) {
                    self.store_failed("update_round", &e);
                }
            }
            self.teardown_round();
            self.ledger.reset_teams();
        }
        self.round = None;

        let (now, tps) = (self.now(), self.config.general.ticks_per_second);
        let players: Vec<PlayerId> = self.ledger.profiles().map(|p| p.id).collect();
        for player in &players {
            let Some(profile) = self.ledger.stamp_for_save(*player, now, tps) else { continue };
            if let Err(e) = self.store.upsert_player_profile(profile) {
                self.store_failed("upsert_player_profile", &e);
            }
        }
        let _ = self.ledger.take_dirty();
        self.set_phase(Phase::Waiting);
        info!(profiles = players.len(), "Orchestrator shut down");
    }

    // ------------------------------------------------------------------
    // Population & sweeps
    // ------------------------------------------------------------------

    fn on_populate_step(&mut self, handle: TaskHandle) {
        if let StepOutcome::Placed(_) = self.containers.step(&mut self.env, &self.store, &mut self.rng) {
            RushCounters::bump(&self.counters.containers_placed);
        }
        if let StepOutcome::Placed(_) =
            self.rescue.npcs_mut().step(&mut self.env, &self.store, &mut self.rng)
        {
            RushCounters::bump(&self.counters.npcs_placed);
        }
        if !self.containers.is_populating() && !self.rescue.npcs().is_populating() {
            self.scheduler.cancel(handle);
            info!(
                containers = self.containers.active_count(),
                npcs = self.rescue.npcs().active_count(),
                "Population finished"
            );
        }
    }

    fn on_container_sweep(&mut self) {
        let span = debug_span!(spans::RESPAWN_SWEEP, category = "container");
        let _enter = span.enter();
        let now = self.now();
        let placed = self.containers.sweep(&mut self.env, &self.store, now, &mut self.rng);
        RushCounters::add(&self.counters.containers_placed, placed as u64);
    }

    fn on_npc_sweep(&mut self) {
        let span = debug_span!(spans::RESPAWN_SWEEP, category = "rescue_npc");
        let _enter = span.enter();
        let now = self.now();
        let placed = self.rescue.npcs_mut().sweep(&mut self.env, &self.store, now, &mut self.rng);
        RushCounters::add(&self.counters.npcs_placed, placed as u64);
    }

    fn on_help_sweep(&mut self) {
        let now = self.now();
        for (player, npc, name) in self.rescue.help_sweep(&self.env, now) {
            self.notify(Notice::HelpRequest { player, npc, name });
        }
    }

    fn on_punishment_sweep(&mut self) {
        let now = self.now();
        for player in self.punishment.sweep(&mut self.ledger, now) {
            let team = self.ledger.team_of(player);
            self.env.set_name_color(player, team);
            self.notify(Notice::PunishmentExpired { player });
        }
    }

    /// A world area became active: purge placements left by other rounds.
    /// Works in every phase. Returns how many stale placements were removed.
    pub fn on_chunk_activated(&mut self, chunk: ChunkPos) -> usize {
        self.containers.on_chunk_activated(&mut self.env, &self.store, chunk)
            + self.rescue.npcs_mut().on_chunk_activated(&mut self.env, &self.store, chunk)
    }

    // ------------------------------------------------------------------
    // Encounters
    // ------------------------------------------------------------------

    /// `player` interacted with the rescue NPC `npc`.
    ///
    /// # Errors
    ///
    /// [`Rejection::NotActive`] outside Active, [`Rejection::UnknownPlayer`],
    /// and the engine's [`Rejection::AlreadyEngaged`] / [`Rejection::UnknownNpc`].
    pub fn start_encounter(&mut self, player: PlayerId, npc: ActorHandle) -> Result<EncounterStart, Rejection> {
        self.require_active()?;
        if !self.ledger.contains(player) {
            return Err(Rejection::UnknownPlayer);
        }
        let start = self.rescue.start(&mut self.env, player, npc, &mut self.rng)?;
        let tps = self.config.ticks(1);
        self.scheduler.schedule_repeating(tps, tps, Task::EncounterSecond(player));
        RushCounters::bump(&self.counters.encounters_started);

        self.notify(Notice::EncounterStarted {
            player,
            tier: start.tier,
            waves: start.waves,
            duration_seconds: start.duration_seconds,
        });
        self.notify(Notice::WaveSpawned {
            player,
            wave: 1,
            total: start.waves,
            monsters: start.first_wave,
        });
        Ok(start)
    }

    fn on_encounter_second(&mut self, handle: TaskHandle, player: PlayerId) {
        let now = self.now();
        let Some(update) = self.rescue.advance(&mut self.env, player, now, &mut self.rng) else {
            self.scheduler.cancel(handle);
            return;
        };
        match update {
            EncounterUpdate::Ongoing { wave, total, monsters_left, seconds_left, spawned, warning } => {
                if let Some(monsters) = spawned {
                    self.notify(Notice::WaveSpawned { player, wave, total, monsters });
                }
                if warning {
                    self.notify(Notice::DistanceWarning { player });
                }
                self.notify(Notice::EncounterProgress { player, wave, total, monsters_left, seconds_left });
            }
            EncounterUpdate::Won { tier, reward, threshold_points } => {
                self.scheduler.cancel(handle);
                RushCounters::bump(&self.counters.encounters_won);
                if let Some(profile) = self.ledger.profile_mut(player) {
                    profile.encounters_completed += 1;
                }
                self.notify(Notice::EncounterWon { player, tier, reward });
                if let Err(reason) = self.credit(player, reward, PointSource::Rescue) {
                    warn!(%player, %reason, "Rescue reward not credited");
                }
                if self.threshold.add(player, threshold_points) {
                    self.request_privileged(player);
                }
            }
            EncounterUpdate::Lost(end) => {
                self.scheduler.cancel(handle);
                RushCounters::bump(&self.counters.encounters_lost);
                self.notify(Notice::EncounterLost { player, end });
            }
        }
    }

    fn request_privileged(&mut self, player: PlayerId) {
        match self.threshold.request_spawn(&mut self.env, player, &mut self.rng) {
            SpawnOutcome::Spawned { actor, type_id } => {
                RushCounters::bump(&self.counters.privileged_spawned);
                self.notify(Notice::PrivilegedSpawned { player, actor, type_id });
            }
            SpawnOutcome::Suppressed => {
                RushCounters::bump(&self.counters.privileged_suppressed);
                self.notify(Notice::PrivilegedSuppressed { player });
            }
            SpawnOutcome::Failed => debug!(%player, "Privileged spawn request failed"),
        }
    }

    /// A privileged encounter died. The cap slot is freed even when `by` is
    /// not a known participant.
    ///
    /// # Errors
    ///
    /// [`Rejection::NotActive`] outside Active, [`Rejection::NotPrivileged`]
    /// if `actor` is not a live privileged encounter, [`Rejection::UnknownPlayer`]
    /// if nobody can be credited.
    pub fn on_privileged_defeated(&mut self, actor: ActorHandle, by: PlayerId) -> Result<i64, Rejection> {
        self.require_active()?;
        let bonus = self.threshold.on_defeated(actor).ok_or(Rejection::NotPrivileged)?;
        self.credit(by, bonus, PointSource::PrivilegedBonus)?;
        info!(%actor, %by, bonus, "Privileged encounter defeated");
        self.notify(Notice::PrivilegedDefeated { by, bonus });
        self.flush();
        Ok(bonus)
    }

    // ------------------------------------------------------------------
    // Points, combat, containers
    // ------------------------------------------------------------------

    /// Credit `amount` points to `player` and their team.
    ///
    /// # Errors
    ///
    /// [`Rejection::NotActive`] outside Active; [`Rejection::UnknownPlayer`].
    pub fn add_points(&mut self, player: PlayerId, amount: i64) -> Result<Credit, Rejection> {
        self.require_active()?;
        let credit = self.credit(player, amount, PointSource::Direct);
        self.flush();
        credit
    }

    /// `player` consumed `item`; convert it through the food table.
    ///
    /// # Errors
    ///
    /// [`Rejection::NotActive`] outside Active; [`Rejection::NotConvertible`]
    /// for items without a point value; [`Rejection::UnknownPlayer`].
    pub fn consume_item(&mut self, player: PlayerId, item: &str) -> Result<Credit, Rejection> {
        self.require_active()?;
        let amount = *self.config.points.food.get(item).ok_or(Rejection::NotConvertible)?;
        let credit = self.credit(player, amount, PointSource::Consumption);
        self.flush();
        credit
    }

    /// `attacker` killed `victim`: bump the aggression counters.
    ///
    /// # Errors
    ///
    /// [`Rejection::NotActive`], [`Rejection::SelfTarget`], [`Rejection::UnknownPlayer`].
    pub fn record_aggression(&mut self, attacker: PlayerId, victim: PlayerId) -> Result<(), Rejection> {
        self.require_active()?;
        if attacker == victim {
            return Err(Rejection::SelfTarget);
        }
        if !self.ledger.record_aggression(attacker, victim) {
            return Err(Rejection::UnknownPlayer);
        }
        debug!(%attacker, %victim, "Aggression recorded");
        self.flush();
        Ok(())
    }

    /// `attacker` damaged `victim` under the hostility rule.
    ///
    /// A first trigger strips worn protective gear and flags the attacker
    /// with the reserved color. A notice goes out the first time each victim
    /// appears within one punishment streak.
    ///
    /// # Errors
    ///
    /// [`Rejection::NotActive`], plus the tracker's [`Rejection::SelfTarget`],
    /// [`Rejection::UnknownPlayer`] and [`Rejection::FriendlyFire`].
    pub fn trigger_punishment(&mut self, attacker: PlayerId, victim: PlayerId) -> Result<Punishment, Rejection> {
        self.require_active()?;
        let now = self.now();
        let outcome = self.punishment.trigger(&mut self.ledger, attacker, victim, now)?;
        if let Punishment::Marked { until, first, announce } = outcome {
            RushCounters::bump(&self.counters.punishments_applied);
            if first {
                self.env.strip_protective_gear(attacker);
                self.env.set_name_color(attacker, Some(TeamColor::RESERVED));
            }
            if announce {
                self.notify(Notice::PunishmentApplied { attacker, victim, until, first });
            }
        }
        self.flush();
        Ok(outcome)
    }

    /// Whether `player` may equip protective gear right now.
    #[must_use]
    pub fn can_equip_protective(&self, player: PlayerId) -> bool {
        self.punishment.can_equip_protective(&self.ledger, player, self.now())
    }

    /// Gate an equip action for `item`.
    ///
    /// # Errors
    ///
    /// [`Rejection::GearLocked`] when `item` is protective and the player is punished.
    pub fn check_equip(&self, player: PlayerId, item: &str) -> Result<(), Rejection> {
        if is_protective(item) && !self.can_equip_protective(player) {
            return Err(Rejection::GearLocked);
        }
        Ok(())
    }

    /// `player` opened the container at `pos`.
    ///
    /// # Errors
    ///
    /// [`Rejection::NotActive`], [`Rejection::UnknownPlayer`], [`Rejection::UnknownContainer`].
    pub fn on_container_opened(&mut self, player: PlayerId, pos: BlockPos) -> Result<ContainerOpened, Rejection> {
        self.require_active()?;
        if !self.ledger.contains(player) {
            return Err(Rejection::UnknownPlayer);
        }
        let opened = self.containers.open(pos)?;
        if let Some(profile) = self.ledger.profile_mut(player) {
            profile.containers_opened += 1;
        }
        if let Some(damage) = opened.damage {
            self.notify(Notice::ContainerTrapped { player, damage });
        }
        self.flush();
        Ok(opened)
    }

    /// The container at `pos` was emptied or broken; schedule its respawn.
    ///
    /// # Errors
    ///
    /// [`Rejection::NotActive`], [`Rejection::UnknownContainer`].
    pub fn on_container_consumed(&mut self, pos: BlockPos) -> Result<ContainerKind, Rejection> {
        self.require_active()?;
        let now = self.now();
        let kind = self.containers.on_consumed(&mut self.env, pos, now)?;
        RushCounters::bump(&self.counters.containers_consumed);
        Ok(kind)
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// A participant came online. The host must already report them in
    /// [`WorldHost::online_participants`](crate::services::WorldHost::online_participants).
    pub fn on_participant_joined(&mut self, player: PlayerId, name: &str) -> Phase {
        let now = self.now();
        if !self.ledger.contains(player) {
            let mut profile = match self.store.load_player_profile(player) {
                Ok(Some(profile)) => profile,
                Ok(None) => PlayerProfile::new(player, name),
                Err(e) => {
                    self.store_failed("load_player_profile", &e);
                    PlayerProfile::new(player, name)
                }
            };
            profile.team = None;
            profile.restore_deadline(now, self.config.general.ticks_per_second);
            self.ledger.insert_profile(profile);
        }

        let ceiling = now.saturating_add(self.punishment.cap());
        if let Some(profile) = self.ledger.profile_mut(player) {
            profile.name = name.to_string();
            profile.last_seen = Utc::now();
            profile.punished_until = profile.punished_until.map(|until| until.min(ceiling));
        }
        let punished = self.punishment.is_punished(&self.ledger, player, now);

        if self.phase == Phase::Active && self.ledger.team_of(player).is_none() {
            let team = self.ledger.smallest_team();
            self.ledger.assign(player, team);
            let spawn = self.spawn_point();
            self.env.prepare_participant(player, team, spawn);
            info!(%player, %team, "Late participant assigned");
            self.notify(Notice::TeamAssigned { player, team });
        }
        let color = if punished { Some(TeamColor::RESERVED) } else { self.ledger.team_of(player) };
        self.env.set_name_color(player, color);

        info!(%player, name, online = self.online_count(), "Participant joined");
        self.flush();
        self.check_quorum()
    }

    /// A participant went offline. The host must already have removed them
    /// from [`WorldHost::online_participants`](crate::services::WorldHost::online_participants).
    pub fn on_participant_left(&mut self, player: PlayerId) -> Phase {
        let now = self.now();
        if self.rescue.abandon(&mut self.env, player, now) {
            self.scheduler.cancel_where(|t| *t == Task::EncounterSecond(player));
            RushCounters::bump(&self.counters.encounters_lost);
            self.notify(Notice::EncounterLost { player, end: EncounterEnd::Abandoned });
        }
        if let Some(profile) = self.ledger.profile_mut(player) {
            profile.last_seen = Utc::now();
        }
        self.flush();
        if self.phase != Phase::Active {
            self.ledger.remove_profile(player);
        }
        info!(%player, online = self.online_count(), "Participant left");
        self.check_quorum()
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    /// Snapshot for admin commands and dashboards.
    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        let now = self.now();
        let tps = self.config.ticks(1);
        let seconds_left = match self.phase {
            Phase::Waiting => 0,
            Phase::Countdown => self.countdown_left,
            Phase::Active => self.round_left,
            Phase::Cooldown => self.cooldown_until.saturating_sub(now).div_ceil(tps),
        };
        StatusSnapshot {
            phase: self.phase,
            round: self.round.as_ref().and_then(|r| r.id),
            tick: now,
            seconds_left,
            standings: self.ledger.standings(),
            containers_active: self.containers.active_count(),
            containers_pending: self.containers.pending_count(),
            npcs_active: self.rescue.npcs().active_count(),
            npcs_pending: self.rescue.npcs().pending_count(),
            encounters: self.rescue.active_count(),
            privileged_active: self.threshold.active_count(),
            online: self.online_count(),
            counters: self.counters.snapshot(),
        }
    }

    /// Leaderboard from the record store, falling back to the cache when the
    /// store is unavailable.
    pub fn top_players(&mut self, limit: usize) -> Vec<PlayerProfile> {
        self.flush();
        match self.store.top_players_by_points(limit) {
            Ok(top) => top,
            Err(e) => {
                self.store_failed("top_players_by_points", &e);
                self.ledger.top_players(limit).into_iter().cloned().collect()
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn require_active(&self) -> Result<(), Rejection> {
        if self.phase == Phase::Active { Ok(()) } else { Err(Rejection::NotActive) }
    }

    fn set_phase(&mut self, to: Phase) {
        let from = self.phase;
        if from == to {
            return;
        }
        self.phase = to;
        info!(%from, %to, "Phase changed");
        self.notify(Notice::PhaseChanged { from, to });
    }

    fn notify(&self, notice: Notice) {
        self.notifier.notify(notice);
    }

    fn notify_insufficient(&self) {
        self.notify(Notice::InsufficientPlayers {
            online: self.online_count(),
            required: self.config.round.min_players,
        });
    }

    fn credit(&mut self, player: PlayerId, amount: i64, source: PointSource) -> Result<Credit, Rejection> {
        let balance = self.ledger.add_points(player, amount).ok_or(Rejection::UnknownPlayer)?;
        if amount > 0 {
            RushCounters::add(&self.counters.points_awarded, amount.unsigned_abs());
        }
        debug!(%player, amount, balance, ?source, "Points credited");
        self.notify(Notice::PointsAwarded { player, amount, source, balance });
        Ok(Credit { amount, balance })
    }

    fn spawn_point(&mut self) -> Coordinate {
        let center = self.config.center();
        self.env
            .find_safe_coordinate(center, SPAWN_SCATTER)
            .map_or_else(|| center.center(), |pos| pos.center())
    }

    fn flush(&mut self) {
        let dirty = self.ledger.take_dirty();
        if dirty.is_empty() {
            return;
        }
        let span = debug_span!(spans::PERSIST_FLUSH, profiles = dirty.len());
        let _enter = span.enter();
        let now = self.now();
        let tps = self.config.general.ticks_per_second;
        for player in dirty {
            let Some(profile) = self.ledger.stamp_for_save(player, now, tps) else { continue };
            if let Err(e) = self.store.upsert_player_profile(profile) {
                self.store_failed("upsert_player_profile", &e);
            }
        }
    }

    fn evict_offline(&mut self) {
        self.flush();
        let online: HashSet<PlayerId> = self.env.online_participants().into_iter().collect();
        let offline: Vec<PlayerId> = self
            .ledger
            .profiles()
            .map(|p| p.id)
            .filter(|id| !online.contains(id))
            .collect();
        for player in offline {
            self.ledger.remove_profile(player);
        }
    }

    fn store_failed(&self, operation: &'static str, e: &RushError) {
        RushCounters::bump(&self.counters.store_failures);
        error!(operation, error = %e, "Record store failure, continuing on in-memory state");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
