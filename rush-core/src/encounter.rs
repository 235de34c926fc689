//! Rescue encounters: per-player wave defense around a placed NPC.
//!
//! Rescue NPCs are the second [`RespawnScheduler`] instance. Interacting with
//! an idle NPC takes it out of the idle set and starts an [`Encounter`]; the
//! owner then calls [`RescueEngine::advance`] once per second of game time
//! until the encounter resolves.
//!
//! Per-second check order:
//!
//! 1. participant online, else abandoned
//! 2. NPC alive, else failed
//! 3. distance bands: warning once, hard band abandons
//! 4. recall monsters that wandered off the leash
//! 5. spawn the next wave on an interval boundary
//! 6. victory once every wave is out and no monster remains
//! 7. failure once the duration has elapsed

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::TAU;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{RescueConfig, RescueTier};
use crate::error::Rejection;
use crate::respawn::{Placer, RespawnScheduler};
use crate::services::{EntityCategory, Environment};
use crate::types::{ActorHandle, BlockPos, Coordinate, PlayerId, Tick};

// ---------------------------------------------------------------------------
// NPC placement
// ---------------------------------------------------------------------------

/// An idle rescue NPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescueNpc {
    /// Actor handle.
    pub actor: ActorHandle,
    /// Tier level.
    pub tier: u8,
    /// Actor type that was spawned.
    pub type_id: String,
    /// Display name.
    pub name: String,
}

/// Places rescue NPCs with a weighted tier draw.
#[derive(Debug, Clone)]
pub struct NpcPlacer {
    tiers: Vec<RescueTier>,
    names: Vec<String>,
}

impl NpcPlacer {
    fn pick_tier<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&RescueTier> {
        self.tiers
            .choose_weighted(rng, |t| t.spawn_weight)
            .ok()
            .or_else(|| self.tiers.first())
    }

    fn spawn_tier<E: Environment>(
        env: &mut E,
        tier: &RescueTier,
        pos: BlockPos,
        name: &str,
    ) -> Option<RescueNpc> {
        match env.spawn_actor(&tier.npc_type, pos.center(), 1) {
            Ok(actor) => {
                let name = tier.display_name(name);
                env.set_display_name(actor, &name);
                Some(RescueNpc { actor, tier: tier.level, type_id: tier.npc_type.clone(), name })
            }
            Err(e) => {
                debug!(tier = tier.level, %pos, error = %e, "NPC spawn declined");
                None
            }
        }
    }
}

impl Placer for NpcPlacer {
    type Entity = RescueNpc;
    const CATEGORY: EntityCategory = EntityCategory::RescueNpc;

    fn place<E: Environment, R: Rng + ?Sized>(
        &mut self,
        env: &mut E,
        pos: BlockPos,
        rng: &mut R,
    ) -> Option<RescueNpc> {
        let tier = self.pick_tier(rng)?;
        let name = self.names.choose(rng).map_or("Villager", String::as_str);
        Self::spawn_tier(env, tier, pos, name).or_else(|| {
            let fallback = self.tiers.first().filter(|t| t.level != tier.level)?;
            warn!(tier = tier.level, fallback = fallback.level, "Falling back to lowest tier");
            Self::spawn_tier(env, fallback, pos, name)
        })
    }

    fn remove<E: Environment>(&mut self, env: &mut E, _: BlockPos, npc: &RescueNpc) {
        env.despawn(npc.actor);
    }

    fn remove_stale<E: Environment>(&mut self, env: &mut E, pos: BlockPos) {
        env.remove_actors_at(pos);
    }

    fn kind_name(npc: &RescueNpc) -> String {
        npc.type_id.clone()
    }
}

/// NPC instance of the scheduler.
pub type NpcScheduler = RespawnScheduler<NpcPlacer>;

// ---------------------------------------------------------------------------
// Encounter state
// ---------------------------------------------------------------------------

/// How an encounter ended without a victory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterEnd {
    /// The NPC died or time ran out.
    Failed,
    /// The participant left or strayed beyond the hard band.
    Abandoned,
}

/// One running rescue encounter.
#[derive(Debug, Clone)]
pub struct Encounter {
    /// Participant defending the NPC.
    pub player: PlayerId,
    /// The NPC being defended.
    pub npc: RescueNpc,
    /// Where the NPC was placed; its respawn key.
    pub npc_pos: BlockPos,
    /// Tier parameters.
    pub tier: RescueTier,
    /// Seconds elapsed.
    pub elapsed: u64,
    /// Waves spawned so far.
    pub current_wave: u32,
    /// Live monsters.
    pub monsters: Vec<ActorHandle>,
    /// Whether the distance warning is currently shown.
    pub warned: bool,
    anchor: Coordinate,
}

impl Encounter {
    /// Seconds before the encounter times out.
    #[must_use]
    pub fn seconds_left(&self) -> u64 {
        self.tier.duration_seconds.saturating_sub(self.elapsed)
    }

    /// Whether every wave has been spawned.
    #[must_use]
    pub fn all_waves_out(&self) -> bool {
        self.current_wave >= self.tier.waves
    }
}

/// Data for the start announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncounterStart {
    /// Tier level.
    pub tier: u8,
    /// Total waves.
    pub waves: u32,
    /// Duration in seconds.
    pub duration_seconds: u64,
    /// Monsters spawned by the first wave.
    pub first_wave: u32,
}

/// Result of one per-second update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncounterUpdate {
    /// Still running.
    Ongoing {
        /// Waves spawned so far.
        wave: u32,
        /// Total waves.
        total: u32,
        /// Live monsters.
        monsters_left: usize,
        /// Seconds before timeout.
        seconds_left: u64,
        /// Monsters spawned by a wave released this second.
        spawned: Option<u32>,
        /// Whether the one-time distance warning fired this second.
        warning: bool,
    },
    /// Every wave cleared in time.
    Won {
        /// Tier level.
        tier: u8,
        /// Points rewarded.
        reward: i64,
        /// Points for the threshold accumulator.
        threshold_points: u32,
    },
    /// Failed or abandoned.
    Lost(EncounterEnd),
}

// ---------------------------------------------------------------------------
// RescueEngine
// ---------------------------------------------------------------------------

/// Owns the NPC scheduler and every running encounter.
#[derive(Debug)]
pub struct RescueEngine {
    config: RescueConfig,
    npcs: NpcScheduler,
    encounters: BTreeMap<PlayerId, Encounter>,
    help_last: HashMap<PlayerId, Tick>,
    help_cooldown: Tick,
}

impl RescueEngine {
    /// Build from the `[rescue]` section, resolving tiers.
    #[must_use]
    pub fn new(config: &RescueConfig, ticks_per_second: u32) -> Self {
        let tps = u64::from(ticks_per_second.max(1));
        let placer = NpcPlacer {
            tiers: config.resolved_tiers(),
            names: config.names.clone(),
        };
        Self {
            config: config.clone(),
            npcs: NpcScheduler::new(placer, config.respawn_delay_seconds.saturating_mul(tps)),
            encounters: BTreeMap::new(),
            help_last: HashMap::new(),
            help_cooldown: config.help_cooldown_seconds.saturating_mul(tps),
        }
    }

    /// Drop tiers and monster types the actor spawner does not know.
    /// Returns whether any tier survives.
    pub fn validate_types<E: Environment>(&mut self, env: &E) -> bool {
        self.config.elite_monsters.retain(|m| {
            let known = env.is_known_type(m);
            if !known {
                warn!(type_id = %m, "Unknown elite monster type, skipping");
            }
            known
        });
        let tiers = &mut self.npcs.placer_mut().tiers;
        tiers.retain_mut(|tier| {
            tier.monsters.retain(|m| env.is_known_type(m));
            let usable = env.is_known_type(&tier.npc_type) && !tier.monsters.is_empty();
            if !usable {
                warn!(tier = tier.level, npc_type = %tier.npc_type, "Rescue tier uses unknown actor types, disabled");
            }
            usable
        });
        if tiers.is_empty() {
            warn!("No usable rescue tiers, rescue encounters disabled");
        }
        !tiers.is_empty()
    }

    /// Usable tiers, lowest level first.
    #[must_use]
    pub fn tiers(&self) -> &[RescueTier] {
        &self.npcs.placer().tiers
    }

    /// NPC scheduler.
    #[must_use]
    pub fn npcs(&self) -> &NpcScheduler {
        &self.npcs
    }

    /// Mutable NPC scheduler.
    pub fn npcs_mut(&mut self) -> &mut NpcScheduler {
        &mut self.npcs
    }

    /// Running encounter of `player`.
    #[must_use]
    pub fn encounter(&self, player: PlayerId) -> Option<&Encounter> {
        self.encounters.get(&player)
    }

    /// Number of running encounters.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.encounters.len()
    }

    /// Whether `actor` is a monster of some running encounter.
    #[must_use]
    pub fn is_encounter_monster(&self, actor: ActorHandle) -> bool {
        self.encounters.values().any(|e| e.monsters.contains(&actor))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// `player` interacted with the NPC `actor`.
    ///
    /// # Errors
    ///
    /// [`Rejection::AlreadyEngaged`] if the player already defends an NPC;
    /// [`Rejection::UnknownNpc`] if `actor` is not an idle rescue NPC.
    pub fn start<E: Environment, R: Rng + ?Sized>(
        &mut self,
        env: &mut E,
        player: PlayerId,
        actor: ActorHandle,
        rng: &mut R,
    ) -> Result<EncounterStart, Rejection> {
        if self.encounters.contains_key(&player) {
            return Err(Rejection::AlreadyEngaged);
        }
        let (npc_pos, npc) = self
            .npcs
            .find(|n| n.actor == actor)
            .map(|(pos, npc)| (pos, npc.clone()))
            .ok_or(Rejection::UnknownNpc)?;
        let tier = self
            .tiers()
            .iter()
            .find(|t| t.level == npc.tier)
            .cloned()
            .ok_or(Rejection::UnknownNpc)?;
        self.npcs.take(npc_pos);

        let anchor = env.actor_position(actor).unwrap_or_else(|| npc_pos.center());
        let mut encounter = Encounter {
            player,
            npc,
            npc_pos,
            tier,
            elapsed: 0,
            current_wave: 0,
            monsters: Vec::new(),
            warned: false,
            anchor,
        };
        let first_wave = self.spawn_wave(env, &mut encounter, rng);
        let start = EncounterStart {
            tier: encounter.tier.level,
            waves: encounter.tier.waves,
            duration_seconds: encounter.tier.duration_seconds,
            first_wave,
        };
        info!(%player, tier = start.tier, waves = start.waves, "Rescue encounter started");
        self.encounters.insert(player, encounter);
        Ok(start)
    }

    /// Run one second of `player`'s encounter. Terminal outcomes tear the
    /// encounter down and queue the NPC location for respawn.
    pub fn advance<E: Environment, R: Rng + ?Sized>(
        &mut self,
        env: &mut E,
        player: PlayerId,
        now: Tick,
        rng: &mut R,
    ) -> Option<EncounterUpdate> {
        let mut enc = self.encounters.remove(&player)?;
        let update = self.check(env, &mut enc, rng);
        match &update {
            EncounterUpdate::Ongoing { .. } => {
                self.encounters.insert(player, enc);
            }
            EncounterUpdate::Won { reward, .. } => {
                info!(%player, tier = enc.tier.level, reward, "Rescue encounter won");
                self.teardown(env, &enc, now);
            }
            EncounterUpdate::Lost(end) => {
                info!(%player, tier = enc.tier.level, ?end, "Rescue encounter lost");
                self.teardown(env, &enc, now);
            }
        }
        Some(update)
    }

    fn check<E: Environment, R: Rng + ?Sized>(
        &self,
        env: &mut E,
        enc: &mut Encounter,
        rng: &mut R,
    ) -> EncounterUpdate {
        enc.elapsed += 1;

        let Some(position) = env.participant_position(enc.player) else {
            return EncounterUpdate::Lost(EncounterEnd::Abandoned);
        };
        if env.actor_position(enc.npc.actor).is_none() {
            return EncounterUpdate::Lost(EncounterEnd::Failed);
        }

        let distance = position.distance(&enc.anchor);
        let mut warning = false;
        if distance > self.config.abandon_distance {
            return EncounterUpdate::Lost(EncounterEnd::Abandoned);
        } else if distance > self.config.warning_distance {
            warning = !enc.warned;
            enc.warned = true;
        } else {
            enc.warned = false;
        }

        enc.monsters.retain(|m| env.actor_position(*m).is_some());
        for monster in &enc.monsters {
            let Some(at) = env.actor_position(*monster) else { continue };
            if at.distance(&enc.anchor) > self.config.leash_radius {
                let dist = sample(rng, self.config.recall_min, self.config.recall_max);
                let to = ground_point(env, enc.anchor, rng.gen_range(0.0..TAU), dist);
                env.relocate(*monster, to);
                debug!(player = %enc.player, %monster, "Monster recalled");
            }
        }

        let interval = enc.tier.wave_interval_seconds.max(1);
        let spawned = (enc.elapsed % interval == 0 && !enc.all_waves_out())
            .then(|| self.spawn_wave(env, enc, rng));

        if enc.all_waves_out() && enc.monsters.is_empty() {
            let reward = rng.gen_range(enc.tier.reward_min..=enc.tier.reward_max);
            return EncounterUpdate::Won {
                tier: enc.tier.level,
                reward,
                threshold_points: enc.tier.threshold_points,
            };
        }
        if enc.elapsed >= enc.tier.duration_seconds {
            return EncounterUpdate::Lost(EncounterEnd::Failed);
        }

        EncounterUpdate::Ongoing {
            wave: enc.current_wave,
            total: enc.tier.waves,
            monsters_left: enc.monsters.len(),
            seconds_left: enc.seconds_left(),
            spawned,
            warning,
        }
    }

    fn spawn_wave<E: Environment, R: Rng + ?Sized>(
        &self,
        env: &mut E,
        enc: &mut Encounter,
        rng: &mut R,
    ) -> u32 {
        enc.current_wave += 1;
        let final_wave = enc.all_waves_out();
        let mut spawned = 0;
        for _ in 0..enc.tier.per_wave {
            let elite = final_wave
                && !self.config.elite_monsters.is_empty()
                && rng.gen_bool(self.config.elite_fraction.clamp(0.0, 1.0));
            let pool = if elite { &self.config.elite_monsters } else { &enc.tier.monsters };
            let Some(type_id) = pool.choose(rng) else { continue };

            let dist = sample(rng, self.config.spawn_ring_min, self.config.spawn_ring_max);
            let at = ground_point(env, enc.anchor, rng.gen_range(0.0..TAU), dist);
            match env.spawn_actor(type_id, at, u32::from(enc.tier.level)) {
                Ok(monster) => {
                    enc.monsters.push(monster);
                    spawned += 1;
                }
                Err(e) => debug!(%type_id, error = %e, "Monster spawn declined"),
            }
        }
        debug!(player = %enc.player, wave = enc.current_wave, spawned, final_wave, "Wave spawned");
        spawned
    }

    fn teardown<E: Environment>(&mut self, env: &mut E, enc: &Encounter, now: Tick) {
        for monster in &enc.monsters {
            env.despawn(*monster);
        }
        env.despawn(enc.npc.actor);
        self.npcs.enqueue_respawn(enc.npc_pos, now);
    }

    /// Abort `player`'s encounter (e.g. on disconnect) as abandoned.
    pub fn abandon<E: Environment>(&mut self, env: &mut E, player: PlayerId, now: Tick) -> bool {
        let Some(enc) = self.encounters.remove(&player) else {
            return false;
        };
        self.teardown(env, &enc, now);
        true
    }

    // ------------------------------------------------------------------
    // Help requests
    // ------------------------------------------------------------------

    /// Participants near an idle NPC who are due a help request. Players in
    /// a running encounter are skipped and keep their cooldown.
    pub fn help_sweep<E: Environment>(&mut self, env: &E, now: Tick) -> Vec<(PlayerId, ActorHandle, String)> {
        let npcs: Vec<(Coordinate, &RescueNpc)> = self
            .npcs
            .active()
            .map(|(pos, npc)| (env.actor_position(npc.actor).unwrap_or(pos.center()), npc))
            .collect();
        let mut requests = Vec::new();
        for player in env.online_participants() {
            if self.encounters.contains_key(&player) {
                continue;
            }
            let Some(at) = env.participant_position(player) else { continue };
            let cooling = self
                .help_last
                .get(&player)
                .is_some_and(|last| now.saturating_sub(*last) < self.help_cooldown);
            if cooling {
                continue;
            }
            if let Some((_, npc)) = npcs
                .iter()
                .find(|(npc_at, _)| at.distance(npc_at) <= self.config.proximity_range)
            {
                self.help_last.insert(player, now);
                requests.push((player, npc.actor, npc.name.clone()));
            }
        }
        requests
    }

    /// Tear down every encounter and every NPC; forget all pending work.
    pub fn clear<E: Environment>(&mut self, env: &mut E) -> usize {
        let running = std::mem::take(&mut self.encounters);
        for enc in running.values() {
            for monster in &enc.monsters {
                env.despawn(*monster);
            }
            env.despawn(enc.npc.actor);
        }
        self.help_last.clear();
        self.npcs.clear(env);
        running.len()
    }
}

fn sample<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    if max > min { rng.gen_range(min..max) } else { min }
}

fn ground_point<E: Environment>(env: &E, anchor: Coordinate, angle: f64, distance: f64) -> Coordinate {
    let mut at = anchor.offset_polar(angle, distance);
    let block = at.to_block();
    if let Some(ground) = env.ground_height_at(at.world, block.x, block.z) {
        at.y = f64::from(ground + 1);
    }
    at
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
