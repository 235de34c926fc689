//! Generic spawn/respawn scheduler.
//!
//! One bookkeeping engine, two instances (containers and rescue NPCs). The
//! instance-specific part (what gets placed, how it is torn down) lives behind
//! the [`Placer`] trait; this module owns the active set, the identity-keyed
//! pending set and the one-probe-per-step population queue.
//!
//! ```text
//!   populate ──probe/step──► active ──consume──► pending ──sweep (due, loaded)──► active
//!                                                   │
//!                                                   └── chunk unloaded: stays pending
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;

use rand::Rng;
use tracing::{debug, error, info, trace};

use crate::services::{EntityCategory, Environment, RecordStore};
use crate::types::{BlockPos, CHUNK_SIZE, ChunkPos, RoundId, Tick};

// ---------------------------------------------------------------------------
// Placer
// ---------------------------------------------------------------------------

/// Instance-specific half of a [`RespawnScheduler`].
pub trait Placer {
    /// What the scheduler remembers about a placed entity.
    type Entity: Clone + fmt::Debug;

    /// Category used in the placement log.
    const CATEGORY: EntityCategory;

    /// Extra filter on probe results (height band, terrain...).
    fn accepts(&self, pos: BlockPos) -> bool {
        let _ = pos;
        true
    }

    /// Materialize an entity at `pos`. `None` means the host declined.
    fn place<E: Environment, R: Rng + ?Sized>(
        &mut self,
        env: &mut E,
        pos: BlockPos,
        rng: &mut R,
    ) -> Option<Self::Entity>;

    /// Tear down a live entity.
    fn remove<E: Environment>(&mut self, env: &mut E, pos: BlockPos, entity: &Self::Entity);

    /// Tear down a leftover from another round that the scheduler never tracked.
    fn remove_stale<E: Environment>(&mut self, env: &mut E, pos: BlockPos);

    /// Type name written to the placement log.
    fn kind_name(entity: &Self::Entity) -> String;
}

// ---------------------------------------------------------------------------
// Population plan
// ---------------------------------------------------------------------------

/// Parameters of an initial population pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopulationPlan {
    /// Center of the play area.
    pub center: BlockPos,
    /// Radius of the play area in blocks.
    pub radius: u32,
    /// Use every `stride`-th chunk on each axis.
    pub stride: u32,
    /// Entities to place per used chunk.
    pub per_chunk: u32,
    /// Probes allowed per entity before the chunk slot is skipped.
    pub attempts: u32,
}

impl PopulationPlan {
    /// Chunks whose area intersects the circle, thinned by `stride`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn chunks(&self) -> Vec<ChunkPos> {
        let r = self.radius as i32;
        let stride = self.stride.max(1) as i32;
        let (cx, cz) = (self.center.x, self.center.z);
        let (min_x, max_x) = ((cx - r).div_euclid(CHUNK_SIZE), (cx + r).div_euclid(CHUNK_SIZE));
        let (min_z, max_z) = ((cz - r).div_euclid(CHUNK_SIZE), (cz + r).div_euclid(CHUNK_SIZE));
        let r2 = i64::from(r) * i64::from(r);

        let mut out = Vec::new();
        for x in (min_x..=max_x).step_by(stride as usize) {
            for z in (min_z..=max_z).step_by(stride as usize) {
                let chunk = ChunkPos { world: self.center.world, x, z };
                let area = chunk.area();
                let nx = cx.clamp(area.min_x, area.max_x - 1);
                let nz = cz.clamp(area.min_z, area.max_z - 1);
                let (dx, dz) = (i64::from(nx - cx), i64::from(nz - cz));
                if dx * dx + dz * dz <= r2 {
                    out.push(chunk);
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
struct Probe {
    chunk: ChunkPos,
    remaining: u32,
    attempts_left: u32,
}

/// Outcome of one population step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing queued.
    Idle,
    /// A probe failed; the slot may be retried or skipped.
    Missed,
    /// An entity was placed.
    Placed(BlockPos),
}

// ---------------------------------------------------------------------------
// RespawnScheduler
// ---------------------------------------------------------------------------

/// Bookkeeping for placed entities, pending respawns and population probes.
pub struct RespawnScheduler<P: Placer> {
    placer: P,
    active: HashMap<BlockPos, P::Entity>,
    pending: HashMap<BlockPos, Tick>,
    probes: VecDeque<Probe>,
    plan: Option<PopulationPlan>,
    round: Option<RoundId>,
    delay: Tick,
    probes_run: u64,
}

impl<P: Placer> fmt::Debug for RespawnScheduler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RespawnScheduler")
            .field("category", &P::CATEGORY)
            .field("active", &self.active.len())
            .field("pending", &self.pending.len())
            .field("queued_probes", &self.probes.len())
            .field("round", &self.round)
            .finish_non_exhaustive()
    }
}

impl<P: Placer> RespawnScheduler<P> {
    /// Create an idle scheduler with the given respawn delay.
    #[must_use]
    pub fn new(placer: P, delay: Tick) -> Self {
        Self {
            placer,
            active: HashMap::new(),
            pending: HashMap::new(),
            probes: VecDeque::new(),
            plan: None,
            round: None,
            delay,
            probes_run: 0,
        }
    }

    /// Instance-specific half.
    #[must_use]
    pub fn placer(&self) -> &P {
        &self.placer
    }

    /// Mutable instance-specific half.
    pub fn placer_mut(&mut self) -> &mut P {
        &mut self.placer
    }

    /// Round the placed entities belong to.
    #[must_use]
    pub fn round(&self) -> Option<RoundId> {
        self.round
    }

    /// Queue an initial population pass for `round`. Any previous queue is dropped.
    pub fn begin_population(&mut self, plan: PopulationPlan, round: Option<RoundId>) -> usize {
        self.round = round;
        self.plan = Some(plan);
        self.probes = plan
            .chunks()
            .into_iter()
            .filter(|_| plan.per_chunk > 0)
            .map(|chunk| Probe {
                chunk,
                remaining: plan.per_chunk,
                attempts_left: plan.attempts.max(1),
            })
            .collect();
        info!(
            category = P::CATEGORY.as_str(),
            chunks = self.probes.len(),
            round = ?round,
            "Population queued"
        );
        self.probes.len()
    }

    /// Whether population probes remain.
    #[must_use]
    pub fn is_populating(&self) -> bool {
        !self.probes.is_empty()
    }

    /// Run exactly one probe from the population queue.
    pub fn step<E: Environment, S: RecordStore + ?Sized, R: Rng + ?Sized>(
        &mut self,
        env: &mut E,
        store: &S,
        rng: &mut R,
    ) -> StepOutcome {
        let (Some(mut probe), Some(plan)) = (self.probes.pop_front(), self.plan) else {
            return StepOutcome::Idle;
        };
        self.probes_run += 1;
        probe.attempts_left -= 1;

        let center = chunk_center(probe.chunk, plan.center.y);
        let candidate = env
            .find_safe_coordinate(center, (CHUNK_SIZE / 2).unsigned_abs())
            .filter(|pos| pos.world == plan.center.world)
            .filter(|pos| pos.horizontal_distance(&plan.center) <= f64::from(plan.radius))
            .filter(|pos| !self.active.contains_key(pos) && !self.pending.contains_key(pos))
            .filter(|pos| self.placer.accepts(*pos));

        let placed = candidate.and_then(|pos| self.place_at(env, store, pos, rng).then_some(pos));

        match placed {
            Some(pos) => {
                probe.remaining -= 1;
                if probe.remaining > 0 {
                    probe.attempts_left = plan.attempts.max(1);
                    self.probes.push_front(probe);
                }
                StepOutcome::Placed(pos)
            }
            None => {
                if probe.attempts_left > 0 {
                    self.probes.push_front(probe);
                } else if probe.remaining > 1 {
                    probe.remaining -= 1;
                    probe.attempts_left = plan.attempts.max(1);
                    self.probes.push_front(probe);
                } else {
                    trace!(category = P::CATEGORY.as_str(), chunk = ?probe.chunk, "Chunk skipped");
                }
                StepOutcome::Missed
            }
        }
    }

    /// Run the whole population queue synchronously.
    pub fn populate_now<E: Environment, S: RecordStore + ?Sized, R: Rng + ?Sized>(
        &mut self,
        env: &mut E,
        store: &S,
        rng: &mut R,
    ) -> usize {
        let mut placed = 0;
        while self.is_populating() {
            if let StepOutcome::Placed(_) = self.step(env, store, rng) {
                placed += 1;
            }
        }
        placed
    }

    fn place_at<E: Environment, S: RecordStore + ?Sized, R: Rng + ?Sized>(
        &mut self,
        env: &mut E,
        store: &S,
        pos: BlockPos,
        rng: &mut R,
    ) -> bool {
        let Some(entity) = self.placer.place(env, pos, rng) else {
            return false;
        };
        if let Some(round) = self.round {
            let kind = P::kind_name(&entity);
            if let Err(e) = store.record_placed_entity(round, P::CATEGORY, pos, &kind) {
                error!(category = P::CATEGORY.as_str(), %pos, error = %e, "Failed to record placement");
            }
        }
        debug!(category = P::CATEGORY.as_str(), %pos, entity = ?entity, "Entity placed");
        self.active.insert(pos, entity);
        true
    }

    // ------------------------------------------------------------------
    // Consumption & respawn
    // ------------------------------------------------------------------

    /// Take an entity out of the active set without scheduling anything.
    pub fn take(&mut self, pos: BlockPos) -> Option<P::Entity> {
        self.active.remove(&pos)
    }

    /// Schedule a respawn at `pos`. A location already pending keeps its
    /// original fire time. Returns the effective fire time.
    pub fn enqueue_respawn(&mut self, pos: BlockPos, now: Tick) -> Tick {
        *self.pending.entry(pos).or_insert(now.saturating_add(self.delay))
    }

    /// Consume the entity at `pos`: remove it from the active set and queue
    /// its respawn. Returns the consumed entity.
    pub fn consume(&mut self, pos: BlockPos, now: Tick) -> Option<P::Entity> {
        let entity = self.active.remove(&pos)?;
        let fire_at = self.enqueue_respawn(pos, now);
        debug!(category = P::CATEGORY.as_str(), %pos, fire_at, "Respawn scheduled");
        Some(entity)
    }

    /// Re-place every due pending entry whose chunk is loaded. Unreachable or
    /// declined entries stay pending. Returns the number re-placed.
    pub fn sweep<E: Environment, S: RecordStore + ?Sized, R: Rng + ?Sized>(
        &mut self,
        env: &mut E,
        store: &S,
        now: Tick,
        rng: &mut R,
    ) -> usize {
        let mut due: Vec<BlockPos> = self
            .pending
            .iter()
            .filter(|(pos, fire_at)| **fire_at <= now && env.is_loaded(pos.chunk()))
            .map(|(pos, _)| *pos)
            .collect();
        due.sort_unstable();

        let mut placed = 0;
        for pos in due {
            if self.place_at(env, store, pos, rng) {
                self.pending.remove(&pos);
                placed += 1;
            }
        }
        if placed > 0 {
            debug!(category = P::CATEGORY.as_str(), placed, pending = self.pending.len(), "Respawn sweep");
        }
        placed
    }

    // ------------------------------------------------------------------
    // Stale cleanup & teardown
    // ------------------------------------------------------------------

    /// A chunk became active: purge leftovers belonging to other rounds from
    /// both the world and the placement log.
    pub fn on_chunk_activated<E: Environment, S: RecordStore + ?Sized>(
        &mut self,
        env: &mut E,
        store: &S,
        chunk: ChunkPos,
    ) -> usize {
        let keep = self.round.unwrap_or(RoundId(0));
        let stale = match store.delete_placed_entities_not_in_round(keep, P::CATEGORY, &chunk.area()) {
            Ok(stale) => stale,
            Err(e) => {
                error!(category = P::CATEGORY.as_str(), ?chunk, error = %e, "Stale cleanup failed");
                return 0;
            }
        };
        for pos in &stale {
            if !self.active.contains_key(pos) {
                self.placer.remove_stale(env, *pos);
            }
        }
        if !stale.is_empty() {
            info!(category = P::CATEGORY.as_str(), ?chunk, removed = stale.len(), "Removed stale entities");
        }
        stale.len()
    }

    /// Remove every live entity and forget all pending work.
    pub fn clear<E: Environment>(&mut self, env: &mut E) -> usize {
        let removed = self.active.len();
        for (pos, entity) in std::mem::take(&mut self.active) {
            self.placer.remove(env, pos, &entity);
        }
        self.pending.clear();
        self.probes.clear();
        self.plan = None;
        self.round = None;
        removed
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Entity placed at `pos`.
    #[must_use]
    pub fn get(&self, pos: BlockPos) -> Option<&P::Entity> {
        self.active.get(&pos)
    }

    /// First active entity matching `pred`.
    pub fn find(&self, mut pred: impl FnMut(&P::Entity) -> bool) -> Option<(BlockPos, &P::Entity)> {
        self.active.iter().find(|(_, e)| pred(e)).map(|(pos, e)| (*pos, e))
    }

    /// Every active entity.
    pub fn active(&self) -> impl Iterator<Item = (&BlockPos, &P::Entity)> {
        self.active.iter()
    }

    /// Number of active entities.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of pending respawns.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Fire time of the pending respawn at `pos`.
    #[must_use]
    pub fn pending_fire_at(&self, pos: BlockPos) -> Option<Tick> {
        self.pending.get(&pos).copied()
    }

    /// Probes executed since creation.
    #[must_use]
    pub fn probes_run(&self) -> u64 {
        self.probes_run
    }
}

fn chunk_center(chunk: ChunkPos, y: i32) -> BlockPos {
    BlockPos::new(
        chunk.world,
        chunk.min_block_x() + CHUNK_SIZE / 2,
        y,
        chunk.min_block_z() + CHUNK_SIZE / 2,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::sim::FlatWorld;
    use crate::types::WorldId;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Places bare markers; records what was torn down.
    #[derive(Debug, Default)]
    struct Marker {
        removed: Vec<BlockPos>,
        stale: Vec<BlockPos>,
    }

    impl Placer for Marker {
        type Entity = u32;
        const CATEGORY: EntityCategory = EntityCategory::Container;

        fn place<E: Environment, R: Rng + ?Sized>(&mut self, _: &mut E, _: BlockPos, _: &mut R) -> Option<u32> {
            Some(7)
        }

        fn remove<E: Environment>(&mut self, _: &mut E, pos: BlockPos, _: &u32) {
            self.removed.push(pos);
        }

        fn remove_stale<E: Environment>(&mut self, _: &mut E, pos: BlockPos) {
            self.stale.push(pos);
        }

        fn kind_name(_: &u32) -> String {
            "marker".to_string()
        }
    }

    fn plan(radius: u32) -> PopulationPlan {
        PopulationPlan {
            center: BlockPos::new(WorldId(0), 0, 64, 0),
            radius,
            stride: 1,
            per_chunk: 1,
            attempts: 3,
        }
    }

    #[test]
    fn chunk_cover_includes_center_and_respects_stride() {
        let chunks = plan(40).chunks();
        assert!(chunks.iter().any(|c| c.x == 0 && c.z == 0));
        assert!(chunks.iter().any(|c| c.x == -1 && c.z == -1));
        // corner chunk at (2, 2) starts at 32,32 which is ~45 blocks away
        assert!(!chunks.iter().any(|c| c.x == 2 && c.z == 2));

        let sparse = PopulationPlan { stride: 3, ..plan(40) }.chunks();
        assert!(sparse.len() < chunks.len());
    }

    #[test]
    fn population_runs_one_probe_per_step() {
        let mut world = FlatWorld::new();
        let store = MemoryStore::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut s = RespawnScheduler::new(Marker::default(), 10);
        let queued = s.begin_population(plan(32), Some(RoundId(1)));
        assert!(queued > 0);

        let mut steps = 0;
        while s.is_populating() {
            assert_ne!(s.step(&mut world, &store, &mut rng), StepOutcome::Idle);
            steps += 1;
        }
        assert_eq!(u64::try_from(steps).ok(), Some(s.probes_run()));
        assert!(s.active_count() > 0);
        assert!(s.active_count() <= queued);
        assert_eq!(s.step(&mut world, &store, &mut rng), StepOutcome::Idle);
        assert_eq!(store.placed_count(), s.active_count());
    }

    #[test]
    fn pending_is_unique_per_location() {
        let mut world = FlatWorld::new();
        let store = MemoryStore::new();
        let mut rng = StdRng::seed_from_u64(2);
        let mut s = RespawnScheduler::new(Marker::default(), 10);
        s.begin_population(plan(16), Some(RoundId(1)));
        s.populate_now(&mut world, &store, &mut rng);
        let (pos, _) = s.find(|_| true).expect("something placed");

        assert!(s.consume(pos, 5).is_some());
        assert!(s.consume(pos, 6).is_none());
        assert_eq!(s.enqueue_respawn(pos, 8), 15);
        assert_eq!(s.pending_count(), 1);
        assert_eq!(s.pending_fire_at(pos), Some(15));
    }

    #[test]
    fn sweep_waits_for_deadline_and_loaded_chunk() {
        let mut world = FlatWorld::new();
        let store = MemoryStore::new();
        let mut rng = StdRng::seed_from_u64(3);
        let mut s = RespawnScheduler::new(Marker::default(), 10);
        let pos = BlockPos::new(WorldId(0), 100, 64, 100);
        s.enqueue_respawn(pos, 0);

        assert_eq!(s.sweep(&mut world, &store, 9, &mut rng), 0);
        world.unload_chunk(pos.chunk());
        assert_eq!(s.sweep(&mut world, &store, 50, &mut rng), 0);
        assert_eq!(s.pending_count(), 1, "unreachable entries stay pending");

        world.load_chunk(pos.chunk());
        assert_eq!(s.sweep(&mut world, &store, 51, &mut rng), 1);
        assert_eq!(s.pending_count(), 0);
        assert!(s.get(pos).is_some());
    }

    #[test]
    fn stale_entities_from_other_rounds_are_purged() {
        let mut world = FlatWorld::new();
        let store = MemoryStore::new();
        let old = BlockPos::new(WorldId(0), 3, 64, 3);
        store
            .record_placed_entity(RoundId(1), EntityCategory::Container, old, "chest")
            .expect("record");

        let mut s = RespawnScheduler::new(Marker::default(), 10);
        s.begin_population(plan(0), Some(RoundId(2)));
        assert_eq!(s.on_chunk_activated(&mut world, &store, old.chunk()), 1);
        assert_eq!(s.placer().stale, vec![old]);
        assert_eq!(s.on_chunk_activated(&mut world, &store, old.chunk()), 0);
    }

    #[test]
    fn clear_tears_everything_down() {
        let mut world = FlatWorld::new();
        let store = MemoryStore::new();
        let mut rng = StdRng::seed_from_u64(4);
        let mut s = RespawnScheduler::new(Marker::default(), 10);
        s.begin_population(plan(32), Some(RoundId(1)));
        s.populate_now(&mut world, &store, &mut rng);
        let placed = s.active_count();
        let (pos, _) = s.find(|_| true).expect("placed");
        s.consume(pos, 0);

        assert_eq!(s.clear(&mut world), placed - 1);
        assert_eq!(s.placer().removed.len(), placed - 1);
        assert_eq!(s.active_count(), 0);
        assert_eq!(s.pending_count(), 0);
        assert!(!s.is_populating());
    }
}
