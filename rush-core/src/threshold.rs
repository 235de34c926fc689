//! Threshold-gated privileged encounters.
//!
//! Each player carries an overflow-conserving accumulator. Rescue victories
//! feed it; crossing the threshold issues one spawn request near the player
//! and carries the remainder forward. A global cap bounds the number of
//! privileged encounters alive at once; requests at the cap are dropped.

use std::collections::HashMap;
use std::f64::consts::TAU;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::config::ThresholdConfig;
use crate::services::Environment;
use crate::types::{ActorHandle, Coordinate, PlayerId};

/// What became of a spawn request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// An encounter now exists.
    Spawned {
        /// Actor handle.
        actor: ActorHandle,
        /// Actor type drawn.
        type_id: String,
    },
    /// The global cap was reached; the request is dropped.
    Suppressed,
    /// No usable type, unknown player position, or the spawner declined.
    Failed,
}

/// Per-player accumulators plus the set of live privileged encounters.
#[derive(Debug, Clone)]
pub struct ThresholdSpawner {
    config: ThresholdConfig,
    accumulators: HashMap<PlayerId, u32>,
    active: HashMap<ActorHandle, PlayerId>,
}

impl ThresholdSpawner {
    /// Create with a threshold of at least one.
    #[must_use]
    pub fn new(mut config: ThresholdConfig) -> Self {
        config.points = config.points.max(1);
        Self {
            config,
            accumulators: HashMap::new(),
            active: HashMap::new(),
        }
    }

    /// Drop actor types the spawner does not know. Returns whether any remain.
    pub fn validate_types<E: Environment>(&mut self, env: &E) -> bool {
        self.config.types.retain(|t| {
            let known = env.is_known_type(t);
            if !known {
                warn!(type_id = %t, "Unknown privileged actor type, skipping");
            }
            known
        });
        if self.config.types.is_empty() {
            warn!("No privileged actor types available, privileged encounters disabled");
        }
        !self.config.types.is_empty()
    }

    /// Threshold value.
    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.config.points
    }

    /// Bonus granted for a defeat.
    #[must_use]
    pub fn defeat_bonus(&self) -> i64 {
        self.config.defeat_bonus
    }

    /// Current accumulator value.
    #[must_use]
    pub fn accumulator(&self, player: PlayerId) -> u32 {
        self.accumulators.get(&player).copied().unwrap_or(0)
    }

    /// Add points. Returns `true` when this update crossed the threshold, in
    /// which case the threshold has already been subtracted. At most one
    /// crossing is reported per update; any remainder still above the
    /// threshold fires on the next update.
    pub fn add(&mut self, player: PlayerId, points: u32) -> bool {
        let threshold = self.config.points;
        let acc = self.accumulators.entry(player).or_insert(0);
        *acc = acc.saturating_add(points);
        if *acc >= threshold {
            *acc -= threshold;
            debug!(%player, carried = *acc, "Threshold crossed");
            true
        } else {
            false
        }
    }

    /// Number of live privileged encounters.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Whether `actor` is a live privileged encounter.
    #[must_use]
    pub fn is_privileged(&self, actor: ActorHandle) -> bool {
        self.active.contains_key(&actor)
    }

    /// Try to materialize a privileged encounter near `player`.
    pub fn request_spawn<E: Environment, R: Rng + ?Sized>(
        &mut self,
        env: &mut E,
        player: PlayerId,
        rng: &mut R,
    ) -> SpawnOutcome {
        if self.active.len() >= self.config.max_active {
            info!(%player, active = self.active.len(), "Privileged spawn suppressed at cap");
            return SpawnOutcome::Suppressed;
        }
        let Some(type_id) = self.config.types.choose(rng).cloned() else {
            return SpawnOutcome::Failed;
        };
        let Some(origin) = env.participant_position(player) else {
            return SpawnOutcome::Failed;
        };
        let at = spawn_point(env, origin, rng.gen_range(0.0..TAU), self.config.spawn_distance);

        match env.spawn_actor(&type_id, at, self.config.level) {
            Ok(actor) => {
                self.active.insert(actor, player);
                info!(%player, %actor, %type_id, "Privileged encounter spawned");
                SpawnOutcome::Spawned { actor, type_id }
            }
            Err(e) => {
                debug!(%player, error = %e, "Privileged spawn declined");
                SpawnOutcome::Failed
            }
        }
    }

    /// A privileged encounter was defeated. Frees its slot and returns the
    /// bonus, or `None` if the actor is not one of ours.
    pub fn on_defeated(&mut self, actor: ActorHandle) -> Option<i64> {
        self.active.remove(&actor)?;
        Some(self.config.defeat_bonus)
    }

    /// Despawn every live encounter and reset all accumulators.
    pub fn clear<E: Environment>(&mut self, env: &mut E) {
        for (actor, _) in self.active.drain() {
            env.despawn(actor);
        }
        self.accumulators.clear();
    }
}

fn spawn_point<E: Environment>(env: &E, origin: Coordinate, angle: f64, distance: f64) -> Coordinate {
    let mut at = origin.offset_polar(angle, distance);
    let block = at.to_block();
    if let Some(ground) = env.ground_height_at(at.world, block.x, block.z) {
        at.y = f64::from(ground + 1);
    }
    at
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::FlatWorld;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn spawner(max_active: usize) -> ThresholdSpawner {
        ThresholdSpawner::new(ThresholdConfig {
            points: 100,
            max_active,
            ..ThresholdConfig::default()
        })
    }

    #[test]
    fn overflow_is_carried() {
        let mut s = spawner(1);
        let p = PlayerId::new();
        assert!(!s.add(p, 60));
        assert!(s.add(p, 50));
        assert_eq!(s.accumulator(p), 10);
    }

    #[test]
    fn large_addition_fires_once_per_update() {
        let mut s = spawner(1);
        let p = PlayerId::new();
        assert!(s.add(p, 250));
        assert_eq!(s.accumulator(p), 150);
        assert!(s.add(p, 0));
        assert_eq!(s.accumulator(p), 50);
        assert!(!s.add(p, 0));
    }

    #[test]
    fn exact_threshold_resets_to_zero() {
        let mut s = spawner(1);
        let p = PlayerId::new();
        assert!(s.add(p, 100));
        assert_eq!(s.accumulator(p), 0);
    }

    #[test]
    fn cap_suppresses_and_defeat_frees_slot() {
        let mut world = FlatWorld::new();
        let p = world.add_participant("alice");
        let mut rng = StdRng::seed_from_u64(3);
        let mut s = spawner(1);

        let SpawnOutcome::Spawned { actor, .. } = s.request_spawn(&mut world, p, &mut rng) else {
            panic!("expected spawn");
        };
        assert_eq!(s.request_spawn(&mut world, p, &mut rng), SpawnOutcome::Suppressed);
        assert_eq!(s.active_count(), 1);

        assert_eq!(s.on_defeated(actor), Some(500));
        assert_eq!(s.on_defeated(actor), None);
        assert!(matches!(
            s.request_spawn(&mut world, p, &mut rng),
            SpawnOutcome::Spawned { .. }
        ));
    }

    #[test]
    fn unknown_types_disable_spawning() {
        let mut world = FlatWorld::new();
        let p = world.add_participant("bob");
        let mut s = ThresholdSpawner::new(ThresholdConfig {
            types: vec!["NoSuchBoss".to_string()],
            ..ThresholdConfig::default()
        });
        assert!(!s.validate_types(&world));
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(s.request_spawn(&mut world, p, &mut rng), SpawnOutcome::Failed);
    }

    #[test]
    fn clear_despawns_and_resets() {
        let mut world = FlatWorld::new();
        let p = world.add_participant("carol");
        let mut rng = StdRng::seed_from_u64(9);
        let mut s = spawner(2);
        s.add(p, 40);
        s.request_spawn(&mut world, p, &mut rng);
        assert_eq!(world.actor_count(), 1);
        s.clear(&mut world);
        assert_eq!(world.actor_count(), 0);
        assert_eq!(s.accumulator(p), 0);
        assert_eq!(s.active_count(), 0);
    }
}
