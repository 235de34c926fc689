//! World containers: the first [`RespawnScheduler`] instance.

use rand::Rng;
use tracing::debug;

use crate::config::ContainerConfig;
use crate::error::Rejection;
use crate::loot::{ContainerKind, roll_loot};
use crate::respawn::{Placer, RespawnScheduler};
use crate::services::{EntityCategory, Environment};
use crate::types::{BlockPos, Tick};

/// Places loot containers inside a height band.
#[derive(Debug, Clone)]
pub struct ContainerPlacer {
    min_height: i32,
    max_height: i32,
    trapped_damage: f64,
}

impl ContainerPlacer {
    /// From the `[containers]` section.
    #[must_use]
    pub fn new(config: &ContainerConfig) -> Self {
        Self {
            min_height: config.min_height,
            max_height: config.max_height,
            trapped_damage: config.trapped_damage,
        }
    }
}

impl Placer for ContainerPlacer {
    type Entity = ContainerKind;
    const CATEGORY: EntityCategory = EntityCategory::Container;

    fn accepts(&self, pos: BlockPos) -> bool {
        (self.min_height..=self.max_height).contains(&pos.y)
    }

    fn place<E: Environment, R: Rng + ?Sized>(
        &mut self,
        env: &mut E,
        pos: BlockPos,
        rng: &mut R,
    ) -> Option<ContainerKind> {
        let kind = ContainerKind::random(rng);
        let loot = roll_loot(kind, rng);
        env.place_container(pos, kind, &loot).then_some(kind)
    }

    fn remove<E: Environment>(&mut self, env: &mut E, pos: BlockPos, _: &ContainerKind) {
        env.remove_container(pos);
    }

    fn remove_stale<E: Environment>(&mut self, env: &mut E, pos: BlockPos) {
        env.remove_container(pos);
    }

    fn kind_name(kind: &ContainerKind) -> String {
        kind.as_str().to_string()
    }
}

/// Container instance of the scheduler.
pub type ContainerScheduler = RespawnScheduler<ContainerPlacer>;

/// What opening a game container did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerOpened {
    /// Kind of the opened container.
    pub kind: ContainerKind,
    /// Damage dealt to the opener, for trapped containers.
    pub damage: Option<f64>,
}

impl RespawnScheduler<ContainerPlacer> {
    /// A participant opened the container at `pos`.
    ///
    /// # Errors
    ///
    /// [`Rejection::UnknownContainer`] if nothing of ours sits there.
    pub fn open(&self, pos: BlockPos) -> Result<ContainerOpened, Rejection> {
        let kind = *self.get(pos).ok_or(Rejection::UnknownContainer)?;
        let damage = kind.is_trapped().then_some(self.placer().trapped_damage);
        Ok(ContainerOpened { kind, damage })
    }

    /// The container at `pos` was emptied or broken.
    ///
    /// # Errors
    ///
    /// [`Rejection::UnknownContainer`] if nothing of ours sits there.
    pub fn on_consumed<E: Environment>(
        &mut self,
        env: &mut E,
        pos: BlockPos,
        now: Tick,
    ) -> Result<ContainerKind, Rejection> {
        let kind = self.consume(pos, now).ok_or(Rejection::UnknownContainer)?;
        env.remove_container(pos);
        debug!(%pos, %kind, "Container consumed");
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::respawn::PopulationPlan;
    use crate::sim::FlatWorld;
    use crate::types::{RoundId, WorldId};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn populated(world: &mut FlatWorld, store: &MemoryStore) -> ContainerScheduler {
        let config = ContainerConfig::default();
        let mut s = ContainerScheduler::new(ContainerPlacer::new(&config), 60);
        s.begin_population(
            PopulationPlan {
                center: BlockPos::new(WorldId(0), 0, 64, 0),
                radius: 48,
                stride: 1,
                per_chunk: 2,
                attempts: 5,
            },
            Some(RoundId(1)),
        );
        let mut rng = StdRng::seed_from_u64(8);
        s.populate_now(world, store, &mut rng);
        s
    }

    #[test]
    fn population_places_world_containers() {
        let mut world = FlatWorld::new();
        let store = MemoryStore::new();
        let s = populated(&mut world, &store);
        assert!(s.active_count() > 0);
        assert_eq!(world.container_count(), s.active_count());
    }

    #[test]
    fn open_and_consume_cycle() {
        let mut world = FlatWorld::new();
        let store = MemoryStore::new();
        let mut s = populated(&mut world, &store);
        let (pos, kind) = s.find(|_| true).map(|(p, k)| (p, *k)).expect("placed");

        let opened = s.open(pos).expect("open");
        assert_eq!(opened.kind, kind);
        assert_eq!(opened.damage.is_some(), kind.is_trapped());

        assert_eq!(s.on_consumed(&mut world, pos, 100), Ok(kind));
        assert_eq!(s.open(pos), Err(Rejection::UnknownContainer));
        assert_eq!(s.pending_fire_at(pos), Some(160));
        assert!(!world.has_container(pos));
        assert_eq!(s.on_consumed(&mut world, pos, 101), Err(Rejection::UnknownContainer));
    }

    #[test]
    fn height_band_filters_probes() {
        let placer = ContainerPlacer::new(&ContainerConfig::default());
        assert!(placer.accepts(BlockPos::new(WorldId(0), 0, 64, 0)));
        assert!(!placer.accepts(BlockPos::new(WorldId(0), 0, 30, 0)));
        assert!(!placer.accepts(BlockPos::new(WorldId(0), 0, 250, 0)));
    }
}
