//! A flat, in-process world implementing [`Environment`].
//!
//! Ground is a single plane at [`FlatWorld::GROUND`]; every chunk is loaded
//! until [`FlatWorld::unload_chunk`] says otherwise. The simulated host binary,
//! the benches and the test suites all drive the orchestrator through it.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::config::RushConfig;
use crate::loot::{ContainerKind, LootItem};
use crate::services::{ActorSpawner, SpatialPlacement, SpawnError, WorldHost};
use crate::types::{ActorHandle, BlockPos, ChunkPos, Coordinate, PlayerId, TeamColor, WorldId};

/// A live actor.
#[derive(Debug, Clone, PartialEq)]
pub struct SimActor {
    /// Spawned type.
    pub type_id: String,
    /// Current position.
    pub at: Coordinate,
    /// Spawn level.
    pub level: u32,
    /// Display name, if one was set.
    pub name: Option<String>,
}

/// An online participant.
#[derive(Debug, Clone, PartialEq)]
pub struct SimParticipant {
    /// Display name.
    pub name: String,
    /// Current position.
    pub at: Coordinate,
    /// Team set by the last round preparation.
    pub team: Option<TeamColor>,
    /// Name tag color.
    pub name_color: Option<TeamColor>,
    /// How often worn gear was stripped.
    pub gear_strips: u32,
}

/// Flat reference world.
#[derive(Debug)]
pub struct FlatWorld {
    rng: StdRng,
    known_types: BTreeSet<String>,
    actors: BTreeMap<ActorHandle, SimActor>,
    next_actor: u64,
    containers: BTreeMap<BlockPos, (ContainerKind, Vec<LootItem>)>,
    participants: BTreeMap<PlayerId, SimParticipant>,
    unloaded: HashSet<ChunkPos>,
    refuse_placement: bool,
    environment_resets: u32,
}

impl Default for FlatWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl FlatWorld {
    /// Height of the solid ground plane.
    pub const GROUND: i32 = 63;

    /// A world that knows every actor type the default configuration names.
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(0x5eed)
    }

    /// Same as [`FlatWorld::new`] with a chosen probe seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        let config = RushConfig::default();
        let mut known_types: BTreeSet<String> = config.threshold.types.iter().cloned().collect();
        known_types.extend(config.rescue.elite_monsters.iter().cloned());
        for tier in &config.rescue.tiers {
            known_types.insert(tier.npc_type.clone());
            known_types.extend(tier.monsters.iter().cloned());
        }
        Self {
            rng: StdRng::seed_from_u64(seed),
            known_types,
            actors: BTreeMap::new(),
            next_actor: 1,
            containers: BTreeMap::new(),
            participants: BTreeMap::new(),
            unloaded: HashSet::new(),
            refuse_placement: false,
            environment_resets: 0,
        }
    }

    // ------------------------------------------------------------------
    // Actor types
    // ------------------------------------------------------------------

    /// Make `type_id` spawnable.
    pub fn register_type(&mut self, type_id: impl Into<String>) {
        self.known_types.insert(type_id.into());
    }

    /// Make `type_id` unknown.
    pub fn forget_type(&mut self, type_id: &str) {
        self.known_types.remove(type_id);
    }

    // ------------------------------------------------------------------
    // Participants
    // ------------------------------------------------------------------

    /// Bring a new participant online at the origin.
    pub fn add_participant(&mut self, name: impl Into<String>) -> PlayerId {
        let id = PlayerId::new();
        self.add_participant_with_id(id, name);
        id
    }

    /// Bring a participant with a known id online at the origin.
    pub fn add_participant_with_id(&mut self, id: PlayerId, name: impl Into<String>) {
        let at = Coordinate::new(WorldId(0), 0.0, f64::from(Self::GROUND + 1), 0.0);
        self.participants.insert(
            id,
            SimParticipant { name: name.into(), at, team: None, name_color: None, gear_strips: 0 },
        );
    }

    /// Take a participant offline.
    pub fn remove_participant(&mut self, player: PlayerId) -> Option<SimParticipant> {
        self.participants.remove(&player)
    }

    /// Teleport a participant.
    pub fn move_participant(&mut self, player: PlayerId, to: Coordinate) {
        if let Some(p) = self.participants.get_mut(&player) {
            p.at = to;
        }
    }

    /// State of an online participant.
    #[must_use]
    pub fn participant(&self, player: PlayerId) -> Option<&SimParticipant> {
        self.participants.get(&player)
    }

    // ------------------------------------------------------------------
    // Actors
    // ------------------------------------------------------------------

    /// Kill an actor as if combat had ended it.
    pub fn kill_actor(&mut self, actor: ActorHandle) -> bool {
        self.actors.remove(&actor).is_some()
    }

    /// Whether the actor is still alive.
    #[must_use]
    pub fn is_alive(&self, actor: ActorHandle) -> bool {
        self.actors.contains_key(&actor)
    }

    /// Live actor count.
    #[must_use]
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// A live actor.
    #[must_use]
    pub fn actor(&self, actor: ActorHandle) -> Option<&SimActor> {
        self.actors.get(&actor)
    }

    /// Live actors of one type.
    #[must_use]
    pub fn actors_of_type(&self, type_id: &str) -> Vec<ActorHandle> {
        self.actors
            .iter()
            .filter(|(_, a)| a.type_id == type_id)
            .map(|(h, _)| *h)
            .collect()
    }

    // ------------------------------------------------------------------
    // Blocks and chunks
    // ------------------------------------------------------------------

    /// Number of placed containers.
    #[must_use]
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// Whether a container stands at `pos`.
    #[must_use]
    pub fn has_container(&self, pos: BlockPos) -> bool {
        self.containers.contains_key(&pos)
    }

    /// Loot inside the container at `pos`.
    #[must_use]
    pub fn container_loot(&self, pos: BlockPos) -> Option<&[LootItem]> {
        self.containers.get(&pos).map(|(_, loot)| loot.as_slice())
    }

    /// Mark a chunk unloaded.
    pub fn unload_chunk(&mut self, chunk: ChunkPos) {
        self.unloaded.insert(chunk);
    }

    /// Mark a chunk loaded again.
    pub fn load_chunk(&mut self, chunk: ChunkPos) {
        self.unloaded.remove(&chunk);
    }

    /// Make every placement call fail.
    pub fn set_refuse_placement(&mut self, refuse: bool) {
        self.refuse_placement = refuse;
    }

    /// How often the environment around the play area was reset.
    #[must_use]
    pub fn environment_resets(&self) -> u32 {
        self.environment_resets
    }

    fn occupied(&self, pos: BlockPos) -> bool {
        self.containers.contains_key(&pos) || self.actors.values().any(|a| a.at.to_block() == pos)
    }
}

impl SpatialPlacement for FlatWorld {
    fn find_safe_coordinate(&mut self, center: BlockPos, radius: u32) -> Option<BlockPos> {
        let r = i32::try_from(radius).unwrap_or(i32::MAX);
        for _ in 0..4 {
            let x = center.x + self.rng.gen_range(-r..=r);
            let z = center.z + self.rng.gen_range(-r..=r);
            let pos = BlockPos::new(center.world, x, Self::GROUND + 1, z);
            if self.is_loaded(pos.chunk()) && !self.occupied(pos) {
                return Some(pos);
            }
        }
        None
    }

    fn ground_height_at(&self, _: WorldId, _: i32, _: i32) -> Option<i32> {
        Some(Self::GROUND)
    }

    fn is_loaded(&self, chunk: ChunkPos) -> bool {
        !self.unloaded.contains(&chunk)
    }
}

impl ActorSpawner for FlatWorld {
    fn spawn_actor(&mut self, type_id: &str, at: Coordinate, level: u32) -> Result<ActorHandle, SpawnError> {
        if !self.known_types.contains(type_id) {
            return Err(SpawnError::UnknownType(type_id.to_string()));
        }
        if self.refuse_placement {
            return Err(SpawnError::Declined("placement refused".to_string()));
        }
        let handle = ActorHandle(self.next_actor);
        self.next_actor += 1;
        self.actors.insert(handle, SimActor { type_id: type_id.to_string(), at, level, name: None });
        trace!(%handle, type_id, %at, "Actor spawned");
        Ok(handle)
    }

    fn is_known_type(&self, type_id: &str) -> bool {
        self.known_types.contains(type_id)
    }

    fn despawn(&mut self, actor: ActorHandle) {
        self.actors.remove(&actor);
    }

    fn actor_position(&self, actor: ActorHandle) -> Option<Coordinate> {
        self.actors.get(&actor).map(|a| a.at)
    }

    fn relocate(&mut self, actor: ActorHandle, to: Coordinate) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.at = to;
        }
    }

    fn remove_actors_at(&mut self, pos: BlockPos) -> usize {
        let before = self.actors.len();
        self.actors.retain(|_, a| a.at.to_block() != pos);
        before - self.actors.len()
    }

    fn set_display_name(&mut self, actor: ActorHandle, name: &str) {
        if let Some(a) = self.actors.get_mut(&actor) {
            a.name = Some(name.to_string());
        }
    }
}

impl WorldHost for FlatWorld {
    fn online_participants(&self) -> Vec<PlayerId> {
        self.participants.keys().copied().collect()
    }

    fn participant_position(&self, player: PlayerId) -> Option<Coordinate> {
        self.participants.get(&player).map(|p| p.at)
    }

    fn place_container(&mut self, pos: BlockPos, kind: ContainerKind, loot: &[LootItem]) -> bool {
        if self.refuse_placement || self.containers.contains_key(&pos) {
            return false;
        }
        self.containers.insert(pos, (kind, loot.to_vec()));
        true
    }

    fn remove_container(&mut self, pos: BlockPos) -> bool {
        self.containers.remove(&pos).is_some()
    }

    fn strip_protective_gear(&mut self, player: PlayerId) {
        if let Some(p) = self.participants.get_mut(&player) {
            p.gear_strips += 1;
        }
    }

    fn set_name_color(&mut self, player: PlayerId, color: Option<TeamColor>) {
        if let Some(p) = self.participants.get_mut(&player) {
            p.name_color = color;
        }
    }

    fn prepare_participant(&mut self, player: PlayerId, team: TeamColor, spawn: Coordinate) {
        if let Some(p) = self.participants.get_mut(&player) {
            p.team = Some(team);
            p.at = spawn;
        }
    }

    fn reset_environment(&mut self, _: BlockPos, _: u32) {
        self.environment_resets += 1;
    }
}
