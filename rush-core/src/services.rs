//! Interfaces to the host environment and the record store.
//!
//! The orchestrator owns one value implementing [`Environment`] (the host's
//! world, placement and actor services) and one [`RecordStore`]. Both are
//! called only from the tick thread; a host with asynchronous back ends must
//! complete the work before returning or marshal results back through the
//! gameplay entrypoints.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Result;
use crate::ledger::{PlayerProfile, TeamStanding};
use crate::loot::{ContainerKind, LootItem};
use crate::types::{ActorHandle, Area, BlockPos, ChunkPos, Coordinate, PlayerId, Round, RoundId, TeamColor, WorldId};

// ---------------------------------------------------------------------------
// Spatial Placement
// ---------------------------------------------------------------------------

/// Answers "where can something stand?" questions about the world.
pub trait SpatialPlacement {
    /// A block within `radius` of `center` with solid ground below and free
    /// space at the block itself, or `None`. `center.y` is a hint only.
    fn find_safe_coordinate(&mut self, center: BlockPos, radius: u32) -> Option<BlockPos>;

    /// Height of the highest solid block in a column.
    fn ground_height_at(&self, world: WorldId, x: i32, z: i32) -> Option<i32>;

    /// Whether the chunk is currently loaded (reachable for placement).
    fn is_loaded(&self, chunk: ChunkPos) -> bool;
}

// ---------------------------------------------------------------------------
// Actor Spawning
// ---------------------------------------------------------------------------

/// Why the actor service declined a spawn.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    /// The type id is not registered with the host.
    #[error("unknown actor type: {0}")]
    UnknownType(String),
    /// The host refused (location blocked, entity cap, chunk unloaded).
    #[error("spawn declined: {0}")]
    Declined(String),
}

/// Materializes and tracks actors (NPCs, monsters, privileged encounters).
pub trait ActorSpawner {
    /// Spawn an actor of `type_id` at `at`.
    ///
    /// # Errors
    /// Returns [`SpawnError`] when the host cannot materialize the actor.
    fn spawn_actor(&mut self, type_id: &str, at: Coordinate, level: u32) -> std::result::Result<ActorHandle, SpawnError>;

    /// Whether `type_id` can be spawned at all.
    fn is_known_type(&self, type_id: &str) -> bool;

    /// Remove an actor. Unknown handles are ignored.
    fn despawn(&mut self, actor: ActorHandle);

    /// Current position, or `None` once the actor is dead or removed.
    fn actor_position(&self, actor: ActorHandle) -> Option<Coordinate>;

    /// Teleport a live actor.
    fn relocate(&mut self, actor: ActorHandle, to: Coordinate);

    /// Remove any game-placed actor standing on `pos`, for stale cleanup after
    /// an unclean shutdown when no handle survives. Returns how many were removed.
    fn remove_actors_at(&mut self, pos: BlockPos) -> usize;

    /// Set the name shown above an actor.
    fn set_display_name(&mut self, actor: ActorHandle, name: &str) {
        let _ = (actor, name);
    }
}

// ---------------------------------------------------------------------------
// World Host
// ---------------------------------------------------------------------------

/// Host-side effects on participants and world blocks.
pub trait WorldHost {
    /// Participants currently online, in any order.
    fn online_participants(&self) -> Vec<PlayerId>;

    /// Position of an online participant; `None` when offline.
    fn participant_position(&self, player: PlayerId) -> Option<Coordinate>;

    /// Put a container block filled with `loot` at `pos`. Returns `false` if refused.
    fn place_container(&mut self, pos: BlockPos, kind: ContainerKind, loot: &[LootItem]) -> bool;

    /// Remove a container block. Returns `false` if nothing was there.
    fn remove_container(&mut self, pos: BlockPos) -> bool;

    /// Move worn protective gear into the general inventory.
    fn strip_protective_gear(&mut self, player: PlayerId);

    /// Show `color` on the participant's name tag; `None` restores the default.
    fn set_name_color(&mut self, player: PlayerId, color: Option<TeamColor>);

    /// Reset health and inventory and teleport the participant for a new round.
    fn prepare_participant(&mut self, player: PlayerId, team: TeamColor, spawn: Coordinate);

    /// Reset weather, time and border around the play area.
    fn reset_environment(&mut self, center: BlockPos, radius: u32);
}

/// Everything the orchestrator needs from the host, as one value.
pub trait Environment: WorldHost + SpatialPlacement + ActorSpawner {}

impl<T: WorldHost + SpatialPlacement + ActorSpawner> Environment for T {}

// ---------------------------------------------------------------------------
// Record Store
// ---------------------------------------------------------------------------

/// Which spawn/respawn instance a placed entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    /// Loot container block.
    Container,
    /// Rescue NPC.
    RescueNpc,
}

impl EntityCategory {
    /// Stable storage name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::RescueNpc => "rescue_npc",
        }
    }
}

/// Persistent records: rounds, player profiles, placements.
///
/// Every method is synchronous and called from the tick thread. Failures are
/// logged by the caller and never abort gameplay.
pub trait RecordStore {
    /// Insert a new round and return its id.
    ///
    /// # Errors
    /// Storage failures.
    fn create_round(&self, round: &Round) -> Result<RoundId>;

    /// Update a persisted round.
    ///
    /// # Errors
    /// Storage failures, or `RoundNotPersisted` if `round.id` is `None`.
    fn update_round(&self, round: &Round) -> Result<()>;

    /// Store final team standings for a round.
    ///
    /// # Errors
    /// Storage failures.
    fn save_team_scores(&self, round: RoundId, standings: &[TeamStanding]) -> Result<()>;

    /// Insert or replace a player profile.
    ///
    /// # Errors
    /// Storage failures.
    fn upsert_player_profile(&self, profile: &PlayerProfile) -> Result<()>;

    /// Load a player profile.
    ///
    /// # Errors
    /// Storage failures.
    fn load_player_profile(&self, player: PlayerId) -> Result<Option<PlayerProfile>>;

    /// Profiles ordered by points, highest first.
    ///
    /// # Errors
    /// Storage failures.
    fn top_players_by_points(&self, limit: usize) -> Result<Vec<PlayerProfile>>;

    /// Log a placed entity for stale cleanup.
    ///
    /// # Errors
    /// Storage failures.
    fn record_placed_entity(&self, round: RoundId, category: EntityCategory, pos: BlockPos, kind: &str) -> Result<()>;

    /// Delete logged placements of `category` inside `area` that belong to
    /// any round other than `round`, returning their positions.
    ///
    /// # Errors
    /// Storage failures.
    fn delete_placed_entities_not_in_round(
        &self,
        round: RoundId,
        category: EntityCategory,
        area: &Area,
    ) -> Result<Vec<BlockPos>>;
}
