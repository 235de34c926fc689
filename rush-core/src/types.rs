//! Core type definitions shared by every subsystem.
//!
//! Identity types are opaque handles; positions that act as map keys are
//! integer block coordinates so equality is structural and exact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A point on the tick clock. Every deadline in the crate is expressed in ticks.
pub type Tick = u64;

/// Width of a chunk (the candidate sub-area used for population) in blocks.
pub const CHUNK_SIZE: i32 = 16;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Create a new random player ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to an actor materialized by the host's actor spawning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorHandle(pub u64);

impl fmt::Display for ActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// Round identifier assigned by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoundId(pub i64);

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round#{}", self.0)
    }
}

/// Identifier of a world (dimension) inside the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct WorldId(pub u32);

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "world-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Spatial
// ---------------------------------------------------------------------------

/// A continuous position inside a world.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    /// World the coordinate belongs to.
    pub world: WorldId,
    /// X coordinate.
    pub x: f64,
    /// Y coordinate (height).
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl Coordinate {
    /// Create a coordinate.
    #[must_use]
    pub const fn new(world: WorldId, x: f64, y: f64, z: f64) -> Self {
        Self { world, x, y, z }
    }

    /// Euclidean distance. Coordinates in different worlds are infinitely apart.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        if self.world != other.world {
            return f64::INFINITY;
        }
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Snap to the containing block.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_block(&self) -> BlockPos {
        BlockPos::new(
            self.world,
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }

    /// The point at `distance` from `self` in the horizontal direction `angle` (radians).
    #[must_use]
    pub fn offset_polar(&self, angle: f64, distance: f64) -> Self {
        Self {
            world: self.world,
            x: self.x + angle.cos() * distance,
            y: self.y,
            z: self.z + angle.sin() * distance,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:.1}, {:.1}, {:.1})", self.world, self.x, self.y, self.z)
    }
}

/// Integer block position: the identity key for placed entities and pending respawns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    /// World the block belongs to.
    pub world: WorldId,
    /// Block X.
    pub x: i32,
    /// Block Y.
    pub y: i32,
    /// Block Z.
    pub z: i32,
}

impl BlockPos {
    /// Create a block position.
    #[must_use]
    pub const fn new(world: WorldId, x: i32, y: i32, z: i32) -> Self {
        Self { world, x, y, z }
    }

    /// Chunk containing this block.
    #[must_use]
    pub const fn chunk(&self) -> ChunkPos {
        ChunkPos {
            world: self.world,
            x: self.x.div_euclid(CHUNK_SIZE),
            z: self.z.div_euclid(CHUNK_SIZE),
        }
    }

    /// Center of the block's top face, where an actor standing on it would be.
    #[must_use]
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            self.world,
            f64::from(self.x) + 0.5,
            f64::from(self.y),
            f64::from(self.z) + 0.5,
        )
    }

    /// Horizontal distance between block origins.
    #[must_use]
    pub fn horizontal_distance(&self, other: &Self) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dz = f64::from(self.z - other.z);
        (dx * dx + dz * dz).sqrt()
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}, {}, {}]", self.world, self.x, self.y, self.z)
    }
}

/// A chunk column: the unit of world loading and of population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    /// World the chunk belongs to.
    pub world: WorldId,
    /// Chunk X (block X divided by [`CHUNK_SIZE`]).
    pub x: i32,
    /// Chunk Z.
    pub z: i32,
}

impl ChunkPos {
    /// Smallest block X inside the chunk.
    #[must_use]
    pub const fn min_block_x(&self) -> i32 {
        self.x * CHUNK_SIZE
    }

    /// Smallest block Z inside the chunk.
    #[must_use]
    pub const fn min_block_z(&self) -> i32 {
        self.z * CHUNK_SIZE
    }

    /// The chunk as an [`Area`].
    #[must_use]
    pub const fn area(&self) -> Area {
        Area {
            world: self.world,
            min_x: self.min_block_x(),
            min_z: self.min_block_z(),
            max_x: self.min_block_x() + CHUNK_SIZE,
            max_z: self.min_block_z() + CHUNK_SIZE,
        }
    }
}

/// Axis-aligned horizontal rectangle, `min` inclusive and `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Area {
    /// World the area belongs to.
    pub world: WorldId,
    /// Inclusive lower X bound.
    pub min_x: i32,
    /// Inclusive lower Z bound.
    pub min_z: i32,
    /// Exclusive upper X bound.
    pub max_x: i32,
    /// Exclusive upper Z bound.
    pub max_z: i32,
}

impl Area {
    /// Bounding square of the circle around `center` with `radius` blocks.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn around(center: BlockPos, radius: u32) -> Self {
        let r = radius as i32;
        Self {
            world: center.world,
            min_x: center.x - r,
            min_z: center.z - r,
            max_x: center.x + r + 1,
            max_z: center.z + r + 1,
        }
    }

    /// Whether the block lies inside the area.
    #[must_use]
    pub const fn contains(&self, pos: &BlockPos) -> bool {
        pos.world.0 == self.world.0
            && pos.x >= self.min_x
            && pos.x < self.max_x
            && pos.z >= self.min_z
            && pos.z < self.max_z
    }
}

// ---------------------------------------------------------------------------
// Teams
// ---------------------------------------------------------------------------

/// Fixed team color set. [`TeamColor::RESERVED`] flags punished players and is
/// never assigned as a membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamColor {
    /// Reserved for punished players.
    Red,
    /// Playable.
    Blue,
    /// Playable.
    Green,
    /// Playable.
    Yellow,
}

impl TeamColor {
    /// The color used to flag punished players.
    pub const RESERVED: Self = Self::Red;

    /// Every color, reserved included.
    pub const ALL: [Self; 4] = [Self::Red, Self::Blue, Self::Green, Self::Yellow];

    /// Colors participants are distributed across.
    pub const PLAYABLE: [Self; 3] = [Self::Blue, Self::Green, Self::Yellow];

    /// Whether this is the reserved color.
    #[must_use]
    pub fn is_reserved(self) -> bool {
        self == Self::RESERVED
    }

    /// Stable storage name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "RED",
            Self::Blue => "BLUE",
            Self::Green => "GREEN",
            Self::Yellow => "YELLOW",
        }
    }

    /// Parse a storage name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RED" => Some(Self::Red),
            "BLUE" => Some(Self::Blue),
            "GREEN" => Some(Self::Green),
            "YELLOW" => Some(Self::Yellow),
            _ => None,
        }
    }
}

impl fmt::Display for TeamColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Round
// ---------------------------------------------------------------------------

/// One complete play session, from entering Active to leaving it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// Assigned by the record store; absent if persisting failed.
    pub id: Option<RoundId>,
    /// When the round entered Active.
    pub started_at: DateTime<Utc>,
    /// When the round ended.
    pub ended_at: Option<DateTime<Utc>>,
    /// Team with the strictly highest balance, if any.
    pub winning_team: Option<TeamColor>,
    /// Participants at round start.
    pub total_players: u32,
    /// Wall-clock length, set on end.
    pub duration_seconds: Option<u64>,
}

impl Round {
    /// A round starting now.
    #[must_use]
    pub fn begin(total_players: u32) -> Self {
        Self {
            id: None,
            started_at: Utc::now(),
            ended_at: None,
            winning_team: None,
            total_players,
            duration_seconds: None,
        }
    }

    /// Mark the round ended. A second call is ignored; ended rounds are immutable.
    pub fn finish(&mut self, winner: Option<TeamColor>) {
        if self.is_ended() {
            return;
        }
        let now = Utc::now();
        self.ended_at = Some(now);
        self.winning_team = winner;
        self.duration_seconds = Some(
            u64::try_from((now - self.started_at).num_seconds()).unwrap_or_default(),
        );
    }

    /// Whether [`Round::finish`] has run.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_snap_with_floor() {
        let c = Coordinate::new(WorldId(0), -0.5, 64.9, 15.99);
        assert_eq!(c.to_block(), BlockPos::new(WorldId(0), -1, 64, 15));
    }

    #[test]
    fn negative_blocks_map_to_negative_chunks() {
        let pos = BlockPos::new(WorldId(0), -1, 70, 16);
        let chunk = pos.chunk();
        assert_eq!((chunk.x, chunk.z), (-1, 1));
        assert!(chunk.area().contains(&pos));
    }

    #[test]
    fn distance_across_worlds_is_infinite() {
        let a = Coordinate::new(WorldId(0), 0.0, 0.0, 0.0);
        let b = Coordinate::new(WorldId(1), 0.0, 0.0, 0.0);
        assert!(a.distance(&b).is_infinite());
    }

    #[test]
    fn team_names_round_trip() {
        for color in TeamColor::ALL {
            assert_eq!(TeamColor::parse(color.as_str()), Some(color));
        }
        assert!(!TeamColor::PLAYABLE.contains(&TeamColor::RESERVED));
    }

    #[test]
    fn finished_round_is_immutable() {
        let mut round = Round::begin(4);
        round.finish(Some(TeamColor::Blue));
        let ended = round.ended_at;
        round.finish(None);
        assert_eq!(round.winning_team, Some(TeamColor::Blue));
        assert_eq!(round.ended_at, ended);
    }
}
