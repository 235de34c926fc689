//! Bridge module: maps between the server's id space and rush-core types.
//!
//! The server identifies everything by numeric entity uid and places blocks
//! by integer coordinates. rush-core uses:
//! - `PlayerId` (UUID) for participants, stable across reconnects
//! - `ActorHandle` for spawned actors
//! - `BlockPos` / `Coordinate` for locations
//!
//! Player ids are minted lazily and remembered, so a participant who leaves
//! and rejoins keeps their profile.

use std::collections::HashMap;

use rush_core::{ActorHandle, BlockPos, ChunkPos, Coordinate, PlayerId, WorldId};

// ---------------------------------------------------------------------------
// Entity Registry
// ---------------------------------------------------------------------------

/// Bidirectional mapping between server uids and participant ids.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    players: HashMap<u64, PlayerId>,
    reverse: HashMap<PlayerId, u64>,
}

impl EntityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Participant id for a server uid, minting one on first sight.
    pub fn player(&mut self, uid: u64) -> PlayerId {
        if let Some(id) = self.players.get(&uid) {
            return *id;
        }
        let id = PlayerId::new();
        self.bind(uid, id);
        id
    }

    /// Bind a uid to a known participant id (e.g. one loaded from storage).
    pub fn bind(&mut self, uid: u64, id: PlayerId) {
        if let Some(old) = self.players.insert(uid, id) {
            self.reverse.remove(&old);
        }
        self.reverse.insert(id, uid);
    }

    /// Participant id for a uid without minting.
    #[must_use]
    pub fn lookup(&self, uid: u64) -> Option<PlayerId> {
        self.players.get(&uid).copied()
    }

    /// Server uid of a participant.
    #[must_use]
    pub fn uid_of(&self, id: PlayerId) -> Option<u64> {
        self.reverse.get(&id).copied()
    }

    /// Number of known participants.
    #[must_use]
    pub fn count(&self) -> usize {
        self.players.len()
    }
}

/// Actor handle for a server entity uid. Servers hand out unique, never
/// reused uids, so the uid itself is the handle.
#[must_use]
pub fn actor_handle(entity: u64) -> ActorHandle {
    ActorHandle(entity)
}

// ---------------------------------------------------------------------------
// Position Mapping
// ---------------------------------------------------------------------------

/// Block under a server position.
#[must_use]
pub fn server_block(world: u32, x: i32, y: i32, z: i32) -> BlockPos {
    BlockPos::new(WorldId(world), x, y, z)
}

/// Precise server position.
#[must_use]
pub fn server_position(world: u32, x: f64, y: f64, z: f64) -> Coordinate {
    Coordinate::new(WorldId(world), x, y, z)
}

/// Chunk reported by a server chunk-load callback.
#[must_use]
pub fn server_chunk(world: u32, x: i32, z: i32) -> ChunkPos {
    ChunkPos { world: WorldId(world), x, z }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_ids_are_stable() {
        let mut registry = EntityRegistry::new();
        let a = registry.player(7);
        assert_eq!(registry.player(7), a);
        assert_ne!(registry.player(8), a);
        assert_eq!(registry.uid_of(a), Some(7));
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn rebinding_drops_the_old_reverse_entry() {
        let mut registry = EntityRegistry::new();
        let old = registry.player(1);
        let new = PlayerId::new();
        registry.bind(1, new);
        assert_eq!(registry.lookup(1), Some(new));
        assert_eq!(registry.uid_of(old), None);
        assert_eq!(registry.uid_of(new), Some(1));
    }

    #[test]
    fn positions_map_to_chunks() {
        let block = server_block(0, -1, 64, 17);
        assert_eq!(block.chunk(), server_chunk(0, -1, 1));
        assert_eq!(server_position(0, 0.5, 64.0, 0.5).to_block(), server_block(0, 0, 64, 0));
    }
}
