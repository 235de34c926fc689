//! Server events that drive the round orchestrator.
//!
//! Participants and actors are named by server entity uid; the dispatch
//! systems translate them through the [`EntityRegistry`](crate::bridge::EntityRegistry).

use rush_core::{BlockPos, ChunkPos};

/// Something the server observed.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// A participant came online.
    Joined {
        /// Server uid.
        uid: u64,
        /// Display name.
        name: String,
    },

    /// A participant went offline.
    Left {
        /// Server uid.
        uid: u64,
    },

    /// A participant ate or drank an item.
    Consumed {
        /// Server uid.
        uid: u64,
        /// Server item id, e.g. `COOKED_BEEF`.
        item: String,
    },

    /// One participant damaged another.
    Damaged {
        /// Attacker uid.
        attacker: u64,
        /// Victim uid.
        victim: u64,
    },

    /// One participant killed another.
    Killed {
        /// Killer uid.
        killer: u64,
        /// Victim uid.
        victim: u64,
    },

    /// A participant interacted with an actor (right-click, talk).
    Interacted {
        /// Server uid.
        uid: u64,
        /// Actor entity uid.
        entity: u64,
    },

    /// A non-participant actor died.
    ActorDied {
        /// Actor entity uid.
        entity: u64,
        /// Participant credited with the kill, if any.
        killer: Option<u64>,
    },

    /// A participant opened a container block.
    ContainerOpened {
        /// Server uid.
        uid: u64,
        /// Container block.
        pos: BlockPos,
    },

    /// A container was emptied or broken.
    ContainerEmptied {
        /// Container block.
        pos: BlockPos,
    },

    /// A chunk was loaded.
    ChunkLoaded {
        /// The chunk.
        chunk: ChunkPos,
    },

    /// A participant tries to put on an item.
    EquipAttempt {
        /// Server uid.
        uid: u64,
        /// Server item id.
        item: String,
    },

    /// An operator command.
    Admin(AdminCommand),
}

/// Operator commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// Start a countdown now if quorum allows.
    Start,
    /// Cancel a running countdown.
    Cancel,
    /// Report the status snapshot.
    Status,
    /// Report the leaderboard.
    Top(usize),
}

impl HostEvent {
    /// Short name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Joined { .. } => "joined",
            Self::Left { .. } => "left",
            Self::Consumed { .. } => "consumed",
            Self::Damaged { .. } => "damaged",
            Self::Killed { .. } => "killed",
            Self::Interacted { .. } => "interacted",
            Self::ActorDied { .. } => "actor_died",
            Self::ContainerOpened { .. } => "container_opened",
            Self::ContainerEmptied { .. } => "container_emptied",
            Self::ChunkLoaded { .. } => "chunk_loaded",
            Self::EquipAttempt { .. } => "equip_attempt",
            Self::Admin(_) => "admin",
        }
    }

    /// Every participant uid the event names.
    #[must_use]
    pub fn participants(&self) -> Vec<u64> {
        match self {
            Self::Joined { uid, .. }
            | Self::Left { uid }
            | Self::Consumed { uid, .. }
            | Self::Interacted { uid, .. }
            | Self::ContainerOpened { uid, .. }
            | Self::EquipAttempt { uid, .. } => vec![*uid],
            Self::Damaged { attacker, victim } => vec![*attacker, *victim],
            Self::Killed { killer, victim } => vec![*killer, *victim],
            Self::ActorDied { killer, .. } => killer.iter().copied().collect(),
            Self::ContainerEmptied { .. } | Self::ChunkLoaded { .. } | Self::Admin(_) => Vec::new(),
        }
    }

    /// Whether the event only makes sense while a round is running.
    #[must_use]
    pub fn is_gameplay(&self) -> bool {
        matches!(
            self,
            Self::Consumed { .. }
                | Self::Damaged { .. }
                | Self::Killed { .. }
                | Self::Interacted { .. }
                | Self::ActorDied { .. }
                | Self::ContainerOpened { .. }
                | Self::ContainerEmptied { .. }
        )
    }
}
