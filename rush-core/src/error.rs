//! Error types for the rush core library.

use thiserror::Error;

use crate::types::PlayerId;

/// Top-level error type for infrastructure failures (config, storage, I/O).
///
/// Gameplay refusals are not errors; see [`Rejection`].
#[derive(Error, Debug)]
pub enum RushError {
    /// Configuration could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No profile is cached or stored for the player.
    #[error("Player not found: {0}")]
    PlayerNotFound(PlayerId),

    /// A round update was attempted before the store assigned an id.
    #[error("Round has not been persisted yet")]
    RoundNotPersisted,

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, RushError>;

/// Why a gameplay entrypoint refused a request.
///
/// Returned synchronously to the calling host handler so it can cancel the
/// underlying game action or show the player a message.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The call is only valid while a round is active.
    #[error("no round is active")]
    NotActive,

    /// The call is not valid in the current phase.
    #[error("not allowed in the current phase")]
    WrongPhase,

    /// Not enough participants are online to start a countdown.
    #[error("not enough players")]
    NotEnoughPlayers,

    /// The player has no cached profile (never joined).
    #[error("unknown player")]
    UnknownPlayer,

    /// A player targeted themselves.
    #[error("cannot target yourself")]
    SelfTarget,

    /// Both players are on the same team and the rules forbid team damage.
    #[error("friendly fire is disabled")]
    FriendlyFire,

    /// The actor is not an idle rescue NPC.
    #[error("not an idle rescue npc")]
    UnknownNpc,

    /// The player already runs an encounter.
    #[error("already in an encounter")]
    AlreadyEngaged,

    /// No game-placed container exists at that position.
    #[error("not a game container")]
    UnknownContainer,

    /// The consumed item has no point value.
    #[error("item cannot be converted to points")]
    NotConvertible,

    /// The actor is not a live threshold spawn.
    #[error("not a privileged encounter")]
    NotPrivileged,

    /// Punished players cannot equip protective gear.
    #[error("punished players cannot wear armor")]
    GearLocked,
}
