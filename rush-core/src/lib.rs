//! # Rush Core Library
//!
//! Host-agnostic round orchestrator for a team-based minigame.
//!
//! A round moves through four phases driven by one external tick:
//!
//! - **Waiting**: idle until enough participants are online
//! - **Countdown**: quorum reached, debounced against players leaving
//! - **Active**: teams collect points from containers, rescue encounters and
//!   privileged spawns; hostile players are punished
//! - **Cooldown**: results are shown, then the cycle restarts
//!
//! The host supplies an [`services::Environment`] (placement, actors, world
//! effects) and a [`services::RecordStore`]; everything else lives in the
//! [`Orchestrator`].
//!
//! ## Threading Contract
//!
//! Every handler runs on the tick thread. Nothing in this crate spawns
//! threads or blocks; counters in [`metrics`] are atomic so a host may read
//! them from elsewhere.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod containers;
pub mod encounter;
pub mod error;
pub mod ledger;
pub mod loot;
pub mod metrics;
pub mod notify;
pub mod orchestrator;
pub mod persistence;
pub mod punishment;
pub mod respawn;
pub mod scheduler;
pub mod services;
pub mod sim;
pub mod threshold;
pub mod types;

pub use config::RushConfig;
pub use error::{Rejection, RushError};
pub use orchestrator::{Orchestrator, Phase};
pub use types::*;
