//! # rush-host: Server Integration for Rush
//!
//! This crate connects the host-agnostic `rush-core` orchestrator to a game
//! server. The server reports what happened in its own terms (numeric entity
//! ids, item names, block positions); this layer translates those reports
//! into orchestrator entrypoints.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Game server                │
//! │  ┌───────────────────────────────────┐  │
//! │  │           rush-host               │  │
//! │  │  ┌─────────────┐ ┌─────────────┐  │  │
//! │  │  │   Hooks     │ │   Systems   │  │  │
//! │  │  └──────┬──────┘ └──────┬──────┘  │  │
//! │  │         │  HostEvent    │         │  │
//! │  │         ▼               ▼         │  │
//! │  │    ┌─────────────────────────┐    │  │
//! │  │    │  Bridge (id mapping)    │    │  │
//! │  │    └────────────┬────────────┘    │  │
//! │  │                 ▼                 │  │
//! │  │    ┌─────────────────────────┐    │  │
//! │  │    │  rush-core Orchestrator │    │  │
//! │  │    └─────────────────────────┘    │  │
//! │  └───────────────────────────────────┘  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `bridge`: host entity ids to participant ids and actor handles
//! - `config`: rule presets layered over `RushConfig`
//! - `events`: what the server reports
//! - `hooks`: event constructors for the server's callbacks
//! - `systems`: dispatch of events to orchestrator entrypoints

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bridge;
pub mod config;
pub mod events;
pub mod hooks;
pub mod systems;
