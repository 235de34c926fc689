//! Server-side configuration: rule presets over the base `RushConfig`.
//!
//! A server picks one of three presets for a quick setup, or loads a full
//! `rush.toml` whose `[server]` section carries the host-only settings.

use std::fmt;
use std::str::FromStr;

use rush_core::RushConfig;
use rush_core::config::Hostility;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Rule Presets
// ---------------------------------------------------------------------------

/// How forgiving a round is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulePreset {
    /// Short rounds, short punishments, cheap privileged spawns.
    Casual,
    /// The stock tuning.
    #[default]
    Standard,
    /// Long rounds; team kills count and punishments stack high.
    Hardcore,
}

impl RulePreset {
    /// Human-readable summary.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Casual => "Casual: 10 minute rounds, light punishments",
            Self::Standard => "Standard: 20 minute rounds, stock tuning",
            Self::Hardcore => "Hardcore: 30 minute rounds, team kills punished",
        }
    }

    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Casual => "casual",
            Self::Standard => "standard",
            Self::Hardcore => "hardcore",
        }
    }
}

impl fmt::Display for RulePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RulePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "casual" => Ok(Self::Casual),
            "standard" => Ok(Self::Standard),
            "hardcore" => Ok(Self::Hardcore),
            other => Err(format!("unknown preset: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Host Configuration
// ---------------------------------------------------------------------------

/// Host-only settings, the `[server]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Preset the file was derived from, for logs.
    #[serde(default)]
    pub preset: RulePreset,
    /// Headless bots to admit at startup.
    #[serde(default = "default_bots")]
    pub bots: u32,
    /// Seconds between status log lines.
    #[serde(default = "default_status_interval")]
    pub status_interval_seconds: u64,
    /// Tick budget for the slow-tick warning.
    #[serde(default = "default_tick_budget_ms")]
    pub tick_budget_ms: f64,
    /// Write a rotating database backup on shutdown.
    #[serde(default = "default_true")]
    pub backup_on_exit: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            preset: RulePreset::Standard,
            bots: default_bots(),
            status_interval_seconds: default_status_interval(),
            tick_budget_ms: default_tick_budget_ms(),
            backup_on_exit: true,
        }
    }
}

/// Everything the server binary needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// Host-only settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Orchestrator settings.
    #[serde(flatten)]
    pub rush: RushConfig,
}

impl HostConfig {
    /// A config tuned for `preset`.
    #[must_use]
    pub fn for_preset(preset: RulePreset) -> Self {
        let mut config = Self::default();
        config.server.preset = preset;

        match preset {
            RulePreset::Casual => {
                config.rush.round.duration_minutes = 10;
                config.rush.round.cooldown_minutes = 2;
                config.rush.punishment.base_duration_seconds = 60;
                config.rush.punishment.cap_seconds = 600;
                config.rush.threshold.points = 60;
            }
            RulePreset::Standard => {
                // Defaults are tuned for Standard
            }
            RulePreset::Hardcore => {
                config.rush.round.min_players = 4;
                config.rush.round.duration_minutes = 30;
                config.rush.punishment.base_duration_seconds = 300;
                config.rush.punishment.hostility = Hostility::AnyTeam;
                config.rush.threshold.points = 200;
                config.rush.threshold.max_active = 2;
            }
        }

        config
    }

    /// Parse a full `rush.toml`.
    ///
    /// # Errors
    /// Returns `RushError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> rush_core::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| rush_core::RushError::Config(e.to_string()))
    }

    /// Load a full `rush.toml` from disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> rush_core::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

fn default_bots() -> u32 {
    0
}
fn default_status_interval() -> u64 {
    30
}
fn default_tick_budget_ms() -> f64 {
    50.0
}
fn default_true() -> bool {
    true
}
