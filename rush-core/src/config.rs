//! Configuration for the round orchestrator.
//!
//! Maps directly to `rush.toml`. Every field has a default so a partial or
//! empty file is valid; semantic problems (bad tiers, inverted ranges) are
//! reported as warnings and the affected feature is skipped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{BlockPos, Tick, WorldId};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RushConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Phase timing and map geometry.
    #[serde(default)]
    pub round: RoundConfig,
    /// Loot container population.
    #[serde(default)]
    pub containers: ContainerConfig,
    /// Rescue NPCs and wave encounters.
    #[serde(default)]
    pub rescue: RescueConfig,
    /// Punished status.
    #[serde(default)]
    pub punishment: PunishmentConfig,
    /// Threshold-gated privileged spawns.
    #[serde(default)]
    pub threshold: ThresholdConfig,
    /// Item to point conversion.
    #[serde(default)]
    pub points: PointsConfig,
    /// Persistence / save settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl RushConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `RushError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::RushError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Convert whole seconds to ticks at the configured rate.
    #[must_use]
    pub fn ticks(&self, seconds: u64) -> Tick {
        seconds.saturating_mul(u64::from(self.general.ticks_per_second.max(1)))
    }

    /// Map center block. Height is irrelevant for area math and set to zero.
    #[must_use]
    pub fn center(&self) -> BlockPos {
        BlockPos::new(
            WorldId(self.general.world),
            self.round.center_x.unwrap_or(0),
            0,
            self.round.center_z.unwrap_or(0),
        )
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json_logs: bool,
    /// Rate of the external tick source.
    #[serde(default = "default_ticks_per_second")]
    pub ticks_per_second: u32,
    /// Fixed RNG seed; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// World the round is played in.
    #[serde(default)]
    pub world: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            ticks_per_second: 20,
            seed: None,
            world: 0,
        }
    }
}

/// Phase timing and play area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundConfig {
    /// Participants needed to start a countdown.
    #[serde(default = "default_min_players")]
    pub min_players: usize,
    /// Countdown length.
    #[serde(default = "default_countdown_seconds")]
    pub countdown_seconds: u64,
    /// Delay before a quorum loss during Countdown reverts to Waiting.
    #[serde(default = "default_quorum_debounce_ticks")]
    pub quorum_debounce_ticks: Tick,
    /// Active phase length.
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: u64,
    /// Cooldown length.
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,
    /// Radius of the play area in blocks.
    #[serde(default = "default_map_radius")]
    pub map_radius: u32,
    /// Map center X.
    #[serde(default)]
    pub center_x: Option<i32>,
    /// Map center Z.
    #[serde(default)]
    pub center_z: Option<i32>,
    /// Remaining-seconds marks that produce an announcement during Active.
    #[serde(default = "default_announce_remaining")]
    pub announce_remaining: Vec<u64>,
    /// Remaining-seconds marks that produce an announcement during Countdown.
    #[serde(default = "default_countdown_announce")]
    pub countdown_announce: Vec<u64>,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            countdown_seconds: 10,
            quorum_debounce_ticks: 20,
            duration_minutes: 20,
            cooldown_minutes: 5,
            map_radius: 250,
            center_x: None,
            center_z: None,
            announce_remaining: default_announce_remaining(),
            countdown_announce: default_countdown_announce(),
        }
    }
}

/// Loot container population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Containers attempted per chunk.
    #[serde(default = "default_1_u32")]
    pub per_chunk: u32,
    /// Randomized probes per container attempt.
    #[serde(default = "default_10_u32")]
    pub probe_attempts: u32,
    /// Delay between consumption and respawn.
    #[serde(default = "default_60")]
    pub respawn_delay_seconds: u64,
    /// Interval of the respawn sweep.
    #[serde(default = "default_60")]
    pub sweep_interval_seconds: u64,
    /// Damage a trapped container deals when opened.
    #[serde(default = "default_trapped_damage")]
    pub trapped_damage: f64,
    /// Lowest block height a container may be placed at.
    #[serde(default = "default_min_height")]
    pub min_height: i32,
    /// Highest block height a container may be placed at.
    #[serde(default = "default_max_height")]
    pub max_height: i32,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            per_chunk: 1,
            probe_attempts: 10,
            respawn_delay_seconds: 60,
            sweep_interval_seconds: 60,
            trapped_damage: 4.0,
            min_height: 60,
            max_height: 200,
        }
    }
}

/// Rescue NPC placement and wave encounter tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescueConfig {
    /// Place one NPC every `npc_per_chunks` chunks along each axis.
    #[serde(default = "default_3_u32")]
    pub npc_per_chunks: u32,
    /// Randomized probes per NPC attempt.
    #[serde(default = "default_1_u32")]
    pub probe_attempts: u32,
    /// Delay between an encounter ending and its NPC returning.
    #[serde(default = "default_120")]
    pub respawn_delay_seconds: u64,
    /// Interval of the NPC respawn sweep.
    #[serde(default = "default_1_u64")]
    pub sweep_interval_seconds: u64,
    /// Distance at which idle NPCs call for help.
    #[serde(default = "default_proximity_range")]
    pub proximity_range: f64,
    /// Minimum gap between help calls to the same participant.
    #[serde(default = "default_5")]
    pub help_cooldown_seconds: u64,
    /// Distance that triggers the one-time caution notice.
    #[serde(default = "default_warning_distance")]
    pub warning_distance: f64,
    /// Distance that abandons the encounter.
    #[serde(default = "default_abandon_distance")]
    pub abandon_distance: f64,
    /// Monsters further than this from the NPC are recalled.
    #[serde(default = "default_leash_radius")]
    pub leash_radius: f64,
    /// Minimum recall distance from the NPC.
    #[serde(default = "default_recall_min")]
    pub recall_min: f64,
    /// Maximum recall distance from the NPC.
    #[serde(default = "default_recall_max")]
    pub recall_max: f64,
    /// Minimum wave spawn distance from the NPC.
    #[serde(default = "default_spawn_ring_min")]
    pub spawn_ring_min: f64,
    /// Maximum wave spawn distance from the NPC.
    #[serde(default = "default_spawn_ring_max")]
    pub spawn_ring_max: f64,
    /// Share of the final wave drawn from the elite pool.
    #[serde(default = "default_elite_fraction")]
    pub elite_fraction: f64,
    /// Default waves per encounter.
    #[serde(default = "default_3_u32")]
    pub waves: u32,
    /// Default monsters per wave.
    #[serde(default = "default_5_u32")]
    pub per_wave: u32,
    /// Default encounter length.
    #[serde(default = "default_120")]
    pub duration_seconds: u64,
    /// Default spacing between waves.
    #[serde(default = "default_30")]
    pub wave_interval_seconds: u64,
    /// Pool the final wave's elites are drawn from.
    #[serde(default = "default_elite_monsters")]
    pub elite_monsters: Vec<String>,
    /// Names shown on NPCs, formatted through each tier's `name_format`.
    #[serde(default = "default_names")]
    pub names: Vec<String>,
    /// Difficulty tiers.
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierConfig>,
}

impl Default for RescueConfig {
    fn default() -> Self {
        Self {
            npc_per_chunks: 3,
            probe_attempts: 1,
            respawn_delay_seconds: 120,
            sweep_interval_seconds: 1,
            proximity_range: 10.0,
            help_cooldown_seconds: 5,
            warning_distance: 15.0,
            abandon_distance: 20.0,
            leash_radius: 16.0,
            recall_min: 5.0,
            recall_max: 8.0,
            spawn_ring_min: 5.0,
            spawn_ring_max: 10.0,
            elite_fraction: 0.7,
            waves: 3,
            per_wave: 5,
            duration_seconds: 120,
            wave_interval_seconds: 30,
            elite_monsters: default_elite_monsters(),
            names: default_names(),
            tiers: default_tiers(),
        }
    }
}

/// One rescue difficulty tier as written in the config file.
///
/// Wave parameters left unset fall back to the [`RescueConfig`] defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Tier number, 1 to 5. Tier 1 is the fallback when a placement fails.
    pub level: u8,
    /// Actor type of the NPC.
    pub npc_type: String,
    /// Monster types the waves draw from.
    #[serde(default)]
    pub monsters: Vec<String>,
    /// Lowest victory reward.
    pub reward_min: i64,
    /// Highest victory reward.
    pub reward_max: i64,
    /// Points fed to the threshold accumulator on victory.
    pub threshold_points: u32,
    /// Display name pattern; must contain `{name}`.
    #[serde(default = "default_name_format")]
    pub name_format: String,
    /// Relative likelihood of this tier being placed.
    #[serde(default = "default_spawn_weight")]
    pub spawn_weight: u32,
    /// Waves override.
    #[serde(default)]
    pub waves: Option<u32>,
    /// Monsters per wave override.
    #[serde(default)]
    pub per_wave: Option<u32>,
    /// Duration override.
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    /// Wave interval override.
    #[serde(default)]
    pub wave_interval_seconds: Option<u64>,
}

/// A validated tier with every fallback resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescueTier {
    /// Tier number (1 is the fallback tier).
    pub level: u8,
    /// Actor type of the NPC.
    pub npc_type: String,
    /// Monster types the waves draw from.
    pub monsters: Vec<String>,
    /// Lowest victory reward.
    pub reward_min: i64,
    /// Highest victory reward.
    pub reward_max: i64,
    /// Points fed to the threshold accumulator on victory.
    pub threshold_points: u32,
    /// Display name pattern.
    pub name_format: String,
    /// Relative likelihood of this tier being placed.
    pub spawn_weight: u32,
    /// Number of waves.
    pub waves: u32,
    /// Monsters per wave.
    pub per_wave: u32,
    /// Encounter length in seconds.
    pub duration_seconds: u64,
    /// Seconds between waves.
    pub wave_interval_seconds: u64,
}

impl RescueTier {
    /// Display name for an NPC of this tier.
    #[must_use]
    pub fn display_name(&self, name: &str) -> String {
        self.name_format.replace("{name}", name)
    }
}

impl RescueConfig {
    /// Resolve and validate the configured tiers.
    ///
    /// Invalid tiers are logged and skipped; the result may be empty.
    #[must_use]
    pub fn resolved_tiers(&self) -> Vec<RescueTier> {
        let mut tiers: Vec<RescueTier> = Vec::with_capacity(self.tiers.len());
        for raw in &self.tiers {
            let level = raw.level;
            let problem = if !(1..=5).contains(&level) {
                Some("tier number must be 1-5")
            } else if tiers.iter().any(|t| t.level == level) {
                Some("duplicate tier number")
            } else if raw.npc_type.is_empty() {
                Some("npc_type is empty")
            } else if raw.monsters.is_empty() {
                Some("monsters list is empty")
            } else if !raw.name_format.contains("{name}") {
                Some("name_format must contain {name}")
            } else if raw.reward_max < raw.reward_min || raw.reward_min < 0 {
                Some("reward range is inverted or negative")
            } else if raw.threshold_points == 0 {
                Some("threshold_points must be positive")
            } else if raw.spawn_weight == 0 {
                Some("spawn_weight must be positive")
            } else {
                None
            };

            let tier = RescueTier {
                level,
                npc_type: raw.npc_type.clone(),
                monsters: raw.monsters.clone(),
                reward_min: raw.reward_min,
                reward_max: raw.reward_max,
                threshold_points: raw.threshold_points,
                name_format: raw.name_format.clone(),
                spawn_weight: raw.spawn_weight,
                waves: raw.waves.unwrap_or(self.waves),
                per_wave: raw.per_wave.unwrap_or(self.per_wave),
                duration_seconds: raw.duration_seconds.unwrap_or(self.duration_seconds),
                wave_interval_seconds: raw
                    .wave_interval_seconds
                    .unwrap_or(self.wave_interval_seconds),
            };

            let problem = problem.or(if tier.waves == 0 || tier.per_wave == 0 {
                Some("waves and per_wave must be positive")
            } else if tier.duration_seconds == 0 {
                Some("duration must be positive")
            } else {
                None
            });

            match problem {
                Some(reason) => warn!(tier = level, reason, "Skipping rescue tier"),
                None => tiers.push(tier),
            }
        }
        tiers.sort_by_key(|t| t.level);
        tiers
    }
}

/// Punished status tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PunishmentConfig {
    /// Time added per qualifying attack.
    #[serde(default = "default_180")]
    pub base_duration_seconds: u64,
    /// Absolute cap on remaining time, measured from the current instant.
    #[serde(default = "default_3600")]
    pub cap_seconds: u64,
    /// Interval of the expiry sweep.
    #[serde(default = "default_1_u64")]
    pub sweep_interval_seconds: u64,
    /// Which attacks count as hostile.
    #[serde(default)]
    pub hostility: Hostility,
}

impl Default for PunishmentConfig {
    fn default() -> Self {
        Self {
            base_duration_seconds: 180,
            cap_seconds: 3600,
            sweep_interval_seconds: 1,
            hostility: Hostility::default(),
        }
    }
}

/// Hostility rule variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hostility {
    /// Only attacks across teams count; same-team attacks are blocked.
    #[default]
    CrossTeam,
    /// Team-kill sensitive: same-team attacks are allowed and also count.
    AnyTeam,
}

/// Threshold-gated privileged spawner tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Accumulator value that triggers a spawn request.
    #[serde(default = "default_100")]
    pub points: u32,
    /// Simultaneous privileged encounters allowed.
    #[serde(default = "default_1_usize")]
    pub max_active: usize,
    /// Bonus for defeating a privileged encounter.
    #[serde(default = "default_500")]
    pub defeat_bonus: i64,
    /// How far in front of the player the encounter appears.
    #[serde(default = "default_spawn_distance")]
    pub spawn_distance: f64,
    /// Actor types to draw from.
    #[serde(default = "default_privileged_types")]
    pub types: Vec<String>,
    /// Level passed to the actor spawner.
    #[serde(default = "default_1_u32")]
    pub level: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            points: 100,
            max_active: 1,
            defeat_bonus: 500,
            spawn_distance: 10.0,
            types: default_privileged_types(),
            level: 1,
        }
    }
}

/// Item to point conversion table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsConfig {
    /// Points per consumed item, keyed by host item id.
    #[serde(default = "default_food_points")]
    pub food: BTreeMap<String, i64>,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            food: default_food_points(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Enable WAL journal mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// SQLite busy timeout.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
    /// Rotating backups kept.
    #[serde(default = "default_3_u32")]
    pub backup_count: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            wal_mode: true,
            busy_timeout_ms: 5000,
            backup_count: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value helpers (serde requires functions)
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_ticks_per_second() -> u32 { 20 }
fn default_min_players() -> usize { 2 }
fn default_countdown_seconds() -> u64 { 10 }
fn default_quorum_debounce_ticks() -> Tick { 20 }
fn default_duration_minutes() -> u64 { 20 }
fn default_cooldown_minutes() -> u64 { 5 }
fn default_map_radius() -> u32 { 250 }
fn default_announce_remaining() -> Vec<u64> { vec![600, 300, 60, 30, 10] }
fn default_countdown_announce() -> Vec<u64> { vec![10, 5, 3, 2, 1] }
fn default_1_u32() -> u32 { 1 }
fn default_3_u32() -> u32 { 3 }
fn default_5_u32() -> u32 { 5 }
fn default_10_u32() -> u32 { 10 }
fn default_1_u64() -> u64 { 1 }
fn default_1_usize() -> usize { 1 }
fn default_5() -> u64 { 5 }
fn default_30() -> u64 { 30 }
fn default_60() -> u64 { 60 }
fn default_120() -> u64 { 120 }
fn default_180() -> u64 { 180 }
fn default_3600() -> u64 { 3600 }
fn default_100() -> u32 { 100 }
fn default_500() -> i64 { 500 }
fn default_trapped_damage() -> f64 { 4.0 }
fn default_min_height() -> i32 { 60 }
fn default_max_height() -> i32 { 200 }
fn default_proximity_range() -> f64 { 10.0 }
fn default_warning_distance() -> f64 { 15.0 }
fn default_abandon_distance() -> f64 { 20.0 }
fn default_leash_radius() -> f64 { 16.0 }
fn default_recall_min() -> f64 { 5.0 }
fn default_recall_max() -> f64 { 8.0 }
fn default_spawn_ring_min() -> f64 { 5.0 }
fn default_spawn_ring_max() -> f64 { 10.0 }
fn default_elite_fraction() -> f64 { 0.7 }
fn default_spawn_distance() -> f64 { 10.0 }
fn default_spawn_weight() -> u32 { 20 }
fn default_name_format() -> String { "{name}".to_string() }
fn default_db_path() -> String { "rush.db".to_string() }
fn default_busy_timeout() -> u32 { 5000 }
fn default_privileged_types() -> Vec<String> { vec!["SugarLord".to_string()] }
fn default_elite_monsters() -> Vec<String> {
    vec!["EliteCandyGolem".to_string(), "EliteLicoriceKnight".to_string()]
}
fn default_names() -> Vec<String> {
    ["Taro", "Jiro", "Sakura", "Hana", "Yu", "Hikari", "Ame", "Candy", "Mint", "Cocoa"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_tiers() -> Vec<TierConfig> {
    // (level, reward range, threshold points, weight, waves, per wave)
    [
        (1, (50, 100), 10, 35, 2, 3),
        (2, (100, 150), 20, 25, 3, 4),
        (3, (150, 250), 30, 20, 3, 5),
        (4, (250, 400), 50, 12, 4, 6),
        (5, (400, 600), 100, 8, 5, 7),
    ]
    .into_iter()
    .map(|(level, (reward_min, reward_max), threshold_points, spawn_weight, waves, per_wave)| TierConfig {
        level,
        npc_type: format!("EventNPC_T{level}"),
        monsters: vec!["GummyZombie".to_string(), "JellySpider".to_string()],
        reward_min,
        reward_max,
        threshold_points,
        name_format: format!("[T{level}] {{name}}"),
        spawn_weight,
        waves: Some(waves),
        per_wave: Some(per_wave),
        duration_seconds: None,
        wave_interval_seconds: None,
    })
    .collect()
}

fn default_food_points() -> BTreeMap<String, i64> {
    [
        ("APPLE", 5),
        ("BREAD", 10),
        ("COOKED_BEEF", 20),
        ("COOKED_PORKCHOP", 20),
        ("COOKED_CHICKEN", 15),
        ("COOKED_MUTTON", 15),
        ("COOKED_SALMON", 15),
        ("COOKED_COD", 10),
        ("BAKED_POTATO", 10),
        ("CARROT", 5),
        ("GOLDEN_CARROT", 30),
        ("GOLDEN_APPLE", 50),
        ("ENCHANTED_GOLDEN_APPLE", 100),
        ("CAKE", 25),
        ("PUMPKIN_PIE", 20),
        ("COOKIE", 5),
        ("MELON_SLICE", 3),
        ("SWEET_BERRIES", 3),
        ("GLOW_BERRIES", 5),
    ]
    .into_iter()
    .map(|(item, points)| (item.to_string(), points))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config = RushConfig::from_toml("").expect("parse");
        assert_eq!(config.round.min_players, 2);
        assert_eq!(config.punishment.cap_seconds, 3600);
        assert_eq!(config.threshold.points, 100);
        assert_eq!(config.rescue.resolved_tiers().len(), 5);
        assert_eq!(config.points.food.get("GOLDEN_APPLE"), Some(&50));
    }

    #[test]
    fn partial_override() {
        let config = RushConfig::from_toml(
            r#"
            [general]
            ticks_per_second = 10

            [round]
            min_players = 4
            center_x = 100

            [punishment]
            hostility = "any_team"
            "#,
        )
        .expect("parse");
        assert_eq!(config.round.min_players, 4);
        assert_eq!(config.ticks(3), 30);
        assert_eq!(config.center().x, 100);
        assert_eq!(config.punishment.hostility, Hostility::AnyTeam);
        // Untouched section keeps defaults.
        assert_eq!(config.containers.probe_attempts, 10);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = RushConfig::from_toml("[round\nmin_players = ").expect_err("must fail");
        assert!(matches!(err, crate::RushError::Config(_)));
    }

    #[test]
    fn malformed_tiers_are_skipped() {
        let config = RushConfig::from_toml(
            r#"
            [[rescue.tiers]]
            level = 1
            npc_type = "Villager"
            monsters = ["Zombie"]
            reward_min = 10
            reward_max = 20
            threshold_points = 5

            [[rescue.tiers]]
            level = 2
            npc_type = "Villager"
            monsters = ["Zombie"]
            reward_min = 50
            reward_max = 20
            threshold_points = 5

            [[rescue.tiers]]
            level = 3
            npc_type = "Villager"
            monsters = ["Zombie"]
            reward_min = 1
            reward_max = 2
            threshold_points = 5
            name_format = "no placeholder"

            [[rescue.tiers]]
            level = 1
            npc_type = "Duplicate"
            monsters = ["Zombie"]
            reward_min = 1
            reward_max = 2
            threshold_points = 5
            "#,
        )
        .expect("parse");
        let tiers = config.rescue.resolved_tiers();
        assert_eq!(tiers.len(), 1);
        assert_eq!(tiers[0].level, 1);
        // Unset wave parameters fall back to the section defaults.
        assert_eq!(tiers[0].waves, 3);
        assert_eq!(tiers[0].duration_seconds, 120);
    }

    #[test]
    fn display_name_substitutes_placeholder() {
        let tier = RushConfig::default().rescue.resolved_tiers().remove(0);
        assert_eq!(tier.display_name("Mint"), "[T1] Mint");
    }
}
