//! Game container kinds and their loot tables.

use std::collections::BTreeSet;
use std::fmt;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Container kinds
// ---------------------------------------------------------------------------

/// Kind of world container placed by the container scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum ContainerKind {
    Chest,
    LargeChest,
    Barrel,
    Furnace,
    BlastFurnace,
    Smoker,
    BrewingStand,
    Hopper,
    Dropper,
    Dispenser,
    TrappedChest,
}

impl ContainerKind {
    /// The nine kinds sharing the 27% bucket of [`ContainerKind::random`].
    pub const OTHERS: [Self; 9] = [
        Self::LargeChest,
        Self::Barrel,
        Self::Furnace,
        Self::BlastFurnace,
        Self::Smoker,
        Self::BrewingStand,
        Self::Hopper,
        Self::Dropper,
        Self::Dispenser,
    ];

    /// 70% chest, 3% trapped chest, 27% spread evenly over the rest.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let roll = rng.gen_range(0.0..100.0);
        if roll < 70.0 {
            Self::Chest
        } else if roll < 73.0 {
            Self::TrappedChest
        } else {
            Self::OTHERS[rng.gen_range(0..Self::OTHERS.len())]
        }
    }

    /// Whether opening the container hurts the opener.
    #[must_use]
    pub fn is_trapped(self) -> bool {
        self == Self::TrappedChest
    }

    /// Inventory slots the container offers.
    #[must_use]
    pub fn slots(self) -> u8 {
        match self {
            Self::LargeChest => 54,
            Self::Chest | Self::TrappedChest | Self::Barrel => 27,
            Self::Dropper | Self::Dispenser => 9,
            Self::BrewingStand | Self::Hopper => 5,
            Self::Furnace | Self::BlastFurnace | Self::Smoker => 3,
        }
    }

    /// Loot category the container is filled from.
    #[must_use]
    pub fn category(self) -> LootCategory {
        match self {
            Self::Chest | Self::LargeChest | Self::Smoker => LootCategory::Food,
            Self::BrewingStand => LootCategory::Potion,
            Self::Dispenser => LootCategory::Equipment,
            Self::Furnace | Self::BlastFurnace | Self::Barrel => LootCategory::Material,
            Self::Hopper | Self::Dropper => LootCategory::Utility,
            Self::TrappedChest => LootCategory::TrapReward,
        }
    }

    /// Stable name used in the placement log.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chest => "chest",
            Self::LargeChest => "large_chest",
            Self::Barrel => "barrel",
            Self::Furnace => "furnace",
            Self::BlastFurnace => "blast_furnace",
            Self::Smoker => "smoker",
            Self::BrewingStand => "brewing_stand",
            Self::Hopper => "hopper",
            Self::Dropper => "dropper",
            Self::Dispenser => "dispenser",
            Self::TrappedChest => "trapped_chest",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Loot
// ---------------------------------------------------------------------------

/// Item family a container is stocked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum LootCategory {
    Food,
    Potion,
    Equipment,
    Material,
    Utility,
    TrapReward,
}

/// One stack placed into a container slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootItem {
    /// Host item id.
    pub item: String,
    /// Stack size.
    pub amount: u32,
    /// Slot index, unique within one container.
    pub slot: u8,
}

const CANDIES: &[&str] = &[
    "COOKIE", "COOKIE", "COOKIE", "PUMPKIN_PIE", "CAKE", "SWEET_BERRIES", "GLOW_BERRIES",
    "GOLDEN_APPLE", "GOLDEN_CARROT", "MELON_SLICE", "APPLE",
];

const MEALS: &[&str] = &[
    "BREAD", "COOKED_BEEF", "COOKED_CHICKEN", "COOKED_MUTTON", "COOKED_PORKCHOP",
    "COOKED_SALMON", "BAKED_POTATO", "CARROT",
];

const EQUIPMENT: &[&str] = &[
    "IRON_HELMET", "IRON_CHESTPLATE", "IRON_LEGGINGS", "IRON_BOOTS", "IRON_SWORD", "BOW",
    "SHIELD", "DIAMOND_HELMET", "DIAMOND_CHESTPLATE", "DIAMOND_LEGGINGS", "DIAMOND_BOOTS",
    "DIAMOND_SWORD",
];

const POTIONS: &[&str] = &[
    "POTION", "SPLASH_POTION", "LINGERING_POTION", "HONEY_BOTTLE", "MILK_BUCKET",
    "SUSPICIOUS_STEW",
];

const MATERIALS: &[&str] = &[
    "COAL", "CHARCOAL", "IRON_INGOT", "GOLD_INGOT", "STICK", "STRING", "FEATHER", "LEATHER",
    "BONE", "GUNPOWDER", "REDSTONE", "GLOWSTONE_DUST", "BLAZE_POWDER", "MAGMA_CREAM",
];

const UTILITIES: &[&str] = &[
    "ARROW", "ENDER_PEARL", "SNOWBALL", "EGG", "FISHING_ROD", "BUCKET", "WATER_BUCKET",
    "TORCH", "LADDER", "COMPASS",
];

const TRAP_REWARDS: &[&str] = &[
    "DIAMOND_HELMET", "DIAMOND_CHESTPLATE", "DIAMOND_LEGGINGS", "DIAMOND_BOOTS",
    "DIAMOND_SWORD", "DIAMOND_PICKAXE", "DIAMOND_AXE", "NETHERITE_HELMET",
    "NETHERITE_CHESTPLATE", "NETHERITE_LEGGINGS", "NETHERITE_BOOTS", "NETHERITE_SWORD",
    "ELYTRA", "TRIDENT", "ENCHANTED_GOLDEN_APPLE",
];

/// Protective gear slots a punished player may not fill.
pub const PROTECTIVE_SUFFIXES: &[&str] = &["_HELMET", "_CHESTPLATE", "_LEGGINGS", "_BOOTS"];

/// Whether an item id names wearable protective gear.
#[must_use]
pub fn is_protective(item: &str) -> bool {
    item == "ELYTRA" || PROTECTIVE_SUFFIXES.iter().any(|s| item.ends_with(s))
}

fn pick<R: Rng + ?Sized>(table: &'static [&'static str], rng: &mut R) -> &'static str {
    table.choose(rng).copied().unwrap_or("AIR")
}

fn roll_item<R: Rng + ?Sized>(category: LootCategory, rng: &mut R) -> (&'static str, u32) {
    match category {
        LootCategory::Food => {
            let table = if rng.gen_bool(0.7) { CANDIES } else { MEALS };
            (pick(table, rng), rng.gen_range(1..=8))
        }
        LootCategory::Equipment => (pick(EQUIPMENT, rng), 1),
        LootCategory::Potion => {
            let item = pick(POTIONS, rng);
            let amount = match item {
                "HONEY_BOTTLE" | "SUSPICIOUS_STEW" => rng.gen_range(1..=3),
                _ => 1,
            };
            (item, amount)
        }
        LootCategory::Material => (pick(MATERIALS, rng), rng.gen_range(4..=11)),
        LootCategory::Utility => {
            let item = pick(UTILITIES, rng);
            let amount = match item {
                "ARROW" | "TORCH" | "LADDER" => rng.gen_range(8..=23),
                "SNOWBALL" | "EGG" => rng.gen_range(4..=19),
                "ENDER_PEARL" => rng.gen_range(1..=3),
                _ => 1,
            };
            (item, amount)
        }
        LootCategory::TrapReward => {
            let item = pick(TRAP_REWARDS, rng);
            let amount = if item == "ENCHANTED_GOLDEN_APPLE" { rng.gen_range(1..=2) } else { 1 };
            (item, amount)
        }
    }
}

/// Roll 2 to 5 stacks (never more than the container holds) into distinct slots.
pub fn roll_loot<R: Rng + ?Sized>(kind: ContainerKind, rng: &mut R) -> Vec<LootItem> {
    let slots = kind.slots();
    let count = rng.gen_range(2..=5u8).min(slots);
    let mut used = BTreeSet::new();
    let mut items = Vec::with_capacity(usize::from(count));
    while items.len() < usize::from(count) {
        let slot = rng.gen_range(0..slots);
        if !used.insert(slot) {
            continue;
        }
        let (item, amount) = roll_item(kind.category(), rng);
        items.push(LootItem { item: item.to_string(), amount, slot });
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn kind_distribution_is_chest_heavy() {
        let mut rng = StdRng::seed_from_u64(42);
        let n = 20_000;
        let draws: Vec<ContainerKind> = (0..n).map(|_| ContainerKind::random(&mut rng)).collect();
        let chests = draws.iter().filter(|k| **k == ContainerKind::Chest).count();
        let trapped = draws.iter().filter(|k| k.is_trapped()).count();
        let ratio = chests as f64 / f64::from(n);
        assert!((0.67..0.73).contains(&ratio), "chest ratio {ratio}");
        assert!(trapped > 0 && trapped < n as usize / 10);
        for other in ContainerKind::OTHERS {
            assert!(draws.contains(&other), "{other} never drawn");
        }
    }

    #[test]
    fn loot_uses_distinct_slots_within_capacity() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..200 {
            for kind in [ContainerKind::Chest, ContainerKind::Furnace, ContainerKind::Hopper] {
                let loot = roll_loot(kind, &mut rng);
                assert!((2..=5).contains(&loot.len()));
                assert!(loot.len() <= usize::from(kind.slots()));
                let slots: BTreeSet<u8> = loot.iter().map(|l| l.slot).collect();
                assert_eq!(slots.len(), loot.len());
                assert!(slots.iter().all(|s| *s < kind.slots()));
            }
        }
    }

    #[test]
    fn amounts_follow_tables() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..300 {
            for item in roll_loot(ContainerKind::Barrel, &mut rng) {
                assert!((4..=11).contains(&item.amount));
            }
            for item in roll_loot(ContainerKind::Chest, &mut rng) {
                assert!((1..=8).contains(&item.amount));
            }
            for item in roll_loot(ContainerKind::Dispenser, &mut rng) {
                assert_eq!(item.amount, 1);
            }
        }
    }

    #[test]
    fn protective_gear_is_recognised() {
        assert!(is_protective("IRON_HELMET"));
        assert!(is_protective("NETHERITE_BOOTS"));
        assert!(is_protective("ELYTRA"));
        assert!(!is_protective("DIAMOND_SWORD"));
    }
}
