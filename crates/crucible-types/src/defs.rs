//! Catalog definition shapes.
//!
//! One struct per record kind, mirroring the JSON data files the catalog
//! loads at startup. Definitions are immutable for the process lifetime;
//! ownership rows reference them by `key`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Planet biome, also the exploration deck a planet draws from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanetBiome {
    Cultural,
    Hazardous,
    Industrial,
    /// Deep-space biome. Frontier relic fragments are wild when restoring
    /// a relic.
    Frontier,
}

impl PlanetBiome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanetBiome::Cultural => "cultural",
            PlanetBiome::Hazardous => "hazardous",
            PlanetBiome::Industrial => "industrial",
            PlanetBiome::Frontier => "frontier",
        }
    }
}

impl fmt::Display for PlanetBiome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an exploration card does when drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorationSubtype {
    /// One-shot effect, nothing persisted.
    Action,
    /// Binds to a specific owned planet.
    Attach,
    /// Collectible; three fragments restore a relic.
    RelicFragment,
    /// Restored from fragments, never drawn by exploring.
    Relic,
}

/// Objective difficulty band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveTier {
    StageOne,
    StageTwo,
    Secret,
}

impl ObjectiveTier {
    /// Public objectives occupy shared slots; secret ones are per-player.
    pub fn is_public(&self) -> bool {
        !matches!(self, ObjectiveTier::Secret)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectiveTier::StageOne => "stage_one",
            ObjectiveTier::StageTwo => "stage_two",
            ObjectiveTier::Secret => "secret",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stage_one" => Some(ObjectiveTier::StageOne),
            "stage_two" => Some(ObjectiveTier::StageTwo),
            "secret" => Some(ObjectiveTier::Secret),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectiveTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action card definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDef {
    pub key: String,
    pub name: String,
    pub asset: String,
}

/// Technology definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TechnologyDef {
    pub key: String,
    pub name: String,
    pub color: String,
    pub asset: String,
}

/// Planet definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanetDef {
    pub key: String,
    pub name: String,
    pub biome: PlanetBiome,
    #[serde(default)]
    pub tech_specialty: Option<String>,
    pub resources: u32,
    pub influence: u32,
    #[serde(default)]
    pub legendary: bool,
    pub asset: String,
}

/// Strategem definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategemDef {
    pub key: String,
    pub name: String,
    pub asset: String,
}

/// Exploration card definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExplorationDef {
    pub key: String,
    pub name: String,
    pub biome: PlanetBiome,
    pub subtype: ExplorationSubtype,
    pub asset: String,
}

/// Objective definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveDef {
    pub key: String,
    pub name: String,
    pub tier: ObjectiveTier,
    pub victory_points: u32,
    pub asset: String,
}

/// Faction definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FactionDef {
    pub key: String,
    pub name: String,
    pub asset: String,
}
