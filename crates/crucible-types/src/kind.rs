//! The closed set of game-piece kinds.
//!
//! Every ownership operation is dispatched through `CardKind`: the enum
//! carries the per-kind table spec (ownership table and key column) so the
//! ledger never builds SQL from caller-supplied strings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of catalog-backed game piece a player can own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    Action,
    Technology,
    Planet,
    Strategem,
    Exploration,
    Objective,
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Table spec for one kind's ownership rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KindSpec {
    /// Ownership table name.
    pub table: &'static str,
    /// Column holding the catalog key.
    pub key_column: &'static str,
}

impl CardKind {
    /// All kinds, in catalog order.
    pub const ALL: [CardKind; 6] = [
        CardKind::Action,
        CardKind::Technology,
        CardKind::Planet,
        CardKind::Strategem,
        CardKind::Exploration,
        CardKind::Objective,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardKind::Action => "action",
            CardKind::Technology => "technology",
            CardKind::Planet => "planet",
            CardKind::Strategem => "strategem",
            CardKind::Exploration => "exploration",
            CardKind::Objective => "objective",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "action" => Some(CardKind::Action),
            "technology" => Some(CardKind::Technology),
            "planet" => Some(CardKind::Planet),
            "strategem" => Some(CardKind::Strategem),
            "exploration" => Some(CardKind::Exploration),
            "objective" => Some(CardKind::Objective),
            _ => None,
        }
    }

    /// Ownership table and key column for this kind.
    pub const fn spec(&self) -> KindSpec {
        match self {
            CardKind::Action => KindSpec {
                table: "playerActions",
                key_column: "actionKey",
            },
            CardKind::Technology => KindSpec {
                table: "playerTechnologies",
                key_column: "technologyKey",
            },
            CardKind::Planet => KindSpec {
                table: "playerPlanets",
                key_column: "planetKey",
            },
            CardKind::Strategem => KindSpec {
                table: "playerStrategems",
                key_column: "strategemKey",
            },
            CardKind::Exploration => KindSpec {
                table: "playerExplorationCards",
                key_column: "explorationKey",
            },
            CardKind::Objective => KindSpec {
                table: "playerObjectives",
                key_column: "objectiveKey",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_str_roundtrip() {
        for kind in CardKind::ALL {
            assert_eq!(CardKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(CardKind::from_str("bogus"), None);
    }

    #[test]
    fn test_specs_are_distinct() {
        let tables: Vec<_> = CardKind::ALL.iter().map(|k| k.spec().table).collect();
        for (i, t) in tables.iter().enumerate() {
            assert!(!tables[i + 1..].contains(t), "duplicate table {t}");
        }
    }

    #[test]
    fn test_serde_tag() {
        let json = serde_json::to_string(&CardKind::Exploration).unwrap();
        assert_eq!(json, "\"exploration\"");
    }
}
