//! Shared types for the crucible game coordination service.
//!
//! Identifiers, the closed set of game-piece kinds, and the catalog
//! definition shapes. Everything here is plain data; behavior lives in the
//! catalog, store, and ledger crates.

pub mod defs;
pub mod ids;
pub mod kind;

pub use defs::{
    ActionDef, ExplorationDef, ExplorationSubtype, FactionDef, ObjectiveDef, ObjectiveTier,
    PlanetBiome, PlanetDef, StrategemDef, TechnologyDef,
};
pub use ids::ConnId;
pub use kind::{CardKind, KindSpec};
