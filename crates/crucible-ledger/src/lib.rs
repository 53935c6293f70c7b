//! The ownership ledger.
//!
//! Every operation here opens one write-exclusive transaction against the
//! game's store, validates inputs against the catalog, and either commits a
//! consistent change or rolls back entirely. Expected failures (`NotFound`,
//! `Conflict`, `Validation` shapes) come back as typed results; storage
//! failures abort the transaction and surface as [`LedgerError::Storage`].

pub mod exploration;
pub mod objectives;
pub mod ownership;
pub mod rows;
pub mod strategems;

use std::sync::Arc;

use thiserror::Error;

use crucible_catalog::Catalog;
use crucible_store::{GameDirectory, GameStore, StoreError};
use crucible_types::{CardKind, ObjectiveTier};

pub use rows::{
    Attachment, CardFace, ExploreOutcome, ObjectiveCard, ObjectiveGrant, ObjectiveRemoval,
    OwnedCard, PlayerSnapshot, PublicProgress, PublicSlot, RelicRestore, ScoreChange, ScoredBy,
    SlotRemoval, StrategemGoods,
};

/// Failure class, for mapping a [`LedgerError`] onto a wire reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    Storage,
}

/// Typed results of ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("no game named '{0}'")]
    GameNotFound(String),

    #[error("no {kind} definition for '{key}'")]
    DefinitionNotFound { kind: CardKind, key: String },

    #[error("player '{0}' is not in this game")]
    PlayerNotFound(String),

    #[error("{kind} '{key}' is not assigned to this player")]
    NotAssigned { kind: CardKind, key: String },

    #[error("{kind} '{key}' is already owned")]
    AlreadyOwned { kind: CardKind, key: String },

    #[error("planet '{0}' is not assigned to this player")]
    PlanetNotOwned(String),

    #[error("'{key}' is already attached to planet '{planet}'")]
    AlreadyAttached { planet: String, key: String },

    #[error("no attachment '{key}' on planet '{planet}'")]
    AttachmentMissing { planet: String, key: String },

    #[error("no {0} definitions left to draw")]
    ExhaustedPool(CardKind),

    #[error("no exploration cards remaining for planet '{0}'")]
    NoCandidates(String),

    #[error("objective '{0}' is already in play")]
    AlreadyInPlay(String),

    #[error("no free {0} objective slots")]
    TierFull(ObjectiveTier),

    #[error("objective '{0}' is not in play")]
    NotInPlay(String),

    #[error("{0}")]
    InvalidFragments(String),

    #[error("no relics remaining to restore")]
    NoRelicsLeft,

    #[error("{0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl LedgerError {
    /// Which of the four failure classes this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::GameNotFound(_)
            | LedgerError::DefinitionNotFound { .. }
            | LedgerError::PlayerNotFound(_)
            | LedgerError::NotAssigned { .. }
            | LedgerError::PlanetNotOwned(_)
            | LedgerError::AttachmentMissing { .. }
            | LedgerError::NotInPlay(_) => ErrorKind::NotFound,

            LedgerError::AlreadyOwned { .. }
            | LedgerError::AlreadyAttached { .. }
            | LedgerError::ExhaustedPool(_)
            | LedgerError::NoCandidates(_)
            | LedgerError::AlreadyInPlay(_)
            | LedgerError::TierFull(_)
            | LedgerError::NoRelicsLeft => ErrorKind::Conflict,

            LedgerError::InvalidFragments(_) | LedgerError::Validation(_) => ErrorKind::Validation,

            LedgerError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::GameMissing(name) => LedgerError::GameNotFound(name),
            StoreError::Sqlite(e) => LedgerError::Storage(e),
            other => LedgerError::Validation(other.to_string()),
        }
    }
}

/// Result alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Ownership ledger over the game directory and the catalog.
///
/// Cheap to clone-by-`Arc`; one instance serves every connection.
pub struct Ledger {
    games: Arc<GameDirectory>,
    catalog: Arc<Catalog>,
}

impl Ledger {
    pub fn new(games: Arc<GameDirectory>, catalog: Arc<Catalog>) -> Self {
        Self { games, catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Resolve a game name to its open store.
    pub(crate) fn store(&self, game: &str) -> Result<Arc<GameStore>> {
        Ok(self.games.open_game(game)?)
    }

    /// The game's roster, ordered by display name.
    pub fn list_players(&self, game: &str) -> Result<Vec<crucible_store::store::PlayerRow>> {
        let store = self.store(game)?;
        Ok(store.read(crucible_store::store::list_players)?)
    }

    /// Everything one player holds, assembled for a full client refresh.
    pub fn player_snapshot(&self, game: &str, player_id: &str) -> Result<PlayerSnapshot> {
        let store = self.store(game)?;
        let player = store.read(|conn| {
            crucible_store::store::list_players(conn)?
                .into_iter()
                .find(|p| p.player_id == player_id)
                .ok_or_else(|| LedgerError::PlayerNotFound(player_id.to_string()))
        })?;

        let mut attachments = Vec::new();
        let planets = self.list_owned(game, player_id, CardKind::Planet)?;
        for planet in &planets {
            attachments.extend(self.list_attachments(game, player_id, &planet.key)?);
        }

        Ok(PlayerSnapshot {
            player,
            actions: self.list_owned(game, player_id, CardKind::Action)?,
            technologies: self.list_owned(game, player_id, CardKind::Technology)?,
            planets,
            strategems: self.list_owned(game, player_id, CardKind::Strategem)?,
            explorations: self.list_owned(game, player_id, CardKind::Exploration)?,
            objectives: self.list_objectives(game, player_id)?,
            attachments,
        })
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Shared fixtures: a temp game directory with one game and a small
    //! hand-built catalog.

    use std::sync::Arc;

    use crucible_catalog::Catalog;
    use crucible_store::GameDirectory;
    use crucible_types::{
        ActionDef, ExplorationDef, ExplorationSubtype, ObjectiveDef, ObjectiveTier, PlanetBiome,
        PlanetDef, StrategemDef, TechnologyDef,
    };

    use super::Ledger;

    pub const GAME: &str = "Nexus";

    pub fn action(key: &str) -> ActionDef {
        ActionDef {
            key: key.into(),
            name: format!("Action {key}"),
            asset: format!("actions/{key}.png"),
        }
    }

    pub fn technology(key: &str) -> TechnologyDef {
        TechnologyDef {
            key: key.into(),
            name: format!("Tech {key}"),
            color: "blue".into(),
            asset: format!("tech/{key}.png"),
        }
    }

    pub fn planet(key: &str, biome: PlanetBiome) -> PlanetDef {
        PlanetDef {
            key: key.into(),
            name: format!("Planet {key}"),
            biome,
            tech_specialty: None,
            resources: 2,
            influence: 1,
            legendary: false,
            asset: format!("planets/{key}.png"),
        }
    }

    pub fn strategem(key: &str) -> StrategemDef {
        StrategemDef {
            key: key.into(),
            name: format!("Strategem {key}"),
            asset: format!("strategems/{key}.png"),
        }
    }

    pub fn exploration(key: &str, biome: PlanetBiome, subtype: ExplorationSubtype) -> ExplorationDef {
        ExplorationDef {
            key: key.into(),
            name: format!("Exploration {key}"),
            biome,
            subtype,
            asset: format!("exploration/{key}.png"),
        }
    }

    pub fn objective(key: &str, tier: ObjectiveTier, points: u32) -> ObjectiveDef {
        ObjectiveDef {
            key: key.into(),
            name: format!("Objective {key}"),
            tier,
            victory_points: points,
            asset: format!("objectives/{key}.png"),
        }
    }

    /// A ledger over a fresh temp directory holding one game with the given
    /// players, plus the ids assigned to them.
    pub fn ledger_with_game(
        catalog: Catalog,
        players: &[&str],
    ) -> (Ledger, Vec<String>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let games = Arc::new(GameDirectory::new(dir.path()));
        let roster: Vec<String> = players.iter().map(|p| p.to_string()).collect();
        games.create_game(GAME, &roster).unwrap();

        let store = games.open_game(GAME).unwrap();
        let ids = store
            .read(|conn| {
                crucible_store::store::list_players(conn)
                    .map(|rows| rows.into_iter().map(|r| r.player_id).collect::<Vec<_>>())
            })
            .unwrap();

        (Ledger::new(games, Arc::new(catalog)), ids, dir)
    }
}
