//! Per-game durable storage.
//!
//! One SQLite database per game holds the player roster and every ownership
//! row. [`GameStore`] wraps a single connection behind a writer lock and
//! exposes [`GameStore::with_txn`], the only way mutating code touches the
//! database. [`GameDirectory`] owns the on-disk layout and the cache of open
//! stores.

pub mod directory;
pub mod store;

use thiserror::Error;

pub use directory::{GameDirectory, GameSummary};
pub use store::{GameMetadata, GameStore, PlayerRow};

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("game '{0}' already exists")]
    GameExists(String),

    #[error("no game named '{0}'")]
    GameMissing(String),

    #[error("invalid game name '{0}'")]
    InvalidName(String),

    #[error("at least one player is required")]
    NoPlayers,

    #[error("every player must have a name")]
    UnnamedPlayer,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
