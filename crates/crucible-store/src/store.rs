//! SQLite persistence for one game.
//!
//! A [`GameStore`] owns a single connection behind a `parking_lot` mutex.
//! Read-modify-write operations go through [`GameStore::with_txn`], which
//! holds the writer lock for the whole transaction and commits only on the
//! `Ok` path; the transaction guard rolls back on every other exit.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use serde::Serialize;
use uuid::Uuid;

use crate::StoreError;

const SCHEMA: &str = r#"
-- Roster, one row per player for the life of the game
CREATE TABLE IF NOT EXISTS players (
    id INTEGER PRIMARY KEY,
    playerId TEXT UNIQUE NOT NULL,
    name TEXT NOT NULL,
    faction TEXT,
    resources INTEGER NOT NULL DEFAULT 0,
    influence INTEGER NOT NULL DEFAULT 0,
    commodities INTEGER NOT NULL DEFAULT 0,
    tradeGoods INTEGER NOT NULL DEFAULT 0,
    victoryPoints INTEGER NOT NULL DEFAULT 0
);

-- Single-row game metadata
CREATE TABLE IF NOT EXISTS game_metadata (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    name TEXT NOT NULL,
    createdAt INTEGER DEFAULT (unixepoch()),
    lastUpdated INTEGER DEFAULT (unixepoch())
);

-- Ownership rows, one table per record kind
CREATE TABLE IF NOT EXISTS playerActions (
    id INTEGER PRIMARY KEY,
    playerId TEXT NOT NULL,
    actionKey TEXT NOT NULL,
    isExhausted INTEGER NOT NULL DEFAULT 0,
    acquiredAt INTEGER DEFAULT (unixepoch())
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_player_actions
    ON playerActions(playerId, actionKey);

CREATE TABLE IF NOT EXISTS playerTechnologies (
    id INTEGER PRIMARY KEY,
    playerId TEXT NOT NULL,
    technologyKey TEXT NOT NULL,
    isExhausted INTEGER NOT NULL DEFAULT 0,
    acquiredAt INTEGER DEFAULT (unixepoch())
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_player_technologies
    ON playerTechnologies(playerId, technologyKey);

CREATE TABLE IF NOT EXISTS playerPlanets (
    id INTEGER PRIMARY KEY,
    playerId TEXT NOT NULL,
    planetKey TEXT NOT NULL,
    isExhausted INTEGER NOT NULL DEFAULT 0,
    acquiredAt INTEGER DEFAULT (unixepoch())
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_player_planets
    ON playerPlanets(playerId, planetKey);

CREATE TABLE IF NOT EXISTS playerStrategems (
    id INTEGER PRIMARY KEY,
    playerId TEXT NOT NULL,
    strategemKey TEXT NOT NULL,
    isExhausted INTEGER NOT NULL DEFAULT 0,
    acquiredAt INTEGER DEFAULT (unixepoch())
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_player_strategems
    ON playerStrategems(playerId, strategemKey);

-- Trade goods pooled on a strategem, game-wide rather than per player
CREATE TABLE IF NOT EXISTS strategemTradeGoods (
    strategemKey TEXT PRIMARY KEY,
    tradeGoods INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS playerExplorationCards (
    id INTEGER PRIMARY KEY,
    playerId TEXT NOT NULL,
    explorationKey TEXT NOT NULL,
    isExhausted INTEGER NOT NULL DEFAULT 0,
    acquiredAt INTEGER DEFAULT (unixepoch())
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_player_exploration
    ON playerExplorationCards(playerId, explorationKey);

-- Objectives carry completion state instead of an exhausted flag
CREATE TABLE IF NOT EXISTS playerObjectives (
    id INTEGER PRIMARY KEY,
    playerId TEXT NOT NULL,
    objectiveKey TEXT NOT NULL,
    isCompleted INTEGER NOT NULL DEFAULT 0,
    acquiredAt INTEGER DEFAULT (unixepoch()),
    completedAt INTEGER
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_player_objectives
    ON playerObjectives(playerId, objectiveKey);

-- Exploration cards bound to a specific owned planet
CREATE TABLE IF NOT EXISTS planetAttachments (
    id INTEGER PRIMARY KEY,
    playerId TEXT NOT NULL,
    planetKey TEXT NOT NULL,
    explorationKey TEXT NOT NULL,
    attachedAt INTEGER DEFAULT (unixepoch())
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_planet_attachments
    ON planetAttachments(playerId, planetKey, explorationKey);

-- Shared objective slots, five per tier
CREATE TABLE IF NOT EXISTS publicObjectiveSlots (
    objectiveKey TEXT PRIMARY KEY,
    tier TEXT NOT NULL,
    slotIndex INTEGER NOT NULL,
    addedBy TEXT,
    addedAt INTEGER DEFAULT (unixepoch())
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_public_slots
    ON publicObjectiveSlots(tier, slotIndex);
"#;

/// Handle to one game's database.
pub struct GameStore {
    conn: Mutex<Connection>,
}

/// A row of the `players` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRow {
    pub player_id: String,
    pub name: String,
    pub faction: Option<String>,
    pub resources: i64,
    pub influence: i64,
    pub commodities: i64,
    pub trade_goods: i64,
    pub victory_points: i64,
}

/// The single `game_metadata` row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMetadata {
    pub name: String,
    pub created_at: i64,
    pub last_updated: i64,
}

impl GameStore {
    /// Open an existing game database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a new game database with its metadata row and player roster.
    ///
    /// Player ids are freshly minted UUIDs; counters start at zero.
    pub fn create<P: AsRef<Path>>(
        path: P,
        game_name: &str,
        player_names: &[String],
    ) -> Result<Self, StoreError> {
        if player_names.is_empty() {
            return Err(StoreError::NoPlayers);
        }
        if player_names.iter().any(|n| n.trim().is_empty()) {
            return Err(StoreError::UnnamedPlayer);
        }

        let store = Self::open(path)?;
        store.with_txn(|tx| {
            tx.execute(
                "INSERT INTO game_metadata (id, name) VALUES (1, ?1)",
                params![game_name],
            )?;
            for name in player_names {
                tx.execute(
                    "INSERT INTO players (playerId, name) VALUES (?1, ?2)",
                    params![Uuid::new_v4().to_string(), name.trim()],
                )?;
            }
            Ok::<_, StoreError>(())
        })?;
        Ok(store)
    }

    /// Run `f` inside a write-exclusive transaction.
    ///
    /// The store's writer lock is held for the whole call, so transactional
    /// operations on one game are linearizable. The transaction commits only
    /// when `f` returns `Ok`; an error (or a panic unwinding through the
    /// guard) rolls back, and the lock is released on every exit path.
    pub fn with_txn<T, E>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run `f` against the connection without opening a transaction.
    ///
    /// For plain lookups that need no atomicity beyond a single statement.
    pub fn read<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E> {
        let conn = self.conn.lock();
        f(&conn)
    }
}

// ============================================================================
// Row helpers shared by the ledger and the directory
// ============================================================================

/// List the player roster, ordered by display name.
pub fn list_players(conn: &Connection) -> rusqlite::Result<Vec<PlayerRow>> {
    let mut stmt = conn.prepare(
        "SELECT playerId, name, faction, resources, influence, commodities,
                tradeGoods, victoryPoints
         FROM players ORDER BY name",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(PlayerRow {
            player_id: row.get(0)?,
            name: row.get(1)?,
            faction: row.get(2)?,
            resources: row.get(3)?,
            influence: row.get(4)?,
            commodities: row.get(5)?,
            trade_goods: row.get(6)?,
            victory_points: row.get(7)?,
        })
    })?;
    rows.collect()
}

/// Every playerId in the roster.
pub fn player_ids(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT playerId FROM players")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}

pub fn player_count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0))
}

pub fn player_exists(conn: &Connection, player_id: &str) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM players WHERE playerId = ?1",
            params![player_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Read the metadata row, if the game has one.
pub fn metadata(conn: &Connection) -> rusqlite::Result<Option<GameMetadata>> {
    let mut stmt =
        conn.prepare("SELECT name, createdAt, lastUpdated FROM game_metadata WHERE id = 1")?;
    let mut rows = stmt.query([])?;
    if let Some(row) = rows.next()? {
        Ok(Some(GameMetadata {
            name: row.get(0)?,
            created_at: row.get(1)?,
            last_updated: row.get(2)?,
        }))
    } else {
        Ok(None)
    }
}

/// Bump the game's last-activity timestamp. Called by every mutating
/// ledger operation inside its transaction.
pub fn touch(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE game_metadata SET lastUpdated = unixepoch() WHERE id = 1",
        [],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_seeds_roster() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nexus.sqlite3");
        let store =
            GameStore::create(&path, "Nexus", &["Alice".to_string(), "Bob".to_string()]).unwrap();

        let players = store.read(list_players).unwrap();
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].name, "Alice");
        assert_eq!(players[0].victory_points, 0);
        assert_ne!(players[0].player_id, players[1].player_id);

        let meta = store.read(metadata).unwrap().unwrap();
        assert_eq!(meta.name, "Nexus");
        assert!(meta.created_at > 0);
    }

    #[test]
    fn test_create_rejects_empty_roster() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.sqlite3");
        assert!(matches!(
            GameStore::create(&path, "Empty", &[]),
            Err(StoreError::NoPlayers)
        ));
        assert!(matches!(
            GameStore::create(&path, "Empty", &["  ".to_string()]),
            Err(StoreError::UnnamedPlayer)
        ));
    }

    #[test]
    fn test_txn_commits_on_ok() {
        let store = GameStore::in_memory().unwrap();
        store
            .with_txn(|tx| {
                tx.execute(
                    "INSERT INTO players (playerId, name) VALUES ('p1', 'Alice')",
                    [],
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .unwrap();

        assert!(store.read(|c| player_exists(c, "p1")).unwrap());
    }

    #[test]
    fn test_txn_rolls_back_on_err() {
        let store = GameStore::in_memory().unwrap();
        let result: Result<(), StoreError> = store.with_txn(|tx| {
            tx.execute(
                "INSERT INTO players (playerId, name) VALUES ('p1', 'Alice')",
                [],
            )?;
            Err(StoreError::NoPlayers)
        });

        assert!(result.is_err());
        assert!(!store.read(|c| player_exists(c, "p1")).unwrap());
    }

    #[test]
    fn test_touch_moves_timestamp() {
        let store = GameStore::in_memory().unwrap();
        store
            .with_txn(|tx| {
                tx.execute(
                    "INSERT INTO game_metadata (id, name, createdAt, lastUpdated)
                     VALUES (1, 'Nexus', 100, 100)",
                    [],
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .unwrap();

        store.with_txn::<_, rusqlite::Error>(|tx| touch(tx)).unwrap();
        let meta = store.read(metadata).unwrap().unwrap();
        assert!(meta.last_updated > 100);
    }

    #[test]
    fn test_ownership_uniqueness() {
        let store = GameStore::in_memory().unwrap();
        store
            .with_txn(|tx| {
                tx.execute(
                    "INSERT INTO playerActions (playerId, actionKey) VALUES ('p1', 'sabotage')",
                    [],
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .unwrap();

        let dup: Result<(), rusqlite::Error> = store.with_txn(|tx| {
            tx.execute(
                "INSERT INTO playerActions (playerId, actionKey) VALUES ('p1', 'sabotage')",
                [],
            )?;
            Ok(())
        });
        assert!(dup.is_err());
    }
}
