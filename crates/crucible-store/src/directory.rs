//! The game directory: on-disk layout and the cache of open stores.
//!
//! Game names map to `<root>/<sanitized>.sqlite3`. Opening a store is
//! cached, so every operation on one game shares the same writer lock and
//! two games never contend.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::store::{self, GameStore};
use crate::StoreError;

/// Owns the games directory and hands out shared store handles.
pub struct GameDirectory {
    root: PathBuf,
    open: DashMap<String, Arc<GameStore>>,
}

/// Listing entry for one game file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub name: String,
    pub created_at: i64,
    pub last_updated: i64,
    pub player_count: i64,
}

impl GameDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk path for a game name.
    pub fn db_path(&self, game_name: &str) -> Result<PathBuf, StoreError> {
        let safe = sanitize_name(game_name)?;
        Ok(self.root.join(format!("{safe}.sqlite3")))
    }

    /// Whether a backing store exists for the name.
    pub fn exists(&self, game_name: &str) -> bool {
        self.db_path(game_name).map(|p| p.exists()).unwrap_or(false)
    }

    /// Create a new game file with its roster.
    ///
    /// A half-created file is removed before the error is returned.
    pub fn create_game(
        &self,
        game_name: &str,
        player_names: &[String],
    ) -> Result<GameSummary, StoreError> {
        let path = self.db_path(game_name)?;
        if path.exists() {
            return Err(StoreError::GameExists(game_name.to_string()));
        }
        fs::create_dir_all(&self.root)?;

        let store = match GameStore::create(&path, game_name, player_names) {
            Ok(store) => store,
            Err(err) => {
                let _ = fs::remove_file(&path);
                return Err(err);
            }
        };

        let summary = summarize(&store, game_name)?;
        self.open
            .insert(game_name.to_string(), Arc::new(store));
        tracing::info!(game = game_name, players = player_names.len(), "created game");
        Ok(summary)
    }

    /// Open (or fetch the cached handle for) an existing game.
    pub fn open_game(&self, game_name: &str) -> Result<Arc<GameStore>, StoreError> {
        if let Some(store) = self.open.get(game_name) {
            return Ok(store.clone());
        }
        let path = self.db_path(game_name)?;
        if !path.exists() {
            return Err(StoreError::GameMissing(game_name.to_string()));
        }
        let store = Arc::new(GameStore::open(&path)?);
        self.open.insert(game_name.to_string(), store.clone());
        Ok(store)
    }

    /// List every game file with its metadata, newest-updated first.
    ///
    /// Unreadable files are skipped with a warning.
    pub fn list_games(&self) -> Vec<GameSummary> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(dir = %self.root.display(), %err, "games directory unreadable");
                return Vec::new();
            }
        };

        let mut games = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(stem) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".sqlite3"))
            else {
                continue;
            };

            match self.open_game(stem) {
                Ok(store) => match summarize(&store, stem) {
                    Ok(summary) => games.push(summary),
                    Err(err) => {
                        tracing::warn!(game = stem, %err, "skipping unreadable game file");
                    }
                },
                Err(err) => {
                    tracing::warn!(game = stem, %err, "skipping unreadable game file");
                }
            }
        }

        games.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        games
    }
}

fn summarize(store: &GameStore, fallback_name: &str) -> Result<GameSummary, StoreError> {
    store.read(|conn| {
        let meta = store::metadata(conn)?;
        let player_count = store::player_count(conn)?;
        let (name, created_at, last_updated) = match meta {
            Some(meta) => (meta.name, meta.created_at, meta.last_updated),
            None => (fallback_name.to_string(), 0, 0),
        };
        Ok(GameSummary {
            name,
            created_at,
            last_updated,
            player_count,
        })
    })
}

/// Keep alphanumerics, spaces, dashes, and underscores; reject anything
/// that sanitizes to nothing.
fn sanitize_name(game_name: &str) -> Result<String, StoreError> {
    let safe: String = game_name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let safe = safe.trim().to_string();
    if safe.is_empty() {
        return Err(StoreError::InvalidName(game_name.to_string()));
    }
    Ok(safe)
}
