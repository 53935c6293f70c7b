//! Objectives and victory-point accounting.
//!
//! Secret objectives live in one player's hand. Public objectives occupy a
//! shared five-slot track per tier: entering play inserts the slot row plus a
//! tracking row for every player, and leaving play reverses every completed
//! player's points before the slot disappears. All of it happens inside one
//! write-exclusive transaction per operation, so partial states never land.

use rand::seq::SliceRandom;
use rusqlite::{Connection, OptionalExtension, params};

use crucible_store::store;
use crucible_types::{CardKind, ObjectiveDef, ObjectiveTier};

use crate::ownership::require_player;
use crate::rows::{
    CardFace, ObjectiveCard, ObjectiveGrant, ObjectiveRemoval, PublicProgress, PublicSlot,
    ScoreChange, ScoredBy, SlotRemoval,
};
use crate::{Ledger, LedgerError, Result};

/// Slots per public tier.
pub const SLOTS_PER_TIER: i64 = 5;

impl Ledger {
    /// Every objective row the player holds, with completion state.
    ///
    /// Rows whose key has dropped out of the catalog are skipped.
    pub fn list_objectives(&self, game: &str, player_id: &str) -> Result<Vec<ObjectiveCard>> {
        let store = self.store(game)?;
        store.read(|conn| {
            require_player(conn, player_id)?;
            let mut stmt = conn.prepare(
                "SELECT objectiveKey, isCompleted, acquiredAt, completedAt
                 FROM playerObjectives WHERE playerId = ?1
                 ORDER BY acquiredAt DESC, id DESC",
            )?;
            let rows = stmt
                .query_map(params![player_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut cards = Vec::with_capacity(rows.len());
            for (key, completed, acquired_at, completed_at) in rows {
                match self.catalog().objective(&key) {
                    Some(def) => cards.push(objective_card(def, completed, acquired_at, completed_at)),
                    None => tracing::warn!(game, key, "objective row without catalog entry"),
                }
            }
            Ok(cards)
        })
    }

    /// Objectives the player could still take, optionally limited to a tier.
    ///
    /// Secret objectives are available unless this player holds them; public
    /// ones are available unless they are already in play.
    pub fn list_available_objectives(
        &self,
        game: &str,
        player_id: &str,
        tier: Option<ObjectiveTier>,
    ) -> Result<Vec<CardFace>> {
        let store = self.store(game)?;
        let (held, in_play) = store.read(|conn| {
            require_player(conn, player_id)?;
            let held = player_objective_keys(conn, player_id)?;
            let in_play = in_play_keys(conn)?;
            Ok::<_, LedgerError>((held, in_play))
        })?;

        let mut faces: Vec<CardFace> = self
            .catalog()
            .objectives()
            .filter(|def| tier.is_none_or(|t| def.tier == t))
            .filter(|def| {
                if def.tier.is_public() {
                    !in_play.iter().any(|k| k == &def.key)
                } else {
                    !held.iter().any(|k| k == &def.key)
                }
            })
            .map(|def| self.face_of(CardKind::Objective, &def.key))
            .collect();
        faces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(faces)
    }

    /// Take a specific objective.
    ///
    /// A secret objective lands in the requesting player's hand; a public one
    /// enters play for the whole game, claiming the lowest free slot of its
    /// tier and giving every player a tracking row.
    pub fn add_objective(&self, game: &str, player_id: &str, key: &str) -> Result<ObjectiveGrant> {
        let def = self.objective_def(key)?.clone();
        let store = self.store(game)?;

        store.with_txn(|tx| {
            require_player(tx, player_id)?;
            let grant = if def.tier.is_public() {
                let slot = assign_public_in_txn(tx, &def, player_id)?;
                ObjectiveGrant::Public { slot }
            } else {
                let card = grant_secret_in_txn(tx, &def, player_id)?;
                ObjectiveGrant::Secret { card }
            };
            store::touch(tx)?;
            tracing::debug!(game, player = player_id, key, tier = %def.tier, "objective granted");
            Ok(grant)
        })
    }

    /// Draw a random objective of a tier the player could still take.
    pub fn draw_objective(
        &self,
        game: &str,
        player_id: &str,
        tier: ObjectiveTier,
    ) -> Result<ObjectiveGrant> {
        let store = self.store(game)?;

        store.with_txn(|tx| {
            require_player(tx, player_id)?;
            let excluded = if tier.is_public() {
                in_play_keys(tx)?
            } else {
                player_objective_keys(tx, player_id)?
            };
            let eligible: Vec<&ObjectiveDef> = self
                .catalog()
                .objectives()
                .filter(|def| def.tier == tier)
                .filter(|def| !excluded.iter().any(|k| k == &def.key))
                .collect();

            let Some(def) = eligible.choose(&mut rand::thread_rng()) else {
                return Err(LedgerError::ExhaustedPool(CardKind::Objective));
            };

            let grant = if tier.is_public() {
                ObjectiveGrant::Public {
                    slot: assign_public_in_txn(tx, def, player_id)?,
                }
            } else {
                ObjectiveGrant::Secret {
                    card: grant_secret_in_txn(tx, def, player_id)?,
                }
            };
            store::touch(tx)?;
            tracing::debug!(game, player = player_id, key = def.key, %tier, "objective drawn");
            Ok(grant)
        })
    }

    /// Mark an objective complete or incomplete for one player, adjusting
    /// their victory points.
    ///
    /// Setting a flag to its current value is a no-op: points move exactly
    /// once per transition. Totals never drop below zero.
    pub fn set_completion(
        &self,
        game: &str,
        player_id: &str,
        key: &str,
        completed: bool,
    ) -> Result<ScoreChange> {
        let def = self.objective_def(key)?.clone();
        let store = self.store(game)?;

        store.with_txn(|tx| {
            require_player(tx, player_id)?;
            let current: Option<bool> = tx
                .query_row(
                    "SELECT isCompleted FROM playerObjectives
                     WHERE playerId = ?1 AND objectiveKey = ?2",
                    params![player_id, key],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(current) = current else {
                return Err(LedgerError::NotAssigned {
                    kind: CardKind::Objective,
                    key: key.to_string(),
                });
            };

            if current != completed {
                tx.execute(
                    "UPDATE playerObjectives
                     SET isCompleted = ?3,
                         completedAt = CASE WHEN ?3 THEN unixepoch() ELSE NULL END
                     WHERE playerId = ?1 AND objectiveKey = ?2",
                    params![player_id, key, completed],
                )?;
                let delta = if completed {
                    def.victory_points as i64
                } else {
                    -(def.victory_points as i64)
                };
                tx.execute(
                    "UPDATE players SET victoryPoints = MAX(0, victoryPoints + ?2)
                     WHERE playerId = ?1",
                    params![player_id, delta],
                )?;
                store::touch(tx)?;
                tracing::debug!(game, player = player_id, key, completed, "objective completion");
            }

            Ok(ScoreChange {
                player_id: player_id.to_string(),
                victory_points: victory_points(tx, player_id)?,
            })
        })
    }

    /// Drop an objective.
    ///
    /// A secret objective leaves one player's hand. A public objective leaves
    /// play for the whole game, reversing completions along the way.
    pub fn remove_objective(
        &self,
        game: &str,
        player_id: &str,
        key: &str,
    ) -> Result<ObjectiveRemoval> {
        let def = self.objective_def(key)?.clone();
        if def.tier.is_public() {
            let removal = self.remove_public(game, key)?;
            return Ok(ObjectiveRemoval::Game { removal });
        }

        let store = self.store(game)?;
        store.with_txn(|tx| {
            require_player(tx, player_id)?;
            let current: Option<bool> = tx
                .query_row(
                    "SELECT isCompleted FROM playerObjectives
                     WHERE playerId = ?1 AND objectiveKey = ?2",
                    params![player_id, key],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(was_completed) = current else {
                return Err(LedgerError::NotAssigned {
                    kind: CardKind::Objective,
                    key: key.to_string(),
                });
            };

            tx.execute(
                "DELETE FROM playerObjectives WHERE playerId = ?1 AND objectiveKey = ?2",
                params![player_id, key],
            )?;
            if was_completed {
                tx.execute(
                    "UPDATE players SET victoryPoints = MAX(0, victoryPoints - ?2)
                     WHERE playerId = ?1",
                    params![player_id, def.victory_points as i64],
                )?;
            }
            store::touch(tx)?;
            tracing::debug!(game, player = player_id, key, "secret objective dropped");
            Ok(ObjectiveRemoval::Player {
                key: key.to_string(),
            })
        })
    }

    /// Pull a public objective out of play for the whole game.
    pub fn remove_public(&self, game: &str, key: &str) -> Result<SlotRemoval> {
        let def = self.objective_def(key)?.clone();
        let store = self.store(game)?;

        store.with_txn(|tx| {
            let removal = remove_public_in_txn(tx, &def)?;
            store::touch(tx)?;
            tracing::debug!(game, key, reversed = removal.reversed.len(), "public objective removed");
            Ok(removal)
        })
    }

    /// Board view: every public objective in play, with who has scored it.
    pub fn list_public_progress(&self, game: &str) -> Result<Vec<PublicProgress>> {
        let store = self.store(game)?;
        store.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT objectiveKey, tier, slotIndex, addedBy
                 FROM publicObjectiveSlots ORDER BY tier, slotIndex",
            )?;
            let slots = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut board = Vec::with_capacity(slots.len());
            for (key, tier_str, slot_index, added_by) in slots {
                let Some(tier) = ObjectiveTier::from_str(&tier_str) else {
                    tracing::warn!(game, key, tier = tier_str, "slot row with unknown tier");
                    continue;
                };
                let Some(def) = self.catalog().objective(&key) else {
                    tracing::warn!(game, key, "slot row without catalog entry");
                    continue;
                };
                board.push(PublicProgress {
                    slot: PublicSlot {
                        key: key.clone(),
                        name: def.name.clone(),
                        tier,
                        slot_index,
                        added_by,
                    },
                    victory_points: def.victory_points,
                    scored_by: scored_by(conn, &key)?,
                });
            }
            Ok(board)
        })
    }

    fn objective_def(&self, key: &str) -> Result<&ObjectiveDef> {
        self.catalog()
            .objective(key)
            .ok_or_else(|| LedgerError::DefinitionNotFound {
                kind: CardKind::Objective,
                key: key.to_string(),
            })
    }
}

fn objective_card(
    def: &ObjectiveDef,
    completed: bool,
    acquired_at: i64,
    completed_at: Option<i64>,
) -> ObjectiveCard {
    ObjectiveCard {
        key: def.key.clone(),
        name: def.name.clone(),
        tier: def.tier,
        victory_points: def.victory_points,
        asset: def.asset.clone(),
        completed,
        acquired_at,
        completed_at,
    }
}

fn grant_secret_in_txn(
    tx: &Connection,
    def: &ObjectiveDef,
    player_id: &str,
) -> Result<ObjectiveCard> {
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO playerObjectives (playerId, objectiveKey) VALUES (?1, ?2)",
        params![player_id, def.key],
    )?;
    if inserted == 0 {
        return Err(LedgerError::AlreadyOwned {
            kind: CardKind::Objective,
            key: def.key.clone(),
        });
    }
    let acquired_at = tx.query_row(
        "SELECT acquiredAt FROM playerObjectives WHERE playerId = ?1 AND objectiveKey = ?2",
        params![player_id, def.key],
        |row| row.get(0),
    )?;
    Ok(objective_card(def, false, acquired_at, None))
}

/// Claim the lowest free slot of the objective's tier and give every player
/// a tracking row.
fn assign_public_in_txn(
    tx: &Connection,
    def: &ObjectiveDef,
    added_by: &str,
) -> Result<PublicSlot> {
    let in_play: Option<i64> = tx
        .query_row(
            "SELECT slotIndex FROM publicObjectiveSlots WHERE objectiveKey = ?1",
            params![def.key],
            |row| row.get(0),
        )
        .optional()?;
    if in_play.is_some() {
        return Err(LedgerError::AlreadyInPlay(def.key.clone()));
    }

    let mut stmt = tx.prepare(
        "SELECT slotIndex FROM publicObjectiveSlots WHERE tier = ?1 ORDER BY slotIndex",
    )?;
    let taken = stmt
        .query_map(params![def.tier.as_str()], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let Some(slot_index) = (0..SLOTS_PER_TIER).find(|i| !taken.contains(i)) else {
        return Err(LedgerError::TierFull(def.tier));
    };

    tx.execute(
        "INSERT INTO publicObjectiveSlots (objectiveKey, tier, slotIndex, addedBy)
         VALUES (?1, ?2, ?3, ?4)",
        params![def.key, def.tier.as_str(), slot_index, added_by],
    )?;
    for player in store::player_ids(tx)? {
        tx.execute(
            "INSERT OR IGNORE INTO playerObjectives (playerId, objectiveKey) VALUES (?1, ?2)",
            params![player, def.key],
        )?;
    }

    Ok(PublicSlot {
        key: def.key.clone(),
        name: def.name.clone(),
        tier: def.tier,
        slot_index,
        added_by: Some(added_by.to_string()),
    })
}

/// Reverse every completed player's points, then drop all tracking rows and
/// the slot itself.
fn remove_public_in_txn(tx: &Connection, def: &ObjectiveDef) -> Result<SlotRemoval> {
    let slot: Option<(String, i64)> = tx
        .query_row(
            "SELECT tier, slotIndex FROM publicObjectiveSlots WHERE objectiveKey = ?1",
            params![def.key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((tier_str, slot_index)) = slot else {
        return Err(LedgerError::NotInPlay(def.key.clone()));
    };
    let tier = ObjectiveTier::from_str(&tier_str).unwrap_or(def.tier);

    let mut stmt = tx.prepare(
        "SELECT playerId FROM playerObjectives
         WHERE objectiveKey = ?1 AND isCompleted = 1",
    )?;
    let completed = stmt
        .query_map(params![def.key], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut reversed = Vec::with_capacity(completed.len());
    for player in completed {
        tx.execute(
            "UPDATE players SET victoryPoints = MAX(0, victoryPoints - ?2)
             WHERE playerId = ?1",
            params![player, def.victory_points as i64],
        )?;
        reversed.push(ScoreChange {
            victory_points: victory_points(tx, &player)?,
            player_id: player,
        });
    }

    tx.execute(
        "DELETE FROM playerObjectives WHERE objectiveKey = ?1",
        params![def.key],
    )?;
    tx.execute(
        "DELETE FROM publicObjectiveSlots WHERE objectiveKey = ?1",
        params![def.key],
    )?;

    Ok(SlotRemoval {
        key: def.key.clone(),
        tier,
        slot_index,
        reversed,
    })
}

fn scored_by(conn: &Connection, key: &str) -> rusqlite::Result<Vec<ScoredBy>> {
    let mut stmt = conn.prepare(
        "SELECT p.playerId, p.name
         FROM playerObjectives o JOIN players p ON p.playerId = o.playerId
         WHERE o.objectiveKey = ?1 AND o.isCompleted = 1
         ORDER BY p.name",
    )?;
    let rows = stmt.query_map(params![key], |row| {
        Ok(ScoredBy {
            player_id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    rows.collect()
}

fn player_objective_keys(conn: &Connection, player_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT objectiveKey FROM playerObjectives WHERE playerId = ?1")?;
    let rows = stmt.query_map(params![player_id], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn in_play_keys(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT objectiveKey FROM publicObjectiveSlots")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn victory_points(conn: &Connection, player_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT victoryPoints FROM players WHERE playerId = ?1",
        params![player_id],
        |row| row.get(0),
    )
}
