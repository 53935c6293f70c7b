//! Planet exploration, attachments, and relic restoration.
//!
//! Exploring draws uniformly from the planet's biome deck, minus anything the
//! player already holds or has attached. What happens next depends on the
//! drawn card's subtype: attach cards bind to the explored planet, relic
//! fragments land in the player's hand, and action cards resolve without
//! persisting anything. Three matching fragments trade for a relic in a
//! single transaction; frontier fragments match any biome.

use rand::seq::SliceRandom;
use rusqlite::{Connection, OptionalExtension, params};

use crucible_store::store;
use crucible_types::{CardKind, ExplorationDef, ExplorationSubtype, PlanetBiome};

use crate::ownership::{is_owned, owned_keys, require_player};
use crate::rows::{Attachment, ExploreOutcome, RelicRestore};
use crate::{Ledger, LedgerError, Result};

/// Fragments consumed per relic restoration.
pub const FRAGMENTS_PER_RELIC: usize = 3;

impl Ledger {
    /// Bind an attachable exploration card to one of the player's planets.
    pub fn attach(
        &self,
        game: &str,
        player_id: &str,
        planet_key: &str,
        exploration_key: &str,
    ) -> Result<Attachment> {
        self.require_def(CardKind::Planet, planet_key)?;
        let def = self.exploration_def(exploration_key)?;
        if def.subtype != ExplorationSubtype::Attach {
            return Err(LedgerError::Validation(format!(
                "exploration card '{exploration_key}' does not attach to planets"
            )));
        }
        let store = self.store(game)?;

        store.with_txn(|tx| {
            require_player(tx, player_id)?;
            require_planet_owned(tx, player_id, planet_key)?;
            if attachment_exists(tx, player_id, planet_key, exploration_key)? {
                return Err(LedgerError::AlreadyAttached {
                    planet: planet_key.to_string(),
                    key: exploration_key.to_string(),
                });
            }
            tx.execute(
                "INSERT INTO planetAttachments (playerId, planetKey, explorationKey)
                 VALUES (?1, ?2, ?3)",
                params![player_id, planet_key, exploration_key],
            )?;
            store::touch(tx)?;
            tracing::debug!(game, player = player_id, planet = planet_key, card = exploration_key, "attached");
            self.attachment_row(tx, player_id, planet_key, exploration_key)
        })
    }

    /// Remove an attachment from a planet.
    pub fn detach(
        &self,
        game: &str,
        player_id: &str,
        planet_key: &str,
        exploration_key: &str,
    ) -> Result<()> {
        let store = self.store(game)?;
        store.with_txn(|tx| {
            require_player(tx, player_id)?;
            let removed = tx.execute(
                "DELETE FROM planetAttachments
                 WHERE playerId = ?1 AND planetKey = ?2 AND explorationKey = ?3",
                params![player_id, planet_key, exploration_key],
            )?;
            if removed == 0 {
                return Err(LedgerError::AttachmentMissing {
                    planet: planet_key.to_string(),
                    key: exploration_key.to_string(),
                });
            }
            store::touch(tx)?;
            Ok(())
        })
    }

    /// Every attachment on one of the player's planets, oldest first.
    pub fn list_attachments(
        &self,
        game: &str,
        player_id: &str,
        planet_key: &str,
    ) -> Result<Vec<Attachment>> {
        let store = self.store(game)?;
        store.read(|conn| {
            require_player(conn, player_id)?;
            let mut stmt = conn.prepare(
                "SELECT explorationKey, attachedAt FROM planetAttachments
                 WHERE playerId = ?1 AND planetKey = ?2 ORDER BY attachedAt, id",
            )?;
            let rows = stmt
                .query_map(params![player_id, planet_key], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(rows
                .into_iter()
                .map(|(key, attached_at)| {
                    let face = self.face_of(CardKind::Exploration, &key);
                    Attachment {
                        planet_key: planet_key.to_string(),
                        exploration_key: key,
                        name: face.name,
                        asset: face.asset,
                        attached_at,
                    }
                })
                .collect())
        })
    }

    /// Explore one of the player's planets, drawing from its biome deck.
    pub fn explore_planet(
        &self,
        game: &str,
        player_id: &str,
        planet_key: &str,
    ) -> Result<ExploreOutcome> {
        let planet = self
            .catalog()
            .planet(planet_key)
            .ok_or_else(|| LedgerError::DefinitionNotFound {
                kind: CardKind::Planet,
                key: planet_key.to_string(),
            })?
            .clone();
        let store = self.store(game)?;

        store.with_txn(|tx| {
            require_player(tx, player_id)?;
            require_planet_owned(tx, player_id, planet_key)?;

            let held = owned_keys(tx, CardKind::Exploration.spec(), player_id)?;
            let attached = attached_keys(tx, player_id)?;
            let deck: Vec<&ExplorationDef> = self
                .catalog()
                .explorations()
                .filter(|d| d.biome == planet.biome)
                .filter(|d| d.subtype != ExplorationSubtype::Relic)
                .filter(|d| !held.iter().any(|k| k == &d.key))
                .filter(|d| !attached.iter().any(|k| k == &d.key))
                .collect();

            let Some(card) = deck.choose(&mut rand::thread_rng()) else {
                return Err(LedgerError::NoCandidates(planet_key.to_string()));
            };
            tracing::debug!(
                game,
                player = player_id,
                planet = planet_key,
                card = card.key,
                subtype = ?card.subtype,
                "explored"
            );

            let outcome = match card.subtype {
                ExplorationSubtype::Attach => {
                    tx.execute(
                        "INSERT INTO planetAttachments (playerId, planetKey, explorationKey)
                         VALUES (?1, ?2, ?3)",
                        params![player_id, planet_key, card.key],
                    )?;
                    ExploreOutcome::Attached {
                        attachment: self.attachment_row(tx, player_id, planet_key, &card.key)?,
                    }
                }
                ExplorationSubtype::RelicFragment => {
                    let spec = CardKind::Exploration.spec();
                    tx.execute(
                        &format!(
                            "INSERT INTO {table} (playerId, {col}) VALUES (?1, ?2)",
                            table = spec.table,
                            col = spec.key_column,
                        ),
                        params![player_id, card.key],
                    )?;
                    let acquired_at: i64 = tx.query_row(
                        "SELECT acquiredAt FROM playerExplorationCards
                         WHERE playerId = ?1 AND explorationKey = ?2",
                        params![player_id, card.key],
                        |row| row.get(0),
                    )?;
                    ExploreOutcome::FragmentGained {
                        card: self
                            .face_of(CardKind::Exploration, &card.key)
                            .into_owned(false, acquired_at),
                    }
                }
                // Relics never enter the deck; anything else resolves on the
                // spot.
                _ => ExploreOutcome::Resolved {
                    card: self.face_of(CardKind::Exploration, &card.key),
                },
            };

            store::touch(tx)?;
            Ok(outcome)
        })
    }

    /// Trade three relic fragments for a relic.
    ///
    /// Fragments must be distinct, held by the player, and share a biome;
    /// frontier fragments are wild. The exchange is atomic: if any fragment
    /// cannot be consumed or no relic remains, nothing changes.
    pub fn restore_relic(
        &self,
        game: &str,
        player_id: &str,
        fragments: &[String],
    ) -> Result<RelicRestore> {
        if fragments.len() != FRAGMENTS_PER_RELIC {
            return Err(LedgerError::InvalidFragments(format!(
                "relic restoration takes exactly {FRAGMENTS_PER_RELIC} fragments, got {}",
                fragments.len()
            )));
        }
        for (i, key) in fragments.iter().enumerate() {
            if fragments[..i].contains(key) {
                return Err(LedgerError::InvalidFragments(format!(
                    "fragment '{key}' listed more than once"
                )));
            }
        }

        let mut anchor: Option<PlanetBiome> = None;
        for key in fragments {
            let def = self.exploration_def(key)?;
            if def.subtype != ExplorationSubtype::RelicFragment {
                return Err(LedgerError::InvalidFragments(format!(
                    "'{key}' is not a relic fragment"
                )));
            }
            if def.biome == PlanetBiome::Frontier {
                continue;
            }
            match anchor {
                None => anchor = Some(def.biome),
                Some(biome) if biome == def.biome => {}
                Some(biome) => {
                    return Err(LedgerError::InvalidFragments(format!(
                        "fragment biomes do not match: {biome} vs {}",
                        def.biome
                    )));
                }
            }
        }

        let store = self.store(game)?;
        store.with_txn(|tx| {
            require_player(tx, player_id)?;

            for key in fragments {
                let removed = tx.execute(
                    "DELETE FROM playerExplorationCards
                     WHERE playerId = ?1 AND explorationKey = ?2",
                    params![player_id, key],
                )?;
                // A fragment can vanish between validation and here if a
                // concurrent operation consumed it; that makes the submitted
                // set invalid, same as any other bad fragment list.
                if removed != 1 {
                    return Err(LedgerError::InvalidFragments(format!(
                        "fragment '{key}' is not held by this player"
                    )));
                }
            }

            // Relics are unique per game, regardless of who holds them.
            let claimed = claimed_relic_keys(tx)?;
            let pool: Vec<&ExplorationDef> = self
                .catalog()
                .explorations_of(ExplorationSubtype::Relic)
                .filter(|d| !claimed.iter().any(|k| k == &d.key))
                .collect();
            let Some(relic) = pool.choose(&mut rand::thread_rng()) else {
                return Err(LedgerError::NoRelicsLeft);
            };

            tx.execute(
                "INSERT INTO playerExplorationCards (playerId, explorationKey) VALUES (?1, ?2)",
                params![player_id, relic.key],
            )?;
            let acquired_at: i64 = tx.query_row(
                "SELECT acquiredAt FROM playerExplorationCards
                 WHERE playerId = ?1 AND explorationKey = ?2",
                params![player_id, relic.key],
                |row| row.get(0),
            )?;
            store::touch(tx)?;
            tracing::info!(game, player = player_id, relic = relic.key, "relic restored");

            Ok(RelicRestore {
                relic: self
                    .face_of(CardKind::Exploration, &relic.key)
                    .into_owned(false, acquired_at),
                consumed: fragments.to_vec(),
            })
        })
    }

    fn exploration_def(&self, key: &str) -> Result<&ExplorationDef> {
        self.catalog()
            .exploration(key)
            .ok_or_else(|| LedgerError::DefinitionNotFound {
                kind: CardKind::Exploration,
                key: key.to_string(),
            })
    }

    fn attachment_row(
        &self,
        conn: &Connection,
        player_id: &str,
        planet_key: &str,
        exploration_key: &str,
    ) -> Result<Attachment> {
        let attached_at: i64 = conn.query_row(
            "SELECT attachedAt FROM planetAttachments
             WHERE playerId = ?1 AND planetKey = ?2 AND explorationKey = ?3",
            params![player_id, planet_key, exploration_key],
            |row| row.get(0),
        )?;
        let face = self.face_of(CardKind::Exploration, exploration_key);
        Ok(Attachment {
            planet_key: planet_key.to_string(),
            exploration_key: exploration_key.to_string(),
            name: face.name,
            asset: face.asset,
            attached_at,
        })
    }
}

fn require_planet_owned(conn: &Connection, player_id: &str, planet_key: &str) -> Result<()> {
    if is_owned(conn, CardKind::Planet.spec(), player_id, planet_key)? {
        Ok(())
    } else {
        Err(LedgerError::PlanetNotOwned(planet_key.to_string()))
    }
}

fn attachment_exists(
    conn: &Connection,
    player_id: &str,
    planet_key: &str,
    exploration_key: &str,
) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM planetAttachments
             WHERE playerId = ?1 AND planetKey = ?2 AND explorationKey = ?3",
            params![player_id, planet_key, exploration_key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Exploration cards this player holds as attachments, on any planet.
fn attached_keys(conn: &Connection, player_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT explorationKey FROM planetAttachments WHERE playerId = ?1")?;
    let rows = stmt.query_map(params![player_id], |row| row.get(0))?;
    rows.collect()
}

/// Exploration cards held by anyone, for relic uniqueness.
fn claimed_relic_keys(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT explorationKey FROM playerExplorationCards")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}
