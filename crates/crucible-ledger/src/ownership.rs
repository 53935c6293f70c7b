//! Card ownership: assign, release, exhaust, and draw.
//!
//! These operations cover the five exhaustible kinds. Objectives carry
//! completion state instead of an exhausted flag and have their own module;
//! passing `CardKind::Objective` here is a validation error.

use rand::seq::SliceRandom;
use rusqlite::{Connection, OptionalExtension, params};

use crucible_store::store;
use crucible_types::{CardKind, KindSpec};

use crate::rows::{CardFace, OwnedCard};
use crate::{Ledger, LedgerError, Result};

impl Ledger {
    /// Every card of `kind` the player currently holds, newest first.
    pub fn list_owned(&self, game: &str, player_id: &str, kind: CardKind) -> Result<Vec<OwnedCard>> {
        let spec = exhaustible(kind)?;
        let store = self.store(game)?;
        store.read(|conn| {
            require_player(conn, player_id)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {key}, isExhausted, acquiredAt FROM {table}
                 WHERE playerId = ?1 ORDER BY acquiredAt DESC, id DESC",
                key = spec.key_column,
                table = spec.table,
            ))?;
            let rows = stmt
                .query_map(params![player_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?, row.get::<_, i64>(2)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(rows
                .into_iter()
                .map(|(key, exhausted, acquired_at)| {
                    self.face_of(kind, &key).into_owned(exhausted, acquired_at)
                })
                .collect())
        })
    }

    /// Catalog entries of `kind` the player does not yet hold, sorted by name.
    pub fn list_available(
        &self,
        game: &str,
        player_id: &str,
        kind: CardKind,
    ) -> Result<Vec<CardFace>> {
        let spec = exhaustible(kind)?;
        let store = self.store(game)?;
        let owned = store.read(|conn| {
            require_player(conn, player_id)?;
            owned_keys(conn, spec, player_id).map_err(LedgerError::from)
        })?;

        let mut faces: Vec<CardFace> = self
            .catalog()
            .keys_of(kind)
            .into_iter()
            .filter(|key| !owned.iter().any(|o| o == key))
            .map(|key| self.face_of(kind, key))
            .collect();
        faces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(faces)
    }

    /// Assign a specific card to a player.
    pub fn add_card(
        &self,
        game: &str,
        player_id: &str,
        kind: CardKind,
        key: &str,
    ) -> Result<OwnedCard> {
        let spec = exhaustible(kind)?;
        self.require_def(kind, key)?;
        let store = self.store(game)?;

        store.with_txn(|tx| {
            require_player(tx, player_id)?;
            if is_owned(tx, spec, player_id, key)? {
                return Err(LedgerError::AlreadyOwned {
                    kind,
                    key: key.to_string(),
                });
            }
            tx.execute(
                &format!(
                    "INSERT INTO {table} (playerId, {col}) VALUES (?1, ?2)",
                    table = spec.table,
                    col = spec.key_column,
                ),
                params![player_id, key],
            )?;
            store::touch(tx)?;
            let acquired_at = acquired_at(tx, spec, player_id, key)?;
            tracing::debug!(game, player = player_id, %kind, key, "card assigned");
            Ok(self.face_of(kind, key).into_owned(false, acquired_at))
        })
    }

    /// Release a card from a player's hand.
    ///
    /// Releasing a planet also drops every exploration card attached to it.
    pub fn remove_card(
        &self,
        game: &str,
        player_id: &str,
        kind: CardKind,
        key: &str,
    ) -> Result<()> {
        let spec = exhaustible(kind)?;
        let store = self.store(game)?;

        store.with_txn(|tx| {
            require_player(tx, player_id)?;
            let removed = tx.execute(
                &format!(
                    "DELETE FROM {table} WHERE playerId = ?1 AND {col} = ?2",
                    table = spec.table,
                    col = spec.key_column,
                ),
                params![player_id, key],
            )?;
            if removed == 0 {
                return Err(LedgerError::NotAssigned {
                    kind,
                    key: key.to_string(),
                });
            }
            if kind == CardKind::Planet {
                tx.execute(
                    "DELETE FROM planetAttachments WHERE playerId = ?1 AND planetKey = ?2",
                    params![player_id, key],
                )?;
            }
            store::touch(tx)?;
            tracing::debug!(game, player = player_id, %kind, key, "card released");
            Ok(())
        })
    }

    /// Flip a card's exhausted flag.
    pub fn set_exhausted(
        &self,
        game: &str,
        player_id: &str,
        kind: CardKind,
        key: &str,
        exhausted: bool,
    ) -> Result<OwnedCard> {
        let spec = exhaustible(kind)?;
        let store = self.store(game)?;

        store.with_txn(|tx| {
            require_player(tx, player_id)?;
            let updated = tx.execute(
                &format!(
                    "UPDATE {table} SET isExhausted = ?3 WHERE playerId = ?1 AND {col} = ?2",
                    table = spec.table,
                    col = spec.key_column,
                ),
                params![player_id, key, exhausted],
            )?;
            if updated == 0 {
                return Err(LedgerError::NotAssigned {
                    kind,
                    key: key.to_string(),
                });
            }
            store::touch(tx)?;
            let acquired_at = acquired_at(tx, spec, player_id, key)?;
            Ok(self.face_of(kind, key).into_owned(exhausted, acquired_at))
        })
    }

    /// Draw uniformly from the catalog entries the player does not yet hold.
    ///
    /// Relics never enter the draw pool; they only exist through restoration.
    pub fn draw_random(&self, game: &str, player_id: &str, kind: CardKind) -> Result<OwnedCard> {
        let spec = exhaustible(kind)?;
        let store = self.store(game)?;

        store.with_txn(|tx| {
            require_player(tx, player_id)?;
            let owned = owned_keys(tx, spec, player_id)?;
            let eligible: Vec<String> = self
                .catalog()
                .keys_of(kind)
                .into_iter()
                .filter(|key| !owned.iter().any(|o| o == key))
                .filter(|key| {
                    kind != CardKind::Exploration
                        || self
                            .catalog()
                            .exploration(key)
                            .is_some_and(|d| d.subtype != crucible_types::ExplorationSubtype::Relic)
                })
                .map(String::from)
                .collect();

            let Some(key) = eligible.choose(&mut rand::thread_rng()) else {
                return Err(LedgerError::ExhaustedPool(kind));
            };

            tx.execute(
                &format!(
                    "INSERT INTO {table} (playerId, {col}) VALUES (?1, ?2)",
                    table = spec.table,
                    col = spec.key_column,
                ),
                params![player_id, key],
            )?;
            store::touch(tx)?;
            let acquired_at = acquired_at(tx, spec, player_id, key)?;
            tracing::debug!(game, player = player_id, %kind, key, "card drawn");
            Ok(self.face_of(kind, key).into_owned(false, acquired_at))
        })
    }

    /// Definition lookup with a typed miss.
    pub(crate) fn require_def(&self, kind: CardKind, key: &str) -> Result<()> {
        if self.catalog().contains(kind, key) {
            Ok(())
        } else {
            Err(LedgerError::DefinitionNotFound {
                kind,
                key: key.to_string(),
            })
        }
    }

    /// Display fields for a key, falling back to the bare key when the
    /// catalog has no entry (stale rows survive catalog edits).
    pub(crate) fn face_of(&self, kind: CardKind, key: &str) -> CardFace {
        CardFace {
            kind,
            key: key.to_string(),
            name: self
                .catalog()
                .display_name(kind, key)
                .unwrap_or(key)
                .to_string(),
            asset: self.catalog().asset(kind, key).unwrap_or_default().to_string(),
        }
    }
}

impl CardFace {
    pub(crate) fn into_owned(self, exhausted: bool, acquired_at: i64) -> OwnedCard {
        OwnedCard {
            kind: self.kind,
            key: self.key,
            name: self.name,
            asset: self.asset,
            exhausted,
            acquired_at,
        }
    }
}

fn exhaustible(kind: CardKind) -> Result<KindSpec> {
    if kind == CardKind::Objective {
        return Err(LedgerError::Validation(
            "objectives are managed through the objective operations".into(),
        ));
    }
    Ok(kind.spec())
}

pub(crate) fn require_player(conn: &Connection, player_id: &str) -> Result<()> {
    if store::player_exists(conn, player_id)? {
        Ok(())
    } else {
        Err(LedgerError::PlayerNotFound(player_id.to_string()))
    }
}

pub(crate) fn owned_keys(
    conn: &Connection,
    spec: KindSpec,
    player_id: &str,
) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {col} FROM {table} WHERE playerId = ?1",
        col = spec.key_column,
        table = spec.table,
    ))?;
    let rows = stmt.query_map(params![player_id], |row| row.get(0))?;
    rows.collect()
}

pub(crate) fn is_owned(
    conn: &Connection,
    spec: KindSpec,
    player_id: &str,
    key: &str,
) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            &format!(
                "SELECT 1 FROM {table} WHERE playerId = ?1 AND {col} = ?2",
                table = spec.table,
                col = spec.key_column,
            ),
            params![player_id, key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn acquired_at(conn: &Connection, spec: KindSpec, player_id: &str, key: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        &format!(
            "SELECT acquiredAt FROM {table} WHERE playerId = ?1 AND {col} = ?2",
            table = spec.table,
            col = spec.key_column,
        ),
        params![player_id, key],
        |row| row.get(0),
    )
}

#[cfg(test)]
mod tests {
    use crucible_catalog::Catalog;
    use crucible_types::{CardKind, ExplorationSubtype, PlanetBiome};

    use crate::testutil::{self, GAME};
    use crate::{ErrorKind, LedgerError};

    fn small_catalog() -> Catalog {
        let mut catalog = Catalog::empty();
        catalog.insert_action(testutil::action("sabotage"));
        catalog.insert_action(testutil::action("uprising"));
        catalog.insert_technology(testutil::technology("gravity-drive"));
        catalog.insert_planet(testutil::planet("veldyr", PlanetBiome::Cultural));
        catalog.insert_exploration(testutil::exploration(
            "ion-storm",
            PlanetBiome::Cultural,
            ExplorationSubtype::Attach,
        ));
        catalog
    }

    #[test]
    fn test_add_and_list() {
        let (ledger, ids, _dir) = testutil::ledger_with_game(small_catalog(), &["Alice", "Bob"]);

        let card = ledger
            .add_card(GAME, &ids[0], CardKind::Action, "sabotage")
            .unwrap();
        assert_eq!(card.key, "sabotage");
        assert_eq!(card.name, "Action sabotage");
        assert!(!card.exhausted);

        let owned = ledger.list_owned(GAME, &ids[0], CardKind::Action).unwrap();
        assert_eq!(owned.len(), 1);
        // The other player's hand is untouched.
        assert!(ledger.list_owned(GAME, &ids[1], CardKind::Action).unwrap().is_empty());
    }

    #[test]
    fn test_available_shrinks_as_cards_are_taken() {
        let (ledger, ids, _dir) = testutil::ledger_with_game(small_catalog(), &["Alice"]);

        assert_eq!(ledger.list_available(GAME, &ids[0], CardKind::Action).unwrap().len(), 2);
        ledger.add_card(GAME, &ids[0], CardKind::Action, "sabotage").unwrap();
        let avail = ledger.list_available(GAME, &ids[0], CardKind::Action).unwrap();
        assert_eq!(avail.len(), 1);
        assert_eq!(avail[0].key, "uprising");
    }

    #[test]
    fn test_add_duplicate_is_conflict() {
        let (ledger, ids, _dir) = testutil::ledger_with_game(small_catalog(), &["Alice"]);
        ledger.add_card(GAME, &ids[0], CardKind::Action, "sabotage").unwrap();

        let err = ledger
            .add_card(GAME, &ids[0], CardKind::Action, "sabotage")
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyOwned { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_unknown_definition_and_player() {
        let (ledger, ids, _dir) = testutil::ledger_with_game(small_catalog(), &["Alice"]);

        assert!(matches!(
            ledger.add_card(GAME, &ids[0], CardKind::Action, "ghost"),
            Err(LedgerError::DefinitionNotFound { .. })
        ));
        assert!(matches!(
            ledger.add_card(GAME, "nobody", CardKind::Action, "sabotage"),
            Err(LedgerError::PlayerNotFound(_))
        ));
        assert!(matches!(
            ledger.add_card("Ghost Game", &ids[0], CardKind::Action, "sabotage"),
            Err(LedgerError::GameNotFound(_))
        ));
    }

    #[test]
    fn test_remove_missing_card() {
        let (ledger, ids, _dir) = testutil::ledger_with_game(small_catalog(), &["Alice"]);
        let err = ledger
            .remove_card(GAME, &ids[0], CardKind::Action, "sabotage")
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotAssigned { .. }));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_exhaust_and_ready() {
        let (ledger, ids, _dir) = testutil::ledger_with_game(small_catalog(), &["Alice"]);
        ledger.add_card(GAME, &ids[0], CardKind::Technology, "gravity-drive").unwrap();

        let card = ledger
            .set_exhausted(GAME, &ids[0], CardKind::Technology, "gravity-drive", true)
            .unwrap();
        assert!(card.exhausted);

        let card = ledger
            .set_exhausted(GAME, &ids[0], CardKind::Technology, "gravity-drive", false)
            .unwrap();
        assert!(!card.exhausted);
    }

    #[test]
    fn test_objectives_rejected_here() {
        let (ledger, ids, _dir) = testutil::ledger_with_game(small_catalog(), &["Alice"]);
        let err = ledger
            .set_exhausted(GAME, &ids[0], CardKind::Objective, "anything", true)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_planet_removal_drops_attachments() {
        let (ledger, ids, _dir) = testutil::ledger_with_game(small_catalog(), &["Alice"]);
        ledger.add_card(GAME, &ids[0], CardKind::Planet, "veldyr").unwrap();
        ledger.attach(GAME, &ids[0], "veldyr", "ion-storm").unwrap();

        ledger.remove_card(GAME, &ids[0], CardKind::Planet, "veldyr").unwrap();
        assert!(ledger.list_attachments(GAME, &ids[0], "veldyr").unwrap().is_empty());
    }

    #[test]
    fn test_draw_lands_on_sole_candidate() {
        let (ledger, ids, _dir) = testutil::ledger_with_game(small_catalog(), &["Alice"]);
        ledger.add_card(GAME, &ids[0], CardKind::Action, "sabotage").unwrap();

        // Only "uprising" is left, so the uniform draw must produce it.
        let card = ledger.draw_random(GAME, &ids[0], CardKind::Action).unwrap();
        assert_eq!(card.key, "uprising");

        let err = ledger.draw_random(GAME, &ids[0], CardKind::Action).unwrap_err();
        assert!(matches!(err, LedgerError::ExhaustedPool(CardKind::Action)));
    }

    #[test]
    fn test_draw_never_yields_relics() {
        let mut catalog = Catalog::empty();
        catalog.insert_exploration(testutil::exploration(
            "shard-of-dawn",
            PlanetBiome::Frontier,
            ExplorationSubtype::Relic,
        ));
        let (ledger, ids, _dir) = testutil::ledger_with_game(catalog, &["Alice"]);

        let err = ledger
            .draw_random(GAME, &ids[0], CardKind::Exploration)
            .unwrap_err();
        assert!(matches!(err, LedgerError::ExhaustedPool(CardKind::Exploration)));
    }
}
