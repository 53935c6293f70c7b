//! Strategem trade goods.
//!
//! Trade goods accumulate on a strategem for the whole game rather than in
//! any player's hand; whoever claims the strategem later collects the pool.
//! Counts never go below zero; a set below zero clamps instead of failing.

use rusqlite::{Connection, OptionalExtension, params};

use crucible_store::store;
use crucible_types::CardKind;

use crate::rows::StrategemGoods;
use crate::{Ledger, Result};

impl Ledger {
    /// Set the trade goods pooled on a strategem.
    pub fn set_trade_goods(
        &self,
        game: &str,
        strategem_key: &str,
        trade_goods: i64,
    ) -> Result<StrategemGoods> {
        self.require_def(CardKind::Strategem, strategem_key)?;
        let goods = trade_goods.max(0);
        let store = self.store(game)?;

        store.with_txn(|tx| {
            tx.execute(
                "INSERT INTO strategemTradeGoods (strategemKey, tradeGoods) VALUES (?1, ?2)
                 ON CONFLICT(strategemKey) DO UPDATE SET tradeGoods = excluded.tradeGoods",
                params![strategem_key, goods],
            )?;
            store::touch(tx)?;
            tracing::debug!(game, strategem = strategem_key, goods, "trade goods set");
            Ok(StrategemGoods {
                strategem_key: strategem_key.to_string(),
                name: self.face_of(CardKind::Strategem, strategem_key).name,
                trade_goods: goods,
            })
        })
    }

    /// Trade goods for every strategem in the catalog, zero when unset,
    /// sorted by name.
    pub fn list_trade_goods(&self, game: &str) -> Result<Vec<StrategemGoods>> {
        let store = self.store(game)?;
        store.read(|conn| {
            let mut listing: Vec<StrategemGoods> = self
                .catalog()
                .strategems()
                .map(|def| {
                    Ok(StrategemGoods {
                        strategem_key: def.key.clone(),
                        name: def.name.clone(),
                        trade_goods: trade_goods_of(conn, &def.key)?,
                    })
                })
                .collect::<Result<_>>()?;
            listing.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(listing)
        })
    }
}

fn trade_goods_of(conn: &Connection, strategem_key: &str) -> rusqlite::Result<i64> {
    let goods: Option<i64> = conn
        .query_row(
            "SELECT tradeGoods FROM strategemTradeGoods WHERE strategemKey = ?1",
            params![strategem_key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(goods.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use crucible_catalog::Catalog;

    use crate::testutil::{self, GAME};
    use crate::{ErrorKind, LedgerError};

    fn strategem_catalog() -> Catalog {
        let mut catalog = Catalog::empty();
        catalog.insert_strategem(testutil::strategem("warfare"));
        catalog.insert_strategem(testutil::strategem("trade"));
        catalog
    }

    #[test]
    fn test_set_and_list_trade_goods() {
        let (ledger, _ids, _dir) = testutil::ledger_with_game(strategem_catalog(), &["Alice"]);

        let goods = ledger.set_trade_goods(GAME, "warfare", 3).unwrap();
        assert_eq!(goods.trade_goods, 3);

        // Untouched strategems report zero.
        let listing = ledger.list_trade_goods(GAME).unwrap();
        assert_eq!(listing.len(), 2);
        let warfare = listing.iter().find(|g| g.strategem_key == "warfare").unwrap();
        assert_eq!(warfare.trade_goods, 3);
        let trade = listing.iter().find(|g| g.strategem_key == "trade").unwrap();
        assert_eq!(trade.trade_goods, 0);

        // A later set overwrites, it does not accumulate.
        let goods = ledger.set_trade_goods(GAME, "warfare", 1).unwrap();
        assert_eq!(goods.trade_goods, 1);
    }

    #[test]
    fn test_trade_goods_clamp_at_zero() {
        let (ledger, _ids, _dir) = testutil::ledger_with_game(strategem_catalog(), &["Alice"]);
        ledger.set_trade_goods(GAME, "warfare", 2).unwrap();

        let goods = ledger.set_trade_goods(GAME, "warfare", -5).unwrap();
        assert_eq!(goods.trade_goods, 0);
    }

    #[test]
    fn test_unknown_strategem_rejected() {
        let (ledger, _ids, _dir) = testutil::ledger_with_game(strategem_catalog(), &["Alice"]);

        let err = ledger.set_trade_goods(GAME, "ghost", 1).unwrap_err();
        assert!(matches!(err, LedgerError::DefinitionNotFound { .. }));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
