//! The gateway: connection table, event dispatch, and room broadcast.
//!
//! One `Gateway` serves every connection. The sender table maps live
//! connection ids to their outbound channels; the registry tracks who is in
//! which session; the ledger does the actual work. Replies go to the caller,
//! and successful mutations are also broadcast to the rest of the room so
//! every client stays current.

use std::net::UdpSocket;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;

use crucible_catalog::Catalog;
use crucible_ledger::Ledger;
use crucible_store::GameDirectory;
use crucible_types::ConnId;

use crate::protocol::{ClientEvent, ServerMessage};
use crate::registry::{Repair, SessionRegistry};

pub struct Gateway {
    registry: SessionRegistry,
    ledger: Ledger,
    games: Arc<GameDirectory>,
    conns: DashMap<ConnId, UnboundedSender<ServerMessage>>,
    port: u16,
}

impl Gateway {
    pub fn new(games: Arc<GameDirectory>, catalog: Arc<Catalog>, port: u16) -> Self {
        Self {
            registry: SessionRegistry::new(),
            ledger: Ledger::new(games.clone(), catalog),
            games,
            conns: DashMap::new(),
            port,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Register a freshly accepted connection's outbound channel.
    pub fn register(&self, conn: ConnId, tx: UnboundedSender<ServerMessage>) {
        self.conns.insert(conn, tx);
        tracing::debug!(conn = %conn.short(), total = self.conns.len(), "connection registered");
    }

    /// Tear down a closed connection and repair the registry.
    ///
    /// A departing host closes their session for everyone; a departing
    /// player just leaves their room.
    pub fn disconnect(&self, conn: ConnId) {
        self.conns.remove(&conn);

        let Some(game_name) = self.registry.session_for(conn) else {
            tracing::debug!(conn = %conn.short(), "connection closed");
            return;
        };

        match self.registry.stop_hosting(conn) {
            Ok(torn) => {
                for evicted in torn.evicted {
                    self.send(
                        evicted.conn,
                        ServerMessage::SessionEnded {
                            game_name: torn.game_name.clone(),
                        },
                    );
                }
            }
            Err(_) => {
                // Not the host: an ordinary leave.
                if let Ok((game, presence)) = self.registry.leave_session(conn) {
                    self.broadcast(
                        &game,
                        ServerMessage::PlayerLeft {
                            game_name: game.clone(),
                            player_id: presence.player_id,
                            player_name: presence.player_name,
                        },
                        Some(conn),
                    );
                }
            }
        }
        tracing::info!(conn = %conn.short(), game = game_name, "connection closed");
    }

    /// Sweep the registry for entries whose connection has vanished and
    /// notify the survivors.
    pub fn reconcile(&self) {
        let repairs = self.registry.reconcile(|c| self.conns.contains_key(&c));
        for repair in repairs {
            match repair {
                Repair::HostLost(torn) => {
                    for evicted in torn.evicted {
                        self.send(
                            evicted.conn,
                            ServerMessage::SessionEnded {
                                game_name: torn.game_name.clone(),
                            },
                        );
                    }
                }
                Repair::PlayerDropped { game_name, presence } => {
                    self.broadcast(
                        &game_name,
                        ServerMessage::PlayerLeft {
                            game_name: game_name.clone(),
                            player_id: presence.player_id,
                            player_name: presence.player_name,
                        },
                        None,
                    );
                }
            }
        }
    }

    /// Handle one client event, returning the direct reply.
    ///
    /// Mutations that succeed are also broadcast to the caller's room.
    pub fn handle_event(&self, conn: ConnId, event: ClientEvent) -> ServerMessage {
        use ClientEvent as E;
        use ServerMessage as M;

        match event {
            // ================================================================
            // Session registry
            // ================================================================
            E::HostGame { game_name } => {
                if !self.games.exists(&game_name) {
                    return M::Error {
                        code: crate::protocol::ErrorCode::NotFound,
                        message: format!("no game named '{game_name}'"),
                    };
                }
                let address = format!("{}:{}", local_ip(), self.port);
                match self.registry.start_hosting(conn, &game_name, &address) {
                    Ok(()) => M::HostingStarted {
                        address,
                        players: self.roster(&game_name),
                        game_name,
                    },
                    Err(err) => M::from_registry_error(&err),
                }
            }
            E::StopHosting => match self.registry.stop_hosting(conn) {
                Ok(torn) => {
                    for evicted in torn.evicted {
                        self.send(
                            evicted.conn,
                            M::SessionEnded {
                                game_name: torn.game_name.clone(),
                            },
                        );
                    }
                    M::HostingStopped {
                        game_name: torn.game_name,
                    }
                }
                Err(err) => M::from_registry_error(&err),
            },
            E::JoinGame { game_name, player_id, player_name } => {
                match self
                    .registry
                    .join_session(conn, &game_name, &player_id, &player_name)
                {
                    Ok(()) => {
                        self.broadcast(
                            &game_name,
                            M::PlayerJoined {
                                game_name: game_name.clone(),
                                player_id,
                                player_name,
                            },
                            Some(conn),
                        );
                        M::SessionJoined {
                            players: self.roster(&game_name),
                            game_name,
                        }
                    }
                    Err(err) => M::from_registry_error(&err),
                }
            }
            E::LeaveGame => match self.registry.leave_session(conn) {
                Ok((game_name, presence)) => {
                    self.broadcast(
                        &game_name,
                        M::PlayerLeft {
                            game_name: game_name.clone(),
                            player_id: presence.player_id,
                            player_name: presence.player_name,
                        },
                        Some(conn),
                    );
                    M::SessionLeft { game_name }
                }
                Err(err) => M::from_registry_error(&err),
            },
            E::GetSessionInfo => M::SessionInfo {
                info: self.registry.session_info_for(conn),
            },
            E::ListActive => {
                let summaries = self.games.list_games();
                let games = self
                    .registry
                    .active_games()
                    .into_iter()
                    .map(|info| {
                        let meta = summaries.iter().find(|s| s.name == info.game_name);
                        crate::protocol::ActiveGame {
                            address: info.host_address,
                            connected: info.player_count,
                            player_count: meta.map_or(0, |s| s.player_count),
                            hosted_at: info.hosted_at,
                            created_at: meta.map_or(0, |s| s.created_at),
                            last_updated: meta.map_or(0, |s| s.last_updated),
                            game_name: info.game_name,
                        }
                    })
                    .collect();
                M::ActiveGames { games }
            }

            // ================================================================
            // Game files
            // ================================================================
            E::CreateGame { game_name, players } => {
                match self.games.create_game(&game_name, &players) {
                    Ok(game) => M::GameCreated { game },
                    Err(err) => M::from_ledger_error(&err.into()),
                }
            }
            E::ListGames => M::Games {
                games: self.games.list_games(),
            },
            E::ListPlayers { game_name } => self.reply(self
                .ledger
                .list_players(&game_name)
                .map(|players| M::Players { players })),
            E::PlayerSnapshot { game_name, player_id } => self.reply(self
                .ledger
                .player_snapshot(&game_name, &player_id)
                .map(|snapshot| M::Snapshot { snapshot })),

            // ================================================================
            // Card ownership
            // ================================================================
            E::ListOwned { game_name, player_id, kind } => self.reply(self
                .ledger
                .list_owned(&game_name, &player_id, kind)
                .map(|cards| M::Owned { cards })),
            E::ListAvailable { game_name, player_id, kind } => self.reply(self
                .ledger
                .list_available(&game_name, &player_id, kind)
                .map(|cards| M::Available { cards })),
            E::AddCard { game_name, player_id, kind, key } => {
                self.mutate(conn, self.ledger.add_card(&game_name, &player_id, kind, &key).map(
                    |card| M::CardAdded { player_id, card },
                ))
            }
            E::RemoveCard { game_name, player_id, kind, key } => self.mutate(
                conn,
                self.ledger
                    .remove_card(&game_name, &player_id, kind, &key)
                    .map(|()| M::CardRemoved { player_id, kind, key }),
            ),
            E::SetExhausted { game_name, player_id, kind, key, exhausted } => self.mutate(
                conn,
                self.ledger
                    .set_exhausted(&game_name, &player_id, kind, &key, exhausted)
                    .map(|card| M::CardUpdated { player_id, card }),
            ),
            E::DrawCard { game_name, player_id, kind } => self.mutate(
                conn,
                self.ledger
                    .draw_random(&game_name, &player_id, kind)
                    .map(|card| M::CardDrawn { player_id, card }),
            ),

            // ================================================================
            // Strategem trade goods
            // ================================================================
            E::SetTradeGoods { game_name, strategem_key, trade_goods } => self.mutate(
                conn,
                self.ledger
                    .set_trade_goods(&game_name, &strategem_key, trade_goods)
                    .map(|goods| M::TradeGoodsSet { goods }),
            ),
            E::ListTradeGoods { game_name } => self.reply(self
                .ledger
                .list_trade_goods(&game_name)
                .map(|listing| M::TradeGoods { listing })),

            // ================================================================
            // Objectives and scoring
            // ================================================================
            E::ListObjectives { game_name, player_id } => self.reply(self
                .ledger
                .list_objectives(&game_name, &player_id)
                .map(|cards| M::Objectives { cards })),
            E::ListAvailableObjectives { game_name, player_id, tier } => self.reply(self
                .ledger
                .list_available_objectives(&game_name, &player_id, tier)
                .map(|cards| M::AvailableObjectives { cards })),
            E::AddObjective { game_name, player_id, key } => self.mutate(
                conn,
                self.ledger
                    .add_objective(&game_name, &player_id, &key)
                    .map(|grant| M::ObjectiveGranted { player_id, grant }),
            ),
            E::DrawObjective { game_name, player_id, tier } => self.mutate(
                conn,
                self.ledger
                    .draw_objective(&game_name, &player_id, tier)
                    .map(|grant| M::ObjectiveGranted { player_id, grant }),
            ),
            E::SetCompletion { game_name, player_id, key, completed } => self.mutate(
                conn,
                self.ledger
                    .set_completion(&game_name, &player_id, &key, completed)
                    .map(|change| M::ScoreChanged { change }),
            ),
            E::RemoveObjective { game_name, player_id, key } => self.mutate(
                conn,
                self.ledger
                    .remove_objective(&game_name, &player_id, &key)
                    .map(|removal| M::ObjectiveRemoved { player_id, removal }),
            ),
            E::PublicProgress { game_name } => self.reply(self
                .ledger
                .list_public_progress(&game_name)
                .map(|board| M::PublicBoard { board })),

            // ================================================================
            // Exploration
            // ================================================================
            E::ExplorePlanet { game_name, player_id, planet } => self.mutate(
                conn,
                self.ledger
                    .explore_planet(&game_name, &player_id, &planet)
                    .map(|result| M::Explored { player_id, result }),
            ),
            E::Attach { game_name, player_id, planet, card } => self.mutate(
                conn,
                self.ledger
                    .attach(&game_name, &player_id, &planet, &card)
                    .map(|attachment| M::Attached { player_id, attachment }),
            ),
            E::Detach { game_name, player_id, planet, card } => self.mutate(
                conn,
                self.ledger
                    .detach(&game_name, &player_id, &planet, &card)
                    .map(|()| M::Detached { player_id, planet, card }),
            ),
            E::RestoreRelic { game_name, player_id, fragments } => self.mutate(
                conn,
                self.ledger
                    .restore_relic(&game_name, &player_id, &fragments)
                    .map(|restore| M::RelicRestored { player_id, restore }),
            ),
        }
    }

    /// Roster for the host/join replies. The game file was just opened, so
    /// a read failure here is logged rather than failing the session call.
    fn roster(&self, game_name: &str) -> Vec<crucible_store::PlayerRow> {
        self.ledger.list_players(game_name).unwrap_or_else(|err| {
            tracing::warn!(game = game_name, %err, "roster unavailable");
            Vec::new()
        })
    }

    fn reply(
        &self,
        result: Result<ServerMessage, crucible_ledger::LedgerError>,
    ) -> ServerMessage {
        match result {
            Ok(msg) => msg,
            Err(err) => ServerMessage::from_ledger_error(&err),
        }
    }

    /// Reply to the caller and, on success, echo the message to the rest of
    /// the caller's room.
    fn mutate(
        &self,
        conn: ConnId,
        result: Result<ServerMessage, crucible_ledger::LedgerError>,
    ) -> ServerMessage {
        match result {
            Ok(msg) => {
                if let Some(game_name) = self.registry.session_for(conn) {
                    self.broadcast(&game_name, msg.clone(), Some(conn));
                }
                msg
            }
            Err(err) => ServerMessage::from_ledger_error(&err),
        }
    }

    fn send(&self, conn: ConnId, msg: ServerMessage) {
        if let Some(tx) = self.conns.get(&conn) {
            // A closed receiver just means the connection is mid-teardown.
            let _ = tx.send(msg);
        }
    }

    /// Send to every session member, optionally skipping one connection.
    fn broadcast(&self, game_name: &str, msg: ServerMessage, except: Option<ConnId>) {
        let Some(members) = self.registry.members_of(game_name) else {
            return;
        };
        for member in members {
            if Some(member) == except {
                continue;
            }
            self.send(member, msg.clone());
        }
    }
}

/// Best-effort LAN address for the hosting announcement.
///
/// The UDP socket is never written to; connecting it just asks the OS which
/// interface would route outward.
fn local_ip() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|sock| {
            sock.connect("10.255.255.255:1")?;
            sock.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use crucible_catalog::Catalog;
    use crucible_store::GameDirectory;
    use crucible_types::{ConnId, ObjectiveDef, ObjectiveTier, StrategemDef};

    use super::*;
    use crate::protocol::ErrorCode;

    fn gateway_with_game() -> (Gateway, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let games = Arc::new(GameDirectory::new(dir.path()));
        games
            .create_game("Nexus", &["Alice".to_string(), "Bob".to_string()])
            .unwrap();

        let mut catalog = Catalog::empty();
        catalog.insert_objective(ObjectiveDef {
            key: "expand-borders".into(),
            name: "Expand Borders".into(),
            tier: ObjectiveTier::StageOne,
            victory_points: 1,
            asset: "obj/expand.png".into(),
        });
        catalog.insert_strategem(StrategemDef {
            key: "warfare".into(),
            name: "Warfare".into(),
            asset: "strategems/warfare.png".into(),
        });

        (Gateway::new(games, Arc::new(catalog), 7717), dir)
    }

    fn connect(gateway: &Gateway) -> (ConnId, mpsc::UnboundedReceiver<ServerMessage>) {
        let conn = ConnId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        gateway.register(conn, tx);
        (conn, rx)
    }

    fn join(game: &str, player_id: &str, player_name: &str) -> ClientEvent {
        ClientEvent::JoinGame {
            game_name: game.into(),
            player_id: player_id.into(),
            player_name: player_name.into(),
        }
    }

    #[test]
    fn test_hosting_requires_existing_game() {
        let (gateway, _dir) = gateway_with_game();
        let (conn, _rx) = connect(&gateway);

        let reply = gateway.handle_event(
            conn,
            ClientEvent::HostGame { game_name: "Ghost".into() },
        );
        assert!(matches!(
            reply,
            ServerMessage::Error { code: ErrorCode::NotFound, .. }
        ));
    }

    #[test]
    fn test_host_join_broadcast() {
        let (gateway, _dir) = gateway_with_game();
        let (host, mut host_rx) = connect(&gateway);
        let (alice, _alice_rx) = connect(&gateway);

        let reply = gateway.handle_event(
            host,
            ClientEvent::HostGame { game_name: "Nexus".into() },
        );
        assert!(matches!(reply, ServerMessage::HostingStarted { .. }));

        let reply = gateway.handle_event(alice, join("Nexus", "p1", "Alice"));
        assert!(matches!(reply, ServerMessage::SessionJoined { .. }));

        // The host hears about the new player; the joiner only gets the reply.
        let msg = host_rx.try_recv().unwrap();
        let ServerMessage::PlayerJoined { player_id, .. } = msg else {
            panic!("expected a playerJoined broadcast");
        };
        assert_eq!(player_id, "p1");
    }

    #[test]
    fn test_mutation_echoes_to_room() {
        let (gateway, _dir) = gateway_with_game();
        let (host, _host_rx) = connect(&gateway);
        let (alice, mut alice_rx) = connect(&gateway);

        gateway.handle_event(host, ClientEvent::HostGame { game_name: "Nexus".into() });
        gateway.handle_event(alice, join("Nexus", "p1", "Alice"));

        let players = match gateway.handle_event(
            host,
            ClientEvent::ListPlayers { game_name: "Nexus".into() },
        ) {
            ServerMessage::Players { players } => players,
            other => panic!("unexpected reply: {other:?}"),
        };

        let reply = gateway.handle_event(
            host,
            ClientEvent::AddObjective {
                game_name: "Nexus".into(),
                player_id: players[0].player_id.clone(),
                key: "expand-borders".into(),
            },
        );
        assert!(matches!(reply, ServerMessage::ObjectiveGranted { .. }));

        let msg = alice_rx.try_recv().unwrap();
        assert!(matches!(msg, ServerMessage::ObjectiveGranted { .. }));
    }

    #[test]
    fn test_trade_goods_events() {
        let (gateway, _dir) = gateway_with_game();
        let (host, _host_rx) = connect(&gateway);
        let (alice, mut alice_rx) = connect(&gateway);

        gateway.handle_event(host, ClientEvent::HostGame { game_name: "Nexus".into() });
        gateway.handle_event(alice, join("Nexus", "p1", "Alice"));

        let reply = gateway.handle_event(
            host,
            ClientEvent::SetTradeGoods {
                game_name: "Nexus".into(),
                strategem_key: "warfare".into(),
                trade_goods: 2,
            },
        );
        let ServerMessage::TradeGoodsSet { goods } = reply else {
            panic!("unexpected reply: {reply:?}");
        };
        assert_eq!(goods.trade_goods, 2);

        // The room hears the change too.
        let msg = alice_rx.try_recv().unwrap();
        assert!(matches!(msg, ServerMessage::TradeGoodsSet { .. }));

        let reply = gateway.handle_event(
            alice,
            ClientEvent::ListTradeGoods { game_name: "Nexus".into() },
        );
        let ServerMessage::TradeGoods { listing } = reply else {
            panic!("unexpected reply: {reply:?}");
        };
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].strategem_key, "warfare");
        assert_eq!(listing[0].trade_goods, 2);
    }

    #[test]
    fn test_host_disconnect_closes_session() {
        let (gateway, _dir) = gateway_with_game();
        let (host, _host_rx) = connect(&gateway);
        let (alice, mut alice_rx) = connect(&gateway);

        gateway.handle_event(host, ClientEvent::HostGame { game_name: "Nexus".into() });
        gateway.handle_event(alice, join("Nexus", "p1", "Alice"));

        gateway.disconnect(host);

        let msg = alice_rx.try_recv().unwrap();
        assert!(matches!(msg, ServerMessage::SessionEnded { .. }));
        assert!(gateway.registry().active_games().is_empty());

        // The evicted player can no longer rejoin the dead session.
        let reply = gateway.handle_event(alice, join("Nexus", "p1", "Alice"));
        assert!(matches!(
            reply,
            ServerMessage::Error { code: ErrorCode::NotFound, .. }
        ));
    }

    #[test]
    fn test_reconcile_repairs_stale_entries() {
        let (gateway, _dir) = gateway_with_game();
        let (host, _host_rx) = connect(&gateway);
        let (alice, _alice_rx) = connect(&gateway);

        gateway.handle_event(host, ClientEvent::HostGame { game_name: "Nexus".into() });
        gateway.handle_event(alice, join("Nexus", "p1", "Alice"));

        // Simulate a vanished player socket whose disconnect never ran.
        gateway.conns.remove(&alice);
        gateway.reconcile();

        assert_eq!(gateway.registry().members_of("Nexus").unwrap(), vec![host]);
    }
}
