//! The session registry: which games are live and who is in them.
//!
//! Pure bookkeeping over connection ids. One mutex guards both maps, so the
//! forward table (game name to session) and the reverse index (connection to
//! game name) can never disagree. Persistence is the ledger's problem; a
//! session here only says "this game is being hosted right now".

use std::collections::HashMap;
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crucible_types::ConnId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("game '{0}' is already being hosted")]
    AlreadyActive(String),

    #[error("connection is already part of a session")]
    AlreadyInSession,

    #[error("no active session for game '{0}'")]
    NoSuchSession(String),

    #[error("player '{0}' is already in this session")]
    DuplicatePlayer(String),

    #[error("connection is not a member of a session")]
    NotPresent,

    #[error("only the host can do that")]
    NotHost,
}

/// One joined (non-host) client.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerPresence {
    pub conn: ConnId,
    pub player_id: String,
    pub player_name: String,
    pub joined_at: SystemTime,
}

/// One live hosted game.
#[derive(Debug, Clone)]
pub struct GameSession {
    pub game_name: String,
    pub host: ConnId,
    /// Where joiners reach the host, announced when hosting starts.
    pub host_address: String,
    pub created_at: SystemTime,
    pub last_activity: SystemTime,
    pub players: Vec<PlayerPresence>,
}

impl GameSession {
    /// Host plus player connections.
    pub fn members(&self) -> Vec<ConnId> {
        let mut all = Vec::with_capacity(self.players.len() + 1);
        all.push(self.host);
        all.extend(self.players.iter().map(|p| p.conn));
        all
    }
}

/// Listing entry for one active session.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub game_name: String,
    pub host_address: String,
    /// Connections in the session, host included.
    pub player_count: usize,
    /// Unix seconds when hosting started.
    pub hosted_at: i64,
    /// Unix seconds of the last join or leave.
    pub last_activity: i64,
}

/// A member's view of their own session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub game_name: String,
    pub is_host: bool,
    /// Absent for the host; players see their own presence.
    pub player: Option<PresenceInfo>,
}

/// Wire form of one presence.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceInfo {
    pub player_id: String,
    pub player_name: String,
}

/// What tearing a session down evicted, for notifying the room.
#[derive(Debug, Clone, PartialEq)]
pub struct TornDown {
    pub game_name: String,
    pub evicted: Vec<PlayerPresence>,
}

/// One registry repair made by a reconcile sweep.
#[derive(Debug, Clone)]
pub enum Repair {
    /// The host's connection vanished; the whole session is gone.
    HostLost(TornDown),
    /// A player's connection vanished; the session continues without them.
    PlayerDropped {
        game_name: String,
        presence: PlayerPresence,
    },
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<String, GameSession>,
    conn_to_game: HashMap<ConnId, String>,
}

/// Registry of live sessions, shared across every connection task.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start hosting a game. The hosting connection becomes its first member.
    pub fn start_hosting(
        &self,
        conn: ConnId,
        game_name: &str,
        host_address: &str,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        if inner.conn_to_game.contains_key(&conn) {
            return Err(RegistryError::AlreadyInSession);
        }
        if inner.sessions.contains_key(game_name) {
            return Err(RegistryError::AlreadyActive(game_name.to_string()));
        }
        let now = SystemTime::now();
        inner.sessions.insert(
            game_name.to_string(),
            GameSession {
                game_name: game_name.to_string(),
                host: conn,
                host_address: host_address.to_string(),
                created_at: now,
                last_activity: now,
                players: Vec::new(),
            },
        );
        inner.conn_to_game.insert(conn, game_name.to_string());
        tracing::info!(game = game_name, host = %conn.short(), "hosting started");
        Ok(())
    }

    /// Stop hosting the caller's game, evicting every member.
    ///
    /// Only the host can stop a session; the reverse index is scrubbed for
    /// host and players alike. A second call returns `NotPresent`.
    pub fn stop_hosting(&self, conn: ConnId) -> Result<TornDown, RegistryError> {
        let mut inner = self.inner.lock();
        let game_name = inner
            .conn_to_game
            .get(&conn)
            .cloned()
            .ok_or(RegistryError::NotPresent)?;
        let session = inner
            .sessions
            .get(&game_name)
            .ok_or(RegistryError::NotPresent)?;
        if session.host != conn {
            return Err(RegistryError::NotHost);
        }
        tear_down(&mut inner, &game_name).ok_or(RegistryError::NotPresent)
    }

    /// Join an active session as a player.
    ///
    /// A player id can only be present once per session, whatever connection
    /// it arrives on.
    pub fn join_session(
        &self,
        conn: ConnId,
        game_name: &str,
        player_id: &str,
        player_name: &str,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        if inner.conn_to_game.contains_key(&conn) && inner.sessions.contains_key(game_name) {
            return Err(RegistryError::AlreadyInSession);
        }
        let Some(session) = inner.sessions.get_mut(game_name) else {
            return Err(RegistryError::NoSuchSession(game_name.to_string()));
        };
        if session.players.iter().any(|p| p.player_id == player_id) {
            return Err(RegistryError::DuplicatePlayer(player_id.to_string()));
        }
        session.players.push(PlayerPresence {
            conn,
            player_id: player_id.to_string(),
            player_name: player_name.to_string(),
            joined_at: SystemTime::now(),
        });
        session.last_activity = SystemTime::now();
        inner.conn_to_game.insert(conn, game_name.to_string());
        tracing::info!(game = game_name, player = player_name, conn = %conn.short(), "player joined");
        Ok(())
    }

    /// Leave the caller's session.
    ///
    /// The host is not a presence and cannot "leave"; it gets `NotPresent`
    /// like any unknown connection.
    pub fn leave_session(&self, conn: ConnId) -> Result<(String, PlayerPresence), RegistryError> {
        let mut inner = self.inner.lock();
        let game_name = inner
            .conn_to_game
            .get(&conn)
            .cloned()
            .ok_or(RegistryError::NotPresent)?;
        let session = inner
            .sessions
            .get_mut(&game_name)
            .ok_or(RegistryError::NotPresent)?;
        let Some(pos) = session.players.iter().position(|p| p.conn == conn) else {
            return Err(RegistryError::NotPresent);
        };
        let presence = session.players.remove(pos);
        session.last_activity = SystemTime::now();
        inner.conn_to_game.remove(&conn);
        tracing::info!(game = game_name, player = presence.player_name, "player left");
        Ok((game_name, presence))
    }

    /// The game the connection is in, if any.
    pub fn session_for(&self, conn: ConnId) -> Option<String> {
        self.inner.lock().conn_to_game.get(&conn).cloned()
    }

    /// The caller's view of their own session, if they are in one.
    pub fn session_info_for(&self, conn: ConnId) -> Option<SessionView> {
        let inner = self.inner.lock();
        let game_name = inner.conn_to_game.get(&conn)?;
        let session = inner.sessions.get(game_name)?;
        let is_host = session.host == conn;
        let player = session
            .players
            .iter()
            .find(|p| p.conn == conn)
            .map(|p| PresenceInfo {
                player_id: p.player_id.clone(),
                player_name: p.player_name.clone(),
            });
        Some(SessionView {
            game_name: session.game_name.clone(),
            is_host,
            player,
        })
    }

    /// Every member of an active session, host first.
    pub fn members_of(&self, game_name: &str) -> Option<Vec<ConnId>> {
        self.inner
            .lock()
            .sessions
            .get(game_name)
            .map(GameSession::members)
    }

    /// Active sessions, sorted by game name.
    pub fn active_games(&self) -> Vec<SessionInfo> {
        let inner = self.inner.lock();
        let mut infos: Vec<SessionInfo> = inner
            .sessions
            .values()
            .map(|s| SessionInfo {
                game_name: s.game_name.clone(),
                host_address: s.host_address.clone(),
                player_count: s.members().len(),
                hosted_at: epoch_secs(s.created_at),
                last_activity: epoch_secs(s.last_activity),
            })
            .collect();
        infos.sort_by(|a, b| a.game_name.cmp(&b.game_name));
        infos
    }

    /// Drop every registry entry whose connection is no longer live.
    ///
    /// A dead host tears the whole session down; a dead player just leaves.
    /// Returns the repairs made so the gateway can notify survivors.
    pub fn reconcile(&self, is_live: impl Fn(ConnId) -> bool) -> Vec<Repair> {
        let mut inner = self.inner.lock();
        let mut repairs = Vec::new();

        let dead_hosts: Vec<String> = inner
            .sessions
            .values()
            .filter(|s| !is_live(s.host))
            .map(|s| s.game_name.clone())
            .collect();
        for game_name in dead_hosts {
            tracing::warn!(game = game_name, "host connection lost, tearing session down");
            if let Some(torn) = tear_down(&mut inner, &game_name) {
                repairs.push(Repair::HostLost(torn));
            }
        }

        let dead_players: Vec<(String, ConnId)> = inner
            .sessions
            .values()
            .flat_map(|s| {
                s.players
                    .iter()
                    .filter(|p| !is_live(p.conn))
                    .map(|p| (s.game_name.clone(), p.conn))
                    .collect::<Vec<_>>()
            })
            .collect();
        for (game_name, conn) in dead_players {
            let Some(session) = inner.sessions.get_mut(&game_name) else {
                continue;
            };
            let Some(pos) = session.players.iter().position(|p| p.conn == conn) else {
                continue;
            };
            let presence = session.players.remove(pos);
            session.last_activity = SystemTime::now();
            inner.conn_to_game.remove(&conn);
            tracing::warn!(game = game_name, player = presence.player_name, "player connection lost");
            repairs.push(Repair::PlayerDropped { game_name, presence });
        }

        repairs
    }
}

fn epoch_secs(t: SystemTime) -> i64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn tear_down(inner: &mut RegistryInner, game_name: &str) -> Option<TornDown> {
    let session = inner.sessions.remove(game_name)?;
    for member in session.members() {
        inner.conn_to_game.remove(&member);
    }
    tracing::info!(game = game_name, "hosting stopped");
    Some(TornDown {
        game_name: game_name.to_string(),
        evicted: session.players,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_host_join_leave() {
        let registry = SessionRegistry::new();
        let host = ConnId::new();
        let c1 = ConnId::new();

        registry.start_hosting(host, "Nexus", "10.0.0.5:7717").unwrap();
        registry.join_session(c1, "Nexus", "p1", "Alice").unwrap();

        assert_eq!(registry.session_for(c1).as_deref(), Some("Nexus"));
        assert_eq!(registry.members_of("Nexus").unwrap(), vec![host, c1]);

        let view = registry.session_info_for(c1).unwrap();
        assert_eq!(view.game_name, "Nexus");
        assert!(!view.is_host);
        assert_eq!(view.player.unwrap().player_name, "Alice");

        let view = registry.session_info_for(host).unwrap();
        assert!(view.is_host);
        assert!(view.player.is_none());

        let (game, presence) = registry.leave_session(c1).unwrap();
        assert_eq!(game, "Nexus");
        assert_eq!(presence.player_id, "p1");
        assert_eq!(registry.session_for(c1), None);
        assert_eq!(registry.members_of("Nexus").unwrap(), vec![host]);
    }

    #[test]
    fn test_one_host_per_game() {
        let registry = SessionRegistry::new();
        let a = ConnId::new();
        let b = ConnId::new();
        registry.start_hosting(a, "Nexus", "10.0.0.5:7717").unwrap();

        assert_eq!(
            registry.start_hosting(b, "Nexus", "10.0.0.5:7717"),
            Err(RegistryError::AlreadyActive("Nexus".into()))
        );
        // And one session per connection.
        assert_eq!(
            registry.start_hosting(a, "Other", "10.0.0.5:7717"),
            Err(RegistryError::AlreadyInSession)
        );
    }

    #[test]
    fn test_duplicate_player_id_across_connections() {
        let registry = SessionRegistry::new();
        let host = ConnId::new();
        let c1 = ConnId::new();
        let c2 = ConnId::new();

        registry.start_hosting(host, "Nexus", "10.0.0.5:7717").unwrap();
        registry.join_session(c1, "Nexus", "p1", "Alice").unwrap();

        // Same player id from another connection is refused while the first
        // presence is live.
        assert_eq!(
            registry.join_session(c2, "Nexus", "p1", "Alice"),
            Err(RegistryError::DuplicatePlayer("p1".into()))
        );

        // Once the first connection leaves, the id is free again.
        registry.leave_session(c1).unwrap();
        registry.join_session(c2, "Nexus", "p1", "Alice").unwrap();
        assert_eq!(registry.session_for(c2).as_deref(), Some("Nexus"));
    }

    #[test]
    fn test_join_guards() {
        let registry = SessionRegistry::new();
        let host = ConnId::new();
        let c1 = ConnId::new();

        assert_eq!(
            registry.join_session(c1, "Nexus", "p1", "Alice"),
            Err(RegistryError::NoSuchSession("Nexus".into()))
        );

        registry.start_hosting(host, "Nexus", "10.0.0.5:7717").unwrap();
        registry.join_session(c1, "Nexus", "p1", "Alice").unwrap();
        assert_eq!(
            registry.join_session(c1, "Nexus", "p2", "Bob"),
            Err(RegistryError::AlreadyInSession)
        );
    }

    #[test]
    fn test_stop_hosting_scrubs_everyone() {
        let registry = SessionRegistry::new();
        let host = ConnId::new();
        let c1 = ConnId::new();
        let c2 = ConnId::new();

        registry.start_hosting(host, "Nexus", "10.0.0.5:7717").unwrap();
        registry.join_session(c1, "Nexus", "p1", "Alice").unwrap();
        registry.join_session(c2, "Nexus", "p2", "Bob").unwrap();

        // Players cannot stop the session.
        assert_eq!(registry.stop_hosting(c1), Err(RegistryError::NotHost));

        let torn = registry.stop_hosting(host).unwrap();
        assert_eq!(torn.game_name, "Nexus");
        let evicted: Vec<&str> = torn.evicted.iter().map(|p| p.player_id.as_str()).collect();
        assert_eq!(evicted, vec!["p1", "p2"]);

        for conn in [host, c1, c2] {
            assert_eq!(registry.session_for(conn), None);
        }
        assert!(registry.members_of("Nexus").is_none());
        assert_eq!(
            registry.join_session(c1, "Nexus", "p1", "Alice"),
            Err(RegistryError::NoSuchSession("Nexus".into()))
        );
        // Stopping again is refused, not fatal.
        assert_eq!(registry.stop_hosting(host), Err(RegistryError::NotPresent));
    }

    #[test]
    fn test_host_cannot_merely_leave() {
        let registry = SessionRegistry::new();
        let host = ConnId::new();
        registry.start_hosting(host, "Nexus", "10.0.0.5:7717").unwrap();
        assert_eq!(registry.leave_session(host), Err(RegistryError::NotPresent));
        // The session itself is untouched.
        assert_eq!(registry.members_of("Nexus").unwrap(), vec![host]);
    }

    #[test]
    fn test_active_games_listing() {
        let registry = SessionRegistry::new();
        let a = ConnId::new();
        let b = ConnId::new();
        let c = ConnId::new();

        registry.start_hosting(a, "Zephyr", "10.0.0.5:7717").unwrap();
        registry.start_hosting(b, "Aurora", "10.0.0.5:7717").unwrap();
        registry.join_session(c, "Zephyr", "p1", "Alice").unwrap();

        let active = registry.active_games();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].game_name, "Aurora");
        assert_eq!(active[0].player_count, 1);
        assert_eq!(active[1].game_name, "Zephyr");
        assert_eq!(active[1].host_address, "10.0.0.5:7717");
        assert_eq!(active[1].player_count, 2);
        assert!(active[1].hosted_at > 0);
        assert!(active[1].last_activity >= active[1].hosted_at);
    }

    #[test]
    fn test_reconcile_drops_dead_player() {
        let registry = SessionRegistry::new();
        let host = ConnId::new();
        let c1 = ConnId::new();
        registry.start_hosting(host, "Nexus", "10.0.0.5:7717").unwrap();
        registry.join_session(c1, "Nexus", "p1", "Alice").unwrap();

        let live: HashSet<ConnId> = [host].into_iter().collect();
        let repairs = registry.reconcile(|c| live.contains(&c));

        assert_eq!(repairs.len(), 1);
        let Repair::PlayerDropped { presence, .. } = &repairs[0] else {
            panic!("expected a player-dropped repair");
        };
        assert_eq!(presence.player_id, "p1");
        assert_eq!(registry.members_of("Nexus").unwrap(), vec![host]);
        assert_eq!(registry.session_for(c1), None);
    }

    #[test]
    fn test_reconcile_dead_host_tears_down() {
        let registry = SessionRegistry::new();
        let host = ConnId::new();
        let c1 = ConnId::new();
        registry.start_hosting(host, "Nexus", "10.0.0.5:7717").unwrap();
        registry.join_session(c1, "Nexus", "p1", "Alice").unwrap();

        let live: HashSet<ConnId> = [c1].into_iter().collect();
        let repairs = registry.reconcile(|c| live.contains(&c));

        assert_eq!(repairs.len(), 1);
        let Repair::HostLost(torn) = &repairs[0] else {
            panic!("expected a host-lost repair");
        };
        assert_eq!(torn.game_name, "Nexus");
        assert_eq!(torn.evicted[0].conn, c1);
        assert!(registry.active_games().is_empty());
        assert_eq!(registry.session_for(c1), None);
    }
}
