//! The wire protocol: newline-delimited JSON, one message per line.
//!
//! Every frame is an object with an `event` tag and camelCase fields.
//! Client events carry a game name and, where relevant, the acting player's
//! persistent id; server messages are either direct replies or room
//! broadcasts, distinguished only by who receives them.

use serde::{Deserialize, Serialize};

use crucible_ledger::{
    Attachment, CardFace, ErrorKind, ExploreOutcome, LedgerError, ObjectiveCard, ObjectiveGrant,
    ObjectiveRemoval, OwnedCard, PlayerSnapshot, PublicProgress, RelicRestore, ScoreChange,
    StrategemGoods,
};
use crucible_store::directory::GameSummary;
use crucible_store::store::PlayerRow;
use crucible_types::{CardKind, ObjectiveTier};

use crate::registry::{RegistryError, SessionView};

/// Everything a client can ask for.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    // Session registry
    HostGame { game_name: String },
    StopHosting,
    JoinGame { game_name: String, player_id: String, player_name: String },
    LeaveGame,
    GetSessionInfo,
    ListActive,

    // Game files
    CreateGame { game_name: String, players: Vec<String> },
    ListGames,
    ListPlayers { game_name: String },
    PlayerSnapshot { game_name: String, player_id: String },

    // Card ownership
    ListOwned { game_name: String, player_id: String, kind: CardKind },
    ListAvailable { game_name: String, player_id: String, kind: CardKind },
    AddCard { game_name: String, player_id: String, kind: CardKind, key: String },
    RemoveCard { game_name: String, player_id: String, kind: CardKind, key: String },
    SetExhausted { game_name: String, player_id: String, kind: CardKind, key: String, exhausted: bool },
    DrawCard { game_name: String, player_id: String, kind: CardKind },

    // Strategem trade goods
    SetTradeGoods { game_name: String, strategem_key: String, trade_goods: i64 },
    ListTradeGoods { game_name: String },

    // Objectives and scoring
    ListObjectives { game_name: String, player_id: String },
    ListAvailableObjectives { game_name: String, player_id: String, tier: Option<ObjectiveTier> },
    AddObjective { game_name: String, player_id: String, key: String },
    DrawObjective { game_name: String, player_id: String, tier: ObjectiveTier },
    SetCompletion { game_name: String, player_id: String, key: String, completed: bool },
    RemoveObjective { game_name: String, player_id: String, key: String },
    PublicProgress { game_name: String },

    // Exploration
    ExplorePlanet { game_name: String, player_id: String, planet: String },
    Attach { game_name: String, player_id: String, planet: String, card: String },
    Detach { game_name: String, player_id: String, planet: String, card: String },
    RestoreRelic { game_name: String, player_id: String, fragments: Vec<String> },
}

/// Lobby entry: a live session joined with its game file's metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGame {
    pub game_name: String,
    /// Where to reach the host.
    pub address: String,
    /// Connections currently in the session, host included.
    pub connected: usize,
    /// Players in the game file's roster.
    pub player_count: i64,
    /// Unix seconds when hosting started.
    pub hosted_at: i64,
    pub created_at: i64,
    pub last_updated: i64,
}

/// Failure class carried on error frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Conflict,
    Validation,
    StorageFailure,
}

/// Everything the server can say back.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    // Session registry
    HostingStarted { game_name: String, address: String, players: Vec<PlayerRow> },
    HostingStopped { game_name: String },
    SessionJoined { game_name: String, players: Vec<PlayerRow> },
    SessionLeft { game_name: String },
    SessionEnded { game_name: String },
    PlayerJoined { game_name: String, player_id: String, player_name: String },
    PlayerLeft { game_name: String, player_id: String, player_name: String },
    SessionInfo { info: Option<SessionView> },
    ActiveGames { games: Vec<ActiveGame> },

    // Game files
    GameCreated { game: GameSummary },
    Games { games: Vec<GameSummary> },
    Players { players: Vec<PlayerRow> },
    Snapshot { snapshot: PlayerSnapshot },

    // Card ownership
    Owned { cards: Vec<OwnedCard> },
    Available { cards: Vec<CardFace> },
    CardAdded { player_id: String, card: OwnedCard },
    CardRemoved { player_id: String, kind: CardKind, key: String },
    CardUpdated { player_id: String, card: OwnedCard },
    CardDrawn { player_id: String, card: OwnedCard },

    // Strategem trade goods
    TradeGoodsSet { goods: StrategemGoods },
    TradeGoods { listing: Vec<StrategemGoods> },

    // Objectives and scoring
    Objectives { cards: Vec<ObjectiveCard> },
    AvailableObjectives { cards: Vec<CardFace> },
    ObjectiveGranted { player_id: String, grant: ObjectiveGrant },
    ObjectiveRemoved { player_id: String, removal: ObjectiveRemoval },
    ScoreChanged { change: ScoreChange },
    PublicBoard { board: Vec<PublicProgress> },

    // Exploration
    Explored { player_id: String, result: ExploreOutcome },
    Attached { player_id: String, attachment: Attachment },
    Detached { player_id: String, planet: String, card: String },
    RelicRestored { player_id: String, restore: RelicRestore },

    Error { code: ErrorCode, message: String },
}

impl ServerMessage {
    /// Error frame for a failed ledger operation.
    pub fn from_ledger_error(err: &LedgerError) -> Self {
        let code = match err.kind() {
            ErrorKind::NotFound => ErrorCode::NotFound,
            ErrorKind::Conflict => ErrorCode::Conflict,
            ErrorKind::Validation => ErrorCode::Validation,
            ErrorKind::Storage => ErrorCode::StorageFailure,
        };
        ServerMessage::Error {
            code,
            message: err.to_string(),
        }
    }

    /// Error frame for a failed registry operation.
    pub fn from_registry_error(err: &RegistryError) -> Self {
        let code = match err {
            RegistryError::NoSuchSession(_) | RegistryError::NotPresent => ErrorCode::NotFound,
            RegistryError::AlreadyActive(_)
            | RegistryError::AlreadyInSession
            | RegistryError::DuplicatePlayer(_) => ErrorCode::Conflict,
            RegistryError::NotHost => ErrorCode::Validation,
        };
        ServerMessage::Error {
            code,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_parses() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"event": "addCard", "gameName": "Nexus", "playerId": "p1",
                "kind": "technology", "key": "gravity-drive"}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            ClientEvent::AddCard { kind: CardKind::Technology, .. }
        ));

        let event: ClientEvent =
            serde_json::from_str(r#"{"event": "stopHosting"}"#).unwrap();
        assert!(matches!(event, ClientEvent::StopHosting));

        let event: ClientEvent = serde_json::from_str(
            r#"{"event": "hostGame", "gameName": "Nexus"}"#,
        )
        .unwrap();
        assert!(matches!(event, ClientEvent::HostGame { .. }));

        let event: ClientEvent =
            serde_json::from_str(r#"{"event": "getSessionInfo"}"#).unwrap();
        assert!(matches!(event, ClientEvent::GetSessionInfo));

        let event: ClientEvent = serde_json::from_str(
            r#"{"event": "joinGame", "gameName": "Nexus",
                "playerId": "p1", "playerName": "Alice"}"#,
        )
        .unwrap();
        let ClientEvent::JoinGame { player_id, player_name, .. } = event else {
            panic!("expected a joinGame event");
        };
        assert_eq!(player_id, "p1");
        assert_eq!(player_name, "Alice");
    }

    #[test]
    fn test_optional_tier_filter() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"event": "listAvailableObjectives", "gameName": "Nexus", "playerId": "p1"}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            ClientEvent::ListAvailableObjectives { tier: None, .. }
        ));

        let event: ClientEvent = serde_json::from_str(
            r#"{"event": "listAvailableObjectives", "gameName": "Nexus",
                "playerId": "p1", "tier": "stage_two"}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            ClientEvent::ListAvailableObjectives { tier: Some(ObjectiveTier::StageTwo), .. }
        ));
    }

    #[test]
    fn test_unknown_event_rejected() {
        let parsed: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"event": "formatDisk"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_server_message_shape() {
        let msg = ServerMessage::HostingStarted {
            game_name: "Nexus".into(),
            address: "10.0.0.5:7717".into(),
            players: Vec::new(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"], "hostingStarted");
        assert_eq!(json["gameName"], "Nexus");

        let err = ServerMessage::Error {
            code: ErrorCode::NotFound,
            message: "no game named 'Ghost'".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "not_found");
    }
}
