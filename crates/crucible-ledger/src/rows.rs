//! Typed results returned by ledger operations.
//!
//! Every shape serializes camelCase, ready to be embedded in a wire reply.

use serde::Serialize;

use crucible_types::{CardKind, ObjectiveTier};

/// A catalog definition as seen by clients: key plus display fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardFace {
    pub kind: CardKind,
    pub key: String,
    pub name: String,
    pub asset: String,
}

/// One ownership row joined with its catalog definition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedCard {
    pub kind: CardKind,
    pub key: String,
    pub name: String,
    pub asset: String,
    pub exhausted: bool,
    pub acquired_at: i64,
}

/// Trade goods pooled on one strategem, shared by the whole game.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategemGoods {
    pub strategem_key: String,
    pub name: String,
    pub trade_goods: i64,
}

/// An objective row, secret or public, for one player.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveCard {
    pub key: String,
    pub name: String,
    pub tier: ObjectiveTier,
    pub victory_points: u32,
    pub asset: String,
    pub completed: bool,
    pub acquired_at: i64,
    pub completed_at: Option<i64>,
}

/// A public objective's shared slot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSlot {
    pub key: String,
    pub name: String,
    pub tier: ObjectiveTier,
    pub slot_index: i64,
    pub added_by: Option<String>,
}

/// A player's victory-point total after a scoring change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreChange {
    pub player_id: String,
    pub victory_points: i64,
}

/// A player who has completed a public objective.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredBy {
    pub player_id: String,
    pub name: String,
}

/// Board view of one public objective: its slot and who has scored it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProgress {
    #[serde(flatten)]
    pub slot: PublicSlot,
    pub victory_points: u32,
    pub scored_by: Vec<ScoredBy>,
}

/// Result of pulling a public objective out of play for the whole game.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRemoval {
    pub key: String,
    pub tier: ObjectiveTier,
    pub slot_index: i64,
    /// New totals for every player whose completion was reversed.
    pub reversed: Vec<ScoreChange>,
}

/// What granting an objective produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "scope")]
pub enum ObjectiveGrant {
    /// A secret objective row for the requesting player.
    Secret { card: ObjectiveCard },
    /// A public objective entering play for everyone.
    Public { slot: PublicSlot },
}

/// What removing an objective produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "scope")]
pub enum ObjectiveRemoval {
    /// A secret objective dropped from one player's hand.
    Player { key: String },
    /// A public objective pulled from play for the whole game.
    Game { removal: SlotRemoval },
}

/// An exploration card bound to an owned planet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub planet_key: String,
    pub exploration_key: String,
    pub name: String,
    pub asset: String,
    pub attached_at: i64,
}

/// What exploring a planet produced, by the drawn card's subtype.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum ExploreOutcome {
    /// The card bound itself to the explored planet.
    Attached { attachment: Attachment },
    /// The fragment went to the player's hand.
    FragmentGained { card: OwnedCard },
    /// One-shot effect; nothing was persisted beyond the activity bump.
    Resolved { card: CardFace },
}

/// Everything one player holds, for a full client refresh.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub player: crucible_store::store::PlayerRow,
    pub actions: Vec<OwnedCard>,
    pub technologies: Vec<OwnedCard>,
    pub planets: Vec<OwnedCard>,
    pub strategems: Vec<OwnedCard>,
    pub explorations: Vec<OwnedCard>,
    pub objectives: Vec<ObjectiveCard>,
    pub attachments: Vec<Attachment>,
}

/// Result of trading three fragments for a relic.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelicRestore {
    pub relic: OwnedCard,
    /// Fragment keys consumed, in the order the caller presented them.
    pub consumed: Vec<String>,
}
