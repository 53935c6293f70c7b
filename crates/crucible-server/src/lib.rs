//! Crucible server library
//!
//! TCP session gateway: the registry of live hosted games plus the wire
//! protocol that drives the ownership ledger.

pub mod constants;
pub mod gateway;
pub mod protocol;
pub mod registry;
pub mod server;

pub use gateway::Gateway;
pub use protocol::{ClientEvent, ErrorCode, ServerMessage};
pub use registry::{
    GameSession, PlayerPresence, PresenceInfo, RegistryError, Repair, SessionInfo,
    SessionRegistry, SessionView, TornDown,
};
