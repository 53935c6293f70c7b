//! Connection identifiers.
//!
//! A `ConnId` names one live real-time connection. It is minted by the
//! gateway when a socket is accepted and dies with the socket; nothing
//! about it is persisted.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a live real-time connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnId(Uuid);

impl ConnId {
    /// Mint a fresh connection id.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short hex form for log lines.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique() {
        assert_ne!(ConnId::new(), ConnId::new());
    }

    #[test]
    fn test_short() {
        assert_eq!(ConnId::new().short().len(), 8);
    }

    #[test]
    fn test_json_roundtrip() {
        let id = ConnId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ConnId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
