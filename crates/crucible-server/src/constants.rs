//! Server configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Default TCP port for the crucible server.
pub const DEFAULT_PORT: u16 = 7717;

/// Default bind address. Game sessions are meant to be reachable over the
/// local network, so this binds every interface.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Default directory for per-game SQLite files.
pub const DEFAULT_GAMES_DIR: &str = "games";

/// Default directory for catalog data files.
pub const DEFAULT_DATA_DIR: &str = "data";

/// How often the registry is swept for entries whose connection is gone.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Environment variable overrides.
pub const ENV_PORT: &str = "CRUCIBLE_PORT";
pub const ENV_GAMES_DIR: &str = "CRUCIBLE_GAMES_DIR";
pub const ENV_DATA_DIR: &str = "CRUCIBLE_DATA_DIR";
