//! Shared constants
//!
//! Values other processes depend on (file names, table layout, timing
//! windows) live here so the main application and the background hosts
//! agree on them.

use std::time::Duration;

/// Shared container layout
pub mod container {
    /// Directory name under the platform data dir when no container is given
    pub const DEFAULT_DIR_NAME: &str = "herald";
    /// Subdirectory standing in for the OS application group container
    pub const GROUP_DIR_NAME: &str = "group";
    /// Environment override for the container location
    pub const ENV_CONTAINER_DIR: &str = "HERALD_CONTAINER_DIR";
    /// SQLite file shared with the main application
    pub const DATABASE_FILE: &str = "common.sqlite";
    /// Key/value defaults written through the bridge
    pub const DEFAULTS_FILE: &str = "defaults.json";
    /// Displayed notifications registry used by desktop hosts
    pub const NOTIFICATIONS_FILE: &str = "notifications.json";
    /// Log directory name
    pub const LOGS_DIR: &str = "logs";
}

/// Distributed lock timing
pub mod locks {
    use super::Duration;

    /// A lock older than this is considered abandoned
    pub const TTL: Duration = Duration::from_secs(30);
    /// Delay between acquisition attempts
    pub const POLL_INTERVAL: Duration = Duration::from_millis(200);
}

/// VoIP call admission
pub mod calls {
    use super::Duration;

    /// Repeated pushes for the same call within this window are not reported again
    pub const DEDUP_WINDOW: Duration = Duration::from_secs(15);
}

/// Remote API
pub mod api {
    use super::Duration;

    /// Defaults key holding the API base URL
    pub const URL_KEY: &str = "url";
    /// Defaults key holding the GraphQL endpoint path
    pub const ENDPOINT_KEY: &str = "endpoint";
    /// Per-request timeout; the OS budget for background work is tight
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    /// Environment override for the request timeout, in seconds
    pub const ENV_REQUEST_TIMEOUT: &str = "HERALD_REQUEST_TIMEOUT_SECS";
    pub const USER_AGENT: &str = concat!("Herald/", env!("CARGO_PKG_VERSION"));
}

/// Log tee for `redirectStdOut`
pub mod logs {
    pub const TEE_FILE: &str = "app.log";
    pub const TEE_MAX_BYTES: u64 = 5 * 1024 * 1024;
}
