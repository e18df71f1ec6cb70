use std::time::Duration;

/// Idle time after which a heartbeat is written to the gateway.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);
