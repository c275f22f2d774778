//! Project-wide constants.

use std::time::Duration;

/// Environment variable holding the configuration store connection string.
pub const DB_ENV_VAR: &str = "VECTOR_DB";

/// User-Agent sent when a request does not set one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/136.0.0.0 Safari/537.36 Edg/136.0.0.0";

/// Per-request HTTP timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for a single handler invocation in the runner's batch loop.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(300);

/// Exit status used when the run is interrupted with Ctrl+C.
pub const EXIT_INTERRUPTED: u8 = 130;
