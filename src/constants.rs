//! Application constants for Artifact Fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain.

use std::time::Duration;

/// Rule key format
pub mod keys {
    /// Number of raw bytes in a rule key (SHA-1 width)
    pub const RULE_KEY_BYTES: usize = 20;

    /// Number of hex characters in a rule key
    pub const RULE_KEY_HEX_LEN: usize = RULE_KEY_BYTES * 2;
}

/// User-facing status messages
pub mod messages {
    /// Reported when the key list is empty
    pub const NO_KEYS: &str = "No cache keys specified.";

    /// Reason attached to keys that were still pending when a run was cancelled
    pub const INTERRUPTED_REASON: &str = "fetch interrupted";
}

/// HTTP cache backend constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "artifact-fetcher/0.1.0";

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 25;

    /// Path segment under the base URL where artifacts are served
    pub const ARTIFACT_PATH: &str = "artifacts/key";

    /// Default rate limit for cache requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 50;
}

/// File operation constants
pub mod files {
    /// Temporary file suffix for atomic operations
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Prefix for the temporary output directory used when none is configured
    pub const OUTPUT_DIR_PREFIX: &str = "artifact-fetch-";

    /// Application directory name under the user's config directory
    pub const APP_DIR_NAME: &str = "artifact-fetcher";

    /// Project-local configuration file name
    pub const LOCAL_CONFIG_FILE: &str = "artifact-fetcher.toml";
}

/// Fetch orchestration constants
pub mod fetch {
    /// Default number of fetches allowed in flight at once
    pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

    /// Upper bound accepted for concurrent fetches
    pub const MAX_CONCURRENT_FETCHES: usize = 256;
}

/// Progress rendering constants
pub mod progress {
    /// Default refresh interval for the live display (milliseconds)
    pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 100;

    /// Fetches slower than this are rendered with the "slow" emphasis
    pub const DEFAULT_SLOW_FETCH_MS: u64 = 1_000;

    /// Fetches slower than this are rendered with the "very slow" emphasis
    pub const DEFAULT_VERY_SLOW_FETCH_MS: u64 = 10_000;

    /// Default locale tag for number formatting
    pub const DEFAULT_LOCALE: &str = "en-US";

    /// Default time zone offset for printed timestamps
    pub const DEFAULT_TIME_ZONE: &str = "+00:00";

    /// Header text shown once fetching has begun
    pub const HEADER_LABEL: &str = "FETCHING ARTIFACTS...";
}

/// Logging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}

// Re-export commonly used constants for convenience
pub use fetch::DEFAULT_MAX_CONCURRENT_FETCHES;
pub use http::USER_AGENT;
pub use keys::RULE_KEY_HEX_LEN;
pub use messages::NO_KEYS;
