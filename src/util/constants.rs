// VoteTally - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "VoteTally";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "VoteTally";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Voting defaults
// =============================================================================

/// Vote weights used by every scope that has not configured its own key.
pub const DEFAULT_VOTE_KEY: &[(&str, i64)] = &[("😍", 2), ("👍", 1), ("👎", -1), ("🤮", -2)];

/// Marker reaction seeded alongside the voting options while voting is open.
/// Removed by the engine once the submission has been scored.
pub const VOTING_OPEN_MARKER: &str = "🕒";

/// Voting window applied when a scope has no timer configured.
pub const DEFAULT_TIMER_HOURS: f64 = 24.0;

/// Upper bound accepted by the timer setter. The engine itself never clamps
/// a stored value.
pub const MAX_TIMER_HOURS: f64 = 48.0;

// =============================================================================
// Extrema sentinels (persisted document only)
// =============================================================================

/// Score written for `best` before any submission has been scored.
pub const BEST_SENTINEL_SCORE: i64 = -1;

/// Score written for `worst` before any submission has been scored.
pub const WORST_SENTINEL_SCORE: i64 = 100_000;

// =============================================================================
// Expiry poller
// =============================================================================

/// Default interval between expiry sweeps.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Minimum accepted poll interval.
pub const MIN_POLL_INTERVAL_SECS: u64 = 1;

/// Maximum accepted poll interval (one hour).
pub const MAX_POLL_INTERVAL_SECS: u64 = 3_600;

/// How often the poller wakes during its sleep to check for cancellation.
pub const DEFAULT_CANCEL_CHECK_INTERVAL_MS: u64 = 100;

/// Minimum accepted cancel-check slice.
pub const MIN_CANCEL_CHECK_INTERVAL_MS: u64 = 10;

/// Maximum accepted cancel-check slice.
pub const MAX_CANCEL_CHECK_INTERVAL_MS: u64 = 5_000;

// =============================================================================
// Logging
// =============================================================================

/// Default log level when neither RUST_LOG nor --debug nor config is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// =============================================================================
// File names
// =============================================================================

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Submission registry document.
pub const REGISTRY_FILE_NAME: &str = "registry.json";

/// Per-scope aggregation document.
pub const AGGREGATION_FILE_NAME: &str = "aggregation.json";

/// Per-scope settings document.
pub const SCOPES_FILE_NAME: &str = "scopes.json";
