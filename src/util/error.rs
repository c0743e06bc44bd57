// VoteTally - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// All errors preserve the causal chain for diagnostic logging.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all VoteTally operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum TallyError {
    /// Durable state could not be read or written. Always fatal.
    Store(StoreError),

    /// A call to the chat platform failed.
    Platform(PlatformError),

    /// A scope settings change was rejected.
    Settings(SettingsError),

    /// Operator configuration could not be loaded.
    Config(ConfigError),

    /// Export operation failed.
    Export(ExportError),
}

impl TallyError {
    /// Whether the process must stop rather than continue with diverging
    /// memory and disk state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

impl fmt::Display for TallyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "Persistence error: {e}"),
            Self::Platform(e) => write!(f, "Platform error: {e}"),
            Self::Settings(e) => write!(f, "Settings error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Export(e) => write!(f, "Export error: {e}"),
        }
    }
}

impl std::error::Error for TallyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Platform(e) => Some(e),
            Self::Settings(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Export(e) => Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors related to the durable documents (registry, aggregation, scopes).
#[derive(Debug)]
pub enum StoreError {
    /// A required document does not exist. Run `votetally init` first.
    Missing { path: PathBuf },

    /// A document exists but is not valid JSON of the expected shape.
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A document parsed but violates an aggregation invariant.
    Inconsistent {
        path: PathBuf,
        scope: u64,
        reason: String,
    },

    /// A document could not be serialised.
    Serialise {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { path } => write!(
                f,
                "Document '{}' does not exist. Run `votetally init` to create empty state.",
                path.display()
            ),
            Self::Corrupt { path, source } => {
                write!(f, "Document '{}' is corrupt: {source}", path.display())
            }
            Self::Inconsistent {
                path,
                scope,
                reason,
            } => write!(
                f,
                "Document '{}' is inconsistent for scope {scope}: {reason}",
                path.display()
            ),
            Self::Serialise { path, source } => {
                write!(f, "Failed to serialise '{}': {source}", path.display())
            }
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Corrupt { source, .. } => Some(source),
            Self::Serialise { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<StoreError> for TallyError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Platform errors
// ---------------------------------------------------------------------------

/// Errors returned by a [`ChatPlatform`](crate::platform::gateway::ChatPlatform).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The message or channel no longer exists (or is not visible).
    NotFound { what: &'static str, id: u64 },

    /// The reaction being removed is not present. Benign for retractions.
    ReactionAbsent,

    /// Any other transport or permission failure.
    Unavailable { reason: String },
}

impl PlatformError {
    /// Whether a retraction that failed with this error can be treated as done.
    pub fn is_benign_for_retraction(&self) -> bool {
        matches!(self, Self::ReactionAbsent | Self::NotFound { .. })
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { what, id } => write!(f, "{what} {id} not found"),
            Self::ReactionAbsent => write!(f, "reaction already removed"),
            Self::Unavailable { reason } => write!(f, "platform unavailable: {reason}"),
        }
    }
}

impl std::error::Error for PlatformError {}

impl From<PlatformError> for TallyError {
    fn from(e: PlatformError) -> Self {
        Self::Platform(e)
    }
}

// ---------------------------------------------------------------------------
// Settings errors
// ---------------------------------------------------------------------------

/// Rejected scope settings changes.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsError {
    /// Timer must be a positive number of hours no greater than `max`.
    TimerOutOfRange { hours: f64, max: f64 },

    /// The emoji is already a voting option.
    DuplicateEmoji { emoji: String },

    /// The emoji is not a voting option.
    UnknownEmoji { emoji: String },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimerOutOfRange { hours, max } => write!(
                f,
                "voting window of {hours} hours is out of range (must be > 0 and at most {max})"
            ),
            Self::DuplicateEmoji { emoji } => write!(f, "{emoji} is already a voting option"),
            Self::UnknownEmoji { emoji } => write!(f, "{emoji} is not a voting option"),
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<SettingsError> for TallyError {
    fn from(e: SettingsError) -> Self {
        Self::Settings(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
///
/// Parse and range problems are reported as warnings with default fallback;
/// only an explicitly requested file that cannot be read is an error.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file named on the command line does not exist.
    NotFound { path: PathBuf },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { path } => {
                write!(f, "Config file '{}' does not exist", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for TallyError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Errors related to export operations.
#[derive(Debug)]
pub enum ExportError {
    /// I/O error writing the export output.
    Io { source: io::Error },

    /// CSV serialisation error.
    Csv { source: csv::Error },

    /// JSON serialisation error.
    Json { source: serde_json::Error },

    /// The requested scope has no aggregation yet.
    UnknownScope { scope: u64 },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { source } => write!(f, "Export I/O error: {source}"),
            Self::Csv { source } => write!(f, "CSV export error: {source}"),
            Self::Json { source } => write!(f, "JSON export error: {source}"),
            Self::UnknownScope { scope } => {
                write!(f, "No scores recorded for scope {scope} yet")
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source } => Some(source),
            Self::Csv { source } => Some(source),
            Self::Json { source } => Some(source),
            Self::UnknownScope { .. } => None,
        }
    }
}

impl From<ExportError> for TallyError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

/// Convenience type alias for VoteTally results.
pub type Result<T> = std::result::Result<T, TallyError>;
