// VoteTally - platform/config.rs
//
// Platform-specific configuration, data directory resolution, and config.toml
// loading with startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::core::settings::validate_timer_hours;
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resolved platform paths for VoteTally data and configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/votetally/ or %APPDATA%\VoteTally\config\)
    pub config_dir: PathBuf,

    /// Data directory holding the registry, aggregation and scope documents.
    pub data_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let data_dir = proj_dirs.data_dir().to_path_buf();

            tracing::debug!(
                config = %config_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                data_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                config_dir: fallback.clone(),
                data_dir: fallback,
            }
        }
    }

    /// Default location of config.toml.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility -- a newer
/// config file can be used with an older binary without crashing.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[engine]` section.
    pub engine: EngineSection,
    /// `[defaults]` section.
    pub defaults: DefaultsSection,
    /// `[storage]` section.
    pub storage: StorageSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[engine]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Seconds between expiry sweeps.
    pub poll_interval_seconds: Option<u64>,
    /// Milliseconds between cancellation checks while the poller sleeps.
    pub cancel_check_interval_ms: Option<u64>,
}

/// `[defaults]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct DefaultsSection {
    /// Voting window for scopes without their own timer.
    pub timer_hours: Option<f64>,
}

/// `[storage]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Directory for the durable documents.
    pub data_dir: Option<String>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path (empty = stderr only).
    pub file: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// All values are validated against named constants at load time.
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // -- Engine --
    /// Interval between expiry sweeps.
    pub poll_interval: Duration,
    /// Sleep slice between cancellation checks.
    pub cancel_check_interval: Duration,

    // -- Defaults --
    /// Voting window for scopes without their own timer.
    pub default_timer_hours: f64,

    // -- Storage --
    /// Data directory override.
    pub data_dir: Option<PathBuf>,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
    /// Log file path.
    pub log_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(constants::DEFAULT_POLL_INTERVAL_SECS),
            cancel_check_interval: Duration::from_millis(
                constants::DEFAULT_CANCEL_CHECK_INTERVAL_MS,
            ),
            default_timer_hours: constants::DEFAULT_TIMER_HOURS,
            data_dir: None,
            log_level: None,
            log_file: None,
        }
    }
}

/// Load and validate `config.toml` from `config_path`.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// A missing file yields defaults with no warnings unless `required` is set
/// (the operator named the file explicitly). An unparseable file yields
/// defaults with a warning.
///
/// Runs before logging is initialised, so problems are returned rather than
/// logged; the caller reports them once tracing is up.
pub fn load_config(
    config_path: &Path,
    required: bool,
) -> Result<(AppConfig, Vec<String>), ConfigError> {
    let mut warnings: Vec<String> = Vec::new();

    let content = match std::fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if required {
                return Err(ConfigError::NotFound {
                    path: config_path.to_path_buf(),
                });
            }
            return Ok((AppConfig::default(), warnings));
        }
        Err(e) => {
            return Err(ConfigError::Io {
                path: config_path.to_path_buf(),
                source: e,
            })
        }
    };

    let raw: RawConfig = match toml::from_str(&content) {
        Ok(r) => r,
        Err(e) => {
            warnings.push(format!(
                "Failed to parse config file '{}': {e}. Using defaults.",
                config_path.display()
            ));
            return Ok((AppConfig::default(), warnings));
        }
    };

    let config = validate(raw, &mut warnings);
    Ok((config, warnings))
}

/// Validate each field against named constants, accumulating all warnings.
fn validate(raw: RawConfig, warnings: &mut Vec<String>) -> AppConfig {
    let mut config = AppConfig::default();

    // -- Engine: poll_interval_seconds --
    if let Some(secs) = raw.engine.poll_interval_seconds {
        if (constants::MIN_POLL_INTERVAL_SECS..=constants::MAX_POLL_INTERVAL_SECS)
            .contains(&secs)
        {
            config.poll_interval = Duration::from_secs(secs);
        } else {
            warnings.push(format!(
                "[engine] poll_interval_seconds = {secs} is out of range ({}-{}). Using default ({}).",
                constants::MIN_POLL_INTERVAL_SECS,
                constants::MAX_POLL_INTERVAL_SECS,
                constants::DEFAULT_POLL_INTERVAL_SECS,
            ));
        }
    }

    // -- Engine: cancel_check_interval_ms --
    if let Some(ms) = raw.engine.cancel_check_interval_ms {
        if (constants::MIN_CANCEL_CHECK_INTERVAL_MS..=constants::MAX_CANCEL_CHECK_INTERVAL_MS)
            .contains(&ms)
        {
            config.cancel_check_interval = Duration::from_millis(ms);
        } else {
            warnings.push(format!(
                "[engine] cancel_check_interval_ms = {ms} is out of range ({}-{}). Using default ({}).",
                constants::MIN_CANCEL_CHECK_INTERVAL_MS,
                constants::MAX_CANCEL_CHECK_INTERVAL_MS,
                constants::DEFAULT_CANCEL_CHECK_INTERVAL_MS,
            ));
        }
    }

    // -- Defaults: timer_hours --
    if let Some(hours) = raw.defaults.timer_hours {
        match validate_timer_hours(hours) {
            Ok(h) => config.default_timer_hours = h,
            Err(e) => warnings.push(format!(
                "[defaults] timer_hours: {e}. Using default ({}).",
                constants::DEFAULT_TIMER_HOURS,
            )),
        }
    }

    // -- Storage: data_dir --
    if let Some(dir) = raw.storage.data_dir {
        if !dir.is_empty() {
            config.data_dir = Some(PathBuf::from(dir));
        }
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.clone());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    // -- Logging: file --
    if let Some(file) = raw.logging.file {
        if !file.is_empty() {
            config.log_file = Some(PathBuf::from(file));
        }
    }

    config
}
