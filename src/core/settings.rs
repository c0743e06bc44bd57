// VoteTally - core/settings.rs
//
// Per-scope settings: which channel is watched, how long voting stays open,
// and what each reaction is worth.
//
// Lookups never fail: a scope with nothing configured gets the system
// defaults. Setters validate; the engine trusts whatever is stored.
//
// Timers are stored in hours (the unit operators type) and converted to
// `chrono::Duration` here and nowhere else.

use crate::core::model::{ChannelId, Emoji, ScopeId, VoteWeightKey};
use crate::util::constants::{DEFAULT_TIMER_HOURS, MAX_TIMER_HOURS};
use crate::util::error::SettingsError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Convert a configured number of hours to a millisecond-precision duration.
///
/// `None` when the value is not finite or does not fit a `Duration`.
pub fn hours_to_duration(hours: f64) -> Option<Duration> {
    let millis = (hours * 3_600_000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    Duration::try_milliseconds(millis as i64)
}

/// Validate a voting window for use as a default or per-scope timer.
pub fn validate_timer_hours(hours: f64) -> Result<f64, SettingsError> {
    if hours.is_finite() && hours > 0.0 && hours <= MAX_TIMER_HOURS {
        Ok(hours)
    } else {
        Err(SettingsError::TimerOutOfRange {
            hours,
            max: MAX_TIMER_HOURS,
        })
    }
}

/// Settings for every scope, as persisted in `scopes.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeSettings {
    #[serde(default, alias = "meme_channels")]
    channels: BTreeMap<ScopeId, ChannelId>,
    #[serde(default, alias = "meme_timers")]
    timers: BTreeMap<ScopeId, f64>,
    #[serde(default)]
    keys: BTreeMap<ScopeId, VoteWeightKey>,
    /// Fallback window for scopes without a timer. Operator config, not persisted.
    #[serde(skip, default = "default_timer_hours")]
    default_timer_hours: f64,
}

fn default_timer_hours() -> f64 {
    DEFAULT_TIMER_HOURS
}

/// The system default voting window.
pub fn default_window() -> Duration {
    Duration::minutes((DEFAULT_TIMER_HOURS * 60.0) as i64)
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            channels: BTreeMap::new(),
            timers: BTreeMap::new(),
            keys: BTreeMap::new(),
            default_timer_hours: DEFAULT_TIMER_HOURS,
        }
    }
}

impl ScopeSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the fallback voting window (from `[defaults] timer_hours`).
    pub fn with_default_timer_hours(mut self, hours: f64) -> Self {
        self.default_timer_hours = hours;
        self
    }

    // -- Lookups --

    /// The channel watched for submissions in `scope`, if one is bound.
    pub fn channel(&self, scope: ScopeId) -> Option<ChannelId> {
        self.channels.get(&scope).copied()
    }

    /// The configured voting window in hours, or the default.
    pub fn timer_hours(&self, scope: ScopeId) -> f64 {
        self.timers
            .get(&scope)
            .copied()
            .unwrap_or(self.default_timer_hours)
    }

    /// The voting window for submissions opened in `scope`.
    ///
    /// A stored timer too large to represent falls back to the system default.
    pub fn voting_window(&self, scope: ScopeId) -> Duration {
        let hours = self.timer_hours(scope);
        hours_to_duration(hours).unwrap_or_else(|| {
            tracing::warn!(
                scope = %scope,
                hours,
                "Stored timer is out of range; using default"
            );
            default_window()
        })
    }

    /// The effective vote key for `scope`. An empty configured key counts as
    /// unconfigured.
    pub fn key(&self, scope: ScopeId) -> VoteWeightKey {
        match self.keys.get(&scope) {
            Some(key) if !key.is_empty() => key.clone(),
            _ => VoteWeightKey::default(),
        }
    }

    /// Every scope with at least one explicit setting.
    pub fn scopes(&self) -> BTreeSet<ScopeId> {
        self.channels
            .keys()
            .chain(self.timers.keys())
            .chain(self.keys.keys())
            .copied()
            .collect()
    }

    // -- Setters --

    pub fn bind_channel(&mut self, scope: ScopeId, channel: ChannelId) {
        self.channels.insert(scope, channel);
    }

    pub fn set_timer_hours(&mut self, scope: ScopeId, hours: f64) -> Result<(), SettingsError> {
        let hours = validate_timer_hours(hours)?;
        self.timers.insert(scope, hours);
        Ok(())
    }

    /// Add a voting option, starting from the scope's effective key.
    pub fn add_emoji(
        &mut self,
        scope: ScopeId,
        emoji: Emoji,
        weight: i64,
    ) -> Result<(), SettingsError> {
        let mut key = self.key(scope);
        if key.contains(&emoji) {
            return Err(SettingsError::DuplicateEmoji { emoji: emoji.0 });
        }
        key.insert(emoji, weight);
        self.keys.insert(scope, key);
        Ok(())
    }

    /// Remove a voting option. Submissions still open stop counting it too.
    pub fn remove_emoji(&mut self, scope: ScopeId, emoji: &Emoji) -> Result<(), SettingsError> {
        let mut key = self.key(scope);
        if key.remove(emoji).is_none() {
            return Err(SettingsError::UnknownEmoji {
                emoji: emoji.0.clone(),
            });
        }
        self.keys.insert(scope, key);
        Ok(())
    }
}
