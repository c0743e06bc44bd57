// VoteTally - core/registry.rs
//
// Submission registry: open submissions and their expiry deadlines.
//
// Persisted shape: { "<submission id>": [<channel id>, <expires at, epoch seconds>] }
// Expiry times are held as `DateTime<Utc>` and converted to fractional epoch
// seconds (millisecond precision) only at the document boundary.

use crate::core::model::{ChannelId, Submission, SubmissionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where an open submission lives and when its voting window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(ChannelId, f64)", into = "(ChannelId, f64)")]
pub struct RegistryEntry {
    pub channel: ChannelId,
    pub expires_at: DateTime<Utc>,
}

impl TryFrom<(ChannelId, f64)> for RegistryEntry {
    type Error = String;

    fn try_from((channel, secs): (ChannelId, f64)) -> Result<Self, Self::Error> {
        if !secs.is_finite() {
            return Err(format!("expiry time {secs} is not a finite number"));
        }
        let millis = (secs * 1_000.0).round() as i64;
        let expires_at = DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or_else(|| format!("expiry time {secs} is out of range"))?;
        Ok(Self {
            channel,
            expires_at,
        })
    }
}

impl From<RegistryEntry> for (ChannelId, f64) {
    fn from(entry: RegistryEntry) -> Self {
        (entry.channel, entry.expires_at.timestamp_millis() as f64 / 1_000.0)
    }
}

/// All submissions currently open for voting.
///
/// A submission appears at most once; reopening an ID already present is a
/// no-op so its original deadline is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionRegistry {
    entries: BTreeMap<SubmissionId, RegistryEntry>,
}

impl SubmissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an open submission. Returns `false` if it was already tracked.
    pub fn open(&mut self, submission: &Submission) -> bool {
        if self.entries.contains_key(&submission.id) {
            return false;
        }
        self.entries.insert(
            submission.id,
            RegistryEntry {
                channel: submission.channel,
                expires_at: submission.expires_at,
            },
        );
        true
    }

    pub fn get(&self, id: &SubmissionId) -> Option<&RegistryEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &SubmissionId) -> bool {
        self.entries.contains_key(id)
    }

    /// Every entry whose deadline is at or before `now`, oldest deadline first.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<(SubmissionId, RegistryEntry)> {
        let mut due: Vec<(SubmissionId, RegistryEntry)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(id, entry)| (*id, *entry))
            .collect();
        due.sort_by_key(|(id, entry)| (entry.expires_at, *id));
        due
    }

    pub fn remove(&mut self, id: &SubmissionId) -> Option<RegistryEntry> {
        self.entries.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SubmissionId, &RegistryEntry)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{ScopeId, UserId};
    use chrono::{Duration, TimeZone};

    fn submission(id: u64, expires_at: DateTime<Utc>) -> Submission {
        Submission {
            id: SubmissionId(id),
            channel: ChannelId(900),
            author: UserId(1),
            scope: ScopeId(10),
            opened_at: expires_at - Duration::hours(24),
            expires_at,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_reopen_keeps_original_deadline() {
        let mut registry = SubmissionRegistry::new();
        assert!(registry.open(&submission(1, t0())));
        assert!(!registry.open(&submission(1, t0() + Duration::hours(5))));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&SubmissionId(1)).unwrap().expires_at, t0());
    }

    #[test]
    fn test_due_collects_only_passed_deadlines() {
        let mut registry = SubmissionRegistry::new();
        registry.open(&submission(1, t0() - Duration::minutes(1)));
        registry.open(&submission(2, t0()));
        registry.open(&submission(3, t0() + Duration::seconds(1)));

        let due: Vec<u64> = registry.due(t0()).iter().map(|(id, _)| id.0).collect();
        assert_eq!(due, vec![1, 2]);
        assert_eq!(registry.len(), 3, "due() must not remove anything");
    }

    #[test]
    fn test_document_shape() {
        let mut registry = SubmissionRegistry::new();
        registry.open(&submission(77, t0()));
        let json = serde_json::to_value(&registry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "77": [900, t0().timestamp() as f64] })
        );
    }

    #[test]
    fn test_loads_fractional_and_integer_epoch_seconds() {
        let json = r#"{ "5": [12, 1700000000.25], "6": [12, 1700000000] }"#;
        let registry: SubmissionRegistry = serde_json::from_str(json).unwrap();
        let e5 = registry.get(&SubmissionId(5)).unwrap();
        assert_eq!(e5.expires_at.timestamp_millis(), 1_700_000_000_250);
        let e6 = registry.get(&SubmissionId(6)).unwrap();
        assert_eq!(e6.expires_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_rejects_malformed_entry() {
        let json = r#"{ "5": [12] }"#;
        assert!(serde_json::from_str::<SubmissionRegistry>(json).is_err());
    }
}
