// VoteTally - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no platform
// dependencies. These types are the shared vocabulary across all layers.

use crate::util::constants;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Identifiers
// =============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Platform message ID of a submission.
    SubmissionId
);
id_type!(
    /// Channel a submission was posted in.
    ChannelId
);
id_type!(
    /// A platform user: submission author, voter, or the engine itself.
    UserId
);
id_type!(
    /// An isolated tenant (a server) with its own settings and aggregates.
    ScopeId
);

/// A reaction symbol: a unicode emoji or a platform custom-emoji token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Emoji(pub String);

impl Emoji {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The marker reaction shown while voting is open.
    pub fn voting_open_marker() -> Self {
        Self::new(constants::VOTING_OPEN_MARKER)
    }
}

impl fmt::Display for Emoji {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Emoji {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// Submissions
// =============================================================================

/// A unit of content open for timed voting.
///
/// The lifecycle is carried by type: a `Submission` is open while it sits in
/// the registry and becomes a `ScoredSubmission` exactly once, when the
/// expiry sweep removes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: SubmissionId,
    pub channel: ChannelId,
    pub author: UserId,
    pub scope: ScopeId,
    pub opened_at: DateTime<Utc>,
    /// Derived once at open time; never recomputed.
    pub expires_at: DateTime<Utc>,
}

/// Outcome of scoring one expired submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredSubmission {
    pub id: SubmissionId,
    pub channel: ChannelId,
    pub scope: ScopeId,
    pub author: UserId,
    pub score: i64,
    /// Position of this submission in its scope's series (1-based).
    pub sequence: u64,
}

// =============================================================================
// Reactions and fetched messages
// =============================================================================

/// Live count of one reaction type on a message, including the engine's seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionTally {
    pub emoji: Emoji,
    pub count: u32,
}

impl ReactionTally {
    pub fn new(emoji: impl Into<String>, count: u32) -> Self {
        Self {
            emoji: Emoji::new(emoji),
            count,
        }
    }
}

/// A message as returned by the platform at fetch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSnapshot {
    pub id: SubmissionId,
    pub channel: ChannelId,
    pub scope: ScopeId,
    pub author: UserId,
    pub author_is_bot: bool,
    pub reactions: Vec<ReactionTally>,
    /// Attachment URLs.
    pub attachments: Vec<String>,
    pub posted_at: DateTime<Utc>,
}

impl MessageSnapshot {
    /// Whether this message is eligible for voting: a human post carrying at
    /// least one attachment. Channel binding is checked by the caller.
    pub fn is_submission(&self) -> bool {
        !self.author_is_bot && !self.attachments.is_empty()
    }
}

// =============================================================================
// Vote weight key
// =============================================================================

/// Mapping from reaction symbol to integer point value for one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoteWeightKey(BTreeMap<Emoji, i64>);

impl VoteWeightKey {
    pub fn new(weights: impl IntoIterator<Item = (Emoji, i64)>) -> Self {
        Self(weights.into_iter().collect())
    }

    /// Points for a reaction; symbols outside the key are worth nothing.
    pub fn weight(&self, emoji: &Emoji) -> i64 {
        self.0.get(emoji).copied().unwrap_or(0)
    }

    pub fn contains(&self, emoji: &Emoji) -> bool {
        self.0.contains_key(emoji)
    }

    pub fn insert(&mut self, emoji: Emoji, weight: i64) {
        self.0.insert(emoji, weight);
    }

    pub fn remove(&mut self, emoji: &Emoji) -> Option<i64> {
        self.0.remove(emoji)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Voting options in presentation order: highest weight first, then by symbol.
    pub fn options(&self) -> Vec<(&Emoji, i64)> {
        let mut options: Vec<(&Emoji, i64)> = self.0.iter().map(|(e, w)| (e, *w)).collect();
        options.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        options
    }
}

impl Default for VoteWeightKey {
    fn default() -> Self {
        Self::new(
            constants::DEFAULT_VOTE_KEY
                .iter()
                .map(|(symbol, weight)| (Emoji::new(*symbol), *weight)),
        )
    }
}

// =============================================================================
// Extrema
// =============================================================================

/// Pointer to the highest or lowest scoring submission seen in a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtremumRecord {
    pub submission: SubmissionId,
    pub channel: ChannelId,
    pub score: i64,
}

// =============================================================================
// Internal events
// =============================================================================

/// A qualifying submission has been posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOpened {
    pub id: SubmissionId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub scope_id: ScopeId,
    pub timestamp: DateTime<Utc>,
}

/// A user added a reaction to some message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionObserved {
    pub message_id: SubmissionId,
    pub reactor_id: UserId,
    pub emoji: Emoji,
}

/// Events the engine consumes, as produced by the ingestor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboundEvent {
    SubmissionOpened(SubmissionOpened),
    ReactionObserved(ReactionObserved),
}
