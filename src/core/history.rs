// VoteTally - core/history.rs
//
// Recompute a scope's aggregates from its channel history.
//
// Used to repair records or migrate from data collected before the engine
// tracked a scope. History is walked oldest first. Submissions still present
// in the registry are skipped individually; scanning always continues past
// them so older, already expired submissions are never missed.

use crate::core::aggregation::{Extrema, ScopeAggregation};
use crate::core::model::{ExtremumRecord, MessageSnapshot, VoteWeightKey};
use crate::core::registry::SubmissionRegistry;
use crate::core::scoring;

/// Qualifying, closed submissions in chronological order with their scores.
fn closed_submissions<'a>(
    history: &'a [MessageSnapshot],
    registry: &SubmissionRegistry,
    key: &VoteWeightKey,
) -> Vec<(&'a MessageSnapshot, i64)> {
    let mut closed: Vec<&MessageSnapshot> = history
        .iter()
        .filter(|m| m.is_submission() && !registry.contains(&m.id))
        .collect();
    closed.sort_by_key(|m| (m.posted_at, m.id));
    closed
        .into_iter()
        .map(|m| (m, scoring::score(&m.reactions, key)))
        .collect()
}

/// Best and worst submission over the scope's closed history.
pub fn recalculate_records(
    history: &[MessageSnapshot],
    registry: &SubmissionRegistry,
    key: &VoteWeightKey,
) -> Extrema {
    let mut records = Extrema::default();
    for (message, score) in closed_submissions(history, registry, key) {
        records.offer(ExtremumRecord {
            submission: message.id,
            channel: message.channel,
            score,
        });
    }
    records
}

/// A fresh aggregation built from the scope's closed history, with sequence
/// numbers assigned in posting order.
pub fn rebuild_aggregation(
    history: &[MessageSnapshot],
    registry: &SubmissionRegistry,
    key: &VoteWeightKey,
) -> ScopeAggregation {
    let mut aggregation = ScopeAggregation::new();
    for (message, score) in closed_submissions(history, registry, key) {
        aggregation.record(message.author, message.id, message.channel, score);
    }
    aggregation
}
