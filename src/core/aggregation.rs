// VoteTally - core/aggregation.rs
//
// Per-scope leaderboard, per-author score series, and best/worst extrema.
//
// Invariants maintained by `ScopeAggregation::record`:
//   - leaderboard[author].score == Σ series[author] scores
//   - leaderboard[author].submitted == series[author].len()
//   - sequence numbers across the scope are exactly 1..=submitted
//   - best/worst are the max/min over every recorded score (strict
//     replacement, so ties keep the earlier record)
//
// Updates are commutative sums and comparisons, so the state reached after a
// batch of records does not depend on their order, apart from which
// submission a sequence number is assigned to.

use crate::core::model::{ChannelId, ExtremumRecord, ScopeId, SubmissionId, UserId};
use crate::util::constants::{BEST_SENTINEL_SCORE, WORST_SENTINEL_SCORE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Document building blocks
// =============================================================================

/// An author's running total on the leaderboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub score: i64,
    pub submitted: u64,
}

/// One scored submission in an author's series: `[score, sequence]` on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(i64, u64)", into = "(i64, u64)")]
pub struct SeriesPoint {
    pub score: i64,
    pub sequence: u64,
}

impl From<(i64, u64)> for SeriesPoint {
    fn from((score, sequence): (i64, u64)) -> Self {
        Self { score, sequence }
    }
}

impl From<SeriesPoint> for (i64, u64) {
    fn from(p: SeriesPoint) -> Self {
        (p.score, p.sequence)
    }
}

/// Best and worst submissions of a scope. `None` until something is scored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRecords", into = "RawRecords")]
pub struct Extrema {
    pub best: Option<ExtremumRecord>,
    pub worst: Option<ExtremumRecord>,
}

impl Extrema {
    /// Offer a newly scored submission to both records.
    pub fn offer(&mut self, candidate: ExtremumRecord) {
        if self.best.map_or(true, |best| candidate.score > best.score) {
            self.best = Some(candidate);
        }
        if self.worst.map_or(true, |worst| candidate.score < worst.score) {
            self.worst = Some(candidate);
        }
    }
}

/// On-disk `records` object. Unset records are written as sentinel triples
/// with a zero submission ID, which is never a real platform ID.
#[derive(Serialize, Deserialize)]
struct RawRecords {
    best: (SubmissionId, ChannelId, i64),
    worst: (SubmissionId, ChannelId, i64),
}

fn record_from_triple(
    (submission, channel, score): (SubmissionId, ChannelId, i64),
) -> Option<ExtremumRecord> {
    (submission.0 != 0).then_some(ExtremumRecord {
        submission,
        channel,
        score,
    })
}

fn triple_from_record(
    record: Option<ExtremumRecord>,
    sentinel: i64,
) -> (SubmissionId, ChannelId, i64) {
    match record {
        Some(r) => (r.submission, r.channel, r.score),
        None => (SubmissionId(0), ChannelId(0), sentinel),
    }
}

impl From<RawRecords> for Extrema {
    fn from(raw: RawRecords) -> Self {
        Self {
            best: record_from_triple(raw.best),
            worst: record_from_triple(raw.worst),
        }
    }
}

impl From<Extrema> for RawRecords {
    fn from(e: Extrema) -> Self {
        Self {
            best: triple_from_record(e.best, BEST_SENTINEL_SCORE),
            worst: triple_from_record(e.worst, WORST_SENTINEL_SCORE),
        }
    }
}

// =============================================================================
// Query results
// =============================================================================

/// One ranked leaderboard line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub author: UserId,
    pub score: i64,
    pub submitted: u64,
    pub average: f64,
}

/// Ranked leaderboard plus scope-wide totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardSummary {
    pub rows: Vec<LeaderboardRow>,
    pub submitted: u64,
    /// Mean score over every scored submission; `None` before the first.
    pub average: Option<f64>,
}

/// Running total of one author over the scope's sequence axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CumulativeSeries {
    pub author: UserId,
    /// `totals[n]` is the author's total after the scope's n-th submission;
    /// `totals[0]` is always 0.
    pub totals: Vec<i64>,
}

// =============================================================================
// ScopeAggregation
// =============================================================================

/// All aggregated scores for one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ScopeDocument")]
pub struct ScopeAggregation {
    leaderboard: BTreeMap<UserId, Standing>,
    series: BTreeMap<UserId, Vec<SeriesPoint>>,
    submitted: u64,
    records: Extrema,
}

/// On-disk shape of a scope, as written by this and older versions.
///
/// Older documents may name the series `graph`, omit `records`, or hold a
/// sentinel on one side of `records` while the other is real.
#[derive(Deserialize)]
struct ScopeDocument {
    #[serde(default)]
    leaderboard: BTreeMap<UserId, Standing>,
    #[serde(default, alias = "graph")]
    series: BTreeMap<UserId, Vec<SeriesPoint>>,
    #[serde(default)]
    submitted: u64,
    #[serde(default)]
    records: Extrema,
}

impl From<ScopeDocument> for ScopeAggregation {
    fn from(doc: ScopeDocument) -> Self {
        let mut aggregation = Self {
            leaderboard: doc.leaderboard,
            series: doc.series,
            submitted: doc.submitted,
            records: doc.records,
        };
        aggregation.fill_missing_extrema();
        aggregation
    }
}

impl ScopeAggregation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one scored submission into the scope. Returns its sequence number.
    pub fn record(
        &mut self,
        author: UserId,
        submission: SubmissionId,
        channel: ChannelId,
        score: i64,
    ) -> u64 {
        let sequence = self.submitted + 1;

        let standing = self.leaderboard.entry(author).or_default();
        standing.score += score;
        standing.submitted += 1;

        self.series
            .entry(author)
            .or_default()
            .push(SeriesPoint { score, sequence });

        self.submitted = sequence;

        self.records.offer(ExtremumRecord {
            submission,
            channel,
            score,
        });

        sequence
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn standing(&self, author: UserId) -> Option<Standing> {
        self.leaderboard.get(&author).copied()
    }

    pub fn series(&self, author: UserId) -> &[SeriesPoint] {
        self.series.get(&author).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn extrema(&self) -> Extrema {
        self.records
    }

    pub(crate) fn set_extrema(&mut self, records: Extrema) {
        self.records = records;
    }

    /// A scope with scored submissions but an unset record gets that record
    /// back from its series. The submission behind it is unknown, so the
    /// record carries submission and channel 0 until the records are
    /// recalculated from history.
    fn fill_missing_extrema(&mut self) {
        if self.submitted == 0 {
            return;
        }
        let scores = || self.series.values().flatten().map(|p| p.score);
        let unknown = |score| ExtremumRecord {
            submission: SubmissionId(0),
            channel: ChannelId(0),
            score,
        };
        if self.records.best.is_none() {
            self.records.best = scores().max().map(unknown);
        }
        if self.records.worst.is_none() {
            self.records.worst = scores().min().map(unknown);
        }
    }

    pub fn authors(&self) -> impl Iterator<Item = &UserId> {
        self.leaderboard.keys()
    }

    /// Sequence number of the author's first scored submission.
    fn first_sequence(&self, author: &UserId) -> u64 {
        self.series
            .get(author)
            .and_then(|points| points.first())
            .map_or(u64::MAX, |p| p.sequence)
    }

    /// Leaderboard ranked by score descending. Ties go to whoever scored first.
    pub fn leaderboard(&self) -> LeaderboardSummary {
        let mut standings: Vec<(&UserId, &Standing)> = self.leaderboard.iter().collect();
        standings.sort_by(|a, b| {
            b.1.score
                .cmp(&a.1.score)
                .then_with(|| self.first_sequence(a.0).cmp(&self.first_sequence(b.0)))
        });

        let rows: Vec<LeaderboardRow> = standings
            .into_iter()
            .enumerate()
            .map(|(i, (author, standing))| LeaderboardRow {
                rank: i + 1,
                author: *author,
                score: standing.score,
                submitted: standing.submitted,
                average: average(standing.score, standing.submitted).unwrap_or(0.0),
            })
            .collect();

        let total_score: i64 = rows.iter().map(|r| r.score).sum();
        let submitted: u64 = rows.iter().map(|r| r.submitted).sum();

        LeaderboardSummary {
            rows,
            submitted,
            average: average(total_score, submitted),
        }
    }

    /// Score → number of submissions with that score, for one author or the
    /// whole scope.
    pub fn histogram(&self, author: Option<UserId>) -> BTreeMap<i64, u64> {
        let mut counts = BTreeMap::new();
        let points: Box<dyn Iterator<Item = &SeriesPoint>> = match author {
            Some(a) => Box::new(self.series(a).iter()),
            None => Box::new(self.series.values().flatten()),
        };
        for point in points {
            *counts.entry(point.score).or_insert(0) += 1;
        }
        counts
    }

    /// Running totals per author, highest final total first.
    pub fn cumulative(&self) -> Vec<CumulativeSeries> {
        let len = self.submitted as usize + 1;
        let mut out: Vec<CumulativeSeries> = self
            .series
            .iter()
            .map(|(author, points)| {
                let mut deltas = vec![0i64; len];
                for p in points {
                    if let Some(slot) = deltas.get_mut(p.sequence as usize) {
                        *slot += p.score;
                    }
                }
                let mut running = 0;
                let totals = deltas
                    .into_iter()
                    .map(|d| {
                        running += d;
                        running
                    })
                    .collect();
                CumulativeSeries {
                    author: *author,
                    totals,
                }
            })
            .collect();

        out.sort_by(|a, b| {
            let fa = a.totals.last().copied().unwrap_or(0);
            let fb = b.totals.last().copied().unwrap_or(0);
            fb.cmp(&fa).then_with(|| {
                self.first_sequence(&a.author)
                    .cmp(&self.first_sequence(&b.author))
            })
        });
        out
    }

    /// Verify the aggregation invariants. Used when loading persisted state.
    pub fn check_consistency(&self) -> Result<(), String> {
        if self.leaderboard.len() != self.series.len()
            || self.leaderboard.keys().ne(self.series.keys())
        {
            return Err("leaderboard and series list different authors".to_string());
        }

        let mut sequences: Vec<u64> = Vec::new();
        for (author, standing) in &self.leaderboard {
            let points = self.series(*author);
            let sum: i64 = points.iter().map(|p| p.score).sum();
            if sum != standing.score {
                return Err(format!(
                    "author {author} has score {} but series sums to {sum}",
                    standing.score
                ));
            }
            if points.len() as u64 != standing.submitted {
                return Err(format!(
                    "author {author} has {} submissions but {} series points",
                    standing.submitted,
                    points.len()
                ));
            }
            if points.windows(2).any(|w| w[0].sequence >= w[1].sequence) {
                return Err(format!("author {author} series is not in sequence order"));
            }
            sequences.extend(points.iter().map(|p| p.sequence));
        }

        sequences.sort_unstable();
        let expected = 1..=self.submitted;
        if sequences.len() as u64 != self.submitted || !sequences.into_iter().eq(expected) {
            return Err(format!(
                "sequence numbers are not exactly 1..={}",
                self.submitted
            ));
        }

        if let (Some(best), Some(worst)) = (self.records.best, self.records.worst) {
            if best.score < worst.score {
                return Err(format!(
                    "best score {} is below worst score {}",
                    best.score, worst.score
                ));
            }
        }
        Ok(())
    }
}

fn average(total: i64, count: u64) -> Option<f64> {
    (count > 0).then(|| total as f64 / count as f64)
}

// =============================================================================
// AggregationStore
// =============================================================================

/// Aggregations for every scope that has scored at least one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregationStore {
    scopes: BTreeMap<ScopeId, ScopeAggregation>,
}

impl AggregationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a scored submission into its scope, creating the scope lazily.
    pub fn record(
        &mut self,
        scope: ScopeId,
        author: UserId,
        submission: SubmissionId,
        channel: ChannelId,
        score: i64,
    ) -> u64 {
        self.scopes
            .entry(scope)
            .or_insert_with(|| {
                tracing::info!(scope = %scope, "First scored submission in scope");
                ScopeAggregation::new()
            })
            .record(author, submission, channel, score)
    }

    pub fn scope(&self, scope: ScopeId) -> Option<&ScopeAggregation> {
        self.scopes.get(&scope)
    }

    pub(crate) fn scope_mut(&mut self, scope: ScopeId) -> Option<&mut ScopeAggregation> {
        self.scopes.get_mut(&scope)
    }

    /// Swap in a rebuilt aggregation for `scope`.
    pub fn replace_scope(&mut self, scope: ScopeId, aggregation: ScopeAggregation) {
        self.scopes.insert(scope, aggregation);
    }

    pub fn scopes(&self) -> impl Iterator<Item = (&ScopeId, &ScopeAggregation)> {
        self.scopes.iter()
    }

    /// First scope (if any) that violates the aggregation invariants.
    pub fn check_consistency(&self) -> Result<(), (ScopeId, String)> {
        for (scope, aggregation) in &self.scopes {
            aggregation
                .check_consistency()
                .map_err(|reason| (*scope, reason))?;
        }
        Ok(())
    }
}
