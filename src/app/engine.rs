// VoteTally - app/engine.rs
//
// The tally engine: one explicitly owned instance shared by `Arc` between the
// gateway's event loop, the expiry poller and query callers.
//
// Concurrency:
//   - All registry, aggregation and settings mutation happens under one
//     `Mutex<EngineState>`, and each mutation is persisted before the lock
//     is released.
//   - Platform calls are never made while the lock is held: each operation
//     reads what it needs, releases the lock, talks to the platform, then
//     re-acquires the lock to apply the result.
//   - A failed platform call only affects the submission it concerns. A
//     failed durable write is returned as a fatal `TallyError::Store`.

use crate::app::ingest::{self, PlatformEvent};
use crate::app::state::EngineState;
use crate::app::store::DocumentStore;
use crate::core::aggregation::{CumulativeSeries, Extrema, LeaderboardSummary};
use crate::core::history;
use crate::core::model::{
    Emoji, InboundEvent, ReactionObserved, ScopeId, ScoredSubmission, Submission, SubmissionId,
    SubmissionOpened, UserId,
};
use crate::core::registry::RegistryEntry;
use crate::core::scoring;
use crate::core::settings::{default_window, ScopeSettings};
use crate::core::vote_guard::{self, Verdict};
use crate::platform::clock::Clock;
use crate::platform::gateway::{self, ChatPlatform};
use crate::util::error::{Result, SettingsError, TallyError};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

// =============================================================================
// Outcomes
// =============================================================================

/// What the engine did with one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Not relevant: untracked message, engine's own reaction, duplicate open.
    Ignored,
    /// A submission was opened for voting.
    Opened(Submission),
    /// A reaction was judged by the vote guard.
    Judged(Verdict),
    /// The vote guard could not fetch the message; nothing was retracted.
    Unchecked,
}

/// Result of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub scored: Vec<ScoredSubmission>,
    /// Expired submissions whose message could not be fetched.
    pub dropped: Vec<SubmissionId>,
    /// Submissions still open after the sweep.
    pub pending: usize,
}

// =============================================================================
// Engine
// =============================================================================

pub struct Engine {
    state: Mutex<EngineState>,
    store: DocumentStore,
    platform: Arc<dyn ChatPlatform>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    /// Load persisted state from `store` and build an engine around it.
    ///
    /// Must complete before any events are fed in or the poller is started.
    /// Missing or corrupt documents are returned as fatal errors.
    pub fn start(
        store: DocumentStore,
        platform: Arc<dyn ChatPlatform>,
        clock: Arc<dyn Clock>,
        default_timer_hours: f64,
    ) -> Result<Arc<Self>> {
        let state = EngineState::load(&store, default_timer_hours)?;
        tracing::info!(
            open = state.registry.len(),
            dir = %store.data_dir().display(),
            "Engine state restored"
        );
        Ok(Arc::new(Self::new(state, store, platform, clock)))
    }

    pub fn new(
        state: EngineState,
        store: DocumentStore,
        platform: Arc<dyn ChatPlatform>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: Mutex::new(state),
            store,
            platform,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Engine state lock was poisoned; continuing with last state");
            poisoned.into_inner()
        })
    }

    // -------------------------------------------------------------------------
    // Event intake
    // -------------------------------------------------------------------------

    /// Adapt and handle a raw platform event.
    pub fn dispatch(&self, event: &PlatformEvent) -> Result<EventOutcome> {
        let inbound = {
            let state = self.lock();
            ingest::adapt(event, &state.settings, self.platform.self_id())
        };
        match inbound {
            Some(inbound) => self.handle(inbound),
            None => Ok(EventOutcome::Ignored),
        }
    }

    /// Handle an internal event.
    pub fn handle(&self, event: InboundEvent) -> Result<EventOutcome> {
        match event {
            InboundEvent::SubmissionOpened(opened) => Ok(self
                .open_submission(&opened)?
                .map_or(EventOutcome::Ignored, EventOutcome::Opened)),
            InboundEvent::ReactionObserved(reaction) => Ok(self.observe_reaction(&reaction)),
        }
    }

    /// Open a submission for voting: seed the voting options, then register
    /// it with a deadline of now plus the scope's voting window, fixed once.
    ///
    /// Returns `None` if the submission is already open.
    pub fn open_submission(&self, opened: &SubmissionOpened) -> Result<Option<Submission>> {
        let (window, options) = {
            let state = self.lock();
            if state.registry.contains(&opened.id) {
                tracing::debug!(submission = %opened.id, "Submission already open");
                return Ok(None);
            }
            let key = state.settings.key(opened.scope_id);
            let options: Vec<Emoji> = key
                .options()
                .into_iter()
                .map(|(e, _)| e.clone())
                .collect();
            (state.settings.voting_window(opened.scope_id), options)
        };

        let marker = Emoji::voting_open_marker();
        for emoji in options.iter().chain(std::iter::once(&marker)) {
            if let Err(e) = self
                .platform
                .add_reaction(opened.channel_id, opened.id, emoji)
            {
                tracing::warn!(
                    submission = %opened.id,
                    emoji = %emoji,
                    error = %e,
                    "Failed to seed voting reaction"
                );
            }
        }

        // The window starts when the engine opens the submission, not at the
        // message's post time.
        let opened_at = self.clock.now();
        let submission = Submission {
            id: opened.id,
            channel: opened.channel_id,
            author: opened.author_id,
            scope: opened.scope_id,
            opened_at,
            expires_at: deadline(opened_at, window),
        };

        let mut state = self.lock();
        if !state.registry.open(&submission) {
            return Ok(None);
        }
        self.store.save_registry(&state.registry)?;

        tracing::info!(
            submission = %submission.id,
            scope = %submission.scope,
            author = %submission.author,
            expires_at = %submission.expires_at,
            "Submission opened for voting"
        );
        Ok(Some(submission))
    }

    /// Run the vote guard for one added reaction.
    ///
    /// Only platform state is touched (retractions); engine state is read.
    pub fn observe_reaction(&self, reaction: &ReactionObserved) -> EventOutcome {
        let self_id = self.platform.self_id();
        if reaction.reactor_id == self_id {
            return EventOutcome::Ignored;
        }

        let Some(entry) = self.lock().registry.get(&reaction.message_id).copied() else {
            return EventOutcome::Ignored;
        };

        let message = match self
            .platform
            .fetch_message(entry.channel, reaction.message_id)
        {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(
                    submission = %reaction.message_id,
                    error = %e,
                    "Vote guard could not fetch submission"
                );
                return EventOutcome::Unchecked;
            }
        };

        let live = if reaction.reactor_id == message.author {
            Vec::new()
        } else {
            self.live_reactions(&message.reactions, entry, reaction)
        };

        let verdict = vote_guard::judge(
            reaction.reactor_id,
            &reaction.emoji,
            message.author,
            &live,
        );
        if verdict.retracts() {
            gateway::retract(
                self.platform.as_ref(),
                entry.channel,
                reaction.message_id,
                &reaction.emoji,
                reaction.reactor_id,
            );
            tracing::debug!(
                submission = %reaction.message_id,
                voter = %reaction.reactor_id,
                emoji = %reaction.emoji,
                verdict = ?verdict,
                "Reaction retracted"
            );
        }
        EventOutcome::Judged(verdict)
    }

    /// Holders of every reaction type other than the one just added.
    fn live_reactions(
        &self,
        tallies: &[crate::core::model::ReactionTally],
        entry: RegistryEntry,
        reaction: &ReactionObserved,
    ) -> Vec<(Emoji, Vec<UserId>)> {
        tallies
            .iter()
            .filter(|t| t.emoji != reaction.emoji)
            .filter_map(|t| {
                match self
                    .platform
                    .reactors(entry.channel, reaction.message_id, &t.emoji)
                {
                    Ok(users) => Some((t.emoji.clone(), users)),
                    Err(e) => {
                        tracing::warn!(
                            submission = %reaction.message_id,
                            emoji = %t.emoji,
                            error = %e,
                            "Could not list reactors"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Expiry
    // -------------------------------------------------------------------------

    /// Score and close every submission whose voting window has passed.
    ///
    /// Each expired submission is fetched without the lock held, then folded
    /// into its scope and removed from the registry in one locked, persisted
    /// step. Unfetchable submissions are dropped without scoring. State is
    /// persisted again at the end of every cycle, even when nothing expired.
    pub fn run_expiry_cycle(&self) -> Result<CycleReport> {
        let now = self.clock.now();
        let due = self.lock().registry.due(now);
        let self_id = self.platform.self_id();
        let mut report = CycleReport::default();

        if !due.is_empty() {
            tracing::debug!(due = due.len(), "Expiry sweep found closed submissions");
        }

        for (id, entry) in due {
            let message = match self.platform.fetch_message(entry.channel, id) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(
                        submission = %id,
                        channel = %entry.channel,
                        error = %e,
                        "Submission deleted or channel unavailable; dropping without a score"
                    );
                    let mut state = self.lock();
                    state.registry.remove(&id);
                    self.store.save_registry(&state.registry)?;
                    report.dropped.push(id);
                    continue;
                }
            };

            gateway::retract(
                self.platform.as_ref(),
                entry.channel,
                id,
                &Emoji::voting_open_marker(),
                self_id,
            );

            let mut state = self.lock();
            if state.registry.remove(&id).is_none() {
                // Closed by a concurrent sweep while we were fetching.
                continue;
            }
            let key = state.settings.key(message.scope);
            let score = scoring::score(&message.reactions, &key);
            let sequence =
                state
                    .aggregation
                    .record(message.scope, message.author, id, message.channel, score);
            state.persist(&self.store)?;

            tracing::info!(
                submission = %id,
                scope = %message.scope,
                author = %message.author,
                score,
                sequence,
                "Submission scored"
            );
            report.scored.push(ScoredSubmission {
                id,
                channel: message.channel,
                scope: message.scope,
                author: message.author,
                score,
                sequence,
            });
        }

        let state = self.lock();
        state.persist(&self.store)?;
        report.pending = state.registry.len();
        Ok(report)
    }

    // -------------------------------------------------------------------------
    // History rebuild
    // -------------------------------------------------------------------------

    fn scope_history(
        &self,
        scope: ScopeId,
    ) -> Result<Option<Vec<crate::core::model::MessageSnapshot>>> {
        let Some(channel) = self.lock().settings.channel(scope) else {
            tracing::warn!(scope = %scope, "No channel bound; nothing to rebuild");
            return Ok(None);
        };
        let mut history = self.platform.channel_history(channel)?;
        history.retain(|m| m.scope == scope);
        Ok(Some(history))
    }

    /// Recompute the best/worst records of `scope` from its channel history.
    ///
    /// Leaves leaderboard and series untouched. Has no effect on a scope that
    /// has never scored a submission.
    pub fn recalculate_records(&self, scope: ScopeId) -> Result<Option<Extrema>> {
        let Some(history) = self.scope_history(scope)? else {
            return Ok(None);
        };

        let mut state = self.lock();
        let key = state.settings.key(scope);
        let records = history::recalculate_records(&history, &state.registry, &key);
        let Some(aggregation) = state.aggregation.scope_mut(scope) else {
            return Ok(None);
        };
        aggregation.set_extrema(records);
        self.store.save_aggregation(&state.aggregation)?;

        tracing::info!(scope = %scope, "Records recalculated from history");
        Ok(Some(records))
    }

    /// Replace the whole aggregation of `scope` with one rebuilt from history.
    /// Returns the number of submissions scored.
    pub fn rebuild_scope(&self, scope: ScopeId) -> Result<Option<u64>> {
        let Some(history) = self.scope_history(scope)? else {
            return Ok(None);
        };

        let mut state = self.lock();
        let key = state.settings.key(scope);
        let rebuilt = history::rebuild_aggregation(&history, &state.registry, &key);
        let submitted = rebuilt.submitted();
        state.aggregation.replace_scope(scope, rebuilt);
        self.store.save_aggregation(&state.aggregation)?;

        tracing::info!(scope = %scope, submitted, "Scope rebuilt from history");
        Ok(Some(submitted))
    }

    // -------------------------------------------------------------------------
    // Settings
    // -------------------------------------------------------------------------

    /// Apply a settings change and persist it. Rejected changes leave both
    /// memory and disk untouched.
    pub fn update_settings<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut ScopeSettings) -> std::result::Result<(), SettingsError>,
    {
        let mut state = self.lock();
        let mut updated = state.settings.clone();
        change(&mut updated).map_err(TallyError::from)?;
        self.store.save_settings(&updated)?;
        state.settings = updated;
        Ok(())
    }

    pub fn settings(&self) -> ScopeSettings {
        self.lock().settings.clone()
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn leaderboard(&self, scope: ScopeId) -> Option<LeaderboardSummary> {
        self.lock()
            .aggregation
            .scope(scope)
            .map(|a| a.leaderboard())
    }

    pub fn histogram(&self, scope: ScopeId, author: Option<UserId>) -> BTreeMap<i64, u64> {
        self.lock()
            .aggregation
            .scope(scope)
            .map(|a| a.histogram(author))
            .unwrap_or_default()
    }

    pub fn cumulative(&self, scope: ScopeId) -> Vec<CumulativeSeries> {
        self.lock()
            .aggregation
            .scope(scope)
            .map(|a| a.cumulative())
            .unwrap_or_default()
    }

    pub fn extrema(&self, scope: ScopeId) -> Option<Extrema> {
        self.lock().aggregation.scope(scope).map(|a| a.extrema())
    }

    /// Open submissions, soonest deadline first.
    pub fn pending(&self) -> Vec<(SubmissionId, RegistryEntry)> {
        let state = self.lock();
        let mut pending: Vec<(SubmissionId, RegistryEntry)> =
            state.registry.iter().map(|(id, e)| (*id, *e)).collect();
        pending.sort_by_key(|(id, e)| (e.expires_at, *id));
        pending
    }
}

/// `opened_at + window`, falling back to the default window when the sum
/// does not fit a timestamp.
fn deadline(opened_at: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    opened_at
        .checked_add_signed(window)
        .or_else(|| {
            tracing::warn!(
                window_secs = window.num_seconds(),
                "Voting window overflows; using default"
            );
            opened_at.checked_add_signed(default_window())
        })
        .unwrap_or(opened_at)
}
