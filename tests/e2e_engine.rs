// VoteTally - tests/e2e_engine.rs
//
// End-to-end tests for the voting lifecycle.
//
// These tests drive a real `Engine` over a real data directory on disk,
// with the in-memory chat platform and a manual clock standing in for the
// gateway and wall time. They cover the path from a posted message through
// vote guarding and expiry to the persisted aggregation documents.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;
use votetally::app::engine::{Engine, EventOutcome};
use votetally::app::ingest::PlatformEvent;
use votetally::app::poller::{ExpiryPoller, PollProgress};
use votetally::app::store::DocumentStore;
use votetally::core::model::{
    ChannelId, Emoji, InboundEvent, MessageSnapshot, ScopeId, SubmissionId, UserId,
};
use votetally::core::settings::ScopeSettings;
use votetally::platform::clock::{Clock, ManualClock};
use votetally::platform::memory::InMemoryPlatform;

// =============================================================================
// Helpers
// =============================================================================

const BOT: UserId = UserId(900);
const SCOPE: ScopeId = ScopeId(1);
const CHANNEL: ChannelId = ChannelId(50);
const ALICE: UserId = UserId(101);
const BOB: UserId = UserId(102);

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap()
}

/// Initialised data directory with `SCOPE` bound to `CHANNEL`.
fn data_dir() -> (TempDir, DocumentStore) {
    let dir = TempDir::new().unwrap();
    let store = DocumentStore::new(dir.path().join("data"));
    store.initialise().unwrap();
    let mut settings = ScopeSettings::new();
    settings.bind_channel(SCOPE, CHANNEL);
    store.save_settings(&settings).unwrap();
    (dir, store)
}

fn start(
    store: &DocumentStore,
    platform: &Arc<InMemoryPlatform>,
    clock: &Arc<ManualClock>,
) -> Arc<Engine> {
    Engine::start(store.clone(), platform.clone(), clock.clone(), 24.0).unwrap()
}

fn post(
    engine: &Engine,
    platform: &InMemoryPlatform,
    id: u64,
    author: UserId,
    at: DateTime<Utc>,
) -> SubmissionId {
    let message = MessageSnapshot {
        id: SubmissionId(id),
        channel: CHANNEL,
        scope: SCOPE,
        author,
        author_is_bot: false,
        reactions: Vec::new(),
        attachments: vec![format!("{id}.jpg")],
        posted_at: at,
    };
    platform.post(message.clone());
    let outcome = engine
        .dispatch(&PlatformEvent::MessagePosted(message))
        .unwrap();
    assert!(matches!(outcome, EventOutcome::Opened(_)), "{outcome:?}");
    SubmissionId(id)
}

fn vote(engine: &Engine, platform: &InMemoryPlatform, id: SubmissionId, user: u64, emoji: &str) {
    let observed = platform.react(id, UserId(user), emoji);
    engine
        .handle(InboundEvent::ReactionObserved(observed))
        .unwrap();
}

fn read_json(path: &std::path::Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

// =============================================================================
// Lifecycle E2E
// =============================================================================

/// Posts A, B, A scored 3, -1, 2 and checks the documents written to disk.
#[test]
fn e2e_three_submissions_update_leaderboard_series_and_records() {
    let (_dir, store) = data_dir();
    let platform = Arc::new(InMemoryPlatform::new(BOT));
    let clock = Arc::new(ManualClock::new(t0()));
    let engine = start(&store, &platform, &clock);

    let first = post(&engine, &platform, 1, ALICE, clock.now());
    clock.advance(Duration::minutes(1));
    let second = post(&engine, &platform, 2, BOB, clock.now());
    clock.advance(Duration::minutes(1));
    let third = post(&engine, &platform, 3, ALICE, clock.now());

    // 😍 x1 voter (2) + 👍 x1 voter (1) = 3
    vote(&engine, &platform, first, 201, "😍");
    vote(&engine, &platform, first, 202, "👍");
    // 👎 x1 voter = -1
    vote(&engine, &platform, second, 201, "👎");
    // 😍 x1 voter = 2
    vote(&engine, &platform, third, 202, "😍");

    clock.advance(Duration::hours(25));
    let report = engine.run_expiry_cycle().unwrap();
    let scores: Vec<(SubmissionId, i64, u64)> = report
        .scored
        .iter()
        .map(|s| (s.id, s.score, s.sequence))
        .collect();
    assert_eq!(scores, vec![(first, 3, 1), (second, -1, 2), (third, 2, 3)]);

    let board = engine.leaderboard(SCOPE).unwrap();
    assert_eq!(board.submitted, 3);
    assert_eq!(board.rows[0].author, ALICE);
    assert_eq!((board.rows[0].score, board.rows[0].submitted), (5, 2));
    assert_eq!(board.rows[1].author, BOB);
    assert_eq!((board.rows[1].score, board.rows[1].submitted), (-1, 1));

    let doc = read_json(&store.aggregation_path());
    let scope = &doc["1"];
    assert_eq!(scope["submitted"], 3);
    assert_eq!(scope["leaderboard"]["101"]["score"], 5);
    assert_eq!(scope["leaderboard"]["101"]["submitted"], 2);
    assert_eq!(scope["leaderboard"]["102"]["score"], -1);
    assert_eq!(scope["series"]["101"], serde_json::json!([[3, 1], [2, 3]]));
    assert_eq!(scope["series"]["102"], serde_json::json!([[-1, 2]]));
    assert_eq!(scope["records"]["best"], serde_json::json!([1, 50, 3]));
    assert_eq!(scope["records"]["worst"], serde_json::json!([2, 50, -1]));

    assert_eq!(read_json(&store.registry_path()), serde_json::json!({}));
}

/// Author votes and repeat votes are retracted; each voter keeps their first reaction.
#[test]
fn e2e_vote_guard_leaves_one_vote_per_voter() {
    let (_dir, store) = data_dir();
    let platform = Arc::new(InMemoryPlatform::new(BOT));
    let clock = Arc::new(ManualClock::new(t0()));
    let engine = start(&store, &platform, &clock);

    let id = post(&engine, &platform, 7, ALICE, t0());
    vote(&engine, &platform, id, ALICE.0, "😍");
    vote(&engine, &platform, id, ALICE.0, "👍");

    let voters: Vec<u64> = (300..310).collect();
    for voter in &voters {
        vote(&engine, &platform, id, *voter, "👍");
        vote(&engine, &platform, id, *voter, "🤮");
        vote(&engine, &platform, id, *voter, "😍");
    }

    assert!(platform.votes_of(id, ALICE).is_empty());
    for voter in &voters {
        assert_eq!(
            platform.votes_of(id, UserId(*voter)),
            vec![Emoji::from("👍")],
            "voter {voter}"
        );
    }

    clock.advance(Duration::hours(24));
    let report = engine.run_expiry_cycle().unwrap();
    assert_eq!(report.scored[0].score, voters.len() as i64);
}

/// Raw gateway reaction events go through the same guard; the engine's own are skipped.
#[test]
fn e2e_reaction_events_from_gateway_are_guarded() {
    let (_dir, store) = data_dir();
    let platform = Arc::new(InMemoryPlatform::new(BOT));
    let clock = Arc::new(ManualClock::new(t0()));
    let engine = start(&store, &platform, &clock);

    let id = post(&engine, &platform, 8, ALICE, t0());
    platform.react(id, ALICE, "😍");
    let outcome = engine
        .dispatch(&PlatformEvent::ReactionAdded {
            message: id,
            channel: CHANNEL,
            user: ALICE,
            emoji: Emoji::from("😍"),
        })
        .unwrap();
    assert!(matches!(outcome, EventOutcome::Judged(_)));
    assert!(platform.votes_of(id, ALICE).is_empty());

    // The engine's own seed reactions are never judged.
    let own = engine
        .dispatch(&PlatformEvent::ReactionAdded {
            message: id,
            channel: CHANNEL,
            user: BOT,
            emoji: Emoji::from("😍"),
        })
        .unwrap();
    assert_eq!(own, EventOutcome::Ignored);
    assert_eq!(platform.holders(id, "😍"), vec![BOT]);
}

/// The voting window starts when the engine opens the submission, even when
/// the gateway delivers the post long after it was made.
#[test]
fn e2e_late_delivered_submission_gets_full_window() {
    let (_dir, store) = data_dir();
    let platform = Arc::new(InMemoryPlatform::new(BOT));
    let clock = Arc::new(ManualClock::new(t0() + Duration::hours(30)));
    let engine = start(&store, &platform, &clock);

    let id = post(&engine, &platform, 9, ALICE, t0());
    let pending = engine.pending();
    assert_eq!(pending[0].0, id);
    assert_eq!(
        pending[0].1.expires_at,
        t0() + Duration::hours(30) + Duration::hours(24)
    );

    let report = engine.run_expiry_cycle().unwrap();
    assert!(report.scored.is_empty());
    assert!(report.dropped.is_empty());
    assert_eq!(report.pending, 1);
}

/// Opens and votes arriving from several threads while expiry sweeps run
/// leave a consistent aggregation with every submission scored once.
#[test]
fn e2e_live_events_during_sweeps_score_each_submission_once() {
    let (_dir, store) = data_dir();
    let platform = Arc::new(InMemoryPlatform::new(BOT));
    let clock = Arc::new(ManualClock::new(t0()));
    let engine = start(&store, &platform, &clock);

    const POSTERS: u64 = 4;
    const PER_POSTER: u64 = 25;

    let mut scored: Vec<SubmissionId> = std::thread::scope(|scope| {
        for poster in 0..POSTERS {
            let (engine, platform) = (&engine, &platform);
            scope.spawn(move || {
                for n in 0..PER_POSTER {
                    let id = 1_000 + poster * PER_POSTER + n;
                    let id = post(engine, platform, id, UserId(10 + poster), t0());
                    vote(engine, platform, id, 500 + n, "😍");
                    vote(engine, platform, id, 600 + n, "👎");
                    vote(engine, platform, id, 500 + n, "👍");
                }
            });
        }

        let sweeper = scope.spawn(|| {
            let mut ids = Vec::new();
            for _ in 0..50 {
                clock.advance(Duration::hours(1));
                let report = engine.run_expiry_cycle().unwrap();
                ids.extend(report.scored.iter().map(|s| s.id));
            }
            ids
        });
        sweeper.join().unwrap()
    });

    clock.advance(Duration::hours(48));
    let last = engine.run_expiry_cycle().unwrap();
    scored.extend(last.scored.iter().map(|s| s.id));
    assert!(engine.pending().is_empty());

    let total = (POSTERS * PER_POSTER) as usize;
    assert_eq!(scored.len(), total);
    assert_eq!(scored.iter().collect::<BTreeSet<_>>().len(), total);

    let board = engine.leaderboard(SCOPE).unwrap();
    assert_eq!(board.submitted, total as u64);
    assert_eq!(board.rows.iter().map(|r| r.submitted).sum::<u64>(), total as u64);

    // The load path runs the aggregation consistency check.
    let on_disk = store.load_aggregation().unwrap();
    assert!(on_disk.check_consistency().is_ok());
    assert_eq!(on_disk.scope(SCOPE).unwrap().submitted(), total as u64);
}

// =============================================================================
// Persistence E2E
// =============================================================================

/// A deadline that passed while the engine was down is honoured once on the first cycle.
#[test]
fn e2e_restart_scores_past_due_submission_exactly_once() {
    let (_dir, store) = data_dir();
    let platform = Arc::new(InMemoryPlatform::new(BOT));
    let clock = Arc::new(ManualClock::new(t0()));

    {
        let engine = start(&store, &platform, &clock);
        let id = post(&engine, &platform, 11, BOB, t0());
        vote(&engine, &platform, id, 201, "😍");
    }

    // Down for two days; the deadline passed while no engine was running.
    clock.advance(Duration::hours(48));
    let engine = start(&store, &platform, &clock);
    assert_eq!(engine.pending().len(), 1);

    let first = engine.run_expiry_cycle().unwrap();
    assert_eq!(first.scored.len(), 1);
    assert_eq!(first.scored[0].score, 2);

    let second = engine.run_expiry_cycle().unwrap();
    assert!(second.scored.is_empty());

    let after_restart = start(&store, &platform, &clock);
    assert!(after_restart.pending().is_empty());
    assert_eq!(after_restart.leaderboard(SCOPE).unwrap().submitted, 1);
}

/// Every cycle rewrites both documents, including one where nothing expired.
#[test]
fn e2e_idle_cycle_rewrites_documents() {
    let (_dir, store) = data_dir();
    let platform = Arc::new(InMemoryPlatform::new(BOT));
    let clock = Arc::new(ManualClock::new(t0()));
    let engine = start(&store, &platform, &clock);
    post(&engine, &platform, 12, ALICE, t0());

    std::fs::remove_file(store.aggregation_path()).unwrap();
    std::fs::remove_file(store.registry_path()).unwrap();

    let report = engine.run_expiry_cycle().unwrap();
    assert!(report.scored.is_empty());
    assert_eq!(read_json(&store.aggregation_path()), serde_json::json!({}));
    assert_eq!(store.load_registry().unwrap().len(), 1);
}

/// A failed registry write during scoring leaves nothing counted on disk, so
/// the restarted engine scores the submission exactly once.
#[test]
fn e2e_failed_registry_write_never_double_counts() {
    let (_dir, store) = data_dir();
    let platform = Arc::new(InMemoryPlatform::new(BOT));
    let clock = Arc::new(ManualClock::new(t0()));

    let registry_bytes = {
        let engine = start(&store, &platform, &clock);
        let id = post(&engine, &platform, 13, BOB, t0());
        vote(&engine, &platform, id, 201, "👍");
        let bytes = std::fs::read(store.registry_path()).unwrap();

        // A directory in place of the registry makes every registry save fail.
        std::fs::remove_file(store.registry_path()).unwrap();
        std::fs::create_dir(store.registry_path()).unwrap();

        clock.advance(Duration::hours(25));
        let err = engine.run_expiry_cycle().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(read_json(&store.aggregation_path()), serde_json::json!({}));
        bytes
    };

    std::fs::remove_dir(store.registry_path()).unwrap();
    std::fs::write(store.registry_path(), registry_bytes).unwrap();

    let engine = start(&store, &platform, &clock);
    let report = engine.run_expiry_cycle().unwrap();
    assert_eq!(report.scored.len(), 1);

    let restarted = start(&store, &platform, &clock);
    let board = restarted.leaderboard(SCOPE).unwrap();
    assert_eq!(board.submitted, 1);
    assert_eq!(board.rows.len(), 1);
    assert_eq!((board.rows[0].author, board.rows[0].submitted), (BOB, 1));
    assert!(restarted.pending().is_empty());
}

/// Documents written by the previous bot load and keep their sequence numbering.
#[test]
fn e2e_legacy_documents_load() {
    let (_dir, store) = data_dir();
    std::fs::write(
        store.registry_path(),
        r#"{ "31": [50, 1773511200.5] }"#,
    )
    .unwrap();
    std::fs::write(
        store.aggregation_path(),
        r#"{ "1": {
            "leaderboard": { "101": { "score": 4, "submitted": 1 } },
            "graph": { "101": [[4, 1]] },
            "submitted": 1,
            "records": { "best": [30, 50, 4], "worst": [30, 50, 4] }
        } }"#,
    )
    .unwrap();
    std::fs::write(
        store.scopes_path(),
        r#"{ "meme_channels": { "1": 50 }, "meme_timers": { "1": 0.5 } }"#,
    )
    .unwrap();

    let platform = Arc::new(InMemoryPlatform::new(BOT));
    let clock = Arc::new(ManualClock::new(t0()));
    let engine = start(&store, &platform, &clock);

    let pending = engine.pending();
    assert_eq!(pending[0].0, SubmissionId(31));
    assert_eq!(pending[0].1.expires_at.timestamp_millis(), 1_773_511_200_500);
    assert_eq!(engine.settings().channel(SCOPE), Some(CHANNEL));
    assert_eq!(engine.settings().voting_window(SCOPE), Duration::minutes(30));
    assert_eq!(engine.extrema(SCOPE).unwrap().best.unwrap().score, 4);

    // Next scored submission continues the sequence.
    let id = post(&engine, &platform, 32, BOB, t0());
    clock.advance(Duration::hours(1));
    let report = engine.run_expiry_cycle().unwrap();
    // Submission 31 is no longer on the platform and is dropped.
    assert_eq!(report.dropped, vec![SubmissionId(31)]);
    assert_eq!(report.scored[0].id, id);
    assert_eq!(report.scored[0].sequence, 2);
}

/// Startup refuses to run without the registry and aggregation documents.
#[test]
fn e2e_missing_documents_abort_startup() {
    let dir = TempDir::new().unwrap();
    let store = DocumentStore::new(dir.path());
    let platform = Arc::new(InMemoryPlatform::new(BOT));
    let clock = Arc::new(ManualClock::new(t0()));
    let err = Engine::start(store, platform, clock, 24.0).err().unwrap();
    assert!(err.is_fatal());
}

// =============================================================================
// Poller E2E
// =============================================================================

/// The poller sweeps at once on start and reports `Stopped` after `stop()`.
#[test]
fn e2e_poller_sweeps_immediately_and_stops_on_request() {
    let (_dir, store) = data_dir();
    let platform = Arc::new(InMemoryPlatform::new(BOT));
    let clock = Arc::new(ManualClock::new(t0()));
    let engine = start(&store, &platform, &clock);

    post(&engine, &platform, 21, ALICE, t0());
    clock.advance(Duration::hours(30));

    let mut poller = ExpiryPoller::new();
    poller.start(
        engine.clone(),
        std::time::Duration::from_secs(60),
        std::time::Duration::from_millis(10),
    );
    assert!(poller.is_active());

    let wait = std::time::Duration::from_secs(5);
    assert_eq!(poller.wait_progress(wait), Some(PollProgress::Started));
    assert_eq!(
        poller.wait_progress(wait),
        Some(PollProgress::CycleCompleted {
            scored: 1,
            dropped: 0,
            pending: 0,
        })
    );

    poller.stop();
    assert!(!poller.is_active());
    assert_eq!(poller.poll_progress(), vec![PollProgress::Stopped]);
    assert_eq!(engine.leaderboard(SCOPE).unwrap().submitted, 1);
}

/// A failed durable write ends the poll loop with `Failed`.
#[test]
fn e2e_poller_stops_on_failed_write() {
    let (_dir, store) = data_dir();
    let platform = Arc::new(InMemoryPlatform::new(BOT));
    let clock = Arc::new(ManualClock::new(t0()));
    let engine = start(&store, &platform, &clock);

    // A directory in place of the registry makes every registry save fail.
    std::fs::remove_file(store.registry_path()).unwrap();
    std::fs::create_dir(store.registry_path()).unwrap();

    let mut poller = ExpiryPoller::new();
    poller.start(
        engine,
        std::time::Duration::from_secs(60),
        std::time::Duration::from_millis(10),
    );

    let wait = std::time::Duration::from_secs(5);
    assert_eq!(poller.wait_progress(wait), Some(PollProgress::Started));
    assert!(matches!(
        poller.wait_progress(wait),
        Some(PollProgress::Failed { .. })
    ));
    poller.stop();
}
