// VoteTally - app/poller.rs
//
// Expiry poller: runs `Engine::run_expiry_cycle` on a fixed interval on a
// background thread.
//
// Architecture:
//   - `ExpiryPoller` lives with the caller; `run_poll_loop` runs on the
//     background thread.
//   - An `Arc<AtomicBool>` cancel flag stops the loop.
//   - Cycle results are sent as `PollProgress` over an mpsc channel and
//     drained by `poll_progress` (or awaited with `wait_progress`).
//
// Error handling:
//   - Per-submission platform failures are absorbed inside the cycle.
//   - A durable-write failure is fatal: the loop sends `Failed` and exits.
//   - The poll interval is slept in cancel-check slices, so a stop request is
//     honoured within one slice.

use crate::app::engine::Engine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

/// Progress messages from the poll thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollProgress {
    Started,
    CycleCompleted {
        scored: usize,
        dropped: usize,
        pending: usize,
    },
    /// The loop exited after a stop request.
    Stopped,
    /// The loop exited on a fatal error.
    Failed { message: String },
}

/// Drives periodic expiry sweeps on a background thread.
pub struct ExpiryPoller {
    progress_rx: Option<mpsc::Receiver<PollProgress>>,
    cancel_flag: Option<Arc<AtomicBool>>,
    handle: Option<JoinHandle<()>>,
}

impl ExpiryPoller {
    pub fn new() -> Self {
        Self {
            progress_rx: None,
            cancel_flag: None,
            handle: None,
        }
    }

    /// Start sweeping every `interval`. The first sweep runs immediately so
    /// deadlines that passed while the engine was down are honoured at once.
    ///
    /// A poller that is already running is stopped first.
    pub fn start(&mut self, engine: Arc<Engine>, interval: Duration, cancel_check: Duration) {
        self.stop();

        let (tx, rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        self.progress_rx = Some(rx);
        self.cancel_flag = Some(Arc::clone(&cancel));

        self.handle = Some(std::thread::spawn(move || {
            run_poll_loop(&engine, interval, cancel_check, &tx, &cancel);
        }));

        tracing::info!(interval_secs = interval.as_secs_f64(), "Expiry poller started");
    }

    /// Stop the poll thread and wait for it to exit.
    ///
    /// Progress sent before the thread exited stays available to
    /// `poll_progress`.
    pub fn stop(&mut self) {
        if let Some(flag) = self.cancel_flag.take() {
            flag.store(true, Ordering::SeqCst);
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Expiry poller thread panicked");
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel_flag.is_some()
    }

    /// Drain all queued progress messages without blocking.
    pub fn poll_progress(&self) -> Vec<PollProgress> {
        let mut messages = Vec::new();
        if let Some(ref rx) = self.progress_rx {
            while let Ok(msg) = rx.try_recv() {
                messages.push(msg);
            }
        }
        messages
    }

    /// Wait up to `timeout` for the next progress message.
    pub fn wait_progress(&self, timeout: Duration) -> Option<PollProgress> {
        self.progress_rx.as_ref()?.recv_timeout(timeout).ok()
    }
}

impl Default for ExpiryPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ExpiryPoller {
    fn drop(&mut self) {
        if let Some(flag) = &self.cancel_flag {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

fn run_poll_loop(
    engine: &Engine,
    interval: Duration,
    cancel_check: Duration,
    tx: &mpsc::Sender<PollProgress>,
    cancel: &AtomicBool,
) {
    macro_rules! send {
        ($msg:expr) => {
            if tx.send($msg).is_err() {
                // Receiver dropped.
                return;
            }
        };
    }

    send!(PollProgress::Started);

    let slice = cancel_check.max(Duration::from_millis(1));
    let slices = (interval.as_millis() / slice.as_millis()).max(1);

    loop {
        if cancel.load(Ordering::SeqCst) {
            send!(PollProgress::Stopped);
            return;
        }

        match engine.run_expiry_cycle() {
            Ok(report) => {
                if !report.scored.is_empty() || !report.dropped.is_empty() {
                    tracing::info!(
                        scored = report.scored.len(),
                        dropped = report.dropped.len(),
                        pending = report.pending,
                        "Expiry sweep complete"
                    );
                }
                send!(PollProgress::CycleCompleted {
                    scored: report.scored.len(),
                    dropped: report.dropped.len(),
                    pending: report.pending,
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "Expiry sweep failed; poller stopping");
                send!(PollProgress::Failed {
                    message: e.to_string(),
                });
                return;
            }
        }

        for _ in 0..slices {
            std::thread::sleep(slice);
            if cancel.load(Ordering::SeqCst) {
                send!(PollProgress::Stopped);
                return;
            }
        }
    }
}
