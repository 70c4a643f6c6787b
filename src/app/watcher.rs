// wv2sleuth - app/watcher.rs
//
// Background discovery refresh loop with single-flight semantics.
//
// Architecture:
//   - `HostAppWatcher` lives on the consumer's thread; `run_watcher`
//     executes on a background thread that owns the `DiscoveryEngine`.
//   - A poll timer triggers Fast-mode refreshes; `request_refresh` injects
//     on-demand refreshes (e.g. a Thorough pass) through a trigger channel.
//   - `RefreshGate` (atomic compare-and-swap) enforces single-flight: a
//     refresh requested while one is in flight is absorbed — the caller
//     observes the in-flight pass's result on the same update channel
//     instead of starting a second scan.  Timer ticks landing mid-refresh
//     are likewise absorbed; there is no queueing and no cancellation of a
//     running pass.
//   - Results cross back over an mpsc channel; the consumer installs them
//     into `SessionState` on its own context (swap-then-notify), so no
//     reader ever observes the shared collection mid-mutation.

use crate::core::discovery::{DiscoveryEngine, DiscoveryOutcome};
use crate::core::model::DiscoveryMode;
use crate::util::constants::{
    MAX_WATCH_POLL_INTERVAL_MS, MIN_WATCH_POLL_INTERVAL_MS, WATCH_CANCEL_CHECK_INTERVAL_MS,
    WATCH_POLL_INTERVAL_MS,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

// =============================================================================
// Refresh gate
// =============================================================================

/// Single-flight guard for refresh passes.
///
/// Thread-safe by construction: `try_begin` is an atomic compare-and-swap,
/// so two racing callers cannot both start a pass regardless of which
/// threads they run on.
#[derive(Debug, Default)]
pub struct RefreshGate(AtomicBool);

impl RefreshGate {
    pub fn new() -> RefreshGate {
        RefreshGate(AtomicBool::new(false))
    }

    /// Claim the in-flight slot.  Returns false when a refresh is already
    /// running.
    pub fn try_begin(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn finish(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn in_flight(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// =============================================================================
// Watcher configuration
// =============================================================================

/// Configuration for the background refresh loop.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// How often the timer triggers a poll refresh (ms).  Clamped to the
    /// configured bounds.
    pub poll_interval_ms: u64,

    /// Mode used for timer-triggered refreshes.
    pub poll_mode: DiscoveryMode,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: WATCH_POLL_INTERVAL_MS,
            poll_mode: DiscoveryMode::Fast,
        }
    }
}

/// One message from the background loop to the consumer.
#[derive(Debug)]
pub enum WatchUpdate {
    /// A discovery pass completed (timer- or request-triggered).
    Pass(DiscoveryOutcome),
}

// =============================================================================
// HostAppWatcher
// =============================================================================

/// Manages the background refresh thread.
pub struct HostAppWatcher {
    /// Channel receiver for the consumer to poll pass results.
    update_rx: Option<mpsc::Receiver<WatchUpdate>>,

    /// Trigger sender for on-demand refreshes.
    trigger_tx: Option<mpsc::Sender<DiscoveryMode>>,

    /// Cancel flag shared with the background thread.
    cancel_flag: Option<Arc<AtomicBool>>,

    /// Single-flight gate shared with the background thread.
    gate: Arc<RefreshGate>,
}

impl HostAppWatcher {
    /// Create an inactive watcher.  No thread is started until `start`.
    pub fn new() -> HostAppWatcher {
        HostAppWatcher {
            update_rx: None,
            trigger_tx: None,
            cancel_flag: None,
            gate: Arc::new(RefreshGate::new()),
        }
    }

    /// Returns `true` if the background thread is currently running.
    pub fn is_active(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .map(|f| !f.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Whether a discovery pass is running right now.
    pub fn refresh_in_flight(&self) -> bool {
        self.gate.in_flight()
    }

    /// Start the background loop, transferring ownership of the engine to
    /// the watcher thread.  Calling `start` while active stops the previous
    /// thread first.
    pub fn start(&mut self, engine: DiscoveryEngine, config: WatchConfig) {
        self.stop();

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel_flag = Some(Arc::clone(&cancel));

        let (update_tx, update_rx) = mpsc::channel();
        self.update_rx = Some(update_rx);

        let (trigger_tx, trigger_rx) = mpsc::channel();
        self.trigger_tx = Some(trigger_tx);

        let gate = Arc::clone(&self.gate);

        std::thread::spawn(move || {
            run_watcher(engine, config, trigger_rx, update_tx, cancel, gate);
        });

        tracing::debug!("Host-app watcher started");
    }

    /// Request a refresh in the given mode.
    ///
    /// Returns false — the request was absorbed — when a refresh is already
    /// in flight; the in-flight pass's result arrives on the same update
    /// channel, which is what "awaiting the same task" means here.
    pub fn request_refresh(&self, mode: DiscoveryMode) -> bool {
        if self.gate.in_flight() {
            tracing::trace!(mode = mode.label(), "Refresh request absorbed (in flight)");
            return false;
        }
        match &self.trigger_tx {
            Some(tx) => tx.send(mode).is_ok(),
            None => false,
        }
    }

    /// Drain at most `max` pending pass results without blocking.
    pub fn poll_updates(&mut self, max: usize) -> Vec<WatchUpdate> {
        let Some(rx) = &self.update_rx else {
            return Vec::new();
        };
        let mut updates = Vec::with_capacity(max.min(4));
        loop {
            if updates.len() >= max {
                break;
            }
            match rx.try_recv() {
                Ok(u) => updates.push(u),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    // Background thread exited; clean up handles.
                    self.update_rx = None;
                    self.trigger_tx = None;
                    self.cancel_flag = None;
                    break;
                }
            }
        }
        updates
    }

    /// Signal the background thread to stop and drop the channels.
    /// A pass already in flight runs to completion; the whole refresh call
    /// is the unit of cancellable work.
    pub fn stop(&mut self) {
        if let Some(flag) = self.cancel_flag.take() {
            flag.store(true, Ordering::Relaxed);
        }
        self.update_rx = None;
        self.trigger_tx = None;
    }
}

impl Default for HostAppWatcher {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Background thread
// =============================================================================

/// Entry point for the background refresh thread.
///
/// Waits for a trigger (or the poll timer) in cancel-checkable
/// sub-intervals, runs one pass under the gate, publishes the outcome,
/// then absorbs any triggers that arrived while the pass was running.
fn run_watcher(
    mut engine: DiscoveryEngine,
    config: WatchConfig,
    trigger_rx: mpsc::Receiver<DiscoveryMode>,
    update_tx: mpsc::Sender<WatchUpdate>,
    cancel: Arc<AtomicBool>,
    gate: Arc<RefreshGate>,
) {
    let poll_interval = Duration::from_millis(
        config
            .poll_interval_ms
            .clamp(MIN_WATCH_POLL_INTERVAL_MS, MAX_WATCH_POLL_INTERVAL_MS),
    );
    let cancel_check = Duration::from_millis(WATCH_CANCEL_CHECK_INTERVAL_MS);

    tracing::debug!(
        poll_interval_ms = poll_interval.as_millis() as u64,
        poll_mode = config.poll_mode.label(),
        "Host-app watcher thread running"
    );

    loop {
        // Wait for a trigger or the poll deadline, checking the cancel flag
        // on every sub-interval so shutdown is prompt.
        let deadline = Instant::now() + poll_interval;
        let mode = loop {
            if cancel.load(Ordering::Relaxed) {
                tracing::debug!("Host-app watcher thread: cancel flag set, exiting");
                return;
            }
            match trigger_rx.recv_timeout(cancel_check) {
                Ok(mode) => break mode,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if Instant::now() >= deadline {
                        break config.poll_mode;
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    // Watcher handle dropped without stop(); exit cleanly.
                    return;
                }
            }
        };

        if !gate.try_begin() {
            // Another pass is somehow in flight (a racing external caller):
            // this tick is absorbed.
            continue;
        }
        let outcome = engine.discover(mode);
        gate.finish();

        if update_tx.send(WatchUpdate::Pass(outcome)).is_err() {
            // Consumer dropped the receiver; exit cleanly.
            tracing::debug!("Host-app watcher: receiver dropped, exiting");
            return;
        }

        // Triggers that arrived while the pass ran are absorbed, not
        // queued: their callers already observe the result just published.
        while trigger_rx.try_recv().is_ok() {}
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_single_flight() {
        let gate = RefreshGate::new();
        assert!(!gate.in_flight());
        assert!(gate.try_begin());
        assert!(gate.in_flight());
        assert!(!gate.try_begin(), "second begin must be refused");
        gate.finish();
        assert!(gate.try_begin());
    }

    #[test]
    fn test_request_refresh_absorbed_while_in_flight() {
        let watcher = HostAppWatcher::new();
        // Simulate an in-flight pass without a background thread.
        assert!(watcher.gate.try_begin());
        assert!(!watcher.request_refresh(DiscoveryMode::Fast));
        watcher.gate.finish();
        // No thread running: the trigger channel is absent, so the request
        // still reports false rather than panicking.
        assert!(!watcher.request_refresh(DiscoveryMode::Fast));
    }

    #[test]
    fn test_inactive_watcher_polls_empty() {
        let mut watcher = HostAppWatcher::new();
        assert!(!watcher.is_active());
        assert!(watcher.poll_updates(8).is_empty());
        // stop() on an inactive watcher is a no-op.
        watcher.stop();
    }
}
