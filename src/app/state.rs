// wv2sleuth - app/state.rs
//
// Application state container: the live host-app and runtime collections,
// passed explicitly to the components that need them — no process-wide
// singletons.
//
// `EntrySet` is composition, not inheritance: a plain ordered container
// plus an explicit "changed" notification channel that consumers subscribe
// to.  Installation is a whole-vector swap followed by notification, so a
// consumer iterating a snapshot never observes the collection mid-mutation.

use crate::core::model::{HostAppEntry, RuntimeEntry};
use crate::util::constants::MAX_DISCOVERY_WARNINGS;
use std::sync::mpsc;

// =============================================================================
// EntrySet
// =============================================================================

/// Notification of one installed snapshot; carries the new generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotice {
    pub generation: u64,
}

/// Ordered container with swap-then-notify installation semantics.
///
/// Writes are confined to the owner's context: `install` replaces the
/// whole vector atomically with respect to any iteration a consumer does
/// over a borrowed slice, then notifies subscribers.  There is no locking
/// of the container itself.
#[derive(Debug)]
pub struct EntrySet<T> {
    items: Vec<T>,
    generation: u64,
    subscribers: Vec<mpsc::Sender<ChangeNotice>>,
}

// Hand-written so `T: Default` is not required — entries never need a
// default value for the container to start empty.
impl<T> Default for EntrySet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EntrySet<T> {
    pub fn new() -> EntrySet<T> {
        EntrySet {
            items: Vec::new(),
            generation: 0,
            subscribers: Vec::new(),
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Monotonic snapshot counter; bumps on every `install`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the whole collection, then notify subscribers.
    ///
    /// Subscribers whose receiver has been dropped are pruned here rather
    /// than accumulating dead senders.
    pub fn install(&mut self, items: Vec<T>) {
        self.items = items;
        self.generation += 1;
        let generation = self.generation;
        self.subscribers
            .retain(|tx| tx.send(ChangeNotice { generation }).is_ok());
    }

    /// Register a change observer.  Every `install` delivers one
    /// `ChangeNotice` until the receiver is dropped.
    pub fn subscribe(&mut self) -> mpsc::Receiver<ChangeNotice> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }
}

// =============================================================================
// Session state
// =============================================================================

/// Top-level application state: the live collections both subsystems feed,
/// plus accumulated non-fatal warnings.
///
/// Constructed once at startup and passed by reference to whatever
/// composes the subsystems; dropped (tearing down subscriptions) when the
/// session ends.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Discovered host apps, replaced wholesale per discovery pass.
    pub host_apps: EntrySet<HostAppEntry>,

    /// Located runtime installations.
    pub runtimes: EntrySet<RuntimeEntry>,

    /// Non-fatal warnings accumulated across passes, bounded.
    warnings: Vec<String>,
}

impl SessionState {
    pub fn new() -> SessionState {
        SessionState::default()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Append pass warnings, keeping the total bounded.
    pub fn push_warnings(&mut self, new: impl IntoIterator<Item = String>) {
        for w in new {
            if self.warnings.len() >= MAX_DISCOVERY_WARNINGS {
                break;
            }
            self.warnings.push(w);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
