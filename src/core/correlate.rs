// wv2sleuth - core/correlate.rs
//
// Window-hierarchy correlation: find the runtime processes rendering for a
// host by walking the host's window tree down to a known leaf class and
// reading the owner of the level below it.
//
// The walk is driven by an explore/include predicate pair: descend through
// child windows until a window's class is one of the leaf classes (the
// browser's web-content window or the core input-source window); include
// leaves; the next window level below a leaf — reached through the
// cross-process child-window property when the host has no direct child
// handle — belongs to the runtime.

use crate::core::probes::{WindowEnumerator, WindowNode};
use crate::util::constants::{
    CORE_INPUT_WINDOW_CLASS, MAX_WINDOW_WALK_DEPTH, WEB_CONTENT_WINDOW_CLASS,
};
use std::collections::{BTreeMap, BTreeSet};

/// Whether a window class terminates the descent.
pub fn is_leaf_class(class_name: &str) -> bool {
    class_name == WEB_CONTENT_WINDOW_CLASS || class_name == CORE_INPUT_WINDOW_CLASS
}

/// Pids of runtime processes correlated to `host_pid` through its window
/// hierarchy.  Used by Fast mode, per candidate host.
pub fn correlated_pids_for_host(
    windows: &dyn WindowEnumerator,
    host_pid: u32,
) -> BTreeSet<u32> {
    let mut found = BTreeSet::new();
    for top in windows.top_level_windows(false) {
        if top.pid != host_pid {
            continue;
        }
        descend(windows, &top, host_pid, 0, &mut found);
    }
    found
}

/// Global parent→children pid map from ALL top-level windows, including
/// hidden message-only windows.  Used by Thorough mode, one walk for the
/// whole system instead of one per candidate.
pub fn global_parent_child_map(windows: &dyn WindowEnumerator) -> BTreeMap<u32, BTreeSet<u32>> {
    let mut map: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
    for top in windows.top_level_windows(true) {
        let mut found = BTreeSet::new();
        descend(windows, &top, top.pid, 0, &mut found);
        if !found.is_empty() {
            map.entry(top.pid).or_default().extend(found);
        }
    }
    map
}

/// Explore one window: recurse into non-leaf children, harvest the owning
/// pids of the level below each leaf.
fn descend(
    windows: &dyn WindowEnumerator,
    node: &WindowNode,
    owner_pid: u32,
    depth: usize,
    found: &mut BTreeSet<u32>,
) {
    if depth >= MAX_WINDOW_WALK_DEPTH {
        tracing::trace!(
            handle = node.handle,
            depth,
            "Window walk depth limit reached"
        );
        return;
    }

    for child in windows.child_windows(node.handle) {
        if is_leaf_class(&child.class_name) {
            harvest_below_leaf(windows, &child, owner_pid, found);
        } else {
            descend(windows, &child, owner_pid, depth + 1, found);
        }
    }
}

/// Read the owning process of the window level below a leaf.  When the leaf
/// has no direct children the runtime's window is reachable only through
/// the cross-process child-window property.
fn harvest_below_leaf(
    windows: &dyn WindowEnumerator,
    leaf: &WindowNode,
    owner_pid: u32,
    found: &mut BTreeSet<u32>,
) {
    let below = windows.child_windows(leaf.handle);
    if below.is_empty() {
        if let Some(remote) = windows.cross_process_child(leaf.handle) {
            if remote.pid != 0 && remote.pid != owner_pid {
                found.insert(remote.pid);
            }
        }
        return;
    }
    for node in below {
        if node.pid != 0 && node.pid != owner_pid {
            found.insert(node.pid);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
