// wv2sleuth - core/probes.rs
//
// Leaf-level OS collaborator seams.  The discovery engine depends on these
// traits only; the platform layer provides the real implementations and the
// test suites provide fakes, so every correlation rule is testable without
// a live process tree.
//
// All traits are Send + Sync: Thorough mode fans module scans out across a
// rayon pool, and the watcher runs the whole engine on a background thread.

use crate::util::error::ProbeError;
use std::path::PathBuf;

// =============================================================================
// Process facts
// =============================================================================

/// Everything the inspector can tell about one process.
#[derive(Debug, Clone, Default)]
pub struct ProcessFacts {
    pub pid: u32,

    /// Short process name (executable file name).
    pub name: String,

    pub executable_path: Option<PathBuf>,

    /// Raw command line.  Tokenized on demand via `core::cmdline`.
    pub command_line: String,

    pub parent_pid: Option<u32>,

    pub integrity: crate::core::model::IntegrityLevel,
}

/// One window in a (possibly cross-process) hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowNode {
    /// Opaque window handle, valid only within the enumerator that
    /// produced it.
    pub handle: u64,

    /// Pid of the owning process.
    pub pid: u32,

    pub class_name: String,
}

// =============================================================================
// Collaborator traits
// =============================================================================

/// Enumerates processes and inspects individual pids.
pub trait ProcessInspector: Send + Sync {
    /// Every pid currently visible on the system.
    fn all_pids(&self) -> Vec<u32>;

    /// Inspect one pid.  Transient failures (`ProcessGone`, `AccessDenied`)
    /// are expected and handled per-pid by the engine.
    fn inspect(&self, pid: u32) -> Result<ProcessFacts, ProbeError>;
}

/// Enumerates the interesting loaded modules of a process.
pub trait ModuleEnumerator: Send + Sync {
    /// Full paths of loaded modules whose file name appears in the
    /// interesting-DLL list.  An empty Vec means the process is not a
    /// WebView2 actor.
    fn loaded_interesting_dlls(&self, pid: u32) -> Result<Vec<PathBuf>, ProbeError>;
}

/// Enumerates windows for hierarchy walking.
pub trait WindowEnumerator: Send + Sync {
    /// All top-level windows; `include_message_only` additionally yields
    /// hidden message-only windows (Thorough mode).
    fn top_level_windows(&self, include_message_only: bool) -> Vec<WindowNode>;

    /// Direct children of a window, in sibling order.
    fn child_windows(&self, handle: u64) -> Vec<WindowNode>;

    /// The window recorded in the cross-process child-window property, when
    /// the next hierarchy level lives in another process and no direct
    /// child handle exists.
    fn cross_process_child(&self, handle: u64) -> Option<WindowNode>;
}

/// Enumerates named-pipe object names in the OS pipe namespace.
pub trait PipeEnumerator: Send + Sync {
    fn pipe_names(&self) -> Result<Vec<String>, ProbeError>;
}
