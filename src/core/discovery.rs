// wv2sleuth - core/discovery.rs
//
// Host-app discovery engine: finds WebView2 host processes and their
// runtime children from OS-level evidence only (named pipes, loaded
// modules, window hierarchies, process parentage), then reconciles the new
// snapshot against the previous one.
//
// Failure semantics: a discovery pass never fails outright.  Any error
// inspecting an individual pid (process exited mid-scan, access denied)
// drops that pid's contribution from the pass; backend-level oddities
// become warnings on the outcome.

use crate::core::cmdline::CommandLine;
use crate::core::correlate;
use crate::core::model::{DiscoveryMode, EntryStatus, HostAppEntry, ProcessRole, SdkInfo};
use crate::core::probes::{
    ModuleEnumerator, PipeEnumerator, ProcessFacts, ProcessInspector, WindowEnumerator,
};
use crate::util::constants::{MAX_DISCOVERY_WARNINGS, MOJO_PIPE_PATTERN, RUNTIME_EXE_NAME};
use crate::util::error::ProbeError;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

// =============================================================================
// Outcome
// =============================================================================

/// Result of one discovery pass, after reconciliation.
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    pub mode: DiscoveryMode,

    /// The reconciled entry set: fresh entries as Running, plus entries
    /// that disappeared since the previous same-mode pass as Terminated.
    pub entries: Vec<HostAppEntry>,

    /// Non-fatal warnings accumulated during the pass.
    pub warnings: Vec<String>,

    /// Wall-clock pass duration.
    pub duration: Duration,
}

// =============================================================================
// Pipe-name evidence
// =============================================================================

/// Extract the creating pid from a runtime IPC pipe name.
///
/// The runtime's IPC layer names its pipes after the creating process:
/// `mojo.4242.1.9` or `mojo.cvox_4242.1.9` — the pid is the second
/// dot-delimited field after an optional `label_` prefix.
pub fn pipe_creator_pid(pipe_name: &str) -> Option<u32> {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        regex::Regex::new(MOJO_PIPE_PATTERN).expect("pipe pattern constant must compile")
    });
    re.captures(pipe_name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Merge a fresh pass result with the previously stored set.
///
/// This is a last-writer union, not a pure diff: entries that disappeared
/// are kept for exactly one more pass as Terminated so a consumer can show
/// "this is now gone" before the entry drops out — UNLESS the pass mode
/// changed, in which case the absence is not meaningful (a less-thorough
/// pass may simply have missed a still-running process) and the old entry
/// is left out entirely.
pub fn reconcile(
    previous: &[HostAppEntry],
    previous_mode: Option<DiscoveryMode>,
    fresh: Vec<HostAppEntry>,
    mode: DiscoveryMode,
) -> Vec<HostAppEntry> {
    let same_mode = previous_mode == Some(mode);
    let mut merged = fresh;

    for old in previous {
        if merged.iter().any(|new| new.same_identity(old)) {
            // Present in both: the fresh version (fresh status, fresh
            // children) already won.
            continue;
        }
        if !same_mode {
            // Never mark Terminated across a mode change.
            continue;
        }
        if old.status == EntryStatus::Terminated {
            // Already emitted once; drop on this pass.
            continue;
        }
        let mut ghost = old.clone();
        ghost.status = EntryStatus::Terminated;
        merged.push(ghost);
    }

    merged
}

// =============================================================================
// Engine
// =============================================================================

/// Orchestrates the discovery strategies over the OS probe seams and keeps
/// the previous snapshot for reconciliation.
pub struct DiscoveryEngine {
    processes: Box<dyn ProcessInspector>,
    modules: Box<dyn ModuleEnumerator>,
    windows: Box<dyn WindowEnumerator>,
    pipes: Box<dyn PipeEnumerator>,

    /// Result of the previous `discover` call, post-reconciliation.
    previous: Vec<HostAppEntry>,

    /// Mode of the previous `discover` call.
    last_mode: Option<DiscoveryMode>,
}

impl DiscoveryEngine {
    pub fn new(
        processes: Box<dyn ProcessInspector>,
        modules: Box<dyn ModuleEnumerator>,
        windows: Box<dyn WindowEnumerator>,
        pipes: Box<dyn PipeEnumerator>,
    ) -> DiscoveryEngine {
        DiscoveryEngine {
            processes,
            modules,
            windows,
            pipes,
            previous: Vec::new(),
            last_mode: None,
        }
    }

    /// The stored snapshot from the most recent pass.
    pub fn entries(&self) -> &[HostAppEntry] {
        &self.previous
    }

    /// Run one discovery pass and reconcile against the stored snapshot.
    pub fn discover(&mut self, mode: DiscoveryMode) -> DiscoveryOutcome {
        let start = Instant::now();
        let mut warnings = Vec::new();

        let fresh = match mode {
            DiscoveryMode::Fast => self.fast_pass(&mut warnings),
            DiscoveryMode::Thorough => self.thorough_pass(&mut warnings),
        };

        tracing::debug!(
            mode = mode.label(),
            hosts = fresh.len(),
            warnings = warnings.len(),
            "Discovery pass complete"
        );

        let entries = reconcile(&self.previous, self.last_mode, fresh, mode);
        self.previous = entries.clone();
        self.last_mode = Some(mode);

        DiscoveryOutcome {
            mode,
            entries,
            warnings,
            duration: start.elapsed(),
        }
    }

    // -------------------------------------------------------------------------
    // Fast mode
    // -------------------------------------------------------------------------

    /// Low-overhead pass: candidate pids come from runtime IPC pipe names,
    /// then each candidate is confirmed by its loaded modules and
    /// correlated through its window hierarchy.
    fn fast_pass(&self, warnings: &mut Vec<String>) -> Vec<HostAppEntry> {
        let pipe_names = match self.pipes.pipe_names() {
            Ok(names) => names,
            Err(e) => {
                push_warning(warnings, format!("Pipe enumeration unavailable: {e}"));
                Vec::new()
            }
        };

        let candidates: BTreeSet<u32> =
            pipe_names.iter().filter_map(|n| pipe_creator_pid(n)).collect();

        tracing::trace!(
            pipes = pipe_names.len(),
            candidates = candidates.len(),
            "Fast pass: pipe candidates"
        );

        let mut hosts = Vec::new();
        for pid in candidates {
            match self.modules.loaded_interesting_dlls(pid) {
                Ok(dlls) if !dlls.is_empty() => {
                    if let Some(host) = self.build_host_entry(pid, dlls) {
                        hosts.push(host);
                    }
                }
                Ok(_) => {} // Pipe owner without WebView2 modules: not a host.
                Err(ProbeError::NotSupported) => {
                    push_warning(
                        warnings,
                        "Module enumeration not supported on this platform".to_string(),
                    );
                    break;
                }
                Err(e) => {
                    // Transient per-pid failure: drop this pid's contribution.
                    tracing::debug!(pid, error = %e, "Fast pass: candidate dropped");
                }
            }
        }

        for host in &mut hosts {
            let child_pids = correlate::correlated_pids_for_host(self.windows.as_ref(), host.pid);
            self.attach_children(host, &child_pids);
        }

        hosts
    }

    // -------------------------------------------------------------------------
    // Thorough mode
    // -------------------------------------------------------------------------

    /// Exhaustive pass: every process is module-scanned (in parallel), the
    /// whole window tree is walked once globally, and runtime processes
    /// whose window hierarchy was not discoverable are matched to hosts by
    /// the OS parent-process-id field.
    fn thorough_pass(&self, warnings: &mut Vec<String>) -> Vec<HostAppEntry> {
        let pids = self.processes.all_pids();

        // Inspect every pid up front; facts are reused by candidate
        // filtering, the name-based runtime match, and child building.
        // Per-pid failures drop that pid from the pass.
        let mut facts: BTreeMap<u32, ProcessFacts> = BTreeMap::new();
        for pid in &pids {
            match self.processes.inspect(*pid) {
                Ok(f) => {
                    facts.insert(*pid, f);
                }
                Err(e) => {
                    tracing::trace!(pid, error = %e, "Thorough pass: pid dropped");
                }
            }
        }

        // Parallel module scan across all surviving pids.
        let scan: Vec<(u32, Result<Vec<PathBuf>, ProbeError>)> = facts
            .keys()
            .copied()
            .collect::<Vec<u32>>()
            .par_iter()
            .map(|&pid| (pid, self.modules.loaded_interesting_dlls(pid)))
            .collect();

        let mut hosts = Vec::new();
        let mut module_probe_unsupported = false;
        for (pid, result) in scan {
            match result {
                Ok(dlls) if !dlls.is_empty() => {
                    // Runtime processes load the same DLL set; they are
                    // children, never host candidates.
                    if is_runtime_process(&facts[&pid]) {
                        continue;
                    }
                    if let Some(host) = self.build_host_entry_from_facts(&facts[&pid], dlls) {
                        hosts.push(host);
                    }
                }
                Ok(_) => {}
                Err(ProbeError::NotSupported) => module_probe_unsupported = true,
                Err(e) => {
                    tracing::debug!(pid, error = %e, "Thorough pass: candidate dropped");
                }
            }
        }
        if module_probe_unsupported {
            push_warning(
                warnings,
                "Module enumeration not supported on this platform".to_string(),
            );
        }

        // One global window walk (including message-only windows) instead of
        // one walk per candidate.
        let window_map = correlate::global_parent_child_map(self.windows.as_ref());

        // Runtime processes whose host window hierarchy was not
        // discoverable: match by the OS parent-process-id field.
        let mut by_parent: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
        for f in facts.values() {
            if is_runtime_process(f) {
                if let Some(parent) = f.parent_pid {
                    by_parent.entry(parent).or_default().insert(f.pid);
                }
            }
        }

        for host in &mut hosts {
            let mut child_pids: BTreeSet<u32> = BTreeSet::new();
            if let Some(found) = window_map.get(&host.pid) {
                child_pids.extend(found);
            }
            if let Some(found) = by_parent.get(&host.pid) {
                child_pids.extend(found);
            }
            self.attach_children_from_facts(host, &child_pids, &facts);
        }

        hosts
    }

    // -------------------------------------------------------------------------
    // Entry building
    // -------------------------------------------------------------------------

    /// Inspect a pid and build a Host entry.  Returns `None` — dropping the
    /// pid's contribution — on any probe failure.
    fn build_host_entry(&self, pid: u32, dlls: Vec<PathBuf>) -> Option<HostAppEntry> {
        match self.processes.inspect(pid) {
            Ok(facts) => self.build_host_entry_from_facts(&facts, dlls),
            Err(e) => {
                tracing::debug!(pid, error = %e, "Host entry dropped");
                None
            }
        }
    }

    fn build_host_entry_from_facts(
        &self,
        facts: &ProcessFacts,
        dlls: Vec<PathBuf>,
    ) -> Option<HostAppEntry> {
        let exe = facts
            .executable_path
            .clone()
            .or_else(|| {
                CommandLine::parse(&facts.command_line)
                    .executable()
                    .map(PathBuf::from)
            })
            .unwrap_or_else(|| PathBuf::from(&facts.name));

        let mut entry = HostAppEntry::new(ProcessRole::Host, exe, facts.pid);
        entry.parent_pid = facts.parent_pid;
        entry.integrity = facts.integrity;
        entry.sdk = SdkInfo::from_dlls(&dlls);
        entry.interesting_dlls = dlls;
        Some(entry)
    }

    /// Build child entries for the correlated pids and fold the browser
    /// child's identity (runtime path, user data dir, pid) into the host.
    fn attach_children(&self, host: &mut HostAppEntry, child_pids: &BTreeSet<u32>) {
        for &pid in child_pids {
            if pid == host.pid {
                continue;
            }
            match self.processes.inspect(pid) {
                Ok(facts) => self.attach_child_from_facts(host, &facts),
                Err(e) => {
                    tracing::debug!(pid, error = %e, "Correlated child dropped");
                }
            }
        }
    }

    fn attach_children_from_facts(
        &self,
        host: &mut HostAppEntry,
        child_pids: &BTreeSet<u32>,
        facts: &BTreeMap<u32, ProcessFacts>,
    ) {
        for &pid in child_pids {
            if pid == host.pid {
                continue;
            }
            if let Some(f) = facts.get(&pid) {
                self.attach_child_from_facts(host, f);
            }
        }
    }

    fn attach_child_from_facts(&self, host: &mut HostAppEntry, facts: &ProcessFacts) {
        let cmd = CommandLine::parse(&facts.command_line);
        let role = ProcessRole::from_type_flag(cmd.key_value("--type"));
        let user_data = cmd.key_value("--user-data-dir").map(PathBuf::from);

        let exe = facts
            .executable_path
            .clone()
            .or_else(|| cmd.executable().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(&facts.name));

        let mut child = HostAppEntry::new(role.clone(), exe.clone(), facts.pid);
        child.parent_pid = facts.parent_pid;
        child.integrity = facts.integrity;
        child.runtime_path = Some(exe.clone());
        child.user_data_path = user_data.clone();

        if role == ProcessRole::Browser {
            host.browser_process_pid = facts.pid;
            host.runtime_path = Some(exe);
            if host.user_data_path.is_none() {
                host.user_data_path = user_data;
            }
        }

        host.children.push(child);
    }
}

/// Whether process facts describe a runtime (msedgewebview2-family) process.
fn is_runtime_process(facts: &ProcessFacts) -> bool {
    if facts.name.eq_ignore_ascii_case(RUNTIME_EXE_NAME) {
        return true;
    }
    facts
        .executable_path
        .as_deref()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.eq_ignore_ascii_case(RUNTIME_EXE_NAME))
}

/// Append a warning, bounded so a machine where every probe fails cannot
/// grow the Vec without limit.
fn push_warning(warnings: &mut Vec<String>, message: String) {
    if warnings.len() < MAX_DISCOVERY_WARNINGS {
        tracing::debug!(warning = %message, "Discovery warning");
        warnings.push(message);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::IntegrityLevel;
    use crate::core::probes::WindowNode;
    use std::sync::{Arc, Mutex};

    // -------------------------------------------------------------------------
    // Fake probe world
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct WorldState {
        facts: BTreeMap<u32, ProcessFacts>,
        dlls: BTreeMap<u32, Vec<PathBuf>>,
        pipes: Vec<String>,
        tops: Vec<WindowNode>,
        children: BTreeMap<u64, Vec<WindowNode>>,
    }

    /// Shared fake OS implementing all four probe seams.
    #[derive(Clone, Default)]
    struct FakeWorld(Arc<Mutex<WorldState>>);

    impl FakeWorld {
        fn add_host(&self, pid: u32, exe: &str, dlls: &[&str]) {
            let mut s = self.0.lock().unwrap();
            s.facts.insert(
                pid,
                ProcessFacts {
                    pid,
                    name: PathBuf::from(exe)
                        .file_name()
                        .unwrap()
                        .to_string_lossy()
                        .into_owned(),
                    executable_path: Some(PathBuf::from(exe)),
                    command_line: format!("\"{exe}\""),
                    parent_pid: Some(1),
                    integrity: IntegrityLevel::Medium,
                },
            );
            s.dlls
                .insert(pid, dlls.iter().map(PathBuf::from).collect());
            s.pipes.push(format!("mojo.{pid}.1.2"));
        }

        fn add_runtime_child(&self, pid: u32, parent: u32, type_flag: Option<&str>, data: &str) {
            let exe = "C:/rt/msedgewebview2.exe";
            let type_part = type_flag
                .map(|t| format!(" --type={t}"))
                .unwrap_or_default();
            let mut s = self.0.lock().unwrap();
            s.facts.insert(
                pid,
                ProcessFacts {
                    pid,
                    name: "msedgewebview2.exe".to_string(),
                    executable_path: Some(PathBuf::from(exe)),
                    command_line: format!("\"{exe}\"{type_part} --user-data-dir={data}"),
                    parent_pid: Some(parent),
                    integrity: IntegrityLevel::Low,
                },
            );
        }

        /// Wire a minimal host window tree reaching `runtime_pid` below a
        /// web-content leaf.
        fn add_window_link(&self, host_pid: u32, runtime_pid: u32) {
            let mut s = self.0.lock().unwrap();
            let base = u64::from(host_pid) * 100;
            s.tops.push(WindowNode {
                handle: base,
                pid: host_pid,
                class_name: "HostTop".to_string(),
            });
            s.children.insert(
                base,
                vec![WindowNode {
                    handle: base + 1,
                    pid: host_pid,
                    class_name: crate::util::constants::WEB_CONTENT_WINDOW_CLASS.to_string(),
                }],
            );
            s.children.insert(
                base + 1,
                vec![WindowNode {
                    handle: base + 2,
                    pid: runtime_pid,
                    class_name: "Below".to_string(),
                }],
            );
        }

        fn kill(&self, pid: u32) {
            let mut s = self.0.lock().unwrap();
            s.facts.remove(&pid);
            s.dlls.remove(&pid);
            s.pipes.retain(|p| pipe_creator_pid(p) != Some(pid));
        }
    }

    impl ProcessInspector for FakeWorld {
        fn all_pids(&self) -> Vec<u32> {
            self.0.lock().unwrap().facts.keys().copied().collect()
        }

        fn inspect(&self, pid: u32) -> Result<ProcessFacts, ProbeError> {
            self.0
                .lock()
                .unwrap()
                .facts
                .get(&pid)
                .cloned()
                .ok_or(ProbeError::ProcessGone { pid })
        }
    }

    impl ModuleEnumerator for FakeWorld {
        fn loaded_interesting_dlls(&self, pid: u32) -> Result<Vec<PathBuf>, ProbeError> {
            let s = self.0.lock().unwrap();
            if !s.facts.contains_key(&pid) {
                return Err(ProbeError::ProcessGone { pid });
            }
            Ok(s.dlls.get(&pid).cloned().unwrap_or_default())
        }
    }

    impl WindowEnumerator for FakeWorld {
        fn top_level_windows(&self, _include_message_only: bool) -> Vec<WindowNode> {
            self.0.lock().unwrap().tops.clone()
        }

        fn child_windows(&self, handle: u64) -> Vec<WindowNode> {
            self.0
                .lock()
                .unwrap()
                .children
                .get(&handle)
                .cloned()
                .unwrap_or_default()
        }

        fn cross_process_child(&self, _handle: u64) -> Option<WindowNode> {
            None
        }
    }

    impl PipeEnumerator for FakeWorld {
        fn pipe_names(&self) -> Result<Vec<String>, ProbeError> {
            Ok(self.0.lock().unwrap().pipes.clone())
        }
    }

    fn engine(world: &FakeWorld) -> DiscoveryEngine {
        DiscoveryEngine::new(
            Box::new(world.clone()),
            Box::new(world.clone()),
            Box::new(world.clone()),
            Box::new(world.clone()),
        )
    }

    // -------------------------------------------------------------------------
    // Pipe parsing
    // -------------------------------------------------------------------------

    #[test]
    fn test_pipe_creator_pid_plain_and_labelled() {
        assert_eq!(pipe_creator_pid("mojo.4242.1.9"), Some(4242));
        assert_eq!(pipe_creator_pid("mojo.cvox_4242.1.9"), Some(4242));
        assert_eq!(pipe_creator_pid("mojo.not_a_pid_x.1.9"), None);
        assert_eq!(pipe_creator_pid("somethingelse.4242.1.9"), None);
        assert_eq!(pipe_creator_pid("mojo.4242"), None);
    }

    // -------------------------------------------------------------------------
    // Fast mode
    // -------------------------------------------------------------------------

    /// Two independent hosts load the SDK DLL; one has a correlated runtime
    /// child window, the other does not yet.  Exactly one entry has a
    /// non-zero browser process pid.
    #[test]
    fn test_fast_two_hosts_one_correlated() {
        let world = FakeWorld::default();
        world.add_host(10, "C:/apps/alpha.exe", &["C:/apps/WebView2Loader.dll"]);
        world.add_host(
            20,
            "C:/apps/beta.exe",
            &["C:/apps/Microsoft.Web.WebView2.Core.dll"],
        );
        world.add_runtime_child(77, 10, None, "C:/data/alpha");
        world.add_window_link(10, 77);

        let mut eng = engine(&world);
        let outcome = eng.discover(DiscoveryMode::Fast);

        assert_eq!(outcome.entries.len(), 2);
        let correlated: Vec<&HostAppEntry> = outcome
            .entries
            .iter()
            .filter(|e| e.browser_process_pid != 0)
            .collect();
        assert_eq!(correlated.len(), 1);
        assert_eq!(correlated[0].pid, 10);
        assert_eq!(correlated[0].browser_process_pid, 77);
        assert_eq!(
            correlated[0].runtime_path.as_deref(),
            Some(std::path::Path::new("C:/rt/msedgewebview2.exe"))
        );
        assert_eq!(
            correlated[0].user_data_path.as_deref(),
            Some(std::path::Path::new("C:/data/alpha"))
        );
        assert_eq!(correlated[0].children.len(), 1);
        assert_eq!(correlated[0].children[0].role, ProcessRole::Browser);
    }

    /// Every entry of a first pass is Running.
    #[test]
    fn test_pass_output_is_all_running() {
        let world = FakeWorld::default();
        world.add_host(10, "C:/apps/alpha.exe", &["C:/apps/WebView2Loader.dll"]);

        let mut eng = engine(&world);
        let outcome = eng.discover(DiscoveryMode::Fast);
        assert!(outcome
            .entries
            .iter()
            .all(|e| e.status == EntryStatus::Running));
    }

    /// A pipe owner without WebView2 modules never becomes a host.
    #[test]
    fn test_fast_ignores_non_webview_pipe_owners() {
        let world = FakeWorld::default();
        world.add_host(10, "C:/apps/plain.exe", &[]);

        let mut eng = engine(&world);
        let outcome = eng.discover(DiscoveryMode::Fast);
        assert!(outcome.entries.is_empty());
    }

    // -------------------------------------------------------------------------
    // Thorough mode
    // -------------------------------------------------------------------------

    /// Parent-pid matching catches runtime children whose host window
    /// hierarchy is not discoverable.
    #[test]
    fn test_thorough_matches_runtime_by_parent_pid() {
        let world = FakeWorld::default();
        world.add_host(10, "C:/apps/alpha.exe", &["C:/apps/WebView2Loader.dll"]);
        // No window link at all: only parentage ties 77 to 10.
        world.add_runtime_child(77, 10, None, "C:/data/alpha");
        world.add_runtime_child(78, 10, Some("renderer"), "C:/data/alpha");

        let mut eng = engine(&world);
        let outcome = eng.discover(DiscoveryMode::Thorough);

        assert_eq!(outcome.entries.len(), 1, "runtime processes are not hosts");
        let host = &outcome.entries[0];
        assert_eq!(host.browser_process_pid, 77);
        assert_eq!(host.children.len(), 2);
        assert!(host
            .children
            .iter()
            .any(|c| c.role == ProcessRole::Renderer));
    }

    // -------------------------------------------------------------------------
    // Reconciliation
    // -------------------------------------------------------------------------

    /// An entry that disappears between two same-mode passes is re-emitted
    /// once as Terminated, then omitted.
    #[test]
    fn test_terminated_emitted_once_then_dropped() {
        let world = FakeWorld::default();
        world.add_host(10, "C:/apps/alpha.exe", &["C:/apps/WebView2Loader.dll"]);

        let mut eng = engine(&world);
        let first = eng.discover(DiscoveryMode::Fast);
        assert_eq!(first.entries.len(), 1);

        world.kill(10);

        let second = eng.discover(DiscoveryMode::Fast);
        assert_eq!(second.entries.len(), 1);
        assert_eq!(second.entries[0].status, EntryStatus::Terminated);

        let third = eng.discover(DiscoveryMode::Fast);
        assert!(third.entries.is_empty());
    }

    /// Absence across a mode change is not meaningful: no Terminated entry.
    #[test]
    fn test_no_terminated_across_mode_change() {
        let world = FakeWorld::default();
        world.add_host(10, "C:/apps/alpha.exe", &["C:/apps/WebView2Loader.dll"]);

        let mut eng = engine(&world);
        eng.discover(DiscoveryMode::Thorough);

        world.kill(10);

        let fast = eng.discover(DiscoveryMode::Fast);
        assert!(
            fast.entries.is_empty(),
            "mode changed: absence must not be reported as Terminated"
        );
    }

    /// A restarted host with the same configuration is the same entry and
    /// comes back Running with its fresh pid.
    #[test]
    fn test_restart_same_identity_stays_running() {
        let world = FakeWorld::default();
        world.add_host(10, "C:/apps/alpha.exe", &["C:/apps/WebView2Loader.dll"]);

        let mut eng = engine(&world);
        eng.discover(DiscoveryMode::Fast);

        world.kill(10);
        world.add_host(33, "C:/apps/alpha.exe", &["C:/apps/WebView2Loader.dll"]);

        let second = eng.discover(DiscoveryMode::Fast);
        assert_eq!(second.entries.len(), 1);
        assert_eq!(second.entries[0].status, EntryStatus::Running);
        assert_eq!(second.entries[0].pid, 33);
    }

    /// A pid that dies between pipe enumeration and module scan is dropped
    /// without failing the pass.
    #[test]
    fn test_dead_candidate_is_dropped_not_fatal() {
        let world = FakeWorld::default();
        world.add_host(10, "C:/apps/alpha.exe", &["C:/apps/WebView2Loader.dll"]);
        // A pipe for a pid with no backing process.
        world.0.lock().unwrap().pipes.push("mojo.999.1.1".to_string());

        let mut eng = engine(&world);
        let outcome = eng.discover(DiscoveryMode::Fast);
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].pid, 10);
    }
}
