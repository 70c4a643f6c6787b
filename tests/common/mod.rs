// wv2sleuth - tests/common/mod.rs
//
// Shared fakes for the integration suites: an in-memory OS world
// implementing the four discovery probe seams, and in-memory storage
// backends implementing the override store seams.

#![allow(dead_code)] // Each test binary uses a subset of the helpers.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use wv2sleuth::core::probes::{
    ModuleEnumerator, PipeEnumerator, ProcessFacts, ProcessInspector, WindowEnumerator,
    WindowNode,
};
use wv2sleuth::core::store::{EnvScope, PolicyHive};
use wv2sleuth::util::error::{BackendError, ProbeError};

// =============================================================================
// Fake OS world (discovery)
// =============================================================================

#[derive(Default)]
struct WorldState {
    facts: BTreeMap<u32, ProcessFacts>,
    dlls: BTreeMap<u32, Vec<PathBuf>>,
    pipes: Vec<String>,
    tops: Vec<WindowNode>,
    message_only: Vec<WindowNode>,
    children: BTreeMap<u64, Vec<WindowNode>>,
    cross_process: BTreeMap<u64, WindowNode>,
}

/// Shared mutable fake OS; clone handles into each probe seat.
#[derive(Clone, Default)]
pub struct FakeWorld(Arc<Mutex<WorldState>>);

impl FakeWorld {
    pub fn new() -> FakeWorld {
        FakeWorld::default()
    }

    /// Add a host process with the given loaded DLLs and a runtime IPC
    /// pipe named after it.
    pub fn add_host(&self, pid: u32, exe: &str, dlls: &[&str]) {
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
                ..Default::default()
            },
        );
        s.dlls.insert(pid, dlls.iter().map(PathBuf::from).collect());
        s.pipes.push(format!("mojo.{pid}.1.2"));
    }

    /// Add a host process with no runtime IPC pipe — invisible to fast
    /// passes, discoverable only by a thorough module scan.
    pub fn add_host_no_pipe(&self, pid: u32, exe: &str, dlls: &[&str]) {
        self.add_host(pid, exe, dlls);
        let mut s = self.0.lock().unwrap();
        s.pipes.retain(|p| !p.contains(&format!(".{pid}.")));
    }

    /// Add a runtime process parented to `parent`.  `type_flag = None`
    /// makes it the browser process.
    pub fn add_runtime_child(
        &self,
        pid: u32,
        parent: u32,
        type_flag: Option<&str>,
        user_data: &str,
    ) {
        let exe = "C:/rt/msedgewebview2.exe";
        let type_part = type_flag.map(|t| format!(" --type={t}")).unwrap_or_default();
        let mut s = self.0.lock().unwrap();
        s.facts.insert(
            pid,
            ProcessFacts {
                pid,
                name: "msedgewebview2.exe".to_string(),
                executable_path: Some(PathBuf::from(exe)),
                command_line: format!(
                    "\"{exe}\"{type_part} \"--user-data-dir={user_data}\""
                ),
                parent_pid: Some(parent),
                ..Default::default()
            },
        );
    }

    /// Wire a host window hierarchy that reaches `runtime_pid` below a
    /// web-content leaf window.
    pub fn add_window_link(&self, host_pid: u32, runtime_pid: u32) {
        let mut s = self.0.lock().unwrap();
        let base = u64::from(host_pid) * 1_000;
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
                class_name: "Chrome_RenderWidgetHostHWND".to_string(),
            }],
        );
        s.children.insert(
            base + 1,
            vec![WindowNode {
                handle: base + 2,
                pid: runtime_pid,
                class_name: "Intermediate".to_string(),
            }],
        );
    }

    /// Remove a process and everything that named it.
    pub fn kill(&self, pid: u32) {
        let mut s = self.0.lock().unwrap();
        s.facts.remove(&pid);
        s.dlls.remove(&pid);
        s.pipes.retain(|p| !p.contains(&format!(".{pid}.")));
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
    fn top_level_windows(&self, include_message_only: bool) -> Vec<WindowNode> {
        let s = self.0.lock().unwrap();
        let mut all = s.tops.clone();
        if include_message_only {
            all.extend(s.message_only.clone());
        }
        all
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

    fn cross_process_child(&self, handle: u64) -> Option<WindowNode> {
        self.0.lock().unwrap().cross_process.get(&handle).cloned()
    }
}

impl PipeEnumerator for FakeWorld {
    fn pipe_names(&self) -> Result<Vec<String>, ProbeError> {
        Ok(self.0.lock().unwrap().pipes.clone())
    }
}

// =============================================================================
// In-memory storage backends (overrides)
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RegValue {
    Str(String),
    Dword(u32),
}

/// In-memory `PolicyHive`: subkey → value name → value.
#[derive(Clone, Default)]
pub struct MemoryHive(Arc<Mutex<BTreeMap<String, BTreeMap<String, RegValue>>>>);

impl MemoryHive {
    pub fn new() -> MemoryHive {
        MemoryHive::default()
    }

    pub fn value(&self, subkey: &str, name: &str) -> Option<RegValue> {
        self.0
            .lock()
            .unwrap()
            .get(subkey)
            .and_then(|k| k.get(name))
            .cloned()
    }

    pub fn set(&self, subkey: &str, name: &str, value: RegValue) {
        self.0
            .lock()
            .unwrap()
            .entry(subkey.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }
}

impl PolicyHive for MemoryHive {
    fn value_names(&self, subkey: &str) -> Result<Vec<String>, BackendError> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .get(subkey)
            .map(|k| k.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn read_string(&self, subkey: &str, name: &str) -> Result<Option<String>, BackendError> {
        Ok(match self.value(subkey, name) {
            Some(RegValue::Str(s)) => Some(s),
            _ => None,
        })
    }

    fn read_dword(&self, subkey: &str, name: &str) -> Result<Option<u32>, BackendError> {
        Ok(match self.value(subkey, name) {
            Some(RegValue::Dword(d)) => Some(d),
            _ => None,
        })
    }

    fn write_string(&self, subkey: &str, name: &str, value: &str) -> Result<(), BackendError> {
        self.set(subkey, name, RegValue::Str(value.to_string()));
        Ok(())
    }

    fn write_dword(&self, subkey: &str, name: &str, value: u32) -> Result<(), BackendError> {
        self.set(subkey, name, RegValue::Dword(value));
        Ok(())
    }

    fn delete_value(&self, subkey: &str, name: &str) -> Result<(), BackendError> {
        if let Some(k) = self.0.lock().unwrap().get_mut(subkey) {
            k.remove(name);
        }
        Ok(())
    }
}

/// In-memory `EnvScope` counting settings-change broadcasts.
#[derive(Clone, Default)]
pub struct MemoryEnv {
    vars: Arc<Mutex<BTreeMap<String, String>>>,
    broadcasts: Arc<Mutex<usize>>,
}

impl MemoryEnv {
    pub fn new() -> MemoryEnv {
        MemoryEnv::default()
    }

    pub fn broadcast_count(&self) -> usize {
        *self.broadcasts.lock().unwrap()
    }

    pub fn seed(&self, name: &str, value: &str) {
        self.vars
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }
}

impl EnvScope for MemoryEnv {
    fn get(&self, name: &str) -> Result<Option<String>, BackendError> {
        Ok(self
            .vars
            .lock()
            .unwrap()
            .get(name)
            .filter(|v| !v.is_empty())
            .cloned())
    }

    fn set_many(&self, assignments: &[(&str, Option<&str>)]) -> Result<(), BackendError> {
        let mut vars = self.vars.lock().unwrap();
        let mut changed = false;
        for (name, value) in assignments {
            let current = vars.get(*name).map(String::as_str);
            if current == *value {
                continue;
            }
            changed = true;
            match value {
                Some(v) => {
                    vars.insert((*name).to_string(), (*v).to_string());
                }
                None => {
                    vars.remove(*name);
                }
            }
        }
        if changed {
            *self.broadcasts.lock().unwrap() += 1;
        }
        Ok(())
    }
}
