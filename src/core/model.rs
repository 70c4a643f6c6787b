// wv2sleuth - core/model.rs
//
// Core data model types.  Pure data definitions with no I/O and no
// platform dependencies; these types are the shared vocabulary across all
// layers.
//
// `HostAppEntry` and `RuntimeEntry` are value-like snapshots: discovery
// regenerates them wholesale each pass and reconciles the new set against
// the previous one, so equality is structural identity — never pid.

use crate::core::channels::ReleaseChannel;
use crate::util::constants;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

// =============================================================================
// Discovery mode and entry status
// =============================================================================

/// How much work a discovery pass is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiscoveryMode {
    /// Low overhead: pipe-name candidates only.  Used for frequent polling.
    Fast,

    /// Exhaustive: every process on the machine is module-scanned.
    Thorough,
}

impl DiscoveryMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Thorough => "thorough",
        }
    }
}

/// Whether the process behind an entry was alive at the last matching pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum EntryStatus {
    #[default]
    Running,

    /// The process disappeared between two same-mode passes.  Re-emitted
    /// exactly once so a consumer can show "this is now gone" for one
    /// polling cycle before the entry drops out.
    Terminated,
}

// =============================================================================
// Process role
// =============================================================================

/// Role of a process in the WebView2 process tree.
///
/// Runtime subtypes come from the `--type` command-line flag; a runtime
/// process with no `--type` flag is the browser process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProcessRole {
    /// A process that embeds a WebView2 control.
    Host,
    Browser,
    Renderer,
    Gpu,
    Utility,
    Crashpad,
    Other(String),
}

impl ProcessRole {
    /// Map a `--type` flag value to a role.  `None` (flag absent) is the
    /// browser process.
    pub fn from_type_flag(type_flag: Option<&str>) -> ProcessRole {
        match type_flag {
            None | Some("browser") => Self::Browser,
            Some("renderer") => Self::Renderer,
            Some("gpu-process") => Self::Gpu,
            Some("utility") => Self::Utility,
            Some("crashpad-handler") => Self::Crashpad,
            Some(other) => Self::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Host => "host",
            Self::Browser => "browser",
            Self::Renderer => "renderer",
            Self::Gpu => "gpu",
            Self::Utility => "utility",
            Self::Crashpad => "crashpad",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Integrity level
// =============================================================================

/// Integrity/sandbox classification of a process, from its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum IntegrityLevel {
    Untrusted,
    Low,
    AppContainer,
    Medium,
    High,
    System,
    #[default]
    Unknown,
}

impl IntegrityLevel {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Untrusted => "Untrusted",
            Self::Low => "Low",
            Self::AppContainer => "AppContainer",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::System => "System",
            Self::Unknown => "Unknown",
        }
    }
}

// =============================================================================
// SDK info
// =============================================================================

/// Which API surface a host is using, derived from the SDK DLL name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SdkApiKind {
    /// WebView2Loader.dll — the C/C++ loader.
    Win32,
    /// Microsoft.Web.WebView2.Core.dll — the managed SDK.
    DotNet,
    /// WinRT projection.
    WinRt,
    Unknown,
}

/// Which UI framework integration DLL was observed, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UiFramework {
    None,
    WinForms,
    Wpf,
    WinUi,
    Unknown,
}

/// The SDK DLL discovered inside a host process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SdkInfo {
    /// Full path of the DLL this classification is based on.
    pub dll_path: PathBuf,

    pub api: SdkApiKind,

    pub ui_framework: UiFramework,
}

impl SdkInfo {
    /// Classify the SDK from a host's interesting-module list.
    ///
    /// Evidence strength follows the ordering of
    /// `constants::INTERESTING_DLLS`: a UI-framework integration DLL implies
    /// the managed API; the bare loader implies Win32.  The runtime client
    /// DLL alone proves a live WebView2 but says nothing about the SDK, so
    /// it yields `None`.
    pub fn from_dlls(dlls: &[PathBuf]) -> Option<SdkInfo> {
        let find = |name: &str| {
            dlls.iter().find(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
            })
        };

        if let Some(p) = find(constants::SDK_WINFORMS_DLL) {
            return Some(SdkInfo {
                dll_path: p.clone(),
                api: SdkApiKind::DotNet,
                ui_framework: UiFramework::WinForms,
            });
        }
        if let Some(p) = find(constants::SDK_WPF_DLL) {
            return Some(SdkInfo {
                dll_path: p.clone(),
                api: SdkApiKind::DotNet,
                ui_framework: UiFramework::Wpf,
            });
        }
        if let Some(p) = find(constants::SDK_WINUI_DLL) {
            return Some(SdkInfo {
                dll_path: p.clone(),
                api: SdkApiKind::WinRt,
                ui_framework: UiFramework::WinUi,
            });
        }
        if let Some(p) = find(constants::SDK_CORE_DLL) {
            return Some(SdkInfo {
                dll_path: p.clone(),
                api: SdkApiKind::DotNet,
                ui_framework: UiFramework::None,
            });
        }
        if let Some(p) = find(constants::SDK_LOADER_DLL) {
            return Some(SdkInfo {
                dll_path: p.clone(),
                api: SdkApiKind::Win32,
                ui_framework: UiFramework::None,
            });
        }
        None
    }
}

// =============================================================================
// Host app entry
// =============================================================================

/// One observed OS-level actor in the WebView2 process tree.
///
/// # Identity
/// Equality is structural — (executable_path, user_data_path, runtime_path)
/// — deliberately excluding pid, so a terminated process and the record
/// that replaces it can be compared for "did anything meaningful change".
/// A restarted host with the same configuration is the *same* entry.
#[derive(Debug, Clone, Serialize)]
pub struct HostAppEntry {
    /// Role in the process tree.
    pub role: ProcessRole,

    pub executable_path: PathBuf,

    pub pid: u32,

    pub parent_pid: Option<u32>,

    /// SDK DLL discovered in this process, when classifiable.
    pub sdk: Option<SdkInfo>,

    /// Runtime executable this host is bound to; `None` until resolved.
    pub runtime_path: Option<PathBuf>,

    /// User data directory, resolved from the correlated runtime's command
    /// line; `None` when unknown.
    pub user_data_path: Option<PathBuf>,

    /// Raw evidence: every interesting DLL loaded in the process.
    pub interesting_dlls: Vec<PathBuf>,

    /// Pid of the correlated runtime browser process; 0 until correlated.
    pub browser_process_pid: u32,

    pub integrity: IntegrityLevel,

    pub status: EntryStatus,

    /// Correlated descendant processes, exclusively owned by this entry.
    pub children: Vec<HostAppEntry>,
}

impl HostAppEntry {
    /// A bare entry for a freshly observed process.
    pub fn new(role: ProcessRole, executable_path: PathBuf, pid: u32) -> HostAppEntry {
        HostAppEntry {
            role,
            executable_path,
            pid,
            parent_pid: None,
            sdk: None,
            runtime_path: None,
            user_data_path: None,
            interesting_dlls: Vec::new(),
            browser_process_pid: 0,
            integrity: IntegrityLevel::Unknown,
            status: EntryStatus::Running,
            children: Vec::new(),
        }
    }

    /// Structural identity: did anything meaningful change between two
    /// snapshots of (possibly) the same host configuration?
    pub fn same_identity(&self, other: &HostAppEntry) -> bool {
        self.executable_path == other.executable_path
            && self.user_data_path == other.user_data_path
            && self.runtime_path == other.runtime_path
    }

    /// Whether a runtime browser process has been correlated.
    pub fn is_correlated(&self) -> bool {
        self.browser_process_pid != 0
    }
}

impl PartialEq for HostAppEntry {
    fn eq(&self, other: &Self) -> bool {
        self.same_identity(other)
    }
}

impl Eq for HostAppEntry {}

// =============================================================================
// Runtime entry
// =============================================================================

/// One discovered runtime executable.  Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeEntry {
    pub exe_path: PathBuf,

    /// Four-part version, derived from a path component; `None` for build
    /// trees without a versioned directory.
    pub version: Option<String>,

    /// Channel, classified by path substring.
    pub channel: ReleaseChannel,

    /// Parent directory of the executable.
    pub location: PathBuf,

    /// Executable mtime, informational.
    pub modified: Option<DateTime<Utc>>,
}

impl RuntimeEntry {
    /// Build an entry from an executable path, deriving version, channel,
    /// and location.
    pub fn from_exe_path(exe_path: PathBuf, modified: Option<DateTime<Utc>>) -> RuntimeEntry {
        let location = exe_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let channel = ReleaseChannel::classify_path(&exe_path.to_string_lossy());
        let version = derive_version(&exe_path);
        RuntimeEntry {
            exe_path,
            version,
            channel,
            location,
            modified,
        }
    }
}

/// Extract a four-part numeric version from the nearest path component that
/// looks like one, searching from the executable upward.
fn derive_version(exe_path: &Path) -> Option<String> {
    // Compiled once per call; runtime scans touch at most a few hundred
    // paths so caching the regex buys nothing measurable.
    let pattern = regex::Regex::new(r"^\d+\.\d+\.\d+\.\d+$").ok()?;
    exe_path
        .ancestors()
        .skip(1)
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .find(|component| pattern.is_match(component))
        .map(str::to_string)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(exe: &str, data: Option<&str>, runtime: Option<&str>, pid: u32) -> HostAppEntry {
        let mut e = HostAppEntry::new(ProcessRole::Host, PathBuf::from(exe), pid);
        e.user_data_path = data.map(PathBuf::from);
        e.runtime_path = runtime.map(PathBuf::from);
        e
    }

    /// Entry identity is structural, not pid-based.
    #[test]
    fn test_identity_ignores_pid() {
        let a = entry(r"C:\apps\host.exe", Some(r"C:\data"), Some(r"C:\rt\msedgewebview2.exe"), 100);
        let b = entry(r"C:\apps\host.exe", Some(r"C:\data"), Some(r"C:\rt\msedgewebview2.exe"), 999);
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_differs_on_user_data_path() {
        let a = entry(r"C:\apps\host.exe", Some(r"C:\data1"), None, 100);
        let b = entry(r"C:\apps\host.exe", Some(r"C:\data2"), None, 100);
        assert_ne!(a, b);
    }

    #[test]
    fn test_identity_differs_on_runtime() {
        let a = entry(r"C:\apps\host.exe", None, Some(r"C:\rt1\msedgewebview2.exe"), 1);
        let b = entry(r"C:\apps\host.exe", None, Some(r"C:\rt2\msedgewebview2.exe"), 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_role_from_type_flag() {
        assert_eq!(ProcessRole::from_type_flag(None), ProcessRole::Browser);
        assert_eq!(ProcessRole::from_type_flag(Some("renderer")), ProcessRole::Renderer);
        assert_eq!(ProcessRole::from_type_flag(Some("gpu-process")), ProcessRole::Gpu);
        assert_eq!(
            ProcessRole::from_type_flag(Some("network")),
            ProcessRole::Other("network".to_string())
        );
    }

    // Path-component logic is exercised with forward-slash paths so these
    // tests behave identically on every host platform; Windows accepts both
    // separators.

    #[test]
    fn test_sdk_classification_prefers_framework_dll() {
        let dlls = vec![
            PathBuf::from("C:/app/WebView2Loader.dll"),
            PathBuf::from("C:/app/Microsoft.Web.WebView2.Core.dll"),
            PathBuf::from("C:/app/Microsoft.Web.WebView2.Wpf.dll"),
        ];
        let sdk = SdkInfo::from_dlls(&dlls).expect("classifiable");
        assert_eq!(sdk.api, SdkApiKind::DotNet);
        assert_eq!(sdk.ui_framework, UiFramework::Wpf);
    }

    #[test]
    fn test_sdk_classification_loader_only() {
        let dlls = vec![PathBuf::from("C:/app/webview2loader.dll")];
        let sdk = SdkInfo::from_dlls(&dlls).expect("classifiable");
        assert_eq!(sdk.api, SdkApiKind::Win32);
        assert_eq!(sdk.ui_framework, UiFramework::None);
    }

    /// The client DLL alone proves a live WebView2 but not which SDK.
    #[test]
    fn test_sdk_classification_client_only_is_none() {
        let dlls = vec![PathBuf::from("C:/win/EmbeddedBrowserWebView.dll")];
        assert!(SdkInfo::from_dlls(&dlls).is_none());
    }

    #[test]
    fn test_runtime_entry_derivation() {
        let rt = RuntimeEntry::from_exe_path(
            PathBuf::from(
                "C:/Program Files (x86)/Microsoft/EdgeWebView/Application/120.0.2210.61/msedgewebview2.exe",
            ),
            None,
        );
        assert_eq!(rt.version.as_deref(), Some("120.0.2210.61"));
        assert_eq!(rt.channel, ReleaseChannel::Stable);
        assert!(rt.location.ends_with("120.0.2210.61"));
    }

    #[test]
    fn test_runtime_entry_no_version_component() {
        let rt = RuntimeEntry::from_exe_path(
            PathBuf::from("C:/build/out/release/msedgewebview2.exe"),
            None,
        );
        assert_eq!(rt.version, None);
    }
}
