// wv2sleuth - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "wv2sleuth";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "wv2sleuth";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default log level when no override is present.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// =============================================================================
// Discovery evidence
// =============================================================================

/// Module names that mark a process as a WebView2 host when loaded.
///
/// Order matters for SDK classification: UI-framework integration DLLs are
/// the most specific evidence, the Win32 loader the least.
pub const INTERESTING_DLLS: &[&str] = &[
    "Microsoft.Web.WebView2.WinForms.dll",
    "Microsoft.Web.WebView2.Wpf.dll",
    "Microsoft.Web.WebView2.WinUI.dll",
    "Microsoft.Web.WebView2.Core.dll",
    "WebView2Loader.dll",
    "EmbeddedBrowserWebView.dll",
];

/// The runtime client DLL injected into every live host process.
pub const CLIENT_DLL: &str = "EmbeddedBrowserWebView.dll";

/// The Win32 SDK loader DLL.
pub const SDK_LOADER_DLL: &str = "WebView2Loader.dll";

/// The managed SDK core DLL.
pub const SDK_CORE_DLL: &str = "Microsoft.Web.WebView2.Core.dll";

/// UI-framework integration DLLs.
pub const SDK_WINFORMS_DLL: &str = "Microsoft.Web.WebView2.WinForms.dll";
pub const SDK_WPF_DLL: &str = "Microsoft.Web.WebView2.Wpf.dll";
pub const SDK_WINUI_DLL: &str = "Microsoft.Web.WebView2.WinUI.dll";

/// Executable name of the WebView2 runtime browser/renderer processes.
pub const RUNTIME_EXE_NAME: &str = "msedgewebview2.exe";

/// Regex for runtime IPC pipe names.  The creating pid is embedded as the
/// second dot-delimited field, optionally preceded by a `label_` prefix:
/// `mojo.4242.1.9`, `mojo.cvox_4242.1.9`.
pub const MOJO_PIPE_PATTERN: &str = r"^mojo\.(?:[A-Za-z0-9]+_)?(\d+)\.\d+\.\d+$";

/// Window class of the web-content leaf window inside a host's hierarchy.
pub const WEB_CONTENT_WINDOW_CLASS: &str = "Chrome_RenderWidgetHostHWND";

/// Window class of the core input-source window, the other discovery leaf.
pub const CORE_INPUT_WINDOW_CLASS: &str = "Chrome_WidgetWin_0";

/// Name of the cross-process child-window property set on a leaf window when
/// the next hierarchy level lives in the runtime process (no direct child
/// window handle exists in the host).
pub const CROSS_PROCESS_CHILD_WINDOW_PROP: &str = "CrossProcessChildWindow";

/// Maximum window-hierarchy depth explored below a top-level window.
/// Bounds the walk on pathological window trees.
pub const MAX_WINDOW_WALK_DEPTH: usize = 32;

/// Maximum direct children read from a single window.  Guards the sibling
/// chain walk against a window that mutates its children mid-enumeration.
pub const MAX_CHILD_WINDOWS: usize = 4_096;

// =============================================================================
// Discovery limits
// =============================================================================

/// How often the host-app watcher triggers a Fast-mode refresh (ms).
pub const WATCH_POLL_INTERVAL_MS: u64 = 3_000;

/// How often the cancel flag is checked within each watcher poll sleep (ms).
pub const WATCH_CANCEL_CHECK_INTERVAL_MS: u64 = 100;

/// Minimum user-configurable watcher poll interval (ms).
pub const MIN_WATCH_POLL_INTERVAL_MS: u64 = 500;

/// Maximum user-configurable watcher poll interval (ms).
pub const MAX_WATCH_POLL_INTERVAL_MS: u64 = 60_000; // 60 s

/// Maximum watcher updates drained by a consumer in one `poll_updates` call.
pub const MAX_WATCH_UPDATES_PER_POLL: usize = 16;

/// Maximum number of non-fatal warnings retained per discovery pass.
/// Prevents the warnings Vec from growing without bound on a machine where
/// every module scan is access-denied.
pub const MAX_DISCOVERY_WARNINGS: usize = 200;

// =============================================================================
// Override storage
// =============================================================================

/// Fixed policy root key, relative to HKCU / HKLM.
pub const REG_POLICY_ROOT: &str = r"SOFTWARE\Policies\Microsoft\Edge\WebView2";

/// The six sibling value-name paths under the policy root.  Each path holds
/// one value per host-app name.
pub const REG_KEY_BROWSER_EXECUTABLE_FOLDER: &str = "BrowserExecutableFolder";
pub const REG_KEY_RELEASE_CHANNEL_PREFERENCE: &str = "ReleaseChannelPreference";
pub const REG_KEY_CHANNEL_SEARCH_KIND: &str = "ChannelSearchKind";
pub const REG_KEY_RELEASE_CHANNELS: &str = "ReleaseChannels";
pub const REG_KEY_ADDITIONAL_BROWSER_ARGUMENTS: &str = "AdditionalBrowserArguments";
pub const REG_KEY_USER_DATA_FOLDER: &str = "UserDataFolder";

/// The six cooperating environment variables (per scope).
pub const ENV_BROWSER_EXECUTABLE_FOLDER: &str = "WEBVIEW2_BROWSER_EXECUTABLE_FOLDER";
pub const ENV_USER_DATA_FOLDER: &str = "WEBVIEW2_USER_DATA_FOLDER";
pub const ENV_ADDITIONAL_BROWSER_ARGUMENTS: &str = "WEBVIEW2_ADDITIONAL_BROWSER_ARGUMENTS";
pub const ENV_RELEASE_CHANNEL_PREFERENCE: &str = "WEBVIEW2_RELEASE_CHANNEL_PREFERENCE";
pub const ENV_CHANNEL_SEARCH_KIND: &str = "WEBVIEW2_CHANNEL_SEARCH_KIND";
pub const ENV_RELEASE_CHANNELS: &str = "WEBVIEW2_RELEASE_CHANNELS";

/// The wildcard host-app key applying to all hosts not otherwise matched.
pub const WILDCARD_HOST_APP: &str = "*";

// =============================================================================
// Runtime locator limits
// =============================================================================

/// Maximum directory recursion depth when scanning for runtime executables.
pub const LOCATOR_MAX_DEPTH: usize = 4;

/// Executable name patterns matched during a runtime scan.
pub const LOCATOR_EXE_PATTERNS: &[&str] = &["msedgewebview2.exe"];

/// Hard upper bound on runtime entries returned by one scan.
pub const LOCATOR_MAX_RESULTS: usize = 256;

// =============================================================================
// Remediation
// =============================================================================

/// Download page offered when a required runtime channel is not installed.
pub const RUNTIME_DOWNLOAD_URL: &str =
    "https://developer.microsoft.com/microsoft-edge/webview2/";
