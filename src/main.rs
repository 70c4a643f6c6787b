// wv2sleuth - main.rs
//
// CLI entry point. Handles:
// 1. CLI argument parsing
// 2. Logging initialisation (debug mode support)
// 3. Configuration loading
// 4. Command dispatch over the discovery engine, override store, and
//    runtime locator

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use wv2sleuth::app::state::SessionState;
use wv2sleuth::app::watcher::{HostAppWatcher, WatchConfig, WatchUpdate};
use wv2sleuth::core::channels::ChannelSet;
use wv2sleuth::core::discovery::DiscoveryEngine;
use wv2sleuth::core::locator::{locate_runtimes, LocatorConfig};
use wv2sleuth::core::model::{DiscoveryMode, HostAppEntry};
use wv2sleuth::core::overrides::{AppOverrideEntry, StorageKind};
use wv2sleuth::core::store::OverrideStore;
use wv2sleuth::platform::config::{load_config, AppConfig, PlatformPaths};
use wv2sleuth::platform::env_scope::{EnvScopeKind, PersistedEnvScope};
use wv2sleuth::platform::modules::LoadedModuleEnumerator;
use wv2sleuth::platform::pipes::NamedPipeEnumerator;
use wv2sleuth::platform::process::SystemProcessInspector;
use wv2sleuth::platform::registry::{RegistryPolicyHive, RegistryRoot};
use wv2sleuth::platform::window_tree::SystemWindowEnumerator;
use wv2sleuth::util::constants;
use wv2sleuth::util::error::{PreconditionError, Result, Wv2SleuthError};
use wv2sleuth::util::logging;

// =============================================================================
// CLI definition
// =============================================================================

#[derive(Parser)]
#[command(
    name = constants::APP_NAME,
    version = constants::APP_VERSION,
    about = "WebView2 host-app discovery and runtime override diagnostics"
)]
struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    /// Path to config.toml (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Discover running WebView2 host apps and their runtime processes.
    Hosts {
        /// Run an exhaustive pass instead of the fast pipe-based pass.
        #[arg(long)]
        thorough: bool,

        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Poll for host apps continuously, printing changes as they happen.
    Watch {
        /// Poll interval in milliseconds (overrides config).
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// List installed WebView2 runtimes.
    Runtimes {
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Inspect and edit runtime-selection override rules.
    Overrides {
        #[command(subcommand)]
        command: OverridesCommand,
    },
}

#[derive(Subcommand)]
enum OverridesCommand {
    /// List all override entries across the four storage tiers.
    List {
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Create or update an override entry.
    Set {
        /// Host app executable name, or "*" for all hosts.
        host_app: String,

        /// Storage tier owning the entry.
        #[arg(long, value_enum, default_value = "registry-user")]
        storage: StorageArg,

        /// Fixed runtime folder (empty clears the fixed-version override).
        #[arg(long, default_value = "")]
        runtime_path: String,

        /// User data folder override.
        #[arg(long, default_value = "")]
        user_data_path: String,

        /// Additional browser arguments.
        #[arg(long, default_value = "")]
        browser_args: String,

        /// Search preview channels before stable.
        #[arg(long)]
        reverse_search: bool,

        /// Allowed channels as comma-separated indices
        /// (0=Stable,1=Beta,2=Dev,3=Canary); empty = all.
        #[arg(long, default_value = "")]
        channels: String,

        /// Fail if the referenced runtime path or channels have no
        /// installed runtime.
        #[arg(long)]
        require_installed: bool,
    },

    /// Remove an override entry (the user-registry wildcard is protected).
    Remove {
        host_app: String,

        #[arg(long, value_enum)]
        storage: StorageArg,
    },

    /// Move an entry to a different storage tier.
    Move {
        host_app: String,

        #[arg(long, value_enum)]
        from: StorageArg,

        #[arg(long, value_enum)]
        to: StorageArg,
    },
}

/// CLI face of `StorageKind`.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum StorageArg {
    EnvUser,
    EnvMachine,
    RegistryMachine,
    RegistryUser,
}

impl From<StorageArg> for StorageKind {
    fn from(arg: StorageArg) -> StorageKind {
        match arg {
            StorageArg::EnvUser => StorageKind::EnvUser,
            StorageArg::EnvMachine => StorageKind::EnvMachine,
            StorageArg::RegistryMachine => StorageKind::RegistryMachine,
            StorageArg::RegistryUser => StorageKind::RegistryUser,
        }
    }
}

// =============================================================================
// Entry point
// =============================================================================

fn main() {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PlatformPaths::resolve().config_file());

    // Load config before logging init so [logging].level participates in
    // the filter priority chain; a broken config still gets log output.
    let (config, config_error) = match load_config(&config_path) {
        Ok(c) => (c, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    logging::init(cli.debug, config.log_level.as_deref());
    if let Some(e) = config_error {
        tracing::error!(error = %e, "Configuration invalid; using defaults");
    }

    if let Err(e) = run(cli, &config) {
        eprintln!("Error: {e}");
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli, config: &AppConfig) -> Result<()> {
    match cli.command {
        Command::Hosts { thorough, json } => cmd_hosts(thorough, json),
        Command::Watch { interval_ms } => cmd_watch(config, interval_ms),
        Command::Runtimes { json } => cmd_runtimes(config, json),
        Command::Overrides { command } => cmd_overrides(config, command),
    }
}

// =============================================================================
// Component wiring
// =============================================================================

fn build_engine() -> DiscoveryEngine {
    DiscoveryEngine::new(
        Box::new(SystemProcessInspector::new()),
        Box::new(LoadedModuleEnumerator::new()),
        Box::new(SystemWindowEnumerator::new()),
        Box::new(NamedPipeEnumerator::new()),
    )
}

fn build_store() -> OverrideStore {
    OverrideStore::new(
        Box::new(PersistedEnvScope::new(EnvScopeKind::User)),
        Box::new(PersistedEnvScope::new(EnvScopeKind::Machine)),
        Box::new(RegistryPolicyHive::new(RegistryRoot::LocalMachine)),
        Box::new(RegistryPolicyHive::new(RegistryRoot::CurrentUser)),
    )
}

fn locator_config(config: &AppConfig) -> LocatorConfig {
    let mut locator = LocatorConfig::default();
    locator
        .scan_roots
        .extend(config.extra_scan_dirs.iter().cloned());
    locator
}

// =============================================================================
// Commands
// =============================================================================

fn cmd_hosts(thorough: bool, json: bool) -> Result<()> {
    let mode = if thorough {
        DiscoveryMode::Thorough
    } else {
        DiscoveryMode::Fast
    };

    let mut engine = build_engine();
    let outcome = engine.discover(mode);

    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome.entries).expect("entries serialize")
        );
        return Ok(());
    }

    if outcome.entries.is_empty() {
        println!("No WebView2 host apps found.");
        return Ok(());
    }

    for entry in &outcome.entries {
        print_host(entry);
    }
    println!(
        "{} host app(s), {:?} pass in {} ms",
        outcome.entries.len(),
        outcome.mode,
        outcome.duration.as_millis()
    );
    Ok(())
}

fn print_host(entry: &HostAppEntry) {
    let runtime = entry
        .runtime_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let data = entry
        .user_data_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    println!(
        "[{}] pid {} ({:?}) {}",
        entry.role,
        entry.pid,
        entry.status,
        entry.executable_path.display()
    );
    println!("    runtime:   {runtime}");
    println!("    user data: {data}");
    if let Some(sdk) = &entry.sdk {
        println!(
            "    sdk:       {:?}/{:?} via {}",
            sdk.api,
            sdk.ui_framework,
            sdk.dll_path.display()
        );
    }
    for child in &entry.children {
        println!(
            "    child:     pid {} [{}] {}",
            child.pid,
            child.role,
            child.executable_path.display()
        );
    }
}

fn cmd_watch(config: &AppConfig, interval_ms: Option<u64>) -> Result<()> {
    let mut state = SessionState::new();
    let mut watcher = HostAppWatcher::new();
    watcher.start(
        build_engine(),
        WatchConfig {
            poll_interval_ms: interval_ms.unwrap_or(config.poll_interval_ms),
            poll_mode: DiscoveryMode::Fast,
        },
    );

    // First pass immediately rather than waiting out the first interval.
    watcher.request_refresh(DiscoveryMode::Thorough);

    println!("Watching for WebView2 host apps (Ctrl+C to stop)...");
    loop {
        for update in watcher.poll_updates(constants::MAX_WATCH_UPDATES_PER_POLL) {
            let WatchUpdate::Pass(outcome) = update;
            state.push_warnings(outcome.warnings.iter().cloned());
            let changed = snapshots_differ(state.host_apps.items(), &outcome.entries);
            // Install on this thread: swap-then-notify.
            state.host_apps.install(outcome.entries);
            if changed {
                println!(
                    "--- {} host app(s) ({} pass) ---",
                    state.host_apps.len(),
                    outcome.mode.label()
                );
                for entry in state.host_apps.items() {
                    print_host(entry);
                }
            }
        }
        std::thread::sleep(Duration::from_millis(200));
    }
}

/// Whether two snapshots differ in anything worth reprinting.  Entry
/// equality is structural identity (it deliberately ignores pid and
/// status), so lifecycle transitions are compared explicitly here.
fn snapshots_differ(current: &[HostAppEntry], fresh: &[HostAppEntry]) -> bool {
    current.len() != fresh.len()
        || current.iter().zip(fresh).any(|(a, b)| {
            !a.same_identity(b)
                || a.status != b.status
                || a.browser_process_pid != b.browser_process_pid
        })
}

fn cmd_runtimes(config: &AppConfig, json: bool) -> Result<()> {
    let (runtimes, warnings) = locate_runtimes(&locator_config(config));
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&runtimes).expect("runtimes serialize")
        );
        return Ok(());
    }

    if runtimes.is_empty() {
        println!("No WebView2 runtimes found.");
        println!("Download one from {}", constants::RUNTIME_DOWNLOAD_URL);
        return Ok(());
    }

    for rt in &runtimes {
        println!(
            "{:<8} {:<16} {}",
            rt.channel.label(),
            rt.version.as_deref().unwrap_or("-"),
            rt.exe_path.display()
        );
    }
    Ok(())
}

fn cmd_overrides(config: &AppConfig, command: OverridesCommand) -> Result<()> {
    let mut store = build_store();
    store.load().map_err(Wv2SleuthError::Override)?;

    match command {
        OverridesCommand::List { json } => {
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(store.entries()).expect("entries serialize")
                );
                return Ok(());
            }
            for entry in store.entries() {
                let mode = if entry.is_fixed_version() {
                    format!("fixed: {}", entry.runtime_path)
                } else if entry.is_evergreen_preview() {
                    "evergreen preview".to_string()
                } else if entry.is_evergreen() {
                    "evergreen".to_string()
                } else {
                    format!("channels: {}", entry.release_channels)
                };
                println!("{:<24} {:<22} {mode}", entry.host_app, entry.storage.label());
            }
            Ok(())
        }

        OverridesCommand::Set {
            host_app,
            storage,
            runtime_path,
            user_data_path,
            browser_args,
            reverse_search,
            channels,
            require_installed,
        } => {
            let mut entry = AppOverrideEntry::new(&host_app, storage.into());
            entry.runtime_path = runtime_path;
            entry.user_data_path = user_data_path;
            entry.browser_arguments = browser_args;
            entry.reverse_search_order = reverse_search;
            entry.release_channels = ChannelSet::decode(&channels);

            if require_installed {
                check_preconditions(config, &entry)?;
            }

            store.apply(entry).map_err(Wv2SleuthError::Override)?;
            println!("Override for '{host_app}' written.");
            Ok(())
        }

        OverridesCommand::Remove { host_app, storage } => {
            let removed = store
                .remove(&host_app, storage.into())
                .map_err(Wv2SleuthError::Override)?;
            if removed {
                println!("Override for '{host_app}' removed.");
            } else {
                println!("Nothing removed (entry absent or protected).");
            }
            Ok(())
        }

        OverridesCommand::Move { host_app, from, to } => {
            store
                .change_storage(&host_app, from.into(), to.into())
                .map_err(Wv2SleuthError::Override)?;
            println!("Override for '{host_app}' moved to {}.", StorageKind::from(to));
            Ok(())
        }
    }
}

/// Verify that the entry's runtime references are satisfiable on this
/// machine.  Surfaced as a typed, recoverable condition with a remediation
/// link — not a generic failure.
fn check_preconditions(config: &AppConfig, entry: &AppOverrideEntry) -> Result<()> {
    let (installed, _) = locate_runtimes(&locator_config(config));

    if entry.is_fixed_version() {
        let dir = PathBuf::from(&entry.runtime_path);
        let exe = dir.join(constants::RUNTIME_EXE_NAME);
        if !exe.is_file() {
            return Err(PreconditionError::RuntimeMissing {
                path: dir,
                download_url: constants::RUNTIME_DOWNLOAD_URL,
            }
            .into());
        }
        return Ok(());
    }

    if !entry.release_channels.is_all() {
        for channel in entry.release_channels.iter() {
            if !installed.iter().any(|rt| rt.channel == channel) {
                return Err(PreconditionError::ChannelNotInstalled {
                    channel: channel.label(),
                    download_url: constants::RUNTIME_DOWNLOAD_URL,
                }
                .into());
            }
        }
    }
    Ok(())
}
