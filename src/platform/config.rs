// wv2sleuth - platform/config.rs
//
// Platform-specific configuration directory resolution and config.toml
// loading with startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Resolved platform paths for wv2sleuth data and configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/wv2sleuth/ or
    /// %APPDATA%\wv2sleuth\).
    pub config_dir: PathBuf,

    /// Data directory for logs, caches, etc.
    pub data_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to the current directory if platform dirs cannot be
    /// determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let data_dir = proj_dirs.data_dir().to_path_buf();

            tracing::debug!(
                config = %config_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                data_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                config_dir: fallback.clone(),
                data_dir: fallback,
            }
        }
    }

    /// Default config.toml location.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility — a newer
/// config file can be used with an older binary without crashing.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[watch]` section.
    pub watch: WatchSection,
    /// `[locator]` section.
    pub locator: LocatorSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[watch]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct WatchSection {
    /// Background poll interval in milliseconds.
    pub poll_interval_ms: Option<u64>,
}

/// `[locator]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LocatorSection {
    /// Extra directories scanned for runtime executables (local build
    /// trees, network shares).
    pub extra_scan_dirs: Option<Vec<PathBuf>>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
}

/// Validated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub poll_interval_ms: u64,
    pub extra_scan_dirs: Vec<PathBuf>,
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: constants::WATCH_POLL_INTERVAL_MS,
            extra_scan_dirs: Vec::new(),
            log_level: None,
        }
    }
}

/// Load and validate config.toml.
///
/// A missing file is the default configuration, not an error.  A present
/// but unparsable or out-of-range file IS an error: silently ignoring a
/// config the user wrote hides mistakes.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file; using defaults");
        return Ok(AppConfig::default());
    }

    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let raw: RawConfig = toml::from_str(&text).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })?;

    validate(raw)
}

fn validate(raw: RawConfig) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::default();

    if let Some(interval) = raw.watch.poll_interval_ms {
        if !(constants::MIN_WATCH_POLL_INTERVAL_MS..=constants::MAX_WATCH_POLL_INTERVAL_MS)
            .contains(&interval)
        {
            return Err(ConfigError::ValueOutOfRange {
                field: "watch.poll_interval_ms".to_string(),
                value: interval.to_string(),
                expected: format!(
                    "{}..={}",
                    constants::MIN_WATCH_POLL_INTERVAL_MS,
                    constants::MAX_WATCH_POLL_INTERVAL_MS
                ),
            });
        }
        config.poll_interval_ms = interval;
    }

    if let Some(dirs) = raw.locator.extra_scan_dirs {
        config.extra_scan_dirs = dirs;
    }

    if let Some(level) = raw.logging.level {
        const KNOWN: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
        if !KNOWN.contains(&level.as_str()) {
            return Err(ConfigError::ValueOutOfRange {
                field: "logging.level".to_string(),
                value: level,
                expected: KNOWN.join(", "),
            });
        }
        config.log_level = Some(level);
    }

    Ok(config)
}

// =============================================================================
// Tests
// =============================================================================
