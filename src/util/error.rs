// wv2sleuth - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation; all errors preserve the causal chain
// for diagnostic logging.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all wv2sleuth operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum Wv2SleuthError {
    /// Override store load or write-through failed.
    Override(OverrideError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// A feature precondition is not satisfied (recoverable; carries a
    /// remediation link).
    Precondition(PreconditionError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for Wv2SleuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Override(e) => write!(f, "Override store error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Precondition(e) => write!(f, "{e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for Wv2SleuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Override(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Precondition(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Probe errors (discovery collaborators)
// ---------------------------------------------------------------------------

/// Error produced by one OS probe call against one process.
///
/// These are transient by design: a pid observed during enumeration can be
/// gone by the time it is inspected.  The discovery engine catches every
/// variant per-pid and drops that pid's contribution from the pass — probe
/// errors never escape a discovery call.
#[derive(Debug)]
pub enum ProbeError {
    /// The process exited between enumeration and inspection.
    ProcessGone { pid: u32 },

    /// The OS denied access to the process (insufficient rights, sandbox).
    AccessDenied { pid: u32 },

    /// The probe is not available on this platform.
    NotSupported,

    /// An OS API call failed with a code not covered above.
    Api {
        operation: &'static str,
        code: u32,
        message: String,
    },

    /// Underlying I/O failure (e.g. enumerating the pipe namespace).
    Io {
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProcessGone { pid } => write!(f, "process {pid} exited during inspection"),
            Self::AccessDenied { pid } => write!(f, "access denied inspecting process {pid}"),
            Self::NotSupported => write!(f, "probe not supported on this platform"),
            Self::Api {
                operation,
                code,
                message,
            } => write!(f, "{operation} failed (code {code}): {message}"),
            Self::Io { operation, source } => write!(f, "{operation}: {source}"),
        }
    }
}

impl std::error::Error for ProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Backend errors (override storage)
// ---------------------------------------------------------------------------

/// Error produced by a storage backend (registry hive or environment scope).
///
/// Unlike probe errors these are fatal to the operation that triggered them:
/// an inaccessible hive means the tool cannot reason about machine state.
#[derive(Debug)]
pub enum BackendError {
    /// The backend is not available on this platform.
    NotSupported,

    /// A registry or environment API call failed.
    Api { code: u32, message: String },

    /// Underlying I/O failure.
    Io { source: io::Error },
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSupported => {
                write!(f, "storage backend not supported on this platform")
            }
            Self::Api { message, .. } if !message.trim().is_empty() => {
                write!(f, "{}", message.trim())
            }
            Self::Api { code, .. } => write!(f, "backend error (code {code})"),
            Self::Io { source } => write!(f, "{source}"),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Override store errors
// ---------------------------------------------------------------------------

/// Errors related to override rule loading and write-through.
#[derive(Debug)]
pub enum OverrideError {
    /// A storage backend failed during load or write-through.
    /// `tier` is the backend's display label (e.g. "registry (HKCU)").
    Backend {
        tier: &'static str,
        operation: &'static str,
        source: BackendError,
    },

    /// The entry is protected and cannot be removed or moved
    /// (the user-registry wildcard fallback).
    ProtectedEntry { host_app: String },

    /// No entry exists for the given key/tier combination.
    UnknownEntry {
        host_app: String,
        tier: &'static str,
    },

    /// The tier holds a single wildcard entry only; per-host-app entries
    /// cannot be stored there (environment scopes).
    WildcardOnlyTier {
        host_app: String,
        tier: &'static str,
    },
}

impl fmt::Display for OverrideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend {
                tier,
                operation,
                source,
            } => write!(f, "{tier}: {operation} failed: {source}"),
            Self::ProtectedEntry { host_app } => write!(
                f,
                "the '{host_app}' user-registry fallback entry cannot be removed"
            ),
            Self::UnknownEntry { host_app, tier } => {
                write!(f, "no override entry for '{host_app}' in {tier}")
            }
            Self::WildcardOnlyTier { host_app, tier } => write!(
                f,
                "{tier} holds a single wildcard entry; cannot store '{host_app}' there"
            ),
        }
    }
}

impl std::error::Error for OverrideError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<OverrideError> for Wv2SleuthError {
    fn from(e: OverrideError) -> Self {
        Self::Override(e)
    }
}

// ---------------------------------------------------------------------------
// Precondition errors
// ---------------------------------------------------------------------------

/// A requested operation needs something that is not installed or present.
///
/// Recoverable by the user; every variant carries a remediation link so the
/// frontend can offer a next step instead of a dead end.
#[derive(Debug)]
pub enum PreconditionError {
    /// The referenced release channel has no installed runtime.
    ChannelNotInstalled {
        channel: &'static str,
        download_url: &'static str,
    },

    /// A fixed-version override points at a path with no runtime executable.
    RuntimeMissing {
        path: PathBuf,
        download_url: &'static str,
    },
}

impl fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelNotInstalled {
                channel,
                download_url,
            } => write!(
                f,
                "no installed WebView2 runtime for the {channel} channel. \
                 Install one from {download_url}"
            ),
            Self::RuntimeMissing { path, download_url } => write!(
                f,
                "no runtime executable found under '{}'. \
                 Install a fixed-version runtime from {download_url}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for PreconditionError {}

impl From<PreconditionError> for Wv2SleuthError {
    fn from(e: PreconditionError) -> Self {
        Self::Precondition(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for Wv2SleuthError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience type alias for wv2sleuth results.
pub type Result<T> = std::result::Result<T, Wv2SleuthError>;
