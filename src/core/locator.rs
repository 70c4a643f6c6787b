// wv2sleuth - core/locator.rs
//
// Runtime locator: scans installation directories, configured build trees,
// and the downloads folder for runtime executables.
//
// Reads only directory entries and file metadata; per-entry I/O errors are
// non-fatal and collected as warnings, so one unreadable directory never
// hides the rest of the machine's runtimes.

use crate::core::model::RuntimeEntry;
use crate::util::constants;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::PathBuf;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a runtime scan.
#[derive(Debug, Clone)]
pub struct LocatorConfig {
    /// Directories to scan.  Missing roots are skipped silently — most
    /// machines have only a subset of the default install locations.
    pub scan_roots: Vec<PathBuf>,

    /// Maximum directory recursion depth below each root.
    pub max_depth: usize,

    /// Glob patterns an executable file name must match.
    pub exe_patterns: Vec<String>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            scan_roots: default_scan_roots(),
            max_depth: constants::LOCATOR_MAX_DEPTH,
            exe_patterns: constants::LOCATOR_EXE_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

/// Default scan roots: the EdgeWebView and Edge-channel application
/// directories under both Program Files roots, plus the user's downloads
/// folder (where fixed-version packages land after download).
pub fn default_scan_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();

    for base_var in ["ProgramFiles(x86)", "ProgramFiles"] {
        if let Ok(base) = std::env::var(base_var) {
            let microsoft = PathBuf::from(base).join("Microsoft");
            for install in [
                "EdgeWebView",
                "EdgeWebViewBeta",
                "EdgeWebViewDev",
                "EdgeWebViewCanary",
                "Edge",
                "Edge Beta",
                "Edge Dev",
                "Edge SxS",
            ] {
                roots.push(microsoft.join(install).join("Application"));
            }
        }
    }

    if let Some(user_dirs) = directories::UserDirs::new() {
        if let Some(downloads) = user_dirs.download_dir() {
            roots.push(downloads.to_path_buf());
        }
    }

    roots
}

// =============================================================================
// Scan
// =============================================================================

/// Scan the configured roots for runtime executables.
///
/// Returns discovered entries (deduplicated by executable path, ordered by
/// channel then version, newest first) and non-fatal warnings.
pub fn locate_runtimes(config: &LocatorConfig) -> (Vec<RuntimeEntry>, Vec<String>) {
    let patterns: Vec<glob::Pattern> = config
        .exe_patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                tracing::warn!(pattern = p, error = %e, "Invalid executable pattern, skipping");
                None
            }
        })
        .collect();

    let mut warnings = Vec::new();
    let mut seen: BTreeSet<PathBuf> = BTreeSet::new();
    let mut entries: Vec<RuntimeEntry> = Vec::new();

    for root in &config.scan_roots {
        if !root.is_dir() {
            tracing::trace!(root = %root.display(), "Locator root absent, skipped");
            continue;
        }

        let walker = walkdir::WalkDir::new(root)
            .max_depth(config.max_depth)
            .follow_links(false);

        for entry_result in walker {
            if entries.len() >= constants::LOCATOR_MAX_RESULTS {
                warnings.push(format!(
                    "Runtime scan stopped at {} results; narrow the scan roots",
                    constants::LOCATOR_MAX_RESULTS
                ));
                break;
            }

            let entry = match entry_result {
                Ok(e) => e,
                Err(e) => {
                    let msg = format!("Cannot access '{}': {e}", root.display());
                    tracing::debug!(warning = %msg, "Locator warning");
                    warnings.push(msg);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if !patterns.iter().any(|p| p.matches(&name.to_lowercase())) {
                continue;
            }

            let path = entry.path().to_path_buf();
            if !seen.insert(path.clone()) {
                continue;
            }

            let modified: Option<DateTime<Utc>> = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from);

            let runtime = RuntimeEntry::from_exe_path(path, modified);
            tracing::debug!(
                exe = %runtime.exe_path.display(),
                channel = %runtime.channel,
                version = runtime.version.as_deref().unwrap_or("-"),
                "Runtime located"
            );
            entries.push(runtime);
        }
    }

    // Channel order, then newest version first within a channel.  Version
    // strings are four-part numerics, so componentwise numeric order is the
    // correct comparison.
    entries.sort_by(|a, b| {
        a.channel
            .cmp(&b.channel)
            .then_with(|| compare_versions(b.version.as_deref(), a.version.as_deref()))
    });

    (entries, warnings)
}

/// Compare dotted numeric versions componentwise; `None` sorts last.
fn compare_versions(a: Option<&str>, b: Option<&str>) -> std::cmp::Ordering {
    fn parts(v: &str) -> Vec<u64> {
        v.split('.').filter_map(|p| p.parse().ok()).collect()
    }
    match (a, b) {
        (Some(a), Some(b)) => parts(a).cmp(&parts(b)),
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

// =============================================================================
// Tests
// =============================================================================
