// wv2sleuth - core/overrides.rs
//
// Override rule model: one entry per (host app, storage tier) describing
// which runtime the host should bind.  The derived selection-mode views
// (evergreen / evergreen-preview / fixed-version) are pure functions of the
// raw fields — there is no cached derived state to keep in sync.

use crate::core::channels::{ChannelSet, ReleaseChannel};
use crate::util::constants::WILDCARD_HOST_APP;
use serde::Serialize;

// =============================================================================
// Storage kind
// =============================================================================

/// The four override storage tiers.  The declaration order is both the load
/// order and the precedence order, lowest specificity first: each
/// subsequent tier can override the previous for the same host-app key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StorageKind {
    EnvUser,
    EnvMachine,
    RegistryMachine,
    RegistryUser,
}

impl StorageKind {
    /// All tiers in load/precedence order.
    pub fn all() -> [StorageKind; 4] {
        [
            Self::EnvUser,
            Self::EnvMachine,
            Self::RegistryMachine,
            Self::RegistryUser,
        ]
    }

    /// Numeric precedence; higher wins.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::EnvUser => 0,
            Self::EnvMachine => 1,
            Self::RegistryMachine => 2,
            Self::RegistryUser => 3,
        }
    }

    pub fn is_registry(&self) -> bool {
        matches!(self, Self::RegistryMachine | Self::RegistryUser)
    }

    pub fn is_env(&self) -> bool {
        !self.is_registry()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::EnvUser => "environment (user)",
            Self::EnvMachine => "environment (machine)",
            Self::RegistryMachine => "registry (HKLM)",
            Self::RegistryUser => "registry (HKCU)",
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Override entry
// =============================================================================

/// One rule describing which runtime a host app (or all apps, host app =
/// "*") should use.
///
/// String overrides use the empty string for "unset" — mirroring the
/// persisted form, where deleting a value and writing an empty value are
/// the same statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppOverrideEntry {
    /// Host-app key; "*" applies to all hosts not otherwise matched.
    pub host_app: String,

    /// Owning backend; also the precedence tier.
    pub storage: StorageKind,

    /// Fixed runtime folder; empty = no fixed-version override.
    pub runtime_path: String,

    /// User data folder override; empty = unset.
    pub user_data_path: String,

    /// Extra browser arguments; empty = unset.
    pub browser_arguments: String,

    /// Search preview channels before stable.
    pub reverse_search_order: bool,

    /// Channels the host may bind; defaults to all four.
    pub release_channels: ChannelSet,
}

impl AppOverrideEntry {
    /// A default entry for a key: everything unset, all channels.
    pub fn new(host_app: &str, storage: StorageKind) -> AppOverrideEntry {
        AppOverrideEntry {
            host_app: host_app.to_string(),
            storage,
            runtime_path: String::new(),
            user_data_path: String::new(),
            browser_arguments: String::new(),
            reverse_search_order: false,
            release_channels: ChannelSet::ALL,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.host_app == WILDCARD_HOST_APP
    }

    /// The mandatory fallback entry: the user-registry wildcard.  Guarded
    /// against removal and tier moves at the store's mutation boundary.
    pub fn is_protected(&self) -> bool {
        self.is_wildcard() && self.storage == StorageKind::RegistryUser
    }

    // -------------------------------------------------------------------------
    // Derived selection-mode views (computed on demand, never stored)
    // -------------------------------------------------------------------------

    /// Evergreen: latest installed Stable runtime — no path override, no
    /// reversed search, full channel set.
    pub fn is_evergreen(&self) -> bool {
        self.runtime_path.is_empty()
            && !self.reverse_search_order
            && self.release_channels.is_all()
    }

    /// Evergreen preview: no fixed path, but preview channels are searched
    /// before stable.
    pub fn is_evergreen_preview(&self) -> bool {
        self.runtime_path.is_empty() && self.reverse_search_order
    }

    /// Fixed version: a runtime folder is pinned.
    pub fn is_fixed_version(&self) -> bool {
        !self.runtime_path.is_empty()
    }

    pub fn channel_enabled(&self, channel: ReleaseChannel) -> bool {
        self.release_channels.contains(channel)
    }

    /// Whether every persisted field is at its default.  An all-default env
    /// entry is indistinguishable from "no entry" and is removed from its
    /// tier rather than stored.
    pub fn is_all_default(&self) -> bool {
        self.runtime_path.is_empty()
            && self.user_data_path.is_empty()
            && self.browser_arguments.is_empty()
            && !self.reverse_search_order
            && self.release_channels.is_all()
    }

    /// Sort key for the merged view: tier load order first; within a
    /// tier, wildcard entries sort to the front, then host apps
    /// alphabetically (case-insensitive).  A sort key rather than an Ord
    /// impl: entries differing only in override values are distinct to
    /// `==` but tie under this ordering.
    pub fn order_key(&self) -> (u8, u8, String) {
        (
            self.storage.precedence(),
            u8::from(!self.is_wildcard()),
            self.host_app.to_lowercase(),
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
