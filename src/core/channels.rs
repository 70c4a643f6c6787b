// wv2sleuth - core/channels.rs
//
// Release channel identification and the channel-set bitmask used by
// override rules.  Pure data; the on-disk encoding (comma-separated small
// ints, empty = all) lives here so every storage backend round-trips
// through one implementation.

use serde::Serialize;

// =============================================================================
// Release channel
// =============================================================================

/// A WebView2 runtime release track.
///
/// The numeric discriminants are the on-disk encoding used by the
/// `ReleaseChannels` registry value and the `WEBVIEW2_RELEASE_CHANNELS`
/// environment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(u8)]
pub enum ReleaseChannel {
    Stable = 0,
    Beta = 1,
    Dev = 2,
    Canary = 3,
}

impl ReleaseChannel {
    /// All channels in encoding order (Stable first).
    pub fn all() -> [ReleaseChannel; 4] {
        [Self::Stable, Self::Beta, Self::Dev, Self::Canary]
    }

    /// Human-readable label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stable => "Stable",
            Self::Beta => "Beta",
            Self::Dev => "Dev",
            Self::Canary => "Canary",
        }
    }

    /// Map an on-disk channel index back to a channel.
    pub fn from_index(index: u8) -> Option<ReleaseChannel> {
        match index {
            0 => Some(Self::Stable),
            1 => Some(Self::Beta),
            2 => Some(Self::Dev),
            3 => Some(Self::Canary),
            _ => None,
        }
    }

    /// Classify a runtime installation by a path substring.
    ///
    /// The SxS (Canary) and named preview installs embed their channel in
    /// the install directory; anything unmarked is a Stable install.
    pub fn classify_path(path: &str) -> ReleaseChannel {
        let lower = path.to_lowercase();
        if lower.contains("sxs") || lower.contains("canary") {
            Self::Canary
        } else if lower.contains("beta") {
            Self::Beta
        } else if lower.contains("dev") {
            Self::Dev
        } else {
            Self::Stable
        }
    }
}

impl std::fmt::Display for ReleaseChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Channel set
// =============================================================================

/// Set of release channels a host app is allowed to bind, as a bitmask.
///
/// The default — and the meaning of an absent/empty persisted value — is
/// "all four channels".  The empty set is representable in memory but is
/// never produced by decoding: an all-garbage persisted value collapses to
/// the default, never to "no channels".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelSet(u8);

impl ChannelSet {
    const FULL_MASK: u8 = 0b1111;

    /// The full set (all four channels).
    pub const ALL: ChannelSet = ChannelSet(Self::FULL_MASK);

    /// The empty set.  Only reachable by explicit removal, never by decode.
    pub const NONE: ChannelSet = ChannelSet(0);

    /// Build a set from individual channels.
    pub fn of(channels: &[ReleaseChannel]) -> ChannelSet {
        let mut set = Self::NONE;
        for c in channels {
            set.insert(*c);
        }
        set
    }

    pub fn contains(&self, channel: ReleaseChannel) -> bool {
        self.0 & (1 << channel as u8) != 0
    }

    pub fn insert(&mut self, channel: ReleaseChannel) {
        self.0 |= 1 << channel as u8;
    }

    pub fn remove(&mut self, channel: ReleaseChannel) {
        self.0 &= !(1 << channel as u8);
    }

    pub fn is_all(&self) -> bool {
        self.0 == Self::FULL_MASK
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Channels in this set, in encoding order.
    pub fn iter(&self) -> impl Iterator<Item = ReleaseChannel> + '_ {
        ReleaseChannel::all().into_iter().filter(|c| self.contains(*c))
    }

    /// Encode for persistence: the full set encodes to the empty string (the
    /// identity default); a subset encodes to its sorted numeric indices,
    /// e.g. {Beta, Canary} → "1,3".
    pub fn encode(&self) -> String {
        if self.is_all() {
            return String::new();
        }
        let parts: Vec<String> = self.iter().map(|c| (c as u8).to_string()).collect();
        parts.join(",")
    }

    /// Decode a persisted channel list.
    ///
    /// An absent or empty value means "all channels", never "no channels".
    /// Unparsable tokens are skipped with a diagnostic; if nothing valid
    /// remains the result is again the full set.
    pub fn decode(raw: &str) -> ChannelSet {
        if raw.trim().is_empty() {
            return Self::ALL;
        }

        let mut set = Self::NONE;
        for token in raw.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.parse::<u8>().ok().and_then(ReleaseChannel::from_index) {
                Some(channel) => set.insert(channel),
                None => {
                    tracing::debug!(token, raw, "Ignoring unparsable release-channel token");
                }
            }
        }

        if set.is_empty() {
            tracing::debug!(raw, "Channel list decoded to nothing; defaulting to all channels");
            Self::ALL
        } else {
            set
        }
    }
}

impl Default for ChannelSet {
    fn default() -> Self {
        Self::ALL
    }
}

impl std::fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_all() {
            return f.write_str("All");
        }
        let labels: Vec<&str> = self.iter().map(|c| c.label()).collect();
        f.write_str(&labels.join("+"))
    }
}

// =============================================================================
// Tests
// =============================================================================
