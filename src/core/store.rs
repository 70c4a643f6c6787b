// wv2sleuth - core/store.rs
//
// Override precedence engine: merges runtime-selection rules from the four
// storage tiers (two env scopes, two registry hives) into one ordered rule
// set, and writes mutations back to exactly one owning backend per entry.
//
// Backend seams are traits so the store's precedence, reconciliation, and
// write-through rules are testable against in-memory backends; the
// platform layer supplies the real registry/environment implementations.

use crate::core::channels::ChannelSet;
use crate::core::overrides::{AppOverrideEntry, StorageKind};
use crate::util::constants::{
    ENV_ADDITIONAL_BROWSER_ARGUMENTS, ENV_BROWSER_EXECUTABLE_FOLDER, ENV_CHANNEL_SEARCH_KIND,
    ENV_RELEASE_CHANNELS, ENV_RELEASE_CHANNEL_PREFERENCE, ENV_USER_DATA_FOLDER,
    REG_KEY_ADDITIONAL_BROWSER_ARGUMENTS, REG_KEY_BROWSER_EXECUTABLE_FOLDER,
    REG_KEY_CHANNEL_SEARCH_KIND, REG_KEY_RELEASE_CHANNELS, REG_KEY_RELEASE_CHANNEL_PREFERENCE,
    REG_KEY_USER_DATA_FOLDER, WILDCARD_HOST_APP,
};
use crate::util::error::{BackendError, OverrideError};
use std::collections::BTreeMap;

// =============================================================================
// Backend seams
// =============================================================================

/// One registry hive, rooted at the fixed policy key.  Subkeys are the six
/// sibling value-name paths; every value name under a subkey is a host-app
/// key.
pub trait PolicyHive: Send + Sync {
    /// All value names under a subkey.  A missing subkey is an empty list,
    /// not an error.
    fn value_names(&self, subkey: &str) -> Result<Vec<String>, BackendError>;

    /// Read a string value; `Ok(None)` when absent or of the wrong type
    /// (malformed persisted data is a diagnostic, not a failure).
    fn read_string(&self, subkey: &str, name: &str) -> Result<Option<String>, BackendError>;

    /// Read a DWORD value; `Ok(None)` when absent or of the wrong type.
    fn read_dword(&self, subkey: &str, name: &str) -> Result<Option<u32>, BackendError>;

    fn write_string(&self, subkey: &str, name: &str, value: &str) -> Result<(), BackendError>;

    fn write_dword(&self, subkey: &str, name: &str, value: u32) -> Result<(), BackendError>;

    /// Delete a value; deleting an absent value succeeds.
    fn delete_value(&self, subkey: &str, name: &str) -> Result<(), BackendError>;
}

/// One persisted environment-variable scope (user or machine).
pub trait EnvScope: Send + Sync {
    /// Read a variable; empty and absent are both `Ok(None)`.
    fn get(&self, name: &str) -> Result<Option<String>, BackendError>;

    /// Set or clear (`None`) a batch of variables as one operation.
    /// Implementations skip the OS settings-change broadcast when every
    /// value is already current — broadcasting is expensive and must not be
    /// spuriously triggered.
    fn set_many(&self, assignments: &[(&str, Option<&str>)]) -> Result<(), BackendError>;
}

// =============================================================================
// Store
// =============================================================================

/// Merged, ordered view over the four override storage tiers.
pub struct OverrideStore {
    env_user: Box<dyn EnvScope>,
    env_machine: Box<dyn EnvScope>,
    registry_machine: Box<dyn PolicyHive>,
    registry_user: Box<dyn PolicyHive>,

    entries: Vec<AppOverrideEntry>,
}

impl OverrideStore {
    pub fn new(
        env_user: Box<dyn EnvScope>,
        env_machine: Box<dyn EnvScope>,
        registry_machine: Box<dyn PolicyHive>,
        registry_user: Box<dyn PolicyHive>,
    ) -> OverrideStore {
        OverrideStore {
            env_user,
            env_machine,
            registry_machine,
            registry_user,
            entries: Vec::new(),
        }
    }

    /// The merged rule set from the last `load`, in precedence order
    /// (wildcards first within each registry tier).
    pub fn entries(&self) -> &[AppOverrideEntry] {
        &self.entries
    }

    pub fn get(&self, host_app: &str, storage: StorageKind) -> Option<&AppOverrideEntry> {
        self.entries
            .iter()
            .find(|e| e.storage == storage && e.host_app == host_app)
    }

    /// Rebuild the merged rule set from all four backends.
    ///
    /// Tiers are rebuilt from scratch, so an entry that received no value
    /// from any of its tier's paths disappears — the backends are the
    /// source of truth and stale entries are never retained.  The
    /// mandatory user-registry wildcard fallback is synthesized (and
    /// written through) when missing.
    pub fn load(&mut self) -> Result<&[AppOverrideEntry], OverrideError> {
        let mut entries = Vec::new();

        for kind in StorageKind::all() {
            match kind {
                StorageKind::EnvUser => {
                    if let Some(e) = load_env_tier(self.env_user.as_ref(), kind)? {
                        entries.push(e);
                    }
                }
                StorageKind::EnvMachine => {
                    if let Some(e) = load_env_tier(self.env_machine.as_ref(), kind)? {
                        entries.push(e);
                    }
                }
                StorageKind::RegistryMachine => {
                    entries.extend(load_registry_tier(self.registry_machine.as_ref(), kind)?);
                }
                StorageKind::RegistryUser => {
                    entries.extend(load_registry_tier(self.registry_user.as_ref(), kind)?);
                }
            }
        }

        self.entries = entries;
        self.ensure_wildcard_fallback()?;
        self.entries.sort_by_key(AppOverrideEntry::order_key);

        tracing::debug!(entries = self.entries.len(), "Override store loaded");
        Ok(&self.entries)
    }

    /// Upsert an entry: write it through to its owning tier, then install
    /// it in the merged view.
    pub fn apply(&mut self, entry: AppOverrideEntry) -> Result<(), OverrideError> {
        if entry.storage.is_env() && !entry.is_wildcard() {
            return Err(OverrideError::WildcardOnlyTier {
                host_app: entry.host_app,
                tier: entry.storage.label(),
            });
        }

        match entry.storage {
            StorageKind::RegistryUser => {
                write_registry_entry(self.registry_user.as_ref(), &entry)?
            }
            StorageKind::RegistryMachine => {
                write_registry_entry(self.registry_machine.as_ref(), &entry)?
            }
            StorageKind::EnvUser => {
                write_env_entry(self.env_user.as_ref(), StorageKind::EnvUser, Some(&entry))?
            }
            StorageKind::EnvMachine => {
                write_env_entry(self.env_machine.as_ref(), StorageKind::EnvMachine, Some(&entry))?
            }
        }

        tracing::debug!(
            host_app = %entry.host_app,
            tier = entry.storage.label(),
            "Override entry written through"
        );

        self.entries
            .retain(|e| !(e.storage == entry.storage && e.host_app == entry.host_app));

        // An all-default env entry is indistinguishable from "no entry";
        // the write above cleared the six variables, so drop it from the
        // view instead of retaining a phantom rule.
        if !(entry.storage.is_env() && entry.is_all_default()) {
            self.entries.push(entry);
        }
        self.entries.sort_by_key(AppOverrideEntry::order_key);
        Ok(())
    }

    /// Remove an entry from its owning backend.
    ///
    /// Returns `Ok(false)` — a guarded no-op — for the protected
    /// user-registry wildcard fallback and for keys with no entry.
    pub fn remove(&mut self, host_app: &str, storage: StorageKind) -> Result<bool, OverrideError> {
        let Some(entry) = self.get(host_app, storage).cloned() else {
            return Ok(false);
        };
        if entry.is_protected() {
            tracing::warn!(
                host_app,
                "Refusing to remove the user-registry wildcard fallback"
            );
            return Ok(false);
        }

        match storage {
            StorageKind::RegistryUser => {
                delete_registry_entry(self.registry_user.as_ref(), host_app, storage)?
            }
            StorageKind::RegistryMachine => {
                delete_registry_entry(self.registry_machine.as_ref(), host_app, storage)?
            }
            StorageKind::EnvUser => {
                write_env_entry(self.env_user.as_ref(), StorageKind::EnvUser, None)?
            }
            StorageKind::EnvMachine => {
                write_env_entry(self.env_machine.as_ref(), StorageKind::EnvMachine, None)?
            }
        }

        self.entries
            .retain(|e| !(e.storage == storage && e.host_app == host_app));
        Ok(true)
    }

    /// Change an entry's owning tier: delete it from the previous backend
    /// and re-apply it under the new one.
    pub fn change_storage(
        &mut self,
        host_app: &str,
        from: StorageKind,
        to: StorageKind,
    ) -> Result<(), OverrideError> {
        if from == to {
            return Ok(());
        }
        let Some(entry) = self.get(host_app, from).cloned() else {
            return Err(OverrideError::UnknownEntry {
                host_app: host_app.to_string(),
                tier: from.label(),
            });
        };
        if entry.is_protected() {
            return Err(OverrideError::ProtectedEntry {
                host_app: host_app.to_string(),
            });
        }
        if to.is_env() && !entry.is_wildcard() {
            return Err(OverrideError::WildcardOnlyTier {
                host_app: host_app.to_string(),
                tier: to.label(),
            });
        }

        let mut moved = entry;
        moved.storage = to;
        self.apply(moved)?;

        // Delete under the old backend only after the new tier holds the
        // entry, so a failure mid-move cannot lose the rule.
        let removed = self.remove(host_app, from)?;
        debug_assert!(removed, "source entry existed above");
        Ok(())
    }

    /// Precedence resolution for one host app: the highest-tier exact-key
    /// entry, or — when no tier has an exact entry — the highest-tier
    /// wildcard.
    pub fn effective_for(&self, host_app: &str) -> Option<&AppOverrideEntry> {
        self.entries
            .iter()
            .filter(|e| e.host_app == host_app)
            .max_by_key(|e| e.storage.precedence())
            .or_else(|| {
                self.entries
                    .iter()
                    .filter(|e| e.is_wildcard())
                    .max_by_key(|e| e.storage.precedence())
            })
    }

    /// Synthesize the mandatory user-registry wildcard fallback when no
    /// load produced one.
    fn ensure_wildcard_fallback(&mut self) -> Result<(), OverrideError> {
        let present = self
            .entries
            .iter()
            .any(|e| e.storage == StorageKind::RegistryUser && e.is_wildcard());
        if present {
            return Ok(());
        }

        let fallback = AppOverrideEntry::new(WILDCARD_HOST_APP, StorageKind::RegistryUser);
        write_registry_entry(self.registry_user.as_ref(), &fallback)?;
        tracing::info!("Synthesized the user-registry wildcard fallback entry");
        self.entries.push(fallback);
        Ok(())
    }
}

// =============================================================================
// Registry tier load / write
// =============================================================================

/// Scan order for the six value-name paths.  The legacy boolean is scanned
/// before its replacement so the replacement wins when both are present.
const REGISTRY_SCAN_ORDER: [&str; 6] = [
    REG_KEY_BROWSER_EXECUTABLE_FOLDER,
    REG_KEY_RELEASE_CHANNEL_PREFERENCE,
    REG_KEY_CHANNEL_SEARCH_KIND,
    REG_KEY_RELEASE_CHANNELS,
    REG_KEY_ADDITIONAL_BROWSER_ARGUMENTS,
    REG_KEY_USER_DATA_FOLDER,
];

fn backend(
    kind: StorageKind,
    operation: &'static str,
) -> impl Fn(BackendError) -> OverrideError {
    move |source| OverrideError::Backend {
        tier: kind.label(),
        operation,
        source,
    }
}

fn load_registry_tier(
    hive: &dyn PolicyHive,
    kind: StorageKind,
) -> Result<Vec<AppOverrideEntry>, OverrideError> {
    let err = backend(kind, "load");
    let mut by_key: BTreeMap<String, AppOverrideEntry> = BTreeMap::new();

    for subkey in REGISTRY_SCAN_ORDER {
        for name in hive.value_names(subkey).map_err(&err)? {
            let entry = by_key
                .entry(name.clone())
                .or_insert_with(|| AppOverrideEntry::new(&name, kind));

            match subkey {
                REG_KEY_BROWSER_EXECUTABLE_FOLDER => {
                    entry.runtime_path =
                        hive.read_string(subkey, &name).map_err(&err)?.unwrap_or_default();
                }
                REG_KEY_RELEASE_CHANNEL_PREFERENCE | REG_KEY_CHANNEL_SEARCH_KIND => {
                    // Same semantics; a malformed DWORD decodes to false.
                    match hive.read_dword(subkey, &name).map_err(&err)? {
                        Some(v) => entry.reverse_search_order = v != 0,
                        None => tracing::debug!(
                            subkey,
                            host_app = %name,
                            "Malformed or missing boolean override value; treated as false"
                        ),
                    }
                }
                REG_KEY_RELEASE_CHANNELS => {
                    let raw = hive.read_string(subkey, &name).map_err(&err)?.unwrap_or_default();
                    entry.release_channels = ChannelSet::decode(&raw);
                }
                REG_KEY_ADDITIONAL_BROWSER_ARGUMENTS => {
                    entry.browser_arguments =
                        hive.read_string(subkey, &name).map_err(&err)?.unwrap_or_default();
                }
                REG_KEY_USER_DATA_FOLDER => {
                    entry.user_data_path =
                        hive.read_string(subkey, &name).map_err(&err)?.unwrap_or_default();
                }
                _ => unreachable!("scan order is the six known paths"),
            }
        }
    }

    Ok(by_key.into_values().collect())
}

fn write_registry_entry(
    hive: &dyn PolicyHive,
    entry: &AppOverrideEntry,
) -> Result<(), OverrideError> {
    let err = backend(entry.storage, "write");
    let name = entry.host_app.as_str();

    // Empty/default values are deleted rather than written, with one
    // exception: AdditionalBrowserArguments is always written — its
    // presence is what records that the entry exists at all.
    if entry.runtime_path.is_empty() {
        hive.delete_value(REG_KEY_BROWSER_EXECUTABLE_FOLDER, name).map_err(&err)?;
    } else {
        hive.write_string(REG_KEY_BROWSER_EXECUTABLE_FOLDER, name, &entry.runtime_path)
            .map_err(&err)?;
    }

    if entry.user_data_path.is_empty() {
        hive.delete_value(REG_KEY_USER_DATA_FOLDER, name).map_err(&err)?;
    } else {
        hive.write_string(REG_KEY_USER_DATA_FOLDER, name, &entry.user_data_path)
            .map_err(&err)?;
    }

    hive.write_string(REG_KEY_ADDITIONAL_BROWSER_ARGUMENTS, name, &entry.browser_arguments)
        .map_err(&err)?;

    if entry.reverse_search_order {
        hive.write_dword(REG_KEY_CHANNEL_SEARCH_KIND, name, 1).map_err(&err)?;
        // Kept in sync for consumers still reading the legacy value.
        hive.write_dword(REG_KEY_RELEASE_CHANNEL_PREFERENCE, name, 1).map_err(&err)?;
    } else {
        hive.delete_value(REG_KEY_CHANNEL_SEARCH_KIND, name).map_err(&err)?;
        hive.delete_value(REG_KEY_RELEASE_CHANNEL_PREFERENCE, name).map_err(&err)?;
    }

    let encoded = entry.release_channels.encode();
    if encoded.is_empty() {
        hive.delete_value(REG_KEY_RELEASE_CHANNELS, name).map_err(&err)?;
    } else {
        hive.write_string(REG_KEY_RELEASE_CHANNELS, name, &encoded).map_err(&err)?;
    }

    Ok(())
}

fn delete_registry_entry(
    hive: &dyn PolicyHive,
    host_app: &str,
    kind: StorageKind,
) -> Result<(), OverrideError> {
    let err = backend(kind, "remove");
    for subkey in REGISTRY_SCAN_ORDER {
        hive.delete_value(subkey, host_app).map_err(&err)?;
    }
    Ok(())
}

// =============================================================================
// Environment tier load / write
// =============================================================================

fn load_env_tier(
    scope: &dyn EnvScope,
    kind: StorageKind,
) -> Result<Option<AppOverrideEntry>, OverrideError> {
    let err = backend(kind, "load");

    let runtime_path = scope.get(ENV_BROWSER_EXECUTABLE_FOLDER).map_err(&err)?;
    let user_data_path = scope.get(ENV_USER_DATA_FOLDER).map_err(&err)?;
    let browser_arguments = scope.get(ENV_ADDITIONAL_BROWSER_ARGUMENTS).map_err(&err)?;
    let legacy_preference = scope.get(ENV_RELEASE_CHANNEL_PREFERENCE).map_err(&err)?;
    let search_kind = scope.get(ENV_CHANNEL_SEARCH_KIND).map_err(&err)?;
    let channels = scope.get(ENV_RELEASE_CHANNELS).map_err(&err)?;

    // The six variables are one co-located group: all empty means the tier
    // has no entry at all — partial updates are not possible here.
    if runtime_path.is_none()
        && user_data_path.is_none()
        && browser_arguments.is_none()
        && legacy_preference.is_none()
        && search_kind.is_none()
        && channels.is_none()
    {
        return Ok(None);
    }

    let mut entry = AppOverrideEntry::new(WILDCARD_HOST_APP, kind);
    entry.runtime_path = runtime_path.unwrap_or_default();
    entry.user_data_path = user_data_path.unwrap_or_default();
    entry.browser_arguments = browser_arguments.unwrap_or_default();
    entry.reverse_search_order = search_kind.or(legacy_preference).as_deref() == Some("1");
    entry.release_channels = ChannelSet::decode(&channels.unwrap_or_default());
    Ok(Some(entry))
}

fn write_env_entry(
    scope: &dyn EnvScope,
    kind: StorageKind,
    entry: Option<&AppOverrideEntry>,
) -> Result<(), OverrideError> {
    let err = backend(kind, "write");

    let non_empty = |s: &str| {
        if s.is_empty() {
            None
        } else {
            Some(s.to_string())
        }
    };

    let (runtime, data, args, reverse, channels) = match entry {
        Some(e) => (
            non_empty(&e.runtime_path),
            non_empty(&e.user_data_path),
            non_empty(&e.browser_arguments),
            e.reverse_search_order.then(|| "1".to_string()),
            non_empty(&e.release_channels.encode()),
        ),
        // Tier removal: all six cleared together, never partially.
        None => (None, None, None, None, None),
    };

    let assignments: [(&str, Option<&str>); 6] = [
        (ENV_BROWSER_EXECUTABLE_FOLDER, runtime.as_deref()),
        (ENV_USER_DATA_FOLDER, data.as_deref()),
        (ENV_ADDITIONAL_BROWSER_ARGUMENTS, args.as_deref()),
        (ENV_RELEASE_CHANNEL_PREFERENCE, reverse.as_deref()),
        (ENV_CHANNEL_SEARCH_KIND, reverse.as_deref()),
        (ENV_RELEASE_CHANNELS, channels.as_deref()),
    ];

    scope.set_many(&assignments).map_err(&err)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::channels::ReleaseChannel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // -------------------------------------------------------------------------
    // In-memory backends
    // -------------------------------------------------------------------------

    #[derive(Debug, Clone, PartialEq)]
    enum Value {
        Str(String),
        Dword(u32),
    }

    #[derive(Default)]
    struct MemoryHive {
        keys: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
    }

    impl MemoryHive {
        fn value(&self, subkey: &str, name: &str) -> Option<Value> {
            self.keys
                .lock()
                .unwrap()
                .get(subkey)
                .and_then(|k| k.get(name))
                .cloned()
        }

        fn set(&self, subkey: &str, name: &str, value: Value) {
            self.keys
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
                .keys
                .lock()
                .unwrap()
                .get(subkey)
                .map(|k| k.keys().cloned().collect())
                .unwrap_or_default())
        }

        fn read_string(&self, subkey: &str, name: &str) -> Result<Option<String>, BackendError> {
            Ok(match self.value(subkey, name) {
                Some(Value::Str(s)) => Some(s),
                _ => None,
            })
        }

        fn read_dword(&self, subkey: &str, name: &str) -> Result<Option<u32>, BackendError> {
            Ok(match self.value(subkey, name) {
                Some(Value::Dword(d)) => Some(d),
                _ => None,
            })
        }

        fn write_string(&self, subkey: &str, name: &str, value: &str) -> Result<(), BackendError> {
            self.set(subkey, name, Value::Str(value.to_string()));
            Ok(())
        }

        fn write_dword(&self, subkey: &str, name: &str, value: u32) -> Result<(), BackendError> {
            self.set(subkey, name, Value::Dword(value));
            Ok(())
        }

        fn delete_value(&self, subkey: &str, name: &str) -> Result<(), BackendError> {
            if let Some(k) = self.keys.lock().unwrap().get_mut(subkey) {
                k.remove(name);
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryEnv {
        vars: Mutex<BTreeMap<String, String>>,
        broadcasts: AtomicUsize,
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
                self.broadcasts.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    /// Store over fresh in-memory backends, returning the backends for
    /// direct inspection.  Leaks the backends deliberately: tests hold
    /// plain references alongside the boxed trait objects.
    fn store() -> (
        OverrideStore,
        &'static MemoryEnv,
        &'static MemoryEnv,
        &'static MemoryHive,
        &'static MemoryHive,
    ) {
        let env_user: &'static MemoryEnv = Box::leak(Box::default());
        let env_machine: &'static MemoryEnv = Box::leak(Box::default());
        let reg_machine: &'static MemoryHive = Box::leak(Box::default());
        let reg_user: &'static MemoryHive = Box::leak(Box::default());
        let store = OverrideStore::new(
            Box::new(EnvRef(env_user)),
            Box::new(EnvRef(env_machine)),
            Box::new(HiveRef(reg_machine)),
            Box::new(HiveRef(reg_user)),
        );
        (store, env_user, env_machine, reg_machine, reg_user)
    }

    struct EnvRef(&'static MemoryEnv);
    impl EnvScope for EnvRef {
        fn get(&self, name: &str) -> Result<Option<String>, BackendError> {
            self.0.get(name)
        }
        fn set_many(&self, assignments: &[(&str, Option<&str>)]) -> Result<(), BackendError> {
            self.0.set_many(assignments)
        }
    }

    struct HiveRef(&'static MemoryHive);
    impl PolicyHive for HiveRef {
        fn value_names(&self, subkey: &str) -> Result<Vec<String>, BackendError> {
            self.0.value_names(subkey)
        }
        fn read_string(&self, subkey: &str, name: &str) -> Result<Option<String>, BackendError> {
            self.0.read_string(subkey, name)
        }
        fn read_dword(&self, subkey: &str, name: &str) -> Result<Option<u32>, BackendError> {
            self.0.read_dword(subkey, name)
        }
        fn write_string(&self, subkey: &str, name: &str, value: &str) -> Result<(), BackendError> {
            self.0.write_string(subkey, name, value)
        }
        fn write_dword(&self, subkey: &str, name: &str, value: u32) -> Result<(), BackendError> {
            self.0.write_dword(subkey, name, value)
        }
        fn delete_value(&self, subkey: &str, name: &str) -> Result<(), BackendError> {
            self.0.delete_value(subkey, name)
        }
    }

    // -------------------------------------------------------------------------
    // Load
    // -------------------------------------------------------------------------

    /// The wildcard fallback is synthesized on load and written through —
    /// the args presence marker appears in the hive.
    #[test]
    fn test_load_synthesizes_wildcard_fallback() {
        let (mut s, _, _, _, reg_user) = store();
        s.load().unwrap();

        let fallback = s.get("*", StorageKind::RegistryUser).expect("fallback");
        assert!(fallback.is_evergreen());
        assert_eq!(
            reg_user.value(REG_KEY_ADDITIONAL_BROWSER_ARGUMENTS, "*"),
            Some(Value::Str(String::new())),
            "presence marker must be written through"
        );
    }

    /// Entries order by tier, wildcard-first within registry tiers.
    #[test]
    fn test_load_orders_tiers_and_wildcards() {
        let (mut s, env_user, _, reg_machine, reg_user) = store();
        env_user
            .set_many(&[(ENV_USER_DATA_FOLDER, Some("C:/envdata"))])
            .unwrap();
        reg_machine.set(
            REG_KEY_ADDITIONAL_BROWSER_ARGUMENTS,
            "zeta.exe",
            Value::Str(String::new()),
        );
        reg_user.set(
            REG_KEY_ADDITIONAL_BROWSER_ARGUMENTS,
            "alpha.exe",
            Value::Str(String::new()),
        );
        reg_user.set(REG_KEY_ADDITIONAL_BROWSER_ARGUMENTS, "*", Value::Str(String::new()));

        s.load().unwrap();
        let keys: Vec<(StorageKind, &str)> = s
            .entries()
            .iter()
            .map(|e| (e.storage, e.host_app.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (StorageKind::EnvUser, "*"),
                (StorageKind::RegistryMachine, "zeta.exe"),
                (StorageKind::RegistryUser, "*"),
                (StorageKind::RegistryUser, "alpha.exe"),
            ]
        );
    }

    /// All six persisted fields of a registry entry land in the model, and
    /// the replacement boolean wins over the legacy one.
    #[test]
    fn test_load_registry_fields() {
        let (mut s, _, _, _, reg_user) = store();
        let name = "app.exe";
        reg_user.set(REG_KEY_BROWSER_EXECUTABLE_FOLDER, name, Value::Str("C:/rt".into()));
        reg_user.set(REG_KEY_USER_DATA_FOLDER, name, Value::Str("C:/data".into()));
        reg_user.set(REG_KEY_ADDITIONAL_BROWSER_ARGUMENTS, name, Value::Str("--foo".into()));
        reg_user.set(REG_KEY_RELEASE_CHANNELS, name, Value::Str("1,3".into()));
        reg_user.set(REG_KEY_RELEASE_CHANNEL_PREFERENCE, name, Value::Dword(0));
        reg_user.set(REG_KEY_CHANNEL_SEARCH_KIND, name, Value::Dword(1));

        s.load().unwrap();
        let e = s.get(name, StorageKind::RegistryUser).expect("entry");
        assert_eq!(e.runtime_path, "C:/rt");
        assert_eq!(e.user_data_path, "C:/data");
        assert_eq!(e.browser_arguments, "--foo");
        assert!(e.reverse_search_order, "ChannelSearchKind wins over legacy");
        assert!(e.channel_enabled(ReleaseChannel::Beta));
        assert!(e.channel_enabled(ReleaseChannel::Canary));
        assert!(!e.channel_enabled(ReleaseChannel::Stable));
        assert!(e.is_fixed_version());
    }

    /// A garbage channel list is a diagnostic, not a failure: the entry
    /// loads with all channels.
    #[test]
    fn test_load_garbage_channels_defaults_to_all() {
        let (mut s, _, _, _, reg_user) = store();
        reg_user.set(REG_KEY_RELEASE_CHANNELS, "app.exe", Value::Str("bogus".into()));

        s.load().unwrap();
        let e = s.get("app.exe", StorageKind::RegistryUser).expect("entry");
        assert!(e.release_channels.is_all());
    }

    /// Env tier: all six empty yields no entry; any value yields exactly
    /// one wildcard entry with all fields populated together.
    #[test]
    fn test_load_env_tier_grouping() {
        let (mut s, env_user, env_machine, _, _) = store();
        env_machine
            .set_many(&[
                (ENV_BROWSER_EXECUTABLE_FOLDER, Some("C:/fixed")),
                (ENV_RELEASE_CHANNELS, Some("0")),
            ])
            .unwrap();

        s.load().unwrap();
        assert!(s.get("*", StorageKind::EnvUser).is_none(), "empty scope: no entry");
        let e = s.get("*", StorageKind::EnvMachine).expect("machine entry");
        assert_eq!(e.runtime_path, "C:/fixed");
        assert_eq!(
            e.release_channels,
            ChannelSet::of(&[ReleaseChannel::Stable])
        );
        let _ = env_user;
    }

    // -------------------------------------------------------------------------
    // Write-through
    // -------------------------------------------------------------------------

    /// Full channel mask persists as an absent value; a subset persists as
    /// the sorted numeric list.
    #[test]
    fn test_write_channel_mask_persistence() {
        let (mut s, _, _, _, reg_user) = store();
        s.load().unwrap();

        let mut e = AppOverrideEntry::new("app.exe", StorageKind::RegistryUser);
        e.release_channels = ChannelSet::of(&[ReleaseChannel::Beta, ReleaseChannel::Canary]);
        s.apply(e.clone()).unwrap();
        assert_eq!(
            reg_user.value(REG_KEY_RELEASE_CHANNELS, "app.exe"),
            Some(Value::Str("1,3".into()))
        );

        e.release_channels = ChannelSet::ALL;
        s.apply(e).unwrap();
        assert_eq!(
            reg_user.value(REG_KEY_RELEASE_CHANNELS, "app.exe"),
            None,
            "full mask must persist as an empty (deleted) value"
        );
        // The presence marker keeps the entry alive.
        assert_eq!(
            reg_user.value(REG_KEY_ADDITIONAL_BROWSER_ARGUMENTS, "app.exe"),
            Some(Value::Str(String::new()))
        );
    }

    /// The boolean writes both the replacement and the legacy value, and
    /// clears both when false.
    #[test]
    fn test_write_reverse_search_order_both_values() {
        let (mut s, _, _, _, reg_user) = store();
        s.load().unwrap();

        let mut e = AppOverrideEntry::new("app.exe", StorageKind::RegistryUser);
        e.reverse_search_order = true;
        s.apply(e.clone()).unwrap();
        assert_eq!(
            reg_user.value(REG_KEY_CHANNEL_SEARCH_KIND, "app.exe"),
            Some(Value::Dword(1))
        );
        assert_eq!(
            reg_user.value(REG_KEY_RELEASE_CHANNEL_PREFERENCE, "app.exe"),
            Some(Value::Dword(1))
        );

        e.reverse_search_order = false;
        s.apply(e).unwrap();
        assert_eq!(reg_user.value(REG_KEY_CHANNEL_SEARCH_KIND, "app.exe"), None);
        assert_eq!(reg_user.value(REG_KEY_RELEASE_CHANNEL_PREFERENCE, "app.exe"), None);
    }

    /// Env write sets the six variables as one batch and skips the
    /// broadcast when nothing changed.
    #[test]
    fn test_env_write_batch_and_broadcast_skip() {
        let (mut s, env_user, _, _, _) = store();
        s.load().unwrap();

        let mut e = AppOverrideEntry::new("*", StorageKind::EnvUser);
        e.user_data_path = "C:/envdata".to_string();
        e.reverse_search_order = true;
        s.apply(e.clone()).unwrap();

        assert_eq!(env_user.get(ENV_USER_DATA_FOLDER).unwrap().as_deref(), Some("C:/envdata"));
        assert_eq!(env_user.get(ENV_CHANNEL_SEARCH_KIND).unwrap().as_deref(), Some("1"));
        assert_eq!(
            env_user.get(ENV_RELEASE_CHANNEL_PREFERENCE).unwrap().as_deref(),
            Some("1"),
            "the legacy variable mirrors the replacement"
        );
        let after_first = env_user.broadcasts.load(Ordering::SeqCst);

        // Re-applying the identical entry must not broadcast again.
        s.apply(e).unwrap();
        assert_eq!(env_user.broadcasts.load(Ordering::SeqCst), after_first);
    }

    /// A per-host-app entry cannot be stored in an env tier.
    #[test]
    fn test_env_tier_rejects_non_wildcard() {
        let (mut s, _, _, _, _) = store();
        s.load().unwrap();

        let e = AppOverrideEntry::new("app.exe", StorageKind::EnvUser);
        assert!(matches!(
            s.apply(e),
            Err(OverrideError::WildcardOnlyTier { .. })
        ));
    }

    // -------------------------------------------------------------------------
    // Removal and moves
    // -------------------------------------------------------------------------

    /// The user-registry wildcard can never be removed.
    #[test]
    fn test_remove_protected_wildcard_is_noop() {
        let (mut s, _, _, _, reg_user) = store();
        s.load().unwrap();

        let removed = s.remove("*", StorageKind::RegistryUser).unwrap();
        assert!(!removed);
        assert!(s.get("*", StorageKind::RegistryUser).is_some());
        assert_eq!(
            reg_user.value(REG_KEY_ADDITIONAL_BROWSER_ARGUMENTS, "*"),
            Some(Value::Str(String::new()))
        );
    }

    #[test]
    fn test_remove_clears_all_six_values() {
        let (mut s, _, _, _, reg_user) = store();
        s.load().unwrap();

        let mut e = AppOverrideEntry::new("app.exe", StorageKind::RegistryUser);
        e.runtime_path = "C:/rt".to_string();
        e.reverse_search_order = true;
        s.apply(e).unwrap();

        assert!(s.remove("app.exe", StorageKind::RegistryUser).unwrap());
        for subkey in REGISTRY_SCAN_ORDER {
            assert_eq!(reg_user.value(subkey, "app.exe"), None, "{subkey} not cleared");
        }
        assert!(s.get("app.exe", StorageKind::RegistryUser).is_none());
    }

    /// Changing storage moves the entry: values disappear from the old
    /// backend and appear under the new one.
    #[test]
    fn test_change_storage_moves_between_hives() {
        let (mut s, _, _, reg_machine, reg_user) = store();
        s.load().unwrap();

        let mut e = AppOverrideEntry::new("app.exe", StorageKind::RegistryUser);
        e.runtime_path = "C:/rt".to_string();
        s.apply(e).unwrap();

        s.change_storage("app.exe", StorageKind::RegistryUser, StorageKind::RegistryMachine)
            .unwrap();

        assert_eq!(reg_user.value(REG_KEY_BROWSER_EXECUTABLE_FOLDER, "app.exe"), None);
        assert_eq!(
            reg_machine.value(REG_KEY_BROWSER_EXECUTABLE_FOLDER, "app.exe"),
            Some(Value::Str("C:/rt".into()))
        );
        let moved = s.get("app.exe", StorageKind::RegistryMachine).expect("moved entry");
        assert_eq!(moved.runtime_path, "C:/rt");
        assert!(s.get("app.exe", StorageKind::RegistryUser).is_none());
    }

    #[test]
    fn test_change_storage_guards() {
        let (mut s, _, _, _, _) = store();
        s.load().unwrap();

        assert!(matches!(
            s.change_storage("*", StorageKind::RegistryUser, StorageKind::RegistryMachine),
            Err(OverrideError::ProtectedEntry { .. })
        ));
        assert!(matches!(
            s.change_storage("ghost.exe", StorageKind::RegistryUser, StorageKind::RegistryMachine),
            Err(OverrideError::UnknownEntry { .. })
        ));
    }

    // -------------------------------------------------------------------------
    // Precedence resolution
    // -------------------------------------------------------------------------

    #[test]
    fn test_effective_for_exact_beats_wildcard_and_tier_order() {
        let (mut s, env_user, _, reg_machine, _) = store();
        env_user
            .set_many(&[(ENV_USER_DATA_FOLDER, Some("C:/env"))])
            .unwrap();
        reg_machine.set(
            REG_KEY_USER_DATA_FOLDER,
            "app.exe",
            Value::Str("C:/machine".into()),
        );
        s.load().unwrap();

        // Exact machine-registry entry beats both wildcards.
        let eff = s.effective_for("app.exe").expect("effective");
        assert_eq!(eff.storage, StorageKind::RegistryMachine);
        assert_eq!(eff.user_data_path, "C:/machine");

        // With no exact entry, the highest-tier wildcard wins — the
        // synthesized RegistryUser fallback outranks the env wildcard.
        let eff = s.effective_for("other.exe").expect("effective");
        assert_eq!(eff.storage, StorageKind::RegistryUser);
        assert!(eff.is_wildcard());
    }
}
