// wv2sleuth - platform/env_scope.rs
//
// Persisted environment-variable scopes (user and machine).
//
// These are not the calling process's environment: the persisted scopes
// live in the registry (HKCU\Environment and the Session Manager key) and
// take effect in newly started processes after a WM_SETTINGCHANGE
// "Environment" broadcast.  The broadcast is sent once per changed batch
// and skipped entirely when every value is already current — it is
// delivered synchronously to every top-level window and must not be
// triggered spuriously.

use crate::core::store::EnvScope;
#[cfg(target_os = "windows")]
use crate::platform::registry::RegistryRoot;
use crate::util::error::BackendError;

/// Which persisted scope a backend operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvScopeKind {
    User,
    Machine,
}

impl EnvScopeKind {
    #[cfg(target_os = "windows")]
    fn location(&self) -> (RegistryRoot, &'static str) {
        match self {
            Self::User => (RegistryRoot::CurrentUser, "Environment"),
            Self::Machine => (
                RegistryRoot::LocalMachine,
                r"SYSTEM\CurrentControlSet\Control\Session Manager\Environment",
            ),
        }
    }
}

/// `EnvScope` over a real persisted scope.
#[derive(Debug, Clone, Copy)]
pub struct PersistedEnvScope {
    // Read by the Windows implementation only; the stub keeps the field
    // so construction is identical on every platform.
    #[cfg_attr(not(target_os = "windows"), allow(dead_code))]
    kind: EnvScopeKind,
}

impl PersistedEnvScope {
    pub fn new(kind: EnvScopeKind) -> PersistedEnvScope {
        PersistedEnvScope { kind }
    }
}

#[cfg(target_os = "windows")]
impl EnvScope for PersistedEnvScope {
    fn get(&self, name: &str) -> Result<Option<String>, BackendError> {
        let (root, path) = self.kind.location();
        let value = crate::platform::registry::reg_ffi::read_string(root, path, name)?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    fn set_many(&self, assignments: &[(&str, Option<&str>)]) -> Result<(), BackendError> {
        let (root, path) = self.kind.location();
        let mut changed = false;

        for (name, value) in assignments {
            let current =
                crate::platform::registry::reg_ffi::read_string(root, path, name)?
                    .filter(|v| !v.is_empty());
            if current.as_deref() == *value {
                continue;
            }
            match value {
                Some(v) => {
                    crate::platform::registry::reg_ffi::write_string(root, path, name, v)?
                }
                None => crate::platform::registry::reg_ffi::delete_value(root, path, name)?,
            }
            changed = true;
        }

        if changed {
            tracing::debug!(scope = ?self.kind, "Broadcasting environment change");
            ffi::broadcast_environment_change();
        }
        Ok(())
    }
}

#[cfg(not(target_os = "windows"))]
impl EnvScope for PersistedEnvScope {
    fn get(&self, _name: &str) -> Result<Option<String>, BackendError> {
        Err(BackendError::NotSupported)
    }

    fn set_many(&self, _assignments: &[(&str, Option<&str>)]) -> Result<(), BackendError> {
        Err(BackendError::NotSupported)
    }
}

// =============================================================================
// Windows FFI
// =============================================================================

#[cfg(target_os = "windows")]
mod ffi {
    use crate::platform::win32;

    const HWND_BROADCAST: isize = 0xFFFF;
    const WM_SETTINGCHANGE: u32 = 0x001A;
    const SMTO_ABORTIFHUNG: u32 = 0x0002;

    /// Per-window reply timeout for the broadcast (ms).
    const BROADCAST_TIMEOUT_MS: u32 = 5_000;

    #[link(name = "user32")]
    extern "system" {
        fn SendMessageTimeoutW(
            hwnd: isize,
            msg: u32,
            w_param: usize,
            l_param: isize,
            fu_flags: u32,
            u_timeout: u32,
            lpdw_result: *mut usize,
        ) -> isize;
    }

    /// Tell running applications the persisted environment changed.
    /// Hung windows are skipped after the timeout; failure here is not an
    /// error — newly started processes pick the values up regardless.
    pub(super) fn broadcast_environment_change() {
        let section = win32::to_wide("Environment");
        let mut result: usize = 0;
        // SAFETY: the section buffer outlives the call; result is writable.
        unsafe {
            SendMessageTimeoutW(
                HWND_BROADCAST,
                WM_SETTINGCHANGE,
                0,
                section.as_ptr() as isize,
                SMTO_ABORTIFHUNG,
                BROADCAST_TIMEOUT_MS,
                &mut result,
            );
        }
    }
}
