// wv2sleuth - platform/registry.rs
//
// Registry access for the override policy hives.
//
// `RegistryPolicyHive` implements the `PolicyHive` seam over one root
// (HKCU or HKLM), rooted at the fixed policy key.  The low-level helpers
// are shared with the environment-scope backend, which persists through
// the registry as well.
//
// Keys are opened per operation (open, act, close): override traffic is a
// handful of values at a time, and short-lived handles cannot go stale
// across hive reloads.

use crate::core::store::PolicyHive;
#[cfg(target_os = "windows")]
use crate::util::constants::REG_POLICY_ROOT;
use crate::util::error::BackendError;

/// Which hive a backend operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryRoot {
    CurrentUser,
    LocalMachine,
}

/// `PolicyHive` over a real registry root.
#[derive(Debug, Clone, Copy)]
pub struct RegistryPolicyHive {
    // Read by the Windows implementation only; the stub keeps the field
    // so construction is identical on every platform.
    #[cfg_attr(not(target_os = "windows"), allow(dead_code))]
    root: RegistryRoot,
}

impl RegistryPolicyHive {
    pub fn new(root: RegistryRoot) -> RegistryPolicyHive {
        RegistryPolicyHive { root }
    }

    #[cfg(target_os = "windows")]
    fn key_path(&self, subkey: &str) -> String {
        format!("{REG_POLICY_ROOT}\\{subkey}")
    }
}

#[cfg(target_os = "windows")]
impl PolicyHive for RegistryPolicyHive {
    fn value_names(&self, subkey: &str) -> Result<Vec<String>, BackendError> {
        reg_ffi::value_names(self.root, &self.key_path(subkey))
    }

    fn read_string(&self, subkey: &str, name: &str) -> Result<Option<String>, BackendError> {
        reg_ffi::read_string(self.root, &self.key_path(subkey), name)
    }

    fn read_dword(&self, subkey: &str, name: &str) -> Result<Option<u32>, BackendError> {
        reg_ffi::read_dword(self.root, &self.key_path(subkey), name)
    }

    fn write_string(&self, subkey: &str, name: &str, value: &str) -> Result<(), BackendError> {
        reg_ffi::write_string(self.root, &self.key_path(subkey), name, value)
    }

    fn write_dword(&self, subkey: &str, name: &str, value: u32) -> Result<(), BackendError> {
        reg_ffi::write_dword(self.root, &self.key_path(subkey), name, value)
    }

    fn delete_value(&self, subkey: &str, name: &str) -> Result<(), BackendError> {
        reg_ffi::delete_value(self.root, &self.key_path(subkey), name)
    }
}

#[cfg(not(target_os = "windows"))]
impl PolicyHive for RegistryPolicyHive {
    fn value_names(&self, _subkey: &str) -> Result<Vec<String>, BackendError> {
        Err(BackendError::NotSupported)
    }

    fn read_string(&self, _subkey: &str, _name: &str) -> Result<Option<String>, BackendError> {
        Err(BackendError::NotSupported)
    }

    fn read_dword(&self, _subkey: &str, _name: &str) -> Result<Option<u32>, BackendError> {
        Err(BackendError::NotSupported)
    }

    fn write_string(&self, _subkey: &str, _name: &str, _value: &str) -> Result<(), BackendError> {
        Err(BackendError::NotSupported)
    }

    fn write_dword(&self, _subkey: &str, _name: &str, _value: u32) -> Result<(), BackendError> {
        Err(BackendError::NotSupported)
    }

    fn delete_value(&self, _subkey: &str, _name: &str) -> Result<(), BackendError> {
        Err(BackendError::NotSupported)
    }
}

// =============================================================================
// Windows FFI
// =============================================================================

/// Low-level registry helpers, shared with `platform::env_scope`.
#[cfg(target_os = "windows")]
pub(crate) mod reg_ffi {
    use super::RegistryRoot;
    use crate::platform::win32;
    use crate::util::error::BackendError;

    // Predefined root handles are sign-extended 32-bit constants.
    const HKEY_CURRENT_USER: isize = 0x8000_0001u32 as i32 as isize;
    const HKEY_LOCAL_MACHINE: isize = 0x8000_0002u32 as i32 as isize;

    const KEY_READ: u32 = 0x0002_0019;
    const KEY_WRITE: u32 = 0x0002_0006;

    const REG_SZ: u32 = 1;
    const REG_EXPAND_SZ: u32 = 2;
    const REG_DWORD: u32 = 4;

    const ERROR_SUCCESS: i32 = 0;
    const ERROR_FILE_NOT_FOUND: i32 = 2;
    const ERROR_MORE_DATA: i32 = 234;
    const ERROR_NO_MORE_ITEMS: i32 = 259;

    /// Registry value names are bounded at 16,383 characters.
    const MAX_VALUE_NAME: usize = 16_384;

    /// Upper bound on value data read in one call (64 KiB of UTF-16).
    const MAX_VALUE_DATA: usize = 64 * 1024;

    #[link(name = "advapi32")]
    extern "system" {
        fn RegOpenKeyExW(
            h_key: isize,
            lp_sub_key: *const u16,
            ul_options: u32,
            sam_desired: u32,
            phk_result: *mut isize,
        ) -> i32;

        fn RegCreateKeyExW(
            h_key: isize,
            lp_sub_key: *const u16,
            reserved: u32,
            lp_class: *const u16,
            dw_options: u32,
            sam_desired: u32,
            lp_security_attributes: *mut std::ffi::c_void,
            phk_result: *mut isize,
            lpdw_disposition: *mut u32,
        ) -> i32;

        fn RegCloseKey(h_key: isize) -> i32;

        fn RegEnumValueW(
            h_key: isize,
            dw_index: u32,
            lp_value_name: *mut u16,
            lpcch_value_name: *mut u32,
            lp_reserved: *mut u32,
            lp_type: *mut u32,
            lp_data: *mut u8,
            lpcb_data: *mut u32,
        ) -> i32;

        fn RegQueryValueExW(
            h_key: isize,
            lp_value_name: *const u16,
            lp_reserved: *mut u32,
            lp_type: *mut u32,
            lp_data: *mut u8,
            lpcb_data: *mut u32,
        ) -> i32;

        fn RegSetValueExW(
            h_key: isize,
            lp_value_name: *const u16,
            reserved: u32,
            dw_type: u32,
            lp_data: *const u8,
            cb_data: u32,
        ) -> i32;

        fn RegDeleteValueW(h_key: isize, lp_value_name: *const u16) -> i32;
    }

    fn root_handle(root: RegistryRoot) -> isize {
        match root {
            RegistryRoot::CurrentUser => HKEY_CURRENT_USER,
            RegistryRoot::LocalMachine => HKEY_LOCAL_MACHINE,
        }
    }

    fn api_error(code: i32) -> BackendError {
        BackendError::Api {
            code: code as u32,
            message: win32::error_message(code as u32),
        }
    }

    /// RAII key handle.
    struct Key(isize);

    impl Drop for Key {
        fn drop(&mut self) {
            // SAFETY: the handle was opened by RegOpenKeyExW or
            // RegCreateKeyExW and is closed exactly once.
            unsafe {
                RegCloseKey(self.0);
            }
        }
    }

    /// Open for reading; `Ok(None)` when the key does not exist.
    fn open_read(root: RegistryRoot, path: &str) -> Result<Option<Key>, BackendError> {
        let wide = win32::to_wide(path);
        let mut handle: isize = 0;
        // SAFETY: `wide` is null-terminated; `handle` receives the key.
        let rc = unsafe { RegOpenKeyExW(root_handle(root), wide.as_ptr(), 0, KEY_READ, &mut handle) };
        match rc {
            ERROR_SUCCESS => Ok(Some(Key(handle))),
            ERROR_FILE_NOT_FOUND => Ok(None),
            code => Err(api_error(code)),
        }
    }

    /// Open for writing, creating the key path when absent.
    fn open_write(root: RegistryRoot, path: &str) -> Result<Key, BackendError> {
        let wide = win32::to_wide(path);
        let mut handle: isize = 0;
        let mut disposition: u32 = 0;
        // SAFETY: all pointer arguments reference live locals.
        let rc = unsafe {
            RegCreateKeyExW(
                root_handle(root),
                wide.as_ptr(),
                0,
                std::ptr::null(),
                0,
                KEY_READ | KEY_WRITE,
                std::ptr::null_mut(),
                &mut handle,
                &mut disposition,
            )
        };
        if rc == ERROR_SUCCESS {
            Ok(Key(handle))
        } else {
            Err(api_error(rc))
        }
    }

    pub(crate) fn value_names(
        root: RegistryRoot,
        path: &str,
    ) -> Result<Vec<String>, BackendError> {
        let Some(key) = open_read(root, path)? else {
            return Ok(Vec::new());
        };

        let mut names = Vec::new();
        let mut name_buf = vec![0u16; MAX_VALUE_NAME];
        for index in 0.. {
            let mut name_len = name_buf.len() as u32;
            // SAFETY: the name buffer is writable for `name_len` chars;
            // data pointers are null (names only).
            let rc = unsafe {
                RegEnumValueW(
                    key.0,
                    index,
                    name_buf.as_mut_ptr(),
                    &mut name_len,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                )
            };
            match rc {
                ERROR_SUCCESS | ERROR_MORE_DATA => {
                    names.push(win32::from_wide(&name_buf[..name_len as usize]));
                }
                ERROR_NO_MORE_ITEMS => break,
                code => return Err(api_error(code)),
            }
        }
        Ok(names)
    }

    /// Query one value's type and raw bytes; `Ok(None)` when absent.
    fn read_raw(
        root: RegistryRoot,
        path: &str,
        name: &str,
    ) -> Result<Option<(u32, Vec<u8>)>, BackendError> {
        let Some(key) = open_read(root, path)? else {
            return Ok(None);
        };

        let wide_name = win32::to_wide(name);
        let mut value_type: u32 = 0;
        let mut data = vec![0u8; MAX_VALUE_DATA];
        let mut data_len = data.len() as u32;
        // SAFETY: `data` is writable for `data_len` bytes.
        let rc = unsafe {
            RegQueryValueExW(
                key.0,
                wide_name.as_ptr(),
                std::ptr::null_mut(),
                &mut value_type,
                data.as_mut_ptr(),
                &mut data_len,
            )
        };
        match rc {
            ERROR_SUCCESS => {
                data.truncate(data_len as usize);
                Ok(Some((value_type, data)))
            }
            ERROR_FILE_NOT_FOUND => Ok(None),
            code => Err(api_error(code)),
        }
    }

    pub(crate) fn read_string(
        root: RegistryRoot,
        path: &str,
        name: &str,
    ) -> Result<Option<String>, BackendError> {
        match read_raw(root, path, name)? {
            Some((value_type, data)) if value_type == REG_SZ || value_type == REG_EXPAND_SZ => {
                let wide: Vec<u16> = data
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                Ok(Some(win32::from_wide(&wide)))
            }
            Some((value_type, _)) => {
                // Wrong type is malformed persisted data: a diagnostic,
                // never a failure.
                tracing::debug!(path, name, value_type, "Expected a string value; ignoring");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub(crate) fn read_dword(
        root: RegistryRoot,
        path: &str,
        name: &str,
    ) -> Result<Option<u32>, BackendError> {
        match read_raw(root, path, name)? {
            Some((REG_DWORD, data)) if data.len() >= 4 => {
                Ok(Some(u32::from_le_bytes([data[0], data[1], data[2], data[3]])))
            }
            Some((value_type, _)) => {
                tracing::debug!(path, name, value_type, "Expected a DWORD value; ignoring");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub(crate) fn write_string(
        root: RegistryRoot,
        path: &str,
        name: &str,
        value: &str,
    ) -> Result<(), BackendError> {
        let key = open_write(root, path)?;
        let wide_name = win32::to_wide(name);
        let wide_value = win32::to_wide(value);
        let bytes = wide_value.len() * 2;
        // SAFETY: the data pointer covers `bytes` bytes of the wide buffer,
        // including its null terminator.
        let rc = unsafe {
            RegSetValueExW(
                key.0,
                wide_name.as_ptr(),
                0,
                REG_SZ,
                wide_value.as_ptr().cast(),
                bytes as u32,
            )
        };
        if rc == ERROR_SUCCESS {
            Ok(())
        } else {
            Err(api_error(rc))
        }
    }

    pub(crate) fn write_dword(
        root: RegistryRoot,
        path: &str,
        name: &str,
        value: u32,
    ) -> Result<(), BackendError> {
        let key = open_write(root, path)?;
        let wide_name = win32::to_wide(name);
        let bytes = value.to_le_bytes();
        // SAFETY: the data pointer covers exactly four bytes.
        let rc = unsafe {
            RegSetValueExW(
                key.0,
                wide_name.as_ptr(),
                0,
                REG_DWORD,
                bytes.as_ptr(),
                bytes.len() as u32,
            )
        };
        if rc == ERROR_SUCCESS {
            Ok(())
        } else {
            Err(api_error(rc))
        }
    }

    /// Delete a value; deleting an absent value (or a value under an
    /// absent key) succeeds.
    pub(crate) fn delete_value(
        root: RegistryRoot,
        path: &str,
        name: &str,
    ) -> Result<(), BackendError> {
        let wide = win32::to_wide(path);
        let mut handle: isize = 0;
        // SAFETY: `wide` is null-terminated; `handle` receives the key.
        let rc = unsafe {
            RegOpenKeyExW(root_handle(root), wide.as_ptr(), 0, KEY_WRITE, &mut handle)
        };
        match rc {
            ERROR_FILE_NOT_FOUND => return Ok(()),
            ERROR_SUCCESS => {}
            code => return Err(api_error(code)),
        }
        let key = Key(handle);

        let wide_name = win32::to_wide(name);
        // SAFETY: the key handle is valid; the name is null-terminated.
        let rc = unsafe { RegDeleteValueW(key.0, wide_name.as_ptr()) };
        match rc {
            ERROR_SUCCESS | ERROR_FILE_NOT_FOUND => Ok(()),
            code => Err(api_error(code)),
        }
    }
}
