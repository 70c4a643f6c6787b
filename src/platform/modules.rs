// wv2sleuth - platform/modules.rs
//
// Loaded-module enumeration for a target process, filtered to the
// interesting-DLL list.
//
// Uses EnumProcessModulesEx through the kernel32 K32* exports so no psapi
// import library is required.  Access failures are mapped to the probe
// error taxonomy: a vanished process and an access-denied process are both
// per-pid conditions the engine drops silently.

use crate::core::probes::ModuleEnumerator;
#[cfg(any(target_os = "windows", test))]
use crate::util::constants::INTERESTING_DLLS;
use crate::util::error::ProbeError;
use std::path::PathBuf;

/// Enumerator over a process's loaded modules.
#[derive(Debug, Default)]
pub struct LoadedModuleEnumerator;

impl LoadedModuleEnumerator {
    pub fn new() -> LoadedModuleEnumerator {
        LoadedModuleEnumerator
    }
}

/// Whether a module path's file name is on the interesting-DLL list.
#[cfg(any(target_os = "windows", test))]
fn is_interesting(path: &std::path::Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| {
            INTERESTING_DLLS
                .iter()
                .any(|dll| dll.eq_ignore_ascii_case(name))
        })
}

#[cfg(target_os = "windows")]
impl ModuleEnumerator for LoadedModuleEnumerator {
    fn loaded_interesting_dlls(&self, pid: u32) -> Result<Vec<PathBuf>, ProbeError> {
        let all = ffi::module_paths(pid)?;
        Ok(all.into_iter().filter(|p| is_interesting(p)).collect())
    }
}

#[cfg(not(target_os = "windows"))]
impl ModuleEnumerator for LoadedModuleEnumerator {
    fn loaded_interesting_dlls(&self, _pid: u32) -> Result<Vec<PathBuf>, ProbeError> {
        Err(ProbeError::NotSupported)
    }
}

// =============================================================================
// Windows FFI
// =============================================================================

#[cfg(target_os = "windows")]
mod ffi {
    use crate::platform::win32;
    use crate::util::error::ProbeError;
    use std::path::PathBuf;

    const PROCESS_QUERY_INFORMATION: u32 = 0x0400;
    const PROCESS_VM_READ: u32 = 0x0010;

    /// LIST_MODULES_ALL: both 32- and 64-bit modules of the target.
    const LIST_MODULES_ALL: u32 = 0x03;

    const ERROR_ACCESS_DENIED: u32 = 5;
    const ERROR_INVALID_PARAMETER: u32 = 87;
    /// Returned while the target is still initialising or is exiting.
    const ERROR_PARTIAL_COPY: u32 = 299;

    /// Upper bound on enumerated modules; a process with more loaded
    /// modules than this is pathological.
    const MAX_MODULES: usize = 2_048;

    /// MAX_PATH-free buffer size for long module paths.
    const PATH_BUF_LEN: usize = 4_096;

    #[link(name = "kernel32")]
    extern "system" {
        fn OpenProcess(dw_desired_access: u32, b_inherit_handle: i32, dw_process_id: u32)
            -> isize;

        fn CloseHandle(h_object: isize) -> i32;

        fn K32EnumProcessModulesEx(
            h_process: isize,
            lph_module: *mut isize,
            cb: u32,
            lpcb_needed: *mut u32,
            dw_filter_flag: u32,
        ) -> i32;

        fn K32GetModuleFileNameExW(
            h_process: isize,
            h_module: isize,
            lp_filename: *mut u16,
            n_size: u32,
        ) -> u32;
    }

    fn last_error() -> u32 {
        std::io::Error::last_os_error().raw_os_error().unwrap_or(0) as u32
    }

    /// Full paths of every module loaded in `pid`.
    pub(super) fn module_paths(pid: u32) -> Result<Vec<PathBuf>, ProbeError> {
        // SAFETY: OpenProcess returns 0 on failure; the handle is closed on
        // every exit path below.
        let process =
            unsafe { OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, 0, pid) };
        if process == 0 {
            return Err(match last_error() {
                ERROR_ACCESS_DENIED => ProbeError::AccessDenied { pid },
                ERROR_INVALID_PARAMETER => ProbeError::ProcessGone { pid },
                code => ProbeError::Api {
                    operation: "OpenProcess",
                    code,
                    message: win32::error_message(code),
                },
            });
        }

        let result = enumerate(process, pid);

        // SAFETY: `process` is a valid handle owned by this function.
        unsafe {
            CloseHandle(process);
        }
        result
    }

    fn enumerate(process: isize, pid: u32) -> Result<Vec<PathBuf>, ProbeError> {
        let mut handles = vec![0isize; MAX_MODULES];
        let cb = (handles.len() * std::mem::size_of::<isize>()) as u32;
        let mut needed: u32 = 0;

        // SAFETY: `handles` is a writable buffer of `cb` bytes; `needed`
        // receives the byte count actually required.
        let ok = unsafe {
            K32EnumProcessModulesEx(process, handles.as_mut_ptr(), cb, &mut needed, LIST_MODULES_ALL)
        };
        if ok == 0 {
            return Err(match last_error() {
                // The process is mid-start or mid-exit: treat as gone for
                // this pass; a later pass will see it settled.
                ERROR_PARTIAL_COPY => ProbeError::ProcessGone { pid },
                ERROR_ACCESS_DENIED => ProbeError::AccessDenied { pid },
                code => ProbeError::Api {
                    operation: "EnumProcessModulesEx",
                    code,
                    message: win32::error_message(code),
                },
            });
        }

        let count = (needed as usize / std::mem::size_of::<isize>()).min(handles.len());
        let mut paths = Vec::with_capacity(count.min(64));
        let mut name_buf = vec![0u16; PATH_BUF_LEN];

        for &module in &handles[..count] {
            // SAFETY: `module` came from the enumeration above; the buffer
            // is writable for its full length.
            let len = unsafe {
                K32GetModuleFileNameExW(
                    process,
                    module,
                    name_buf.as_mut_ptr(),
                    name_buf.len() as u32,
                )
            };
            if len == 0 {
                // The module can be unloaded between the two calls; skip.
                continue;
            }
            paths.push(PathBuf::from(win32::from_wide(&name_buf[..len as usize])));
        }

        Ok(paths)
    }
}

// =============================================================================
// Tests
// =============================================================================
