// wv2sleuth - platform/process.rs
//
// Process inspection backed by `sysinfo` (pid enumeration, executable
// path, command line, parent pid) plus a Windows-only token query for the
// integrity/sandbox classification.
//
// The command line is carried as a single re-quoted string — the form the
// OS stores — and tokenized on demand by `core::cmdline`, so the same
// parsing path serves command lines from every source.

use crate::core::model::IntegrityLevel;
use crate::core::probes::{ProcessFacts, ProcessInspector};
use crate::util::error::ProbeError;
use std::ffi::OsString;
use std::sync::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Inspector over the live process table.
///
/// `sysinfo` requires `&mut` for refreshes; the `Mutex` confines that to
/// this type so the trait surface stays `&self` (the engine fans module
/// scans — not inspections — across threads, so contention is negligible).
pub struct SystemProcessInspector {
    sys: Mutex<System>,
}

impl SystemProcessInspector {
    pub fn new() -> SystemProcessInspector {
        SystemProcessInspector {
            sys: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProcessInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessInspector for SystemProcessInspector {
    fn all_pids(&self) -> Vec<u32> {
        let mut sys = self.sys.lock().expect("process table lock");
        sys.refresh_processes(ProcessesToUpdate::All, true);
        sys.processes().keys().map(|p| p.as_u32()).collect()
    }

    fn inspect(&self, pid: u32) -> Result<ProcessFacts, ProbeError> {
        let mut sys = self.sys.lock().expect("process table lock");
        let sys_pid = Pid::from_u32(pid);
        sys.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);

        let process = sys
            .process(sys_pid)
            .ok_or(ProbeError::ProcessGone { pid })?;

        Ok(ProcessFacts {
            pid,
            name: process.name().to_string_lossy().into_owned(),
            executable_path: process.exe().map(|p| p.to_path_buf()),
            command_line: join_command_line(process.cmd()),
            parent_pid: process.parent().map(|p| p.as_u32()),
            integrity: query_integrity(pid),
        })
    }
}

/// Re-quote an argv slice into the single-string form `core::cmdline`
/// parses: arguments containing whitespace are wrapped in double quotes.
fn join_command_line(args: &[OsString]) -> String {
    let mut line = String::new();
    for arg in args {
        let arg = arg.to_string_lossy();
        if !line.is_empty() {
            line.push(' ');
        }
        if arg.chars().any(char::is_whitespace) {
            line.push('"');
            line.push_str(&arg);
            line.push('"');
        } else {
            line.push_str(&arg);
        }
    }
    line
}

// =============================================================================
// Integrity classification — Windows implementation
// =============================================================================

#[cfg(target_os = "windows")]
fn query_integrity(pid: u32) -> IntegrityLevel {
    ffi::token_integrity(pid).unwrap_or(IntegrityLevel::Unknown)
}

#[cfg(not(target_os = "windows"))]
fn query_integrity(_pid: u32) -> IntegrityLevel {
    IntegrityLevel::Unknown
}

#[cfg(target_os = "windows")]
mod ffi {
    use crate::core::model::IntegrityLevel;

    const PROCESS_QUERY_LIMITED_INFORMATION: u32 = 0x1000;
    const TOKEN_QUERY: u32 = 0x0008;

    /// TOKEN_INFORMATION_CLASS values.
    const TOKEN_INTEGRITY_LEVEL: u32 = 25;
    const TOKEN_IS_APP_CONTAINER: u32 = 29;

    /// Mandatory-label RID thresholds.
    const SECURITY_MANDATORY_LOW_RID: u32 = 0x1000;
    const SECURITY_MANDATORY_MEDIUM_RID: u32 = 0x2000;
    const SECURITY_MANDATORY_HIGH_RID: u32 = 0x3000;
    const SECURITY_MANDATORY_SYSTEM_RID: u32 = 0x4000;

    #[link(name = "kernel32")]
    extern "system" {
        fn OpenProcess(dw_desired_access: u32, b_inherit_handle: i32, dw_process_id: u32)
            -> isize;
        fn CloseHandle(h_object: isize) -> i32;
    }

    #[link(name = "advapi32")]
    extern "system" {
        fn OpenProcessToken(
            process_handle: isize,
            desired_access: u32,
            token_handle: *mut isize,
        ) -> i32;

        fn GetTokenInformation(
            token_handle: isize,
            token_information_class: u32,
            token_information: *mut std::ffi::c_void,
            token_information_length: u32,
            return_length: *mut u32,
        ) -> i32;

        fn GetSidSubAuthorityCount(sid: *const std::ffi::c_void) -> *mut u8;

        fn GetSidSubAuthority(sid: *const std::ffi::c_void, sub_authority: u32) -> *mut u32;
    }

    /// RAII process/token handle.
    struct Handle(isize);

    impl Drop for Handle {
        fn drop(&mut self) {
            if self.0 != 0 {
                // SAFETY: the handle was returned by OpenProcess or
                // OpenProcessToken and is closed exactly once.
                unsafe {
                    CloseHandle(self.0);
                }
            }
        }
    }

    /// Read the integrity level of a process token; `None` when the
    /// process or its token is not accessible.
    pub(super) fn token_integrity(pid: u32) -> Option<IntegrityLevel> {
        // SAFETY: OpenProcess with limited query access returns 0 on
        // failure; the handle is owned by the RAII wrapper.
        let process = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid) };
        if process == 0 {
            return None;
        }
        let process = Handle(process);

        let mut token: isize = 0;
        // SAFETY: process handle is valid; token receives an owned handle.
        if unsafe { OpenProcessToken(process.0, TOKEN_QUERY, &mut token) } == 0 {
            return None;
        }
        let token = Handle(token);

        // AppContainer short-circuits the mandatory-label classification.
        let mut is_app_container: u32 = 0;
        let mut returned: u32 = 0;
        // SAFETY: the buffer is a correctly-sized u32 for this class.
        let ok = unsafe {
            GetTokenInformation(
                token.0,
                TOKEN_IS_APP_CONTAINER,
                std::ptr::addr_of_mut!(is_app_container).cast(),
                std::mem::size_of::<u32>() as u32,
                &mut returned,
            )
        };
        if ok != 0 && is_app_container != 0 {
            return Some(IntegrityLevel::AppContainer);
        }

        // TOKEN_MANDATORY_LABEL: a SID_AND_ATTRIBUTES whose sid carries the
        // integrity RID as its last sub-authority.  64 bytes is ample for
        // the fixed-size label structure.
        let mut buf = [0u8; 64];
        let mut returned: u32 = 0;
        // SAFETY: buf outlives the call; returned reports the used size.
        let ok = unsafe {
            GetTokenInformation(
                token.0,
                TOKEN_INTEGRITY_LEVEL,
                buf.as_mut_ptr().cast(),
                buf.len() as u32,
                &mut returned,
            )
        };
        if ok == 0 {
            return None;
        }

        // SAFETY: on success the buffer starts with a valid
        // SID_AND_ATTRIBUTES; its first pointer-sized field is the SID.
        let sid = unsafe { *buf.as_ptr().cast::<*const std::ffi::c_void>() };
        if sid.is_null() {
            return None;
        }

        // SAFETY: sid points into buf and is a valid SID per the API
        // contract; the sub-authority index is count - 1.
        let rid = unsafe {
            let count = *GetSidSubAuthorityCount(sid);
            if count == 0 {
                return None;
            }
            *GetSidSubAuthority(sid, u32::from(count) - 1)
        };

        Some(match rid {
            r if r < SECURITY_MANDATORY_LOW_RID => IntegrityLevel::Untrusted,
            r if r < SECURITY_MANDATORY_MEDIUM_RID => IntegrityLevel::Low,
            r if r < SECURITY_MANDATORY_HIGH_RID => IntegrityLevel::Medium,
            r if r < SECURITY_MANDATORY_SYSTEM_RID => IntegrityLevel::High,
            _ => IntegrityLevel::System,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
