// wv2sleuth - platform/mod.rs
//
// Platform layer: real implementations of the core probe and storage
// seams, plus configuration loading.
//
// Windows-only functionality calls the Win32 API directly through
// `#[link]`-declared FFI with documented SAFETY invariants.  On other
// platforms every public entry point is a stub (NotSupported error or
// empty result) so the crate builds and its logic tests run unchanged.

pub mod config;
pub mod env_scope;
pub mod modules;
pub mod pipes;
pub mod process;
pub mod registry;
pub mod window_tree;

// =============================================================================
// Shared Win32 helpers
// =============================================================================

/// Wide-string conversion and Win32 error translation shared by the
/// Windows-only modules.
#[cfg(target_os = "windows")]
pub(crate) mod win32 {
    /// Encode a Rust string as a null-terminated UTF-16 buffer.
    pub fn to_wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    /// Decode a UTF-16 buffer, stopping at the first null.
    pub fn from_wide(buf: &[u16]) -> String {
        let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
        String::from_utf16_lossy(&buf[..len])
    }

    #[link(name = "kernel32")]
    extern "system" {
        fn FormatMessageW(
            dw_flags: u32,
            lp_source: *const std::ffi::c_void,
            dw_message_id: u32,
            dw_language_id: u32,
            lp_buffer: *mut u16,
            n_size: u32,
            arguments: *mut std::ffi::c_void,
        ) -> u32;

        fn LocalFree(h_mem: *mut std::ffi::c_void) -> *mut std::ffi::c_void;
    }

    /// Translate a Win32 error code to a human-readable string.
    pub fn error_message(code: u32) -> String {
        match code {
            0 => return "Success".to_string(),
            2 => return "Not found".to_string(),
            5 => return "Access denied".to_string(),
            87 => return "Invalid parameter".to_string(),
            _ => {}
        }

        // FORMAT_MESSAGE_ALLOCATE_BUFFER | FORMAT_MESSAGE_FROM_SYSTEM
        // | FORMAT_MESSAGE_IGNORE_INSERTS
        const FLAGS: u32 = 0x0000_0100 | 0x0000_1000 | 0x0000_0200;

        let mut buf: *mut u16 = std::ptr::null_mut();
        let len = unsafe {
            FormatMessageW(
                FLAGS,
                std::ptr::null(),
                code,
                0,
                std::ptr::addr_of_mut!(buf) as *mut u16,
                0,
                std::ptr::null_mut(),
            )
        };

        if len == 0 || buf.is_null() {
            return format!("Error code {code}");
        }

        // SAFETY: FormatMessageW guarantees `buf` points to `len` valid
        // wide chars when it returns non-zero.
        let msg =
            unsafe { String::from_utf16_lossy(std::slice::from_raw_parts(buf, len as usize)) };
        // SAFETY: the ALLOCATE_BUFFER flag transfers ownership of `buf`;
        // it must be released with LocalFree.
        unsafe {
            LocalFree(buf.cast());
        }
        msg.trim().to_string()
    }
}
