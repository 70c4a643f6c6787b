// wv2sleuth - platform/window_tree.rs
//
// Window enumeration for hierarchy correlation: top-level windows
// (optionally including message-only windows), direct children in sibling
// order, and the cross-process child-window property.
//
// Only reads window metadata (class name, owning pid); never sends input
// or messages to the enumerated windows.

use crate::core::probes::{WindowEnumerator, WindowNode};

/// Enumerator over the live window tree.
#[derive(Debug, Default)]
pub struct SystemWindowEnumerator;

impl SystemWindowEnumerator {
    pub fn new() -> SystemWindowEnumerator {
        SystemWindowEnumerator
    }
}

#[cfg(target_os = "windows")]
impl WindowEnumerator for SystemWindowEnumerator {
    fn top_level_windows(&self, include_message_only: bool) -> Vec<WindowNode> {
        let mut handles = ffi::enum_top_level();
        if include_message_only {
            handles.extend(ffi::enum_message_only());
        }
        handles.into_iter().filter_map(ffi::node_for).collect()
    }

    fn child_windows(&self, handle: u64) -> Vec<WindowNode> {
        ffi::direct_children(handle as isize)
            .into_iter()
            .filter_map(ffi::node_for)
            .collect()
    }

    fn cross_process_child(&self, handle: u64) -> Option<WindowNode> {
        ffi::cross_process_child(handle as isize).and_then(ffi::node_for)
    }
}

#[cfg(not(target_os = "windows"))]
impl WindowEnumerator for SystemWindowEnumerator {
    fn top_level_windows(&self, _include_message_only: bool) -> Vec<WindowNode> {
        Vec::new()
    }

    fn child_windows(&self, _handle: u64) -> Vec<WindowNode> {
        Vec::new()
    }

    fn cross_process_child(&self, _handle: u64) -> Option<WindowNode> {
        None
    }
}

// =============================================================================
// Windows FFI
// =============================================================================

#[cfg(target_os = "windows")]
mod ffi {
    use crate::core::probes::WindowNode;
    use crate::platform::win32;
    use crate::util::constants::{CROSS_PROCESS_CHILD_WINDOW_PROP, MAX_CHILD_WINDOWS};

    /// GetWindow relationship codes.
    const GW_CHILD: u32 = 5;
    const GW_HWNDNEXT: u32 = 2;

    /// Parent handle selecting the message-only window list.
    const HWND_MESSAGE: isize = -3;

    const CLASS_NAME_LEN: usize = 256;

    type EnumWindowsProc = extern "system" fn(hwnd: isize, lparam: isize) -> i32;

    #[link(name = "user32")]
    extern "system" {
        fn EnumWindows(lp_enum_func: EnumWindowsProc, lparam: isize) -> i32;

        fn FindWindowExW(
            hwnd_parent: isize,
            hwnd_child_after: isize,
            lpsz_class: *const u16,
            lpsz_window: *const u16,
        ) -> isize;

        fn GetWindow(hwnd: isize, u_cmd: u32) -> isize;

        fn GetClassNameW(hwnd: isize, lp_class_name: *mut u16, n_max_count: i32) -> i32;

        fn GetWindowThreadProcessId(hwnd: isize, lpdw_process_id: *mut u32) -> u32;

        fn GetPropW(hwnd: isize, lp_string: *const u16) -> isize;
    }

    /// EnumWindows callback: lparam is a `*mut Vec<isize>` owned by the
    /// caller for the duration of the call.
    extern "system" fn collect_hwnd(hwnd: isize, lparam: isize) -> i32 {
        // SAFETY: enum_top_level passes a pointer to a live Vec and blocks
        // until EnumWindows returns, so the pointer is valid here.
        let handles = unsafe { &mut *(lparam as *mut Vec<isize>) };
        handles.push(hwnd);
        1 // continue enumeration
    }

    pub(super) fn enum_top_level() -> Vec<isize> {
        let mut handles: Vec<isize> = Vec::new();
        // SAFETY: the callback only outlives this call on the stack; the
        // Vec pointer stays valid throughout.
        unsafe {
            EnumWindows(collect_hwnd, std::ptr::addr_of_mut!(handles) as isize);
        }
        handles
    }

    /// Message-only windows are invisible to EnumWindows; they are walked
    /// with FindWindowExW under the HWND_MESSAGE parent.
    pub(super) fn enum_message_only() -> Vec<isize> {
        let mut handles = Vec::new();
        let mut current: isize = 0;
        loop {
            // SAFETY: null class/window filters enumerate every child.
            current = unsafe {
                FindWindowExW(HWND_MESSAGE, current, std::ptr::null(), std::ptr::null())
            };
            if current == 0 || handles.len() >= MAX_CHILD_WINDOWS {
                break;
            }
            handles.push(current);
        }
        handles
    }

    /// Direct children via the GW_CHILD / GW_HWNDNEXT sibling chain.
    /// The chain length is capped: a window mutating its children during
    /// the walk must not loop this thread forever.
    pub(super) fn direct_children(parent: isize) -> Vec<isize> {
        let mut children = Vec::new();
        // SAFETY: GetWindow returns 0 when no such window exists.
        let mut current = unsafe { GetWindow(parent, GW_CHILD) };
        while current != 0 && children.len() < MAX_CHILD_WINDOWS {
            children.push(current);
            // SAFETY: `current` was returned by GetWindow above.
            current = unsafe { GetWindow(current, GW_HWNDNEXT) };
        }
        children
    }

    pub(super) fn cross_process_child(handle: isize) -> Option<isize> {
        let prop = win32::to_wide(CROSS_PROCESS_CHILD_WINDOW_PROP);
        // SAFETY: `prop` is a valid null-terminated wide string for the
        // duration of the call.
        let value = unsafe { GetPropW(handle, prop.as_ptr()) };
        (value != 0).then_some(value)
    }

    /// Resolve a handle into a WindowNode.  Windows can be destroyed
    /// between enumeration and resolution; those yield `None`.
    pub(super) fn node_for(handle: isize) -> Option<WindowNode> {
        let mut pid: u32 = 0;
        // SAFETY: pid is a writable u32; a destroyed window leaves it 0.
        unsafe {
            GetWindowThreadProcessId(handle, &mut pid);
        }
        if pid == 0 {
            return None;
        }

        let mut class_buf = [0u16; CLASS_NAME_LEN];
        // SAFETY: the buffer is writable for its full length.
        let len =
            unsafe { GetClassNameW(handle, class_buf.as_mut_ptr(), class_buf.len() as i32) };
        if len <= 0 {
            return None;
        }

        Some(WindowNode {
            handle: handle as u64,
            pid,
            class_name: win32::from_wide(&class_buf[..len as usize]),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
