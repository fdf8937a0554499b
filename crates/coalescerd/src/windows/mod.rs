//! Win32 bindings: power manager query, resume timer, service host.

pub mod power;
pub mod service;

pub use power::{WinResumeTimer, WinWakeApi};

use std::iter::once;
use windows_sys::Win32::Foundation::GetLastError;
use windows_sys::Win32::System::LibraryLoader::SetDllDirectoryW;

/// NUL terminated UTF-16
pub(crate) fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(once(0)).collect()
}

pub(crate) fn last_error() -> u32 {
    // SAFETY: no preconditions
    unsafe { GetLastError() }
}

/// Drop the current directory from the DLL search path before loading
/// anything by name.
pub fn harden_dll_search() {
    let empty = wide("");
    // SAFETY: empty is NUL terminated
    unsafe { SetDllDirectoryW(empty.as_ptr()) };
}
