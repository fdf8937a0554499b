//! Power manager and waitable timer bindings.

use crate::api::{RawStatus, ResumeTimer, WakeApi};
use crate::windows::{last_error, wide};
use anyhow::{bail, Result};
use coalescer_common::TimerError;
use std::ffi::c_void;
use std::ptr::{null, null_mut};
use tracing::debug;
use windows_sys::Win32::Foundation::{CloseHandle, FALSE, FILETIME, HANDLE, HMODULE, NTSTATUS, TRUE};
use windows_sys::Win32::System::LibraryLoader::{FreeLibrary, GetProcAddress, LoadLibraryW};
use windows_sys::Win32::System::Power::POWER_INFORMATION_LEVEL;
use windows_sys::Win32::System::SystemInformation::GetSystemTimeAsFileTime;
use windows_sys::Win32::System::Threading::{
    CancelWaitableTimer, CreateWaitableTimerW, GetCurrentProcessId, SetWaitableTimer,
};

/// Information level returning the pending wake timer list
const WAKE_TIMER_LIST: POWER_INFORMATION_LEVEL = 48;

const STATUS_SUCCESS: NTSTATUS = 0;
const STATUS_BUFFER_TOO_SMALL: NTSTATUS = 0xC000_0023_u32 as NTSTATUS;

type PowerInformationWithPrivileges = unsafe extern "system" fn(
    level: POWER_INFORMATION_LEVEL,
    input: *const c_void,
    input_len: u32,
    output: *mut c_void,
    output_len: u32,
) -> NTSTATUS;

/// `powrprof.dll`, loaded for the process lifetime, with the wake timer
/// query resolved. Not exported by the import library, hence the lookup.
pub struct WinWakeApi {
    module: HMODULE,
    query: PowerInformationWithPrivileges,
}

impl WinWakeApi {
    pub fn load() -> Result<Self> {
        let name = wide("powrprof.dll");
        // SAFETY: name is NUL terminated
        let module = unsafe { LoadLibraryW(name.as_ptr()) };
        if module.is_null() {
            bail!("Failed to load powrprof.dll (os error {})", last_error());
        }

        // SAFETY: module is live, symbol name is NUL terminated
        let proc = unsafe { GetProcAddress(module, b"PowerInformationWithPrivileges\0".as_ptr()) };
        let Some(proc) = proc else {
            let code = last_error();
            // SAFETY: module came from LoadLibraryW and is not used again
            unsafe { FreeLibrary(module) };
            bail!("powrprof.dll has no PowerInformationWithPrivileges (os error {})", code);
        };

        // SAFETY: the export has this signature
        let query = unsafe {
            std::mem::transmute::<unsafe extern "system" fn() -> isize, PowerInformationWithPrivileges>(proc)
        };
        debug!("Resolved PowerInformationWithPrivileges");
        Ok(Self { module, query })
    }
}

impl Drop for WinWakeApi {
    fn drop(&mut self) {
        // SAFETY: module came from LoadLibraryW
        unsafe { FreeLibrary(self.module) };
    }
}

impl WakeApi for WinWakeApi {
    type Timer = WinResumeTimer;

    fn wake_timer_list(&self, buffer: &mut [u8]) -> RawStatus {
        let len = u32::try_from(buffer.len()).unwrap_or(u32::MAX);
        // SAFETY: output pointer and length describe a writable buffer
        let status = unsafe {
            (self.query)(WAKE_TIMER_LIST, null(), 0, buffer.as_mut_ptr().cast(), len)
        };
        match status {
            STATUS_SUCCESS => RawStatus::Success,
            STATUS_BUFFER_TOO_SMALL => RawStatus::BufferTooSmall,
            other => RawStatus::Failed(other as u32),
        }
    }

    fn now(&self) -> u64 {
        let mut time = FILETIME {
            dwLowDateTime: 0,
            dwHighDateTime: 0,
        };
        // SAFETY: time is a valid out pointer
        unsafe { GetSystemTimeAsFileTime(&mut time) };
        (u64::from(time.dwHighDateTime) << 32) | u64::from(time.dwLowDateTime)
    }

    fn current_process_id(&self) -> u32 {
        // SAFETY: no preconditions
        unsafe { GetCurrentProcessId() }
    }

    fn create_timer(&self) -> Result<WinResumeTimer, TimerError> {
        // SAFETY: unnamed auto-reset timer with default security
        let handle = unsafe { CreateWaitableTimerW(null(), FALSE, null()) };
        if handle.is_null() {
            return Err(TimerError::Create(last_error()));
        }
        Ok(WinResumeTimer { handle })
    }
}

/// Waitable timer armed with resume enabled
pub struct WinResumeTimer {
    handle: HANDLE,
}

impl ResumeTimer for WinResumeTimer {
    fn arm(&mut self, fire_at: u64) -> Result<(), TimerError> {
        // Positive due times are absolute
        let due = i64::try_from(fire_at).map_err(|_| TimerError::OutOfRange(fire_at))?;
        // SAFETY: handle is a live waitable timer, due outlives the call
        let ok = unsafe { SetWaitableTimer(self.handle, &due, 0, None, null_mut(), TRUE) };
        if ok == 0 {
            return Err(TimerError::Arm(last_error()));
        }
        Ok(())
    }
}

impl Drop for WinResumeTimer {
    fn drop(&mut self) {
        // SAFETY: handle is owned and closed exactly once
        unsafe {
            CancelWaitableTimer(self.handle);
            CloseHandle(self.handle);
        }
    }
}
