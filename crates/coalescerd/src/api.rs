//! The OS surface the driver needs.
//!
//! The Windows implementation lives in `crate::windows`; tests substitute a
//! scripted fake.

use coalescer_common::TimerError;

/// Result of one wake timer list call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawStatus {
    Success,
    BufferTooSmall,
    Failed(u32),
}

/// A one-shot, resume-capable timer at an absolute time.
///
/// Dropping the timer cancels it and releases the OS handle.
pub trait ResumeTimer {
    /// Set the timer to fire at the absolute FILETIME `fire_at`, replacing
    /// any earlier setting.
    fn arm(&mut self, fire_at: u64) -> Result<(), TimerError>;
}

/// Power manager and timer primitives
pub trait WakeApi {
    type Timer: ResumeTimer;

    /// Fill `buffer` with the pending wake timer list.
    fn wake_timer_list(&self, buffer: &mut [u8]) -> RawStatus;

    /// Current system time as an absolute FILETIME
    fn now(&self) -> u64;

    fn current_process_id(&self) -> u32;

    fn create_timer(&self) -> Result<Self::Timer, TimerError>;
}
