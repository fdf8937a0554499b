//! Suspend/resume guard.
//!
//! Touching the power manager's timer state while the machine is going to
//! sleep, or right after it wakes, can take the machine down. The guard keeps
//! passes out of that window. It is shared between the worker running passes
//! and the host thread delivering power notifications; both sides only use
//! atomics, and the only blocking is the bounded drain on suspend.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Interval between consolidation passes
pub const PASS_INTERVAL: Duration = Duration::from_secs(2);

/// Quiet period after a suspend notification
pub const SUSPEND_PAUSE: Duration = Duration::from_secs(60);

/// Quiet period after a resume notification
pub const RESUME_PAUSE: Duration = Duration::from_secs(10);

/// Longest a suspend notification waits for an in-flight pass
pub const SUSPEND_DRAIN_LIMIT: Duration = Duration::from_secs(2);

/// Number of whole ticks of `cadence` in `pause`.
pub fn ticks_for(pause: Duration, cadence: Duration) -> u32 {
    if cadence.is_zero() {
        return 0;
    }
    u32::try_from(pause.as_millis() / cadence.as_millis().max(1)).unwrap_or(u32::MAX)
}

/// Pause budget and in-flight flag shared by the worker and the host.
#[derive(Debug)]
pub struct SuspendGuard {
    /// Ticks left to skip; 0 means not paused
    pause_ticks: AtomicU32,
    /// A pass is running
    processing: AtomicBool,
    suspend_ticks: u32,
    resume_ticks: u32,
}

impl SuspendGuard {
    pub fn new(cadence: Duration) -> Self {
        Self {
            pause_ticks: AtomicU32::new(0),
            processing: AtomicBool::new(false),
            suspend_ticks: ticks_for(SUSPEND_PAUSE, cadence),
            resume_ticks: ticks_for(RESUME_PAUSE, cadence),
        }
    }

    /// Machine is about to sleep.
    ///
    /// Pauses passes, then waits up to `drain_limit` for a running pass to
    /// finish. Returns false if the pass was still running at the limit.
    pub fn on_suspend(&self, drain_limit: Duration) -> bool {
        self.pause_ticks.store(self.suspend_ticks, Ordering::SeqCst);
        debug!("Suspend notification, pausing {} ticks", self.suspend_ticks);

        let started = Instant::now();
        while self.processing.load(Ordering::SeqCst) {
            if started.elapsed() >= drain_limit {
                warn!(
                    "Consolidation pass still running after {:?}, letting suspend proceed",
                    drain_limit
                );
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Machine has resumed.
    pub fn on_resume(&self) {
        self.pause_ticks.store(self.resume_ticks, Ordering::SeqCst);
        debug!("Resume notification, pausing {} ticks", self.resume_ticks);
    }

    /// Start a pass for this tick, unless paused.
    ///
    /// The in-flight flag is raised before the budget is read, so a pass can
    /// never begin after `on_suspend` has observed the flag clear.
    pub fn begin_pass(&self) -> Option<PassToken<'_>> {
        self.processing.store(true, Ordering::SeqCst);

        let paused = self
            .pause_ticks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if paused {
            self.processing.store(false, Ordering::SeqCst);
            return None;
        }

        Some(PassToken { guard: self })
    }

    /// Ticks left to skip
    pub fn pause_ticks(&self) -> u32 {
        self.pause_ticks.load(Ordering::SeqCst)
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }
}

impl Default for SuspendGuard {
    fn default() -> Self {
        Self::new(PASS_INTERVAL)
    }
}

/// Clears the in-flight flag on drop
#[derive(Debug)]
pub struct PassToken<'a> {
    guard: &'a SuspendGuard,
}

impl Drop for PassToken<'_> {
    fn drop(&mut self) {
        self.guard.processing.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ticks_for_default_cadence() {
        assert_eq!(ticks_for(SUSPEND_PAUSE, PASS_INTERVAL), 30);
        assert_eq!(ticks_for(RESUME_PAUSE, PASS_INTERVAL), 5);
        assert_eq!(ticks_for(SUSPEND_PAUSE, Duration::ZERO), 0);
    }

    #[test]
    fn test_active_guard_runs_passes() {
        let guard = SuspendGuard::default();
        let token = guard.begin_pass();
        assert!(token.is_some());
        assert!(guard.is_processing());
        drop(token);
        assert!(!guard.is_processing());
        assert_eq!(guard.pause_ticks(), 0);
    }

    #[test]
    fn test_suspend_skips_thirty_ticks() {
        let guard = SuspendGuard::default();
        assert!(guard.on_suspend(SUSPEND_DRAIN_LIMIT));

        for tick in 0..30 {
            assert!(guard.begin_pass().is_none(), "tick {} should be skipped", tick);
            assert!(!guard.is_processing());
        }
        assert!(guard.begin_pass().is_some());
    }

    #[test]
    fn test_resume_skips_five_ticks() {
        let guard = SuspendGuard::default();
        guard.on_resume();
        for _ in 0..5 {
            assert!(guard.begin_pass().is_none());
        }
        assert!(guard.begin_pass().is_some());
    }

    #[test]
    fn test_last_notification_wins() {
        let guard = SuspendGuard::default();
        guard.on_resume();
        guard.begin_pass();
        assert!(guard.on_suspend(SUSPEND_DRAIN_LIMIT));
        assert_eq!(guard.pause_ticks(), 30);

        guard.on_resume();
        assert_eq!(guard.pause_ticks(), 5);
    }

    #[test]
    fn test_suspend_waits_for_running_pass() {
        let guard = Arc::new(SuspendGuard::default());
        let token = guard.begin_pass().unwrap();

        let notifier = {
            let guard = Arc::clone(&guard);
            thread::spawn(move || guard.on_suspend(Duration::from_secs(10)))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!notifier.is_finished());
        drop(token);
        assert!(notifier.join().unwrap());
    }

    #[test]
    fn test_suspend_drain_is_bounded() {
        let guard = SuspendGuard::default();
        let _token = guard.begin_pass().unwrap();
        let started = Instant::now();
        assert!(!guard.on_suspend(Duration::from_millis(20)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
