//! Periodic consolidation driver.
//!
//! Every `cadence` the driver asks the guard for permission, queries and
//! parses the wake timer list, and applies the consolidation decision to the
//! single synthetic resume timer it owns. Failures never end the loop; the
//! next tick simply tries again.

use crate::api::{ResumeTimer, WakeApi};
use crate::query::query_wake_timers;
use coalescer_common::ticks::{filetime_to_utc, to_duration};
use coalescer_common::{
    consolidate, parse_wake_timer_list, ConsolidationSettings, Decision, SuspendGuard, Target,
    TimerError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Guard is pausing passes
    Paused,
    /// Wake timer list unavailable; timer untouched, so an armed timer
    /// outlives a run of failed queries and may fire for a stale target
    QueryFailed,
    /// Wake timer list rejected by the decoder; timer untouched
    Malformed,
    /// Armed timer already covers the target
    Kept { fire_at: u64 },
    /// Timer (re)armed
    Armed { fire_at: u64 },
    /// Timer could not be created or armed; retried next tick
    ArmFailed,
    /// Nothing to cover; timer released
    Released,
    /// Nothing to cover and nothing held
    Idle,
}

/// The synthetic timer plus the time it is armed for
struct HeldTimer<T> {
    timer: T,
    armed_at: Option<u64>,
}

pub struct Driver<A: WakeApi> {
    api: A,
    guard: Arc<SuspendGuard>,
    settings: ConsolidationSettings,
    cadence: Duration,
    held: Option<HeldTimer<A::Timer>>,
    /// Consecutive passes that failed to create or arm the timer
    arm_failures: u32,
}

impl<A: WakeApi> Driver<A> {
    pub fn new(
        api: A,
        guard: Arc<SuspendGuard>,
        settings: ConsolidationSettings,
        cadence: Duration,
    ) -> Self {
        Self {
            api,
            guard,
            settings,
            cadence,
            held: None,
            arm_failures: 0,
        }
    }

    /// Fire time of the live timer, if armed
    pub fn armed_at(&self) -> Option<u64> {
        self.held.as_ref().and_then(|held| held.armed_at)
    }

    /// Whether a timer handle is held, armed or not
    pub fn holds_timer(&self) -> bool {
        self.held.is_some()
    }

    /// Consecutive passes that could not set the resume timer
    pub fn arm_failures(&self) -> u32 {
        self.arm_failures
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Run one tick: consult the guard, then do a pass if allowed.
    pub fn tick(&mut self) -> PassOutcome {
        let guard = Arc::clone(&self.guard);
        let Some(_token) = guard.begin_pass() else {
            trace!("Pass paused ({} ticks left)", guard.pause_ticks());
            return PassOutcome::Paused;
        };
        self.pass()
    }

    fn pass(&mut self) -> PassOutcome {
        let buffer = match query_wake_timers(&self.api) {
            Ok(buffer) => buffer,
            Err(e) => {
                debug!("Skipping pass: {}", e);
                return PassOutcome::QueryFailed;
            }
        };

        let entries = match parse_wake_timer_list(&buffer) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Skipping pass, wake timer list rejected: {}", e);
                return PassOutcome::Malformed;
            }
        };

        let decision = consolidate(
            &entries,
            self.api.current_process_id(),
            self.api.now(),
            self.armed_at(),
            &self.settings,
        );

        match decision {
            Decision::Keep { armed_at, .. } => {
                trace!("Resume timer already set for {}", armed_at);
                PassOutcome::Kept { fire_at: armed_at }
            }
            Decision::Arm(target) => self.arm(target),
            Decision::Cancel | Decision::Idle => {
                if self.release() {
                    PassOutcome::Released
                } else {
                    PassOutcome::Idle
                }
            }
        }
    }

    fn arm(&mut self, target: Target) -> PassOutcome {
        let held = match self.held.take() {
            Some(held) => held,
            None => match self.api.create_timer() {
                Ok(timer) => HeldTimer {
                    timer,
                    armed_at: None,
                },
                Err(e) => return self.arm_failed(e),
            },
        };
        let held = self.held.insert(held);

        if let Err(e) = held.timer.arm(target.fire_at) {
            held.armed_at = None;
            return self.arm_failed(e);
        }
        held.armed_at = Some(target.fire_at);

        if self.arm_failures > 0 {
            info!("Resume timer set after {} failed attempts", self.arm_failures);
            self.arm_failures = 0;
        }
        info!(
            "Resume timer set for {} (covers wake timer due in {:?}, owner {:?}, gap {:?})",
            describe(target.fire_at),
            to_duration(target.entry.due_time),
            target.entry.owner,
            to_duration(target.span),
        );
        PassOutcome::Armed {
            fire_at: target.fire_at,
        }
    }

    /// Warn on the first failure of a streak only; the service log is append-only.
    fn arm_failed(&mut self, e: TimerError) -> PassOutcome {
        self.arm_failures = self.arm_failures.saturating_add(1);
        if self.arm_failures == 1 {
            warn!("{}", e);
        } else {
            debug!("{} ({} consecutive)", e, self.arm_failures);
        }
        PassOutcome::ArmFailed
    }

    /// Drop the resume timer. Returns whether one was held.
    pub fn release(&mut self) -> bool {
        match self.held.take() {
            Some(held) => {
                info!(
                    "Resume timer released{}",
                    held.armed_at
                        .map(|at| format!(" (was set for {})", describe(at)))
                        .unwrap_or_default()
                );
                true
            }
            None => false,
        }
    }

    /// Tick every `cadence` until `stop` turns true or its sender goes away,
    /// then release the resume timer.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> Self {
        info!(
            "Consolidating wake timers every {:?} (minimum span {}h, lead {}ms/h)",
            self.cadence, self.settings.min_span_hours, self.settings.lead_ms_per_hour
        );

        while !*stop.borrow() {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = tokio::time::sleep(self.cadence) => {}
            }
            self.tick();
        }

        self.release();
        info!("Consolidation stopped");
        self
    }
}

fn describe(filetime: u64) -> String {
    filetime_to_utc(filetime)
        .map(|time| time.to_rfc3339())
        .unwrap_or_else(|| format!("FILETIME {}", filetime))
}
