//! Target selection for the synthetic resume timer.
//!
//! Pending wake timers are scanned in due order. Timers closer than the
//! minimum span to the previous one (or to "now", for the first) are treated
//! as covered: the machine will already be awake for them. The first timer
//! past such a gap is the target, and the resume timer is set to fire a
//! little before it, earlier for longer gaps.

use crate::ticks::{self, TICKS_PER_SECOND};
use crate::wake_record::WakeTimerEntry;
use serde::{Deserialize, Serialize};

/// Fire times closer than this to the armed one leave the timer alone
pub const REARM_TOLERANCE: u64 = 2 * TICKS_PER_SECOND;

/// Consolidation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationSettings {
    /// Gaps shorter than this many hours are coalesced
    pub min_span_hours: u32,
    /// Lead time subtracted per hour of gap, in milliseconds
    pub lead_ms_per_hour: u32,
}

impl Default for ConsolidationSettings {
    fn default() -> Self {
        Self {
            min_span_hours: 3,
            lead_ms_per_hour: 25_000,
        }
    }
}

/// The wake timer chosen to be covered this pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    /// Position of the entry in the sorted list
    pub index: usize,
    pub entry: WakeTimerEntry,
    /// Ticks between the previous covered timer and this one
    pub span: u64,
    /// Absolute FILETIME at which the resume timer should fire
    pub fire_at: u64,
}

/// What to do with the resume timer after a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The armed timer is close enough to the target
    Keep { target: Target, armed_at: u64 },
    /// Arm (or rearm) the timer for the target
    Arm(Target),
    /// Nothing to cover; release the live timer
    Cancel,
    /// Nothing to cover and no timer live
    Idle,
}

/// Find the first wake timer that is far enough past its predecessor.
///
/// `entries` must be sorted by due time. Entries owned by `self_pid` are
/// ignored entirely, so the resume timer never chases itself.
pub fn select_target(
    entries: &[WakeTimerEntry],
    self_pid: u32,
    now: u64,
    settings: &ConsolidationSettings,
) -> Option<Target> {
    let min_span = u64::from(settings.min_span_hours);
    let mut last_covered = 0u64;

    for (index, entry) in entries.iter().enumerate() {
        if entry.owner == Some(self_pid) {
            continue;
        }

        let span = entry.due_time.saturating_sub(last_covered);
        if ticks::whole_hours(span) < min_span {
            last_covered = entry.due_time;
            continue;
        }

        let lead = ticks::lead_for_span(span, settings.lead_ms_per_hour);
        return Some(Target {
            index,
            entry: *entry,
            span,
            fire_at: now.saturating_add(entry.due_time).saturating_sub(lead),
        });
    }

    None
}

/// Decide the resume timer's next state.
///
/// `armed_at` is the fire time of the live, armed timer, if there is one.
pub fn consolidate(
    entries: &[WakeTimerEntry],
    self_pid: u32,
    now: u64,
    armed_at: Option<u64>,
    settings: &ConsolidationSettings,
) -> Decision {
    match (select_target(entries, self_pid, now, settings), armed_at) {
        (Some(target), Some(armed_at)) if target.fire_at.abs_diff(armed_at) <= REARM_TOLERANCE => {
            Decision::Keep { target, armed_at }
        }
        (Some(target), _) => Decision::Arm(target),
        (None, Some(_)) => Decision::Cancel,
        (None, None) => Decision::Idle,
    }
}
