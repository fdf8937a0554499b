//! `coalescerd list`: show pending wake timers the way the driver sees them.

use crate::api::WakeApi;
use crate::query::query_wake_timers;
use anyhow::{Context, Result};
use coalescer_common::ticks::{filetime_to_utc, to_duration};
use coalescer_common::{parse_wake_timer_list, select_target, ConsolidationSettings, Requester};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;

/// One pending wake timer, annotated
#[derive(Debug, Clone, Serialize)]
pub struct ListedTimer {
    /// Ticks until due
    pub due_in_ticks: u64,
    pub due_at: Option<DateTime<Utc>>,
    pub requester: Requester,
    pub owner: Option<u32>,
    /// Owned by this process
    pub own: bool,
    /// The entry a pass would cover right now
    pub target: bool,
}

/// Snapshot of the wake timer list
#[derive(Debug, Clone, Serialize)]
pub struct WakeTimerReport {
    pub taken_at: Option<DateTime<Utc>>,
    pub timers: Vec<ListedTimer>,
    /// When the resume timer would be set for, if anything needs covering
    pub resume_at: Option<DateTime<Utc>>,
}

impl WakeTimerReport {
    /// Query, parse and annotate the current wake timer list.
    pub fn collect<A: WakeApi>(api: &A, settings: &ConsolidationSettings) -> Result<Self> {
        let buffer = query_wake_timers(api).context("Failed to query wake timers")?;
        let entries = parse_wake_timer_list(&buffer).context("Wake timer list rejected")?;
        let now = api.now();
        let pid = api.current_process_id();
        let target = select_target(&entries, pid, now, settings);

        let timers = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| ListedTimer {
                due_in_ticks: entry.due_time,
                due_at: filetime_to_utc(now.saturating_add(entry.due_time)),
                requester: entry.requester,
                owner: entry.owner,
                own: entry.owner == Some(pid),
                target: target.is_some_and(|t| t.index == index),
            })
            .collect();

        Ok(Self {
            taken_at: filetime_to_utc(now),
            timers,
            resume_at: target.and_then(|t| filetime_to_utc(t.fire_at)),
        })
    }

    /// Human readable table
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<3} {:<14} {:<27} {:<22} {}",
            "", "DUE IN", "DUE AT (UTC)", "REQUESTER", "PID"
        );
        for timer in &self.timers {
            let marker = if timer.target {
                "*"
            } else if timer.own {
                "="
            } else {
                ""
            };
            let due_at = timer
                .due_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            let owner = timer
                .owner
                .map(|pid| pid.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "{:<3} {:<14} {:<27} {:<22} {}",
                marker,
                format_due(timer.due_in_ticks),
                due_at,
                requester_label(timer.requester),
                owner
            );
        }
        match self.resume_at {
            Some(at) => {
                let _ = writeln!(out, "\n* resume timer would be set for {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            None => {
                let _ = writeln!(out, "\nNo wake timer needs covering");
            }
        }
        out
    }
}

fn format_due(ticks: u64) -> String {
    let secs = to_duration(ticks).as_secs();
    format!("{}h {:02}m {:02}s", secs / 3600, (secs / 60) % 60, secs % 60)
}

fn requester_label(requester: Requester) -> String {
    match requester {
        Requester::Kernel => "kernel".to_string(),
        Requester::UserProcess => "process".to_string(),
        Requester::UserSharedService => "shared service".to_string(),
        Requester::Other(kind) => format!("unknown ({})", kind),
        Requester::Unverified => "unverified".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_due() {
        use coalescer_common::ticks::TICKS_PER_SECOND;
        assert_eq!(format_due(0), "0h 00m 00s");
        assert_eq!(format_due(3_725 * TICKS_PER_SECOND), "1h 02m 05s");
        assert_eq!(format_due(30 * 3_600 * TICKS_PER_SECOND), "30h 00m 00s");
    }

    #[test]
    fn test_requester_labels() {
        assert_eq!(requester_label(Requester::Other(7)), "unknown (7)");
        assert_eq!(requester_label(Requester::Unverified), "unverified");
    }
}
