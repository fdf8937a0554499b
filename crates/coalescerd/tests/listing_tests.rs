//! `list` report built from the scripted OS fake.

mod common;

use coalescer_common::ticks::TICKS_PER_HOUR;
use coalescer_common::{ConsolidationSettings, Requester, WakeRecordWriter};
use coalescerd::listing::WakeTimerReport;
use common::{FakeWakeApi, SELF_PID};

fn sample() -> FakeWakeApi {
    let list = WakeRecordWriter::new()
        .push(TICKS_PER_HOUR, Requester::Kernel, 0)
        .push(2 * TICKS_PER_HOUR, Requester::UserProcess, SELF_PID)
        .push(6 * TICKS_PER_HOUR, Requester::UserSharedService, 900)
        .finish();
    FakeWakeApi::new(list)
}

#[test]
fn test_report_marks_target_and_own() {
    let report = WakeTimerReport::collect(&sample(), &ConsolidationSettings::default()).unwrap();

    assert_eq!(report.timers.len(), 3);
    assert!(report.timers[1].own);
    assert!(!report.timers[1].target);
    assert!(report.timers[2].target);
    assert_eq!(report.timers.iter().filter(|t| t.target).count(), 1);
    assert!(report.resume_at.is_some());
    assert!(report.taken_at.is_some());
}

#[test]
fn test_identical_records_mark_one_target() {
    let list = WakeRecordWriter::new()
        .push(TICKS_PER_HOUR, Requester::Kernel, 0)
        .push(6 * TICKS_PER_HOUR, Requester::UserProcess, 900)
        .push(6 * TICKS_PER_HOUR, Requester::UserProcess, 900)
        .finish();
    let report = WakeTimerReport::collect(&FakeWakeApi::new(list), &ConsolidationSettings::default()).unwrap();

    assert_eq!(report.timers.iter().filter(|t| t.target).count(), 1);
    assert!(report.timers[1].target);
    assert!(!report.timers[2].target);
}

#[test]
fn test_report_without_target() {
    let report = WakeTimerReport::collect(
        &sample(),
        &ConsolidationSettings {
            min_span_hours: 12,
            lead_ms_per_hour: 25_000,
        },
    )
    .unwrap();

    assert!(report.timers.iter().all(|t| !t.target));
    assert!(report.resume_at.is_none());
    assert!(report.render().contains("No wake timer needs covering"));
}

#[test]
fn test_render_table() {
    let report = WakeTimerReport::collect(&sample(), &ConsolidationSettings::default()).unwrap();
    let text = report.render();

    assert!(text.contains("shared service"));
    assert!(text.contains("6h 00m 00s"));
    assert!(text.contains("resume timer would be set for"));
}

#[test]
fn test_json_output() {
    let report = WakeTimerReport::collect(&sample(), &ConsolidationSettings::default()).unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["timers"][2]["requester"], "user_shared_service");
    assert_eq!(json["timers"][2]["owner"], 900);
    assert_eq!(json["timers"][0]["owner"], serde_json::Value::Null);
}

#[test]
fn test_query_failure_is_an_error() {
    let api = sample();
    api.state().status = Some(coalescerd::RawStatus::Failed(1));
    assert!(WakeTimerReport::collect(&api, &ConsolidationSettings::default()).is_err());
}
