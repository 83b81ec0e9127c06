#![allow(clippy::unwrap_used, clippy::expect_used)]

use deltalog_core::errors::CommitError;
use deltalog_core::logging_facility::test_capture::init_test_capture;
use deltalog_core::{log_op_end, log_op_error, log_op_start};
use deltalog_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_START};

#[test]
fn test_log_op_start_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_start_unique_1";

    log_op_start!(op_name, step_count = 2);

    let starts = capture.count_events(|e| {
        e.op.as_deref() == Some(op_name) && e.event.as_deref() == Some(EVENT_START)
    });
    assert_eq!(starts, 1);
}

#[test]
fn test_log_op_end_records_duration() {
    let capture = init_test_capture();
    let op_name = "test_log_op_end_unique_2";

    log_op_end!(op_name, duration_ms = 42);

    let events: Vec<_> = capture
        .events()
        .into_iter()
        .filter(|e| e.op.as_deref() == Some(op_name) && e.event.as_deref() == Some(EVENT_END))
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].field("duration_ms"), Some("42"));
}

#[test]
fn test_log_op_error_includes_code_and_scope() {
    let capture = init_test_capture();
    let op_name = "test_log_op_error_unique_3";

    let err = CommitError::OptimisticConcurrency {
        reason: "lease held".to_string(),
    };
    log_op_error!(op_name, err, duration_ms = 10, scope_id = "scope-3");

    let events: Vec<_> = capture
        .events_for_scope("scope-3")
        .into_iter()
        .filter(|e| e.op.as_deref() == Some(op_name))
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.as_deref(), Some(EVENT_END_ERROR));
    assert_eq!(events[0].field("err.code"), Some("ERR_OPTIMISTIC_CONCURRENCY"));
    assert!(events[0].field("err.message").unwrap().contains("lease held"));
}

#[test]
fn test_boundary_emits_single_start_and_end() {
    let capture = init_test_capture();
    let op_name = "test_boundary_unique_4";

    log_op_start!(op_name);
    log_op_end!(op_name, duration_ms = 1);

    capture.assert_event_exists(op_name, EVENT_START);
    capture.assert_event_exists(op_name, EVENT_END);
    assert_eq!(
        capture.count_events(|e| e.op.as_deref() == Some(op_name)),
        2
    );
}
