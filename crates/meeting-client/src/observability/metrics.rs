//! Metric definitions for the meeting client.
//!
//! All metrics follow Prometheus naming conventions:
//! - `meet_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by code:
//! - `operation`: 4 directory calls
//! - `outcome`: success, rejected, error
//! - `from`/`to`: 6 session states
//! - `direction`: inbound, outbound
//! - `event`: relay event names (~10)

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a directory request.
///
/// Metrics: `meet_directory_request_duration_seconds`, `meet_directory_requests_total`
/// Labels: `operation`, `outcome`
pub fn record_directory_request(operation: &'static str, outcome: &'static str, duration: Duration) {
    histogram!(
        "meet_directory_request_duration_seconds",
        "operation" => operation,
        "outcome" => outcome,
    )
    .record(duration.as_secs_f64());

    counter!(
        "meet_directory_requests_total",
        "operation" => operation,
        "outcome" => outcome,
    )
    .increment(1);
}

/// Record a session state transition.
///
/// Metric: `meet_session_transitions_total`
/// Labels: `from`, `to`
pub fn record_state_transition(from: &'static str, to: &'static str) {
    counter!("meet_session_transitions_total", "from" => from, "to" => to).increment(1);
}

/// A countdown timer was spawned.
///
/// Metric: `meet_countdown_timers_active`
pub fn timer_started() {
    gauge!("meet_countdown_timers_active").increment(1.0);
}

/// A countdown timer was cancelled or finished.
///
/// Metric: `meet_countdown_timers_active`
pub fn timer_stopped() {
    gauge!("meet_countdown_timers_active").decrement(1.0);
}

/// Record a relay frame.
///
/// Metric: `meet_relay_messages_total`
/// Labels: `direction` (inbound, outbound), `event`
pub fn record_relay_message(direction: &'static str, event: &'static str) {
    counter!(
        "meet_relay_messages_total",
        "direction" => direction,
        "event" => event,
    )
    .increment(1);
}

/// Record the end result of a call attempt.
///
/// Metric: `meet_call_outcomes_total`
/// Labels: `outcome` (connected, media_unavailable, failed, hung_up)
pub fn record_call_outcome(outcome: &'static str) {
    counter!("meet_call_outcomes_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use metrics_util::MetricKind;

    // Without a recorder the facade is a no-op; these only exercise the calls.

    #[test]
    fn test_record_directory_request() {
        record_directory_request("validate_meeting", "success", Duration::from_millis(12));
        record_directory_request("select_slot", "rejected", Duration::from_millis(40));
        record_directory_request("create_meeting", "error", Duration::from_secs(10));
    }

    #[test]
    fn test_timer_gauge_calls() {
        timer_started();
        timer_stopped();
    }

    #[test]
    fn test_record_relay_and_call_outcome() {
        record_relay_message("outbound", "join-room");
        record_relay_message("inbound", "user-joined");
        record_call_outcome("connected");
        record_call_outcome("media_unavailable");
    }

    #[test]
    fn test_metrics_land_in_local_recorder() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_state_transition("slot_confirmed", "joinable_now");
            record_state_transition("slot_confirmed", "joinable_now");
            timer_started();
            timer_started();
            timer_stopped();
        });

        let snapshot = snapshotter.snapshot().into_vec();

        let transitions = snapshot
            .iter()
            .find(|(key, _, _, _)| {
                key.kind() == MetricKind::Counter
                    && key.key().name() == "meet_session_transitions_total"
            })
            .map(|(_, _, _, value)| value.clone())
            .expect("transition counter recorded");
        assert_eq!(*transitions, DebugValue::Counter(2));

        let timers = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "meet_countdown_timers_active")
            .map(|(_, _, _, value)| value.clone())
            .expect("timer gauge recorded");
        assert!(matches!(timers, DebugValue::Gauge(v) if (v.into_inner() - 1.0).abs() < f64::EPSILON));
    }
}
