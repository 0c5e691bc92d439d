//! Observability for the meeting client.
//!
//! Instrumentation uses `#[instrument(skip_all)]` with explicit field
//! allow-listing. Phone numbers and SDP bodies are never logged.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `meet_directory_request_duration_seconds` | Histogram | `operation`, `outcome` | Directory call latency |
//! | `meet_directory_requests_total` | Counter | `operation`, `outcome` | Directory call count |
//! | `meet_session_transitions_total` | Counter | `from`, `to` | Session state transitions |
//! | `meet_countdown_timers_active` | Gauge | none | Live countdown timers |
//! | `meet_relay_messages_total` | Counter | `direction`, `event` | Relay frames sent/received |
//! | `meet_call_outcomes_total` | Counter | `outcome` | Call attempt results |
//!
//! No exporter is installed here; the embedding application chooses one.

pub mod metrics;

pub use self::metrics::{
    record_call_outcome, record_directory_request, record_relay_message, record_state_transition,
    timer_started, timer_stopped,
};
