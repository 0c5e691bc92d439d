//! Common configuration types for the meeting client crates.

use serde::{Deserialize, Serialize};

/// Default tracing filter directive.
pub const DEFAULT_LOG_FILTER: &str = "meeting_client=info";

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive (e.g. `meeting_client=debug,reqwest=warn`)
    pub log_filter: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            json_logs: false,
        }
    }
}
