//! Meeting client configuration.
//!
//! Configuration is loaded from environment variables. The directory and
//! relay base URLs have no defaults and must always be supplied.

use crate::media::{MediaConstraints, MediaDevices};
use crate::signaling::{PeerConnector, SignalingDeps, WsRelayConnector};
use common::config::{ObservabilityConfig, DEFAULT_LOG_FILTER};
use common::types::MeetingId;
use reqwest::Url;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default directory request timeout in seconds.
pub const DEFAULT_DIRECTORY_TIMEOUT_SECONDS: u64 = 10;

/// Default relay connect timeout in seconds.
pub const DEFAULT_RELAY_CONNECT_TIMEOUT_SECONDS: u64 = 10;

/// Default countdown tick interval in milliseconds.
pub const DEFAULT_COUNTDOWN_TICK_MILLIS: u64 = 1000;

/// Default IANA zone used to resolve slot times.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Meeting client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the meeting directory REST service.
    pub directory_url: Url,

    /// WebSocket URL of the relay channel.
    pub relay_url: Url,

    /// Zone in which slot times-of-day are interpreted.
    pub timezone: chrono_tz::Tz,

    /// Per-request timeout for directory calls (default: 10).
    pub directory_timeout_seconds: u64,

    /// Relay connect and handshake timeout (default: 10).
    pub relay_connect_timeout_seconds: u64,

    /// Countdown timer granularity (default: 1000).
    pub countdown_tick_millis: u64,

    /// Emit ICE candidates as separate signals instead of bundling them.
    pub trickle_ice: bool,

    /// Post a fire-and-forget `send-invite` after creating a meeting.
    pub send_invites: bool,

    /// Logging setup.
    pub observability: ObservabilityConfig,

    /// Recipient phone number of a meeting to create.
    pub recipient: Option<String>,

    /// Existing meeting to open. Ignored when `recipient` is set.
    pub meeting_id: Option<MeetingId>,

    /// Slot time-of-day to confirm after validation, unparsed.
    pub slot: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// does not parse.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let directory_url = parse_url(vars, "MEETING_DIRECTORY_URL", &["http", "https"])?;
        let relay_url = parse_url(vars, "MEETING_RELAY_URL", &["ws", "wss"])?;

        let timezone = match vars.get("MEETING_TIMEZONE") {
            Some(name) => name.trim().parse::<chrono_tz::Tz>().map_err(|_| {
                ConfigError::InvalidValue(format!("MEETING_TIMEZONE: unknown zone '{name}'"))
            })?,
            None => chrono_tz::UTC,
        };

        let directory_timeout_seconds = parse_u64(
            vars,
            "MEETING_DIRECTORY_TIMEOUT_SECONDS",
            DEFAULT_DIRECTORY_TIMEOUT_SECONDS,
        )?;

        let relay_connect_timeout_seconds = parse_u64(
            vars,
            "MEETING_RELAY_CONNECT_TIMEOUT_SECONDS",
            DEFAULT_RELAY_CONNECT_TIMEOUT_SECONDS,
        )?;

        let countdown_tick_millis = parse_u64(
            vars,
            "MEETING_COUNTDOWN_TICK_MILLIS",
            DEFAULT_COUNTDOWN_TICK_MILLIS,
        )?;
        if countdown_tick_millis == 0 {
            return Err(ConfigError::InvalidValue(
                "MEETING_COUNTDOWN_TICK_MILLIS must be greater than zero".to_string(),
            ));
        }

        let trickle_ice = parse_bool(vars, "MEETING_TRICKLE_ICE")?;
        let send_invites = parse_bool(vars, "MEETING_SEND_INVITES")?;

        let observability = ObservabilityConfig {
            log_filter: vars
                .get("MEETING_LOG_FILTER")
                .cloned()
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            json_logs: parse_bool(vars, "MEETING_LOG_JSON")?,
        };

        let meeting_id = match vars.get("MEETING_ID") {
            Some(raw) => Some(
                MeetingId::parse(raw)
                    .map_err(|e| ConfigError::InvalidValue(format!("MEETING_ID: {e}")))?,
            ),
            None => None,
        };

        Ok(Config {
            directory_url,
            relay_url,
            timezone,
            directory_timeout_seconds,
            relay_connect_timeout_seconds,
            countdown_tick_millis,
            trickle_ice,
            send_invites,
            observability,
            recipient: vars.get("MEETING_RECIPIENT").cloned(),
            meeting_id,
            slot: vars.get("MEETING_SLOT").cloned(),
        })
    }

    /// Directory request timeout.
    #[must_use]
    pub fn directory_timeout(&self) -> Duration {
        Duration::from_secs(self.directory_timeout_seconds)
    }

    /// Relay connect timeout.
    #[must_use]
    pub fn relay_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_connect_timeout_seconds)
    }

    /// Countdown tick interval.
    #[must_use]
    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_millis)
    }

    /// WebSocket connector for the configured relay.
    #[must_use]
    pub fn relay_connector(&self) -> WsRelayConnector {
        WsRelayConnector::new(self.relay_url.clone(), self.relay_connect_timeout())
    }

    /// Signaling dependencies over the configured relay, with full audio
    /// and video capture.
    #[must_use]
    pub fn signaling_deps(
        &self,
        media: Arc<dyn MediaDevices>,
        peers: Arc<dyn PeerConnector>,
    ) -> SignalingDeps {
        SignalingDeps {
            media,
            relay: Arc::new(self.relay_connector()),
            peers,
            constraints: MediaConstraints::default(),
            trickle: self.trickle_ice,
        }
    }
}

fn parse_url(
    vars: &HashMap<String, String>,
    key: &str,
    schemes: &[&str],
) -> Result<Url, ConfigError> {
    let raw = vars
        .get(key)
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;

    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidValue(format!("{key}: {e}")))?;

    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidValue(format!(
            "{key}: scheme must be one of {}",
            schemes.join(", ")
        )));
    }

    Ok(url)
}

fn parse_u64(vars: &HashMap<String, String>, key: &str, default: u64) -> Result<u64, ConfigError> {
    match vars.get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(format!("{key}: expected an unsigned integer, got '{raw}'"))
        }),
        None => Ok(default),
    }
}

fn parse_bool(vars: &HashMap<String, String>, key: &str) -> Result<bool, ConfigError> {
    match vars.get(key).map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::InvalidValue(format!(
                "{key}: expected a boolean, got '{v}'"
            ))),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::media::{LocalMediaStream, MediaError};
    use crate::signaling::{PeerConnection, PeerError, PeerEventSender, PeerOptions};
    use async_trait::async_trait;

    struct NoMedia;

    #[async_trait]
    impl MediaDevices for NoMedia {
        async fn get_user_media(
            &self,
            _constraints: MediaConstraints,
        ) -> Result<LocalMediaStream, MediaError> {
            Err(MediaError::PermissionDenied)
        }
    }

    struct NoPeers;

    impl PeerConnector for NoPeers {
        fn create_peer(
            &self,
            _options: PeerOptions,
            _stream: &LocalMediaStream,
            _events: PeerEventSender,
        ) -> Result<Box<dyn PeerConnection>, PeerError> {
            Err(PeerError::Closed)
        }
    }

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "MEETING_DIRECTORY_URL".to_string(),
                "http://localhost:3001/api".to_string(),
            ),
            (
                "MEETING_RELAY_URL".to_string(),
                "ws://localhost:3001".to_string(),
            ),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.directory_url.as_str(), "http://localhost:3001/api");
        assert_eq!(config.relay_url.as_str(), "ws://localhost:3001/");
        assert_eq!(config.timezone, chrono_tz::UTC);
        assert_eq!(
            config.directory_timeout_seconds,
            DEFAULT_DIRECTORY_TIMEOUT_SECONDS
        );
        assert_eq!(
            config.relay_connect_timeout_seconds,
            DEFAULT_RELAY_CONNECT_TIMEOUT_SECONDS
        );
        assert_eq!(config.countdown_tick(), Duration::from_secs(1));
        assert!(!config.trickle_ice);
        assert!(!config.send_invites);
        assert_eq!(config.observability, ObservabilityConfig::default());
        assert!(config.recipient.is_none());
        assert!(config.meeting_id.is_none());
        assert!(config.slot.is_none());
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert(
            "MEETING_TIMEZONE".to_string(),
            "Europe/London".to_string(),
        );
        vars.insert(
            "MEETING_DIRECTORY_TIMEOUT_SECONDS".to_string(),
            "3".to_string(),
        );
        vars.insert(
            "MEETING_RELAY_CONNECT_TIMEOUT_SECONDS".to_string(),
            "7".to_string(),
        );
        vars.insert("MEETING_COUNTDOWN_TICK_MILLIS".to_string(), "250".to_string());
        vars.insert("MEETING_TRICKLE_ICE".to_string(), "true".to_string());
        vars.insert("MEETING_SEND_INVITES".to_string(), "1".to_string());
        vars.insert(
            "MEETING_LOG_FILTER".to_string(),
            "meeting_client=debug".to_string(),
        );
        vars.insert("MEETING_LOG_JSON".to_string(), "yes".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.timezone, chrono_tz::Europe::London);
        assert_eq!(config.directory_timeout(), Duration::from_secs(3));
        assert_eq!(config.relay_connect_timeout(), Duration::from_secs(7));
        assert_eq!(config.countdown_tick(), Duration::from_millis(250));
        assert!(config.trickle_ice);
        assert!(config.send_invites);
        assert_eq!(config.observability.log_filter, "meeting_client=debug");
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_from_vars_meeting_target() {
        let mut vars = base_vars();
        vars.insert("MEETING_RECIPIENT".to_string(), "919876543210".to_string());
        vars.insert("MEETING_ID".to_string(), "  abc123 ".to_string());
        vars.insert("MEETING_SLOT".to_string(), "09:30".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.recipient.as_deref(), Some("919876543210"));
        assert_eq!(config.meeting_id.as_ref().map(MeetingId::as_str), Some("abc123"));
        assert_eq!(config.slot.as_deref(), Some("09:30"));
    }

    #[test]
    fn test_from_vars_rejects_blank_meeting_id() {
        let mut vars = base_vars();
        vars.insert("MEETING_ID".to_string(), "   ".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue(ref msg)) if msg.starts_with("MEETING_ID"))
        );
    }

    #[test]
    fn test_signaling_deps_follow_relay_settings() {
        let mut vars = base_vars();
        vars.insert("MEETING_TRICKLE_ICE".to_string(), "on".to_string());
        let config = Config::from_vars(&vars).expect("Config should load successfully");

        let deps = config.signaling_deps(Arc::new(NoMedia), Arc::new(NoPeers));
        assert!(deps.trickle);
        assert_eq!(deps.constraints, MediaConstraints::default());
        assert_eq!(
            config.relay_connector(),
            WsRelayConnector::new(
                Url::parse("ws://localhost:3001").unwrap(),
                Duration::from_secs(DEFAULT_RELAY_CONNECT_TIMEOUT_SECONDS),
            )
        );
    }

    #[test]
    fn test_from_vars_missing_directory_url() {
        let mut vars = base_vars();
        vars.remove("MEETING_DIRECTORY_URL");

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "MEETING_DIRECTORY_URL")
        );
    }

    #[test]
    fn test_from_vars_missing_relay_url() {
        let mut vars = base_vars();
        vars.remove("MEETING_RELAY_URL");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "MEETING_RELAY_URL"));
    }

    #[test]
    fn test_from_vars_rejects_wrong_schemes() {
        let mut vars = base_vars();
        vars.insert(
            "MEETING_RELAY_URL".to_string(),
            "http://localhost:3001".to_string(),
        );
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));

        let mut vars = base_vars();
        vars.insert(
            "MEETING_DIRECTORY_URL".to_string(),
            "not a url".to_string(),
        );
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_from_vars_rejects_invalid_values() {
        for (key, value) in [
            ("MEETING_TIMEZONE", "Mars/Olympus_Mons"),
            ("MEETING_DIRECTORY_TIMEOUT_SECONDS", "ten"),
            ("MEETING_COUNTDOWN_TICK_MILLIS", "0"),
            ("MEETING_TRICKLE_ICE", "maybe"),
        ] {
            let mut vars = base_vars();
            vars.insert(key.to_string(), value.to_string());
            let result = Config::from_vars(&vars);
            assert!(
                matches!(result, Err(ConfigError::InvalidValue(ref msg)) if msg.starts_with(key)),
                "{key}={value} should be rejected, got {result:?}"
            );
        }
    }
}
