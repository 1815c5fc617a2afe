//! Bridge configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Unset or unparsable numeric keys fall
//! back to their defaults; an unparsable listen address or outbound format
//! is a startup error.

use std::net::SocketAddr;
use std::time::Duration;

use crate::bridge::StateAspect;
use crate::domain::OutboundFormat;
use crate::error::BridgeError;

/// Top-level bridge configuration.
///
/// Loaded once at startup via [`BridgeConfig::from_env`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Socket address to bind the HTTP/WebSocket server to.
    pub listen_addr: SocketAddr,

    /// Period of the liveness sweeper.
    pub sweep_interval: Duration,

    /// Upper bound on one store unsubscribe during teardown.
    pub detach_timeout: Duration,

    /// Upper bound on a socket write or close.
    pub close_timeout: Duration,

    /// Capacity of each session's outbound queue.
    pub outbound_channel_capacity: usize,

    /// Wire representation for device messages.
    pub outbound_format: OutboundFormat,

    /// Send a HEARTBEAT frame along with every liveness ping.
    pub heartbeat_frames: bool,

    /// Also watch the preview-state path for each device.
    pub watch_preview_state: bool,

    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            sweep_interval: Duration::from_secs(30),
            detach_timeout: Duration::from_millis(2_000),
            close_timeout: Duration::from_millis(2_000),
            outbound_channel_capacity: 64,
            outbound_format: OutboundFormat::Binary,
            heartbeat_frames: true,
            watch_preview_state: true,
            log_json: false,
        }
    }
}

impl BridgeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArgument`] if `LISTEN_ADDR` or
    /// `OUTBOUND_FORMAT` is set but cannot be parsed.
    pub fn from_env() -> Result<Self, BridgeError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BridgeError> {
        let defaults = Self::default();

        let listen_addr = match lookup("LISTEN_ADDR") {
            Some(raw) => raw.parse::<SocketAddr>().map_err(|e| {
                BridgeError::InvalidArgument(format!("LISTEN_ADDR {raw:?}: {e}"))
            })?,
            None => defaults.listen_addr,
        };

        let outbound_format = match lookup("OUTBOUND_FORMAT") {
            Some(raw) => raw.parse::<OutboundFormat>()?,
            None => defaults.outbound_format,
        };

        let sweep_secs = parse_or(&lookup, "SWEEP_INTERVAL_SECS", 30u64).max(1);
        let detach_ms = parse_or(&lookup, "DETACH_TIMEOUT_MS", 2_000u64);
        let close_ms = parse_or(&lookup, "CLOSE_TIMEOUT_MS", 2_000u64);

        Ok(Self {
            listen_addr,
            sweep_interval: Duration::from_secs(sweep_secs),
            detach_timeout: Duration::from_millis(detach_ms),
            close_timeout: Duration::from_millis(close_ms),
            outbound_channel_capacity: parse_or(
                &lookup,
                "OUTBOUND_CHANNEL_CAPACITY",
                defaults.outbound_channel_capacity,
            )
            .max(1),
            outbound_format,
            heartbeat_frames: parse_bool_or(&lookup, "HEARTBEAT_FRAMES", defaults.heartbeat_frames),
            watch_preview_state: parse_bool_or(
                &lookup,
                "WATCH_PREVIEW_STATE",
                defaults.watch_preview_state,
            ),
            log_json: lookup("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
        })
    }

    /// State aspects to attach for every device.
    #[must_use]
    pub fn watched_aspects(&self) -> Vec<StateAspect> {
        if self.watch_preview_state {
            StateAspect::ALL.to_vec()
        } else {
            vec![StateAspect::Desired]
        }
    }
}

/// Parses `key` as `T`, returning `default` on missing or invalid values.
fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses `key` as a boolean. Accepts `"true"`, `"1"`, `"false"`, `"0"`
/// (case-insensitive). Returns `default` otherwise.
fn parse_bool_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
