//! Client configuration from environment variables.

use std::time::Duration;

use crate::ws::{ReconnectPolicy, SessionContext};

const DEFAULT_WS_URL: &str = "ws://localhost:8080/api/ws";
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5000;
const DEFAULT_NOTICE_TIMEOUT_MS: u64 = 5000;
const DEFAULT_PROBE_INTERVAL_MS: u64 = 10_000;

/// Network probe used by the native reachability sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    /// `host:port` to open a TCP connection to
    pub addr: String,
    pub interval: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub ws_url: String,
    pub token: Option<String>,
    pub handshake_timeout: Duration,
    /// How long one notification stays visible without being dismissed
    pub notice_timeout: Duration,
    pub probe: Option<ProbeConfig>,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ClientConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CHATLINE_WS_URL`: websocket endpoint (default: "ws://localhost:8080/api/ws")
    /// - `CHATLINE_TOKEN`: session token handed to the transport (default: none)
    /// - `CHATLINE_HANDSHAKE_TIMEOUT_MS`: handshake deadline (default: 5000)
    /// - `CHATLINE_NOTICE_TIMEOUT_MS`: notification auto-dismiss (default: 5000)
    /// - `CHATLINE_PROBE_ADDR`: reachability probe target, e.g. "1.1.1.1:443" (default: no probe)
    /// - `CHATLINE_PROBE_INTERVAL_MS`: probe period (default: 10000)
    /// - `CHATLINE_RECONNECT_MAX_ATTEMPTS`: retry limit, 0 = unlimited (default: 10)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let millis = |key: &str, default: u64| {
            let value = lookup(key).and_then(|raw| match raw.trim().parse::<u64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    crate::log_warn!("Ignoring {}={:?}: not a number of milliseconds", key, raw);
                    None
                }
            });
            Duration::from_millis(value.unwrap_or(default))
        };

        let ws_url = lookup("CHATLINE_WS_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_WS_URL.to_string());
        let token = lookup("CHATLINE_TOKEN").filter(|s| !s.trim().is_empty());

        let probe = lookup("CHATLINE_PROBE_ADDR")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(|addr| ProbeConfig {
                addr,
                interval: millis("CHATLINE_PROBE_INTERVAL_MS", DEFAULT_PROBE_INTERVAL_MS),
            });

        let mut reconnect = ReconnectPolicy::default();
        if let Some(max) = lookup("CHATLINE_RECONNECT_MAX_ATTEMPTS").and_then(|s| s.trim().parse().ok()) {
            reconnect.max_attempts = max;
        }

        Self {
            ws_url,
            token,
            handshake_timeout: millis("CHATLINE_HANDSHAKE_TIMEOUT_MS", DEFAULT_HANDSHAKE_TIMEOUT_MS),
            notice_timeout: millis("CHATLINE_NOTICE_TIMEOUT_MS", DEFAULT_NOTICE_TIMEOUT_MS),
            probe,
            reconnect,
        }
    }

    /// Session context for the configured endpoint
    pub fn session(&self) -> SessionContext {
        let session = SessionContext::new(self.ws_url.clone());
        match &self.token {
            Some(token) => session.with_token(token.clone()),
            None => session,
        }
    }
}
