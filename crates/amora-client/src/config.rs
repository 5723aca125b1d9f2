//! Client configuration loaded from environment variables.
//!
//! Every setting has a default pointing at a local development backend, so a
//! session can be opened with zero configuration.

use std::time::Duration;

use amora_net::{ApiError, ChannelConfig, HttpChatApi};
use amora_shared::constants::{
    DEFAULT_API_URL, DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_WS_URL, HEARTBEAT_INTERVAL,
    MAX_MEDIA_SIZE, MEDIA_AUTO_CLOSE_TIMEOUT, MEDIA_FALLBACK_TIMEOUT, RECONNECT_BASE_DELAY,
    RECONNECT_MAX_DELAY, TYPING_QUIET_PERIOD,
};

/// Durations driving the session's timer slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    pub heartbeat: Duration,
    pub typing_quiet: Duration,
    pub media_fallback: Duration,
    pub media_auto_close: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            heartbeat: HEARTBEAT_INTERVAL,
            typing_quiet: TYPING_QUIET_PERIOD,
            media_fallback: MEDIA_FALLBACK_TIMEOUT,
            media_auto_close: MEDIA_AUTO_CLOSE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base URL.
    /// Env: `AMORA_API_URL`
    /// Default: `http://localhost:7777`
    pub api_url: String,

    /// Real-time endpoint.
    /// Env: `AMORA_WS_URL`
    /// Default: `ws://localhost:7777/ws`
    pub ws_url: String,

    /// Bearer token sent on REST calls and the socket upgrade.
    /// Env: `AMORA_AUTH_TOKEN`
    /// Default: none.
    pub auth_token: Option<String>,

    /// Reconnect attempts after an established channel drops (0 disables).
    /// Env: `AMORA_RECONNECT_ATTEMPTS`
    /// Default: `5`
    pub reconnect_attempts: u32,

    pub timings: SessionTimings,

    /// Maximum media attachment size in bytes (10 MiB).
    pub max_media_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            auth_token: None,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            timings: SessionTimings::default(),
            max_media_size: MAX_MEDIA_SIZE,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("AMORA_API_URL") {
            config.api_url = url;
        }

        if let Some(url) = lookup("AMORA_WS_URL") {
            config.ws_url = url;
        }

        if let Some(token) = lookup("AMORA_AUTH_TOKEN") {
            if !token.is_empty() {
                config.auth_token = Some(token);
            }
        }

        if let Some(attempts) = lookup("AMORA_RECONNECT_ATTEMPTS") {
            match attempts.parse::<u32>() {
                Ok(n) => config.reconnect_attempts = n,
                Err(_) => {
                    tracing::warn!(
                        value = %attempts,
                        "Invalid AMORA_RECONNECT_ATTEMPTS, using default"
                    );
                }
            }
        }

        config
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            url: self.ws_url.clone(),
            auth_token: self.auth_token.clone(),
            reconnect_attempts: self.reconnect_attempts,
            reconnect_base_delay: RECONNECT_BASE_DELAY,
            reconnect_max_delay: RECONNECT_MAX_DELAY,
        }
    }

    pub fn api(&self) -> Result<HttpChatApi, ApiError> {
        HttpChatApi::new(self.api_url.clone(), self.auth_token.clone())
    }
}
