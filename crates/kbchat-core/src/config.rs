//! Client configuration.
//!
//! Values come from an optional TOML file; the binary applies command-line
//! overrides on top.

use std::path::Path;

use serde::Deserialize;

use crate::backoff::ReconnectPolicy;
use crate::error::ConfigError;

/// Configuration for a chat client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientConfig {
    /// Backend base URL (e.g., "http://localhost:8000").
    #[serde(default = "ClientConfig::default_server_url")]
    pub server_url: String,

    /// Path of the chat socket on the backend host.
    #[serde(default = "ClientConfig::default_chat_path")]
    pub chat_path: String,

    /// Spacing between reconnect attempts.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    /// Capacity of the per-connection frame channels.
    #[serde(default = "ClientConfig::default_channel_capacity")]
    pub channel_capacity: usize,

    /// Maximum height of the input area, in rows.
    #[serde(default = "ClientConfig::default_input_max_rows")]
    pub input_max_rows: u16,
}

impl ClientConfig {
    fn default_server_url() -> String {
        "http://localhost:8000".to_string()
    }

    fn default_chat_path() -> String {
        "/ws/chat".to_string()
    }

    const fn default_channel_capacity() -> usize {
        crate::transport::DEFAULT_CHANNEL_CAPACITY
    }

    const fn default_input_max_rows() -> u16 {
        6
    }

    /// Load configuration from a TOML file, or defaults when `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read and
    /// `ConfigError::Parse` if it is not valid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the text is not valid.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// WebSocket URL of the chat endpoint on the server's host.
    ///
    /// `http` maps to `ws` and `https` to `wss`; any path on `server_url` is
    /// replaced by `chat_path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` for other schemes or a missing host.
    pub fn ws_endpoint(&self) -> Result<String, ConfigError> {
        let url = self.server_url.trim();
        let (scheme, rest) = if let Some(rest) = url.strip_prefix("https://") {
            ("wss", rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            ("ws", rest)
        } else if let Some(rest) = url.strip_prefix("wss://") {
            ("wss", rest)
        } else if let Some(rest) = url.strip_prefix("ws://") {
            ("ws", rest)
        } else {
            return Err(ConfigError::InvalidUrl(self.server_url.clone()));
        };

        let host = extract_host(rest);
        if host.is_empty() {
            return Err(ConfigError::InvalidUrl(self.server_url.clone()));
        }

        let path = self.chat_path.trim();
        let sep = if path.starts_with('/') { "" } else { "/" };
        Ok(format!("{scheme}://{host}{sep}{path}"))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: Self::default_server_url(),
            chat_path: Self::default_chat_path(),
            reconnect: ReconnectPolicy::default(),
            channel_capacity: Self::default_channel_capacity(),
            input_max_rows: Self::default_input_max_rows(),
        }
    }
}

/// Host (and port) part of a URL with the scheme already removed.
fn extract_host(rest: &str) -> &str {
    rest.split(['/', '?', '#']).next().unwrap_or_default()
}
