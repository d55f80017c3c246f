//! Error types for the chat client.
//!
//! Errors are split by how they are handled: transport failures are shown to
//! the user and trigger a reconnect, protocol errors are logged, and input
//! errors are dropped without any visible effect.

use thiserror::Error;

/// A result type using `ChatError`.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Socket-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The WebSocket handshake failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// An outbound frame could not be handed to the socket writer.
    #[error("send failed: {0}")]
    Send(String),

    /// Reading from the socket failed.
    #[error("socket error: {0}")]
    Socket(String),

    /// The server closed the connection.
    #[error("connection closed by server")]
    ClosedByPeer,
}

/// An inbound frame that does not match the stream protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not a JSON object of the expected shape.
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    /// A field required by the frame's `type` is absent.
    #[error("frame of type `{kind}` is missing field `{field}`")]
    MissingField {
        /// The frame discriminant.
        kind: String,
        /// The absent field.
        field: &'static str,
    },
}

/// A send request that cannot be honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InputError {
    /// The message is empty or whitespace only.
    #[error("message is blank")]
    Blank,

    /// There is no open connection.
    #[error("not connected")]
    NotConnected,

    /// A reply is still streaming.
    #[error("a reply is still streaming")]
    Busy,
}

/// Any error produced by the chat controller.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Socket-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed inbound frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Rejected user input.
    #[error(transparent)]
    Input(#[from] InputError),
}

impl ChatError {
    /// Whether the error should be shown to the user in the error banner.
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Failure to load client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path of the configuration file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for `ClientConfig`.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The server URL does not use an http, https, ws or wss scheme.
    #[error("unsupported server url: {0}")]
    InvalidUrl(String),
}
