//! Connection state and the status shown to the user.

use std::fmt;

/// Lifecycle of a single socket instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Frames can be sent and received.
    Open,
    /// The socket is gone; a new instance must be created to reconnect.
    Closed,
}

/// Status indicator derived from the connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// The socket is open.
    Connected,
    /// The socket closed or failed; a reconnect is scheduled.
    Disconnected,
    /// A connection attempt is in progress.
    #[default]
    Reconnecting,
}

impl ConnectionStatus {
    /// Text for the status indicator.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Reconnecting => "Connecting...",
        }
    }

    /// Style class for the status indicator.
    #[must_use]
    pub const fn class(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl From<ConnectionState> for ConnectionStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connecting => Self::Reconnecting,
            ConnectionState::Open => Self::Connected,
            ConnectionState::Closed => Self::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
