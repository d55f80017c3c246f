//! Client core for kbchat.
//!
//! This crate holds everything a chat front end needs except the screen:
//!
//! - **Controller**: connection lifecycle, streaming state and reconnect
//!   scheduling for one chat session ([`ChatController`])
//! - **Session**: the async driver that opens sockets and fires reconnect
//!   timers ([`Session`])
//! - **Rendering**: raw-text fixups, Markdown to HTML and sanitizing
//!   ([`format_reply`])
//! - **View seam**: the [`ChatView`] trait and an in-memory [`Transcript`]
//!
//! # Example
//!
//! ```
//! use kbchat_core::{format_reply, ConnectionStatus};
//!
//! let reply = format_reply("Steps:\\n\\n1. open\\n2. close");
//! assert!(reply.html.contains("<ol>"));
//!
//! assert_eq!(ConnectionStatus::Reconnecting.label(), "Connecting...");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod backoff;
pub mod config;
pub mod controller;
pub mod error;
pub mod format;
pub mod protocol;
pub mod session;
pub mod status;
pub mod transcript;
pub mod transport;
pub mod view;

pub use backoff::{Backoff, ReconnectPolicy, DEFAULT_RECONNECT_DELAY};
pub use config::ClientConfig;
pub use controller::{ChatController, ConnectionId};
pub use error::{ChatError, ConfigError, InputError, ProtocolError, Result, TransportError};
pub use format::{escape_html, fixup_raw_text, format_reply, RenderedReply};
pub use protocol::{decode_frame, encode_user_message, Inbound};
pub use session::{Session, SessionEvent};
pub use status::{ConnectionState, ConnectionStatus};
pub use transcript::{InputField, MessageNode, Role, Transcript, WELCOME_MESSAGE};
pub use transport::{Connector, WebSocketConnector, WsEvent, WsSender};
pub use view::{ChatView, NodeId};
