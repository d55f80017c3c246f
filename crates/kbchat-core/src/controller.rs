//! Chat client controller.
//!
//! The controller owns the connection slot, the streaming flag and the
//! pending assistant reply, and drives a [`ChatView`]. It performs no I/O of
//! its own: [`crate::session::Session`] feeds it socket events and schedules
//! the reconnects it asks for.
//!
//! ```text
//!   begin_connect        handle_open          handle_closed
//!  ───────────────▶ Connecting ─────────▶ Open ─────────────▶ Closed
//!                       │                                       │
//!                       └──────────── handle_closed ───────────▶│
//!                                                               │
//!            ◀──────────── begin_connect (after delay) ─────────┘
//! ```

use std::fmt;
use std::time::Duration;

use uuid::Uuid;

use crate::backoff::{Backoff, ReconnectPolicy};
use crate::error::{ChatError, InputError, TransportError};
use crate::format::{escape_html, format_reply};
use crate::protocol::{decode_frame, encode_user_message, Inbound};
use crate::status::{ConnectionState, ConnectionStatus};
use crate::transport::WsSender;
use crate::view::{ChatView, NodeId};

/// Identifies one socket instance. A new id is issued for every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug)]
struct Connection {
    id: ConnectionId,
    state: ConnectionState,
    sender: Option<WsSender>,
}

/// An assistant reply that is still streaming.
#[derive(Debug)]
struct PendingAssistantMessage {
    node: NodeId,
    raw: String,
}

/// Controller for one chat session.
#[derive(Debug)]
pub struct ChatController<V: ChatView> {
    id: Uuid,
    view: V,
    connection: Option<Connection>,
    next_connection: u64,
    streaming: bool,
    pending: Option<PendingAssistantMessage>,
    backoff: Backoff,
    disposed: bool,
}

impl<V: ChatView> ChatController<V> {
    /// Create a controller rendering into `view`.
    pub fn new(mut view: V, policy: ReconnectPolicy) -> Self {
        view.set_status(ConnectionStatus::Disconnected);
        Self {
            id: Uuid::new_v4(),
            view,
            connection: None,
            next_connection: 0,
            streaming: false,
            pending: None,
            backoff: Backoff::new(policy),
            disposed: false,
        }
    }

    /// Unique id of this controller, used in logs.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The view being driven.
    #[must_use]
    pub const fn view(&self) -> &V {
        &self.view
    }

    /// The view, for edits that do not affect controller state.
    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    /// Whether an assistant reply is in flight.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Whether a reply bubble is currently being filled.
    #[must_use]
    pub const fn has_pending_reply(&self) -> bool {
        self.pending.is_some()
    }

    /// State of the current socket, if any.
    #[must_use]
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.connection.as_ref().map(|c| c.state)
    }

    /// Id of the current socket, if any.
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(|c| c.id)
    }

    /// Status derived from the current socket.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.connection_state()
            .map_or(ConnectionStatus::Disconnected, ConnectionStatus::from)
    }

    /// Whether [`ChatController::dispose`] has been called.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        self.disposed
    }

    // =========================================================================
    // Connection Lifecycle
    // =========================================================================

    /// Start a new connection attempt, replacing any previous socket.
    ///
    /// Returns `None` once disposed.
    pub fn begin_connect(&mut self) -> Option<ConnectionId> {
        if self.disposed {
            return None;
        }

        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        self.connection = Some(Connection {
            id,
            state: ConnectionState::Connecting,
            sender: None,
        });
        self.view.set_status(ConnectionStatus::Reconnecting);

        tracing::debug!(controller = %self.id, connection = %id, "Connecting");
        Some(id)
    }

    /// The handshake for `id` succeeded.
    pub fn handle_open(&mut self, id: ConnectionId, sender: WsSender) {
        let Some(conn) = self.current_mut(id) else {
            return;
        };
        if conn.state != ConnectionState::Connecting {
            return;
        }

        conn.state = ConnectionState::Open;
        conn.sender = Some(sender);
        self.backoff.reset();
        self.view.set_status(ConnectionStatus::Connected);
        self.view.clear_error();

        tracing::info!(controller = %self.id, connection = %id, "WebSocket connected");
    }

    /// Socket `id` failed or closed.
    ///
    /// Returns the delay before the next connection attempt, or `None` if the
    /// event is stale, duplicated, or the controller is disposed.
    pub fn handle_closed(&mut self, id: ConnectionId, error: TransportError) -> Option<Duration> {
        let conn = self.current_mut(id)?;
        if conn.state == ConnectionState::Closed {
            return None;
        }

        conn.state = ConnectionState::Closed;
        conn.sender = None;

        if self.streaming || self.pending.is_some() {
            tracing::debug!(controller = %self.id, "Finalizing reply interrupted by disconnect");
            self.finish_reply();
        }

        self.view.set_status(ConnectionStatus::Disconnected);
        let error = ChatError::from(error);
        self.view.show_error(&error);

        let delay = self.backoff.next_delay();
        tracing::warn!(
            controller = %self.id,
            connection = %id,
            error = %error,
            delay_ms = delay.as_millis(),
            "WebSocket disconnected, scheduling reconnect"
        );
        Some(delay)
    }

    /// Stop reacting to events and drop the socket.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.connection = None;
        self.pending = None;
        self.streaming = false;
        tracing::debug!(controller = %self.id, "Controller disposed");
    }

    fn current_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        if self.disposed {
            return None;
        }
        self.connection.as_mut().filter(|c| c.id == id)
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Send a user message.
    ///
    /// Blank text, a missing connection, or an in-flight reply leave the view
    /// untouched and return an [`InputError`].
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Input` when the message cannot be sent and
    /// `ChatError::Transport` if the socket writer rejects the frame.
    pub fn send_message(&mut self, text: &str) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(InputError::Blank.into());
        }
        if self.streaming {
            return Err(InputError::Busy.into());
        }
        let sender = self
            .connection
            .as_ref()
            .filter(|c| !self.disposed && c.state == ConnectionState::Open)
            .and_then(|c| c.sender.clone())
            .ok_or(InputError::NotConnected)?;

        self.view.remove_placeholder();
        self.view.append_user_message(text, &escape_html(text));
        self.view.scroll_to_bottom();

        self.streaming = true;
        self.view.set_input_enabled(false);

        if let Err(e) = sender.send_text(encode_user_message(text)) {
            self.streaming = false;
            self.view.set_input_enabled(true);
            return Err(e.into());
        }

        self.view.clear_input();
        tracing::debug!(controller = %self.id, bytes = text.len(), "Message sent");
        Ok(())
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Handle an inbound text frame from socket `id`.
    ///
    /// Frames from stale sockets are dropped.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Protocol` for a malformed frame; the view is not
    /// changed in that case.
    pub fn handle_frame(&mut self, id: ConnectionId, text: &str) -> Result<(), ChatError> {
        if self.current_mut(id).is_none() {
            tracing::trace!(connection = %id, "Dropping frame from stale connection");
            return Ok(());
        }

        match decode_frame(text)? {
            Inbound::Stream(content) => self.handle_stream_chunk(&content),
            Inbound::End => self.finish_reply(),
            Inbound::Other(kind) => {
                tracing::debug!(kind = %kind, "Ignoring frame of unknown type");
            }
        }
        Ok(())
    }

    fn handle_stream_chunk(&mut self, content: &str) {
        let view = &mut self.view;
        let pending = self.pending.get_or_insert_with(|| PendingAssistantMessage {
            node: view.begin_assistant_message(),
            raw: String::new(),
        });

        pending.raw.push_str(content);
        view.append_assistant_text(pending.node, content);
        view.scroll_to_bottom();
    }

    fn finish_reply(&mut self) {
        if let Some(pending) = self.pending.take() {
            let reply = format_reply(&pending.raw);
            self.view.finalize_assistant_message(pending.node, &reply);
        }

        self.streaming = false;
        self.view.set_input_enabled(true);
        self.view.focus_input();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{Role, Transcript};
    use tokio::sync::mpsc;

    fn controller() -> ChatController<Transcript> {
        ChatController::new(
            Transcript::new(),
            ReconnectPolicy::fixed(Duration::from_millis(3000)),
        )
    }

    /// Controller with an open connection and the receiving end of its writer.
    fn connected() -> (ChatController<Transcript>, ConnectionId, mpsc::Receiver<String>) {
        let mut ctl = controller();
        let id = ctl.begin_connect().unwrap();
        let (tx, rx) = mpsc::channel(8);
        ctl.handle_open(id, WsSender::new(tx));
        (ctl, id, rx)
    }

    fn stream(content: &str) -> String {
        serde_json::json!({ "type": "stream", "content": content }).to_string()
    }

    const END: &str = r#"{"type":"end","content":""}"#;

    // =========================================================================
    // Connection Lifecycle Tests
    // =========================================================================

    #[test]
    fn new_controller_is_disconnected() {
        let ctl = controller();
        assert_eq!(ctl.status(), ConnectionStatus::Disconnected);
        assert_eq!(ctl.view().status(), ConnectionStatus::Disconnected);
        assert!(ctl.connection_state().is_none());
    }

    #[test]
    fn open_sets_connected_and_clears_banner() {
        let mut ctl = controller();
        ctl.view_mut()
            .show_error(&TransportError::ClosedByPeer.into());

        let id = ctl.begin_connect().unwrap();
        assert_eq!(ctl.view().status(), ConnectionStatus::Reconnecting);
        assert_eq!(ctl.connection_state(), Some(ConnectionState::Connecting));

        let (tx, _rx) = mpsc::channel(1);
        ctl.handle_open(id, WsSender::new(tx));
        assert_eq!(ctl.view().status(), ConnectionStatus::Connected);
        assert_eq!(ctl.connection_state(), Some(ConnectionState::Open));
        assert!(ctl.view().error().is_none());
    }

    #[test]
    fn close_schedules_exactly_one_reconnect() {
        let (mut ctl, id, _rx) = connected();

        let delay = ctl.handle_closed(id, TransportError::ClosedByPeer);
        assert_eq!(delay, Some(Duration::from_millis(3000)));
        assert_eq!(ctl.view().status(), ConnectionStatus::Disconnected);
        assert_eq!(ctl.view().error(), Some("connection closed by server"));

        assert_eq!(
            ctl.handle_closed(id, TransportError::Socket("again".into())),
            None
        );
    }

    #[test]
    fn each_attempt_gets_a_fresh_connection() {
        let (mut ctl, first, _rx) = connected();
        ctl.handle_closed(first, TransportError::ClosedByPeer);

        let second = ctl.begin_connect().unwrap();
        assert_ne!(first, second);
        assert_eq!(ctl.connection_state(), Some(ConnectionState::Connecting));

        // Late events from the old socket are ignored
        let (tx, _rx2) = mpsc::channel(1);
        ctl.handle_open(first, WsSender::new(tx));
        assert_eq!(ctl.connection_state(), Some(ConnectionState::Connecting));
        assert_eq!(ctl.handle_closed(first, TransportError::ClosedByPeer), None);
        ctl.handle_frame(first, &stream("ghost")).unwrap();
        assert!(ctl.view().messages().is_empty());
    }

    #[test]
    fn failed_handshake_also_reconnects() {
        let mut ctl = controller();
        let id = ctl.begin_connect().unwrap();
        let delay = ctl.handle_closed(id, TransportError::Connect("refused".into()));
        assert_eq!(delay, Some(Duration::from_millis(3000)));
        assert_eq!(ctl.view().error(), Some("connection failed: refused"));
    }

    #[test]
    fn disposed_controller_stops_reconnecting() {
        let (mut ctl, id, _rx) = connected();
        ctl.dispose();

        assert!(ctl.is_disposed());
        assert_eq!(ctl.handle_closed(id, TransportError::ClosedByPeer), None);
        assert_eq!(ctl.begin_connect(), None);
        assert!(matches!(
            ctl.send_message("hi"),
            Err(ChatError::Input(InputError::NotConnected))
        ));
    }

    // =========================================================================
    // Outbound Tests
    // =========================================================================

    #[test]
    fn send_appends_escaped_bubble_and_transmits_raw_text() {
        let (mut ctl, _id, mut rx) = connected();
        ctl.view_mut().input_mut().insert_char('x');

        ctl.send_message("<b>hi</b> ").unwrap();

        let view = ctl.view();
        assert!(!view.has_placeholder());
        assert_eq!(view.messages().len(), 1);
        assert_eq!(view.messages()[0].role, Role::User);
        assert_eq!(view.messages()[0].html, "&lt;b&gt;hi&lt;/b&gt; ");
        assert!(!view.input().is_enabled());
        assert_eq!(view.input().text(), "");
        assert!(ctl.is_streaming());

        assert_eq!(rx.try_recv().unwrap(), "<b>hi</b> ");
    }

    #[test]
    fn blank_input_is_a_silent_no_op() {
        let (mut ctl, _id, mut rx) = connected();

        for text in ["", "   ", "\n\t"] {
            assert!(matches!(
                ctl.send_message(text),
                Err(ChatError::Input(InputError::Blank))
            ));
        }

        assert!(ctl.view().has_placeholder());
        assert!(ctl.view().messages().is_empty());
        assert!(ctl.view().input().is_enabled());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn sending_while_disconnected_changes_nothing() {
        let mut ctl = controller();
        assert!(matches!(
            ctl.send_message("hello"),
            Err(ChatError::Input(InputError::NotConnected))
        ));

        let id = ctl.begin_connect().unwrap();
        assert!(ctl.send_message("hello").is_err());
        ctl.handle_closed(id, TransportError::ClosedByPeer);
        assert!(ctl.send_message("hello").is_err());

        assert!(ctl.view().has_placeholder());
        assert!(ctl.view().messages().is_empty());
        assert!(!ctl.is_streaming());
    }

    #[test]
    fn second_send_while_streaming_is_refused() {
        let (mut ctl, _id, mut rx) = connected();
        ctl.send_message("first").unwrap();

        assert!(matches!(
            ctl.send_message("second"),
            Err(ChatError::Input(InputError::Busy))
        ));
        assert_eq!(ctl.view().messages().len(), 1);
        assert_eq!(rx.try_recv().unwrap(), "first");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn writer_failure_rolls_back_streaming() {
        let (mut ctl, _id, rx) = connected();
        drop(rx);

        let err = ctl.send_message("hello").unwrap_err();
        assert!(matches!(err, ChatError::Transport(TransportError::Send(_))));
        assert!(!ctl.is_streaming());
        assert!(ctl.view().input().is_enabled());
    }

    // =========================================================================
    // Inbound Tests
    // =========================================================================

    #[test]
    fn chunks_accumulate_then_render_on_end() {
        let (mut ctl, id, _rx) = connected();
        ctl.send_message("hi").unwrap();

        ctl.handle_frame(id, &stream("Hel")).unwrap();
        assert!(ctl.has_pending_reply());
        ctl.handle_frame(id, &stream("lo")).unwrap();

        let reply = &ctl.view().messages()[1];
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.text, "Hello");
        assert!(reply.streaming);

        ctl.handle_frame(id, END).unwrap();
        let reply = &ctl.view().messages()[1];
        assert!(!reply.streaming);
        assert_eq!(reply.html, crate::format::format_reply("Hello").html);
        assert!(reply.html.contains("<p>Hello</p>"));

        assert!(!ctl.is_streaming());
        assert!(!ctl.has_pending_reply());
        assert!(ctl.view().input().is_enabled());
        assert!(ctl.view().input().is_focused());
    }

    #[test]
    fn end_without_chunks_unlocks_input() {
        let (mut ctl, id, _rx) = connected();
        ctl.send_message("hi").unwrap();

        ctl.handle_frame(id, END).unwrap();

        assert!(!ctl.is_streaming());
        assert!(ctl.view().input().is_enabled());
        assert_eq!(ctl.view().messages().len(), 1);
    }

    #[test]
    fn fixups_apply_before_rendering() {
        let (mut ctl, id, _rx) = connected();
        ctl.send_message("list?").unwrap();

        ctl.handle_frame(id, &stream(r"Steps:\n\n1. first\n2. second")).unwrap();
        ctl.handle_frame(id, END).unwrap();

        let reply = &ctl.view().messages()[1];
        assert_eq!(
            reply.source.as_deref(),
            Some("Steps:\n\n  1. first\n  2. second")
        );
        assert!(reply.html.contains("<li>first</li>"));
    }

    #[test]
    fn reconstructed_script_is_sanitized() {
        let (mut ctl, id, _rx) = connected();
        ctl.send_message("hi").unwrap();

        for chunk in ["<scr", "ipt>alert(1)</scr", "ipt>"] {
            ctl.handle_frame(id, &stream(chunk)).unwrap();
        }
        // While streaming the text is shown literally
        assert!(!ctl.view().messages()[1].html.contains("<script"));

        ctl.handle_frame(id, END).unwrap();
        assert!(!ctl.view().messages()[1].html.contains("<script"));
    }

    #[test]
    fn unknown_and_malformed_frames_leave_view_alone() {
        let (mut ctl, id, _rx) = connected();
        ctl.send_message("hi").unwrap();

        ctl.handle_frame(id, r#"{"type":"typing"}"#).unwrap();
        assert!(matches!(
            ctl.handle_frame(id, "garbage"),
            Err(ChatError::Protocol(_))
        ));
        assert!(ctl.handle_frame(id, r#"{"type":"stream"}"#).is_err());

        assert_eq!(ctl.view().messages().len(), 1);
        assert!(ctl.is_streaming());
    }

    #[test]
    fn disconnect_mid_reply_finalizes_partial_text() {
        let (mut ctl, id, _rx) = connected();
        ctl.send_message("hi").unwrap();
        ctl.handle_frame(id, &stream("partial **answer**")).unwrap();

        ctl.handle_closed(id, TransportError::Socket("reset".into()));

        let reply = &ctl.view().messages()[1];
        assert!(!reply.streaming);
        assert!(reply.html.contains("<strong>answer</strong>"));
        assert!(!ctl.is_streaming());
        assert!(ctl.view().input().is_enabled());
    }

    #[test]
    fn replies_do_not_leak_between_turns() {
        let (mut ctl, id, _rx) = connected();

        ctl.send_message("one").unwrap();
        ctl.handle_frame(id, &stream("first")).unwrap();
        ctl.handle_frame(id, END).unwrap();

        ctl.send_message("two").unwrap();
        ctl.handle_frame(id, &stream("second")).unwrap();
        ctl.handle_frame(id, END).unwrap();

        let texts: Vec<&str> = ctl
            .view()
            .messages()
            .iter()
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(texts, vec!["one", "first", "two", "second"]);
    }
}
