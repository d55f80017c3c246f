//! Async driver for a [`ChatController`].
//!
//! The session spawns one forwarding task per connection attempt and one
//! timer per scheduled reconnect. Those tasks never touch the controller:
//! they post [`SessionEvent`]s into a single channel, and the owner feeds each
//! event back through [`Session::handle`] from its own loop. Every spawned
//! task is tied to the session's cancellation token, so [`Session::dispose`]
//! (or dropping the session) stops all pending timers and sockets.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::controller::{ChatController, ConnectionId};
use crate::error::{ChatError, ConfigError, TransportError};
use crate::transport::{Connector, WebSocketConnector, WsEvent, WsSender};
use crate::view::ChatView;

/// Capacity of the session event channel.
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Work for the session owner to hand back to [`Session::handle`].
#[derive(Debug)]
pub enum SessionEvent {
    /// Handshake completed for `id`.
    Opened {
        /// Connection the event belongs to.
        id: ConnectionId,
        /// Writer handle for the new socket.
        sender: WsSender,
    },
    /// Text frame received on `id`.
    Frame {
        /// Connection the event belongs to.
        id: ConnectionId,
        /// Raw frame payload.
        text: String,
    },
    /// Connection `id` failed or closed.
    Closed {
        /// Connection the event belongs to.
        id: ConnectionId,
        /// Why it ended.
        error: TransportError,
    },
    /// A scheduled reconnect delay elapsed.
    ReconnectDue,
}

/// A chat controller bound to an endpoint and a task runtime.
pub struct Session<V: ChatView> {
    controller: ChatController<V>,
    endpoint: String,
    connector: Arc<dyn Connector>,
    events_tx: mpsc::Sender<SessionEvent>,
    shutdown: CancellationToken,
}

impl<V: ChatView> Session<V> {
    /// Wrap `controller`, connecting to `endpoint` through `connector`.
    ///
    /// Returns the session and the receiver its events arrive on.
    pub fn new(
        controller: ChatController<V>,
        endpoint: impl Into<String>,
        connector: Arc<dyn Connector>,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let session = Self {
            controller,
            endpoint: endpoint.into(),
            connector,
            events_tx,
            shutdown: CancellationToken::new(),
        };
        (session, events_rx)
    }

    /// Build a session over a real WebSocket from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if the endpoint cannot be derived.
    pub fn from_config(
        config: &ClientConfig,
        view: V,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), ConfigError> {
        let endpoint = config.ws_endpoint()?;
        let controller = ChatController::new(view, config.reconnect.clone());
        let connector = Arc::new(WebSocketConnector::new(config.channel_capacity));
        Ok(Self::new(controller, endpoint, connector))
    }

    /// WebSocket URL this session connects to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The underlying controller.
    #[must_use]
    pub const fn controller(&self) -> &ChatController<V> {
        &self.controller
    }

    /// The view being driven.
    #[must_use]
    pub const fn view(&self) -> &V {
        self.controller.view()
    }

    /// The view, for input editing and scrolling.
    pub fn view_mut(&mut self) -> &mut V {
        self.controller.view_mut()
    }

    /// Open the first connection.
    pub fn start(&mut self) {
        tracing::info!(endpoint = %self.endpoint, controller = %self.controller.id(), "Starting chat session");
        self.connect();
    }

    /// Send a user message on the open connection.
    ///
    /// # Errors
    ///
    /// See [`ChatController::send_message`].
    pub fn send_message(&mut self, text: &str) -> Result<(), ChatError> {
        self.controller.send_message(text)
    }

    /// Apply one event produced by this session's tasks.
    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Opened { id, sender } => self.controller.handle_open(id, sender),
            SessionEvent::Frame { id, text } => {
                if let Err(e) = self.controller.handle_frame(id, &text) {
                    tracing::warn!(connection = %id, error = %e, frame = %text, "Dropping malformed frame");
                }
            }
            SessionEvent::Closed { id, error } => {
                if let Some(delay) = self.controller.handle_closed(id, error) {
                    self.schedule_reconnect(delay);
                }
            }
            SessionEvent::ReconnectDue => self.connect(),
        }
    }

    /// Stop all tasks and timers and release the socket.
    pub fn dispose(&mut self) {
        self.shutdown.cancel();
        self.controller.dispose();
    }

    fn connect(&mut self) {
        let Some(id) = self.controller.begin_connect() else {
            return;
        };

        let connector = Arc::clone(&self.connector);
        let url = self.endpoint.clone();
        let tx = self.events_tx.clone();
        let token = self.shutdown.child_token();

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    tracing::debug!(connection = %id, "Connection task cancelled");
                }
                () = run_connection(connector, url, id, tx) => {}
            }
        });
    }

    fn schedule_reconnect(&self, delay: Duration) {
        let tx = self.events_tx.clone();
        let token = self.shutdown.child_token();

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = tx.send(SessionEvent::ReconnectDue).await;
                }
            }
        });
    }
}

impl<V: ChatView> Drop for Session<V> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Connect once and forward everything that happens on the socket.
async fn run_connection(
    connector: Arc<dyn Connector>,
    url: String,
    id: ConnectionId,
    tx: mpsc::Sender<SessionEvent>,
) {
    let (sender, mut events) = match connector.connect(&url).await {
        Ok(pair) => pair,
        Err(error) => {
            tracing::debug!(connection = %id, error = %error, "Handshake failed");
            let _ = tx.send(SessionEvent::Closed { id, error }).await;
            return;
        }
    };

    if tx.send(SessionEvent::Opened { id, sender }).await.is_err() {
        return;
    }

    while let Some(event) = events.recv().await {
        let event = match event {
            WsEvent::Text(text) => SessionEvent::Frame { id, text },
            WsEvent::Closed(error) => {
                let _ = tx.send(SessionEvent::Closed { id, error }).await;
                return;
            }
        };
        if tx.send(event).await.is_err() {
            return;
        }
    }

    // Reader vanished without reporting a reason
    let _ = tx
        .send(SessionEvent::Closed {
            id,
            error: TransportError::ClosedByPeer,
        })
        .await;
}
