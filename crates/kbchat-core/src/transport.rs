//! WebSocket transport to the chat backend.
//!
//! A connection is split into a writer task draining outbound text frames
//! and a reader task forwarding inbound text frames. The reader always ends
//! with exactly one [`WsEvent::Closed`], whatever the cause.

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::error::TransportError;

/// Default capacity of the outbound and inbound channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Handle for sending text frames on an open connection.
#[derive(Debug, Clone)]
pub struct WsSender {
    tx: mpsc::Sender<String>,
}

impl WsSender {
    /// Wrap the outbound side of a writer channel.
    #[must_use]
    pub const fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    /// Queue a text frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Send` if the writer is gone or its queue is full.
    pub fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.tx
            .try_send(text)
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    /// Whether the writer task has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Events from the WebSocket reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    /// An inbound text frame.
    Text(String),
    /// The connection ended. Always the last event.
    Closed(TransportError),
}

/// Opens connections to the chat endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Perform the handshake and start the I/O tasks.
    ///
    /// Returns a sender for outbound frames and a receiver of inbound events.
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(WsSender, mpsc::Receiver<WsEvent>), TransportError>;
}

/// [`Connector`] backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy)]
pub struct WebSocketConnector {
    capacity: usize,
}

impl WebSocketConnector {
    /// Connector whose channels hold `capacity` frames.
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self { capacity }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(WsSender, mpsc::Receiver<WsEvent>), TransportError> {
        connect(url, self.capacity).await
    }
}

/// Connect to `url` and spawn the writer and reader tasks.
///
/// # Errors
///
/// Returns `TransportError::Connect` if the handshake fails.
pub async fn connect(
    url: &str,
    capacity: usize,
) -> Result<(WsSender, mpsc::Receiver<WsEvent>), TransportError> {
    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    tracing::debug!(url = %url, "WebSocket handshake complete");

    let (write, read) = ws_stream.split();

    let capacity = capacity.max(1);
    let (outgoing_tx, outgoing_rx) = mpsc::channel::<String>(capacity);
    let (event_tx, event_rx) = mpsc::channel::<WsEvent>(capacity);

    tokio::spawn(ws_writer(write, outgoing_rx));
    tokio::spawn(ws_reader(read, event_tx));

    Ok((WsSender::new(outgoing_tx), event_rx))
}

/// Write queued text frames until the sender side is dropped.
async fn ws_writer<S>(mut write: S, mut rx: mpsc::Receiver<String>)
where
    S: Sink<Message> + Unpin,
{
    while let Some(text) = rx.recv().await {
        if write.send(Message::Text(text)).await.is_err() {
            tracing::debug!("WebSocket writer stopped: socket rejected frame");
            return;
        }
    }

    // Owner dropped the sender: close politely.
    let _ = write.send(Message::Close(None)).await;
}

/// Forward text frames as events, then report how the connection ended.
async fn ws_reader<S>(mut read: S, tx: mpsc::Sender<WsEvent>)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let reason = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                if tx.send(WsEvent::Text(text)).await.is_err() {
                    // Nobody is listening any more.
                    return;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!(frame = ?frame, "Server closed WebSocket");
                break TransportError::ClosedByPeer;
            }
            // Control frames and binary payloads are not part of the protocol
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_) | Message::Binary(_))) => {}
            Some(Err(e)) => break TransportError::Socket(e.to_string()),
            None => break TransportError::ClosedByPeer,
        }
    };

    let _ = tx.send(WsEvent::Closed(reason)).await;
}
