//! WebSocket connection and event loop.
//!
//! One [`Connection`] wraps one WebSocket stream, on either side of the
//! bridge. The connection spawns a tokio task that handles:
//!
//! - Incoming text frames, handed to the frame handler in arrival order
//! - Outgoing text frames queued through [`Connection::send_text`]
//! - Close detection and the close callback
//!
//! Frame interpretation (envelopes, signatures, correlation) belongs to the
//! endpoints; this layer only moves text.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Callback invoked for each inbound text frame.
///
/// Runs on the event loop task; frames are delivered one at a time in the
/// order they arrived.
pub type FrameHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback invoked once when the event loop ends.
pub type CloseHandler = Box<dyn FnOnce(ConnectionId) + Send>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// ConnectionId
// ============================================================================

/// Process-unique id of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write a text frame.
    Send(String),
    /// Close the socket and stop.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// Handle to a live WebSocket connection.
///
/// Cheap to clone; all clones drive the same event loop. Dropping handles
/// does not close the socket, call [`Connection::shutdown`].
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    open: Arc<AtomicBool>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Connection {
    /// Takes ownership of `ws_stream` and spawns its event loop.
    pub(crate) fn spawn<S>(
        ws_stream: WebSocketStream<S>,
        on_frame: FrameHandler,
        on_close: CloseHandler,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = ConnectionId::next();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        tokio::spawn(Self::run_event_loop(
            id,
            ws_stream,
            command_rx,
            Arc::clone(&open),
            on_frame,
            on_close,
        ));

        debug!(connection = %id, "Connection event loop started");

        Self {
            id,
            command_tx,
            open,
        }
    }

    /// Returns this connection's id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns `true` while the event loop is running.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Queues a text frame for sending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the event loop has stopped.
    pub fn send_text(&self, text: String) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ConnectionClosed);
        }

        self.command_tx
            .send(ConnectionCommand::Send(text))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Closes the connection. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        id: ConnectionId,
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        open: Arc<AtomicBool>,
        on_frame: FrameHandler,
        on_close: CloseHandler,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            trace!(connection = %id, len = text.len(), "Frame received");
                            on_frame(text.as_str());
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!(connection = %id, "WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(connection = %id, error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!(connection = %id, "WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send(text)) => {
                            if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                                warn!(connection = %id, error = %e, "Failed to send frame");
                                break;
                            }
                            trace!(connection = %id, "Frame sent");
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!(connection = %id, "Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!(connection = %id, "Command channel closed");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        open.store(false, Ordering::Release);
        on_close(id);

        debug!(connection = %id, "Event loop terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn pair() -> (WebSocketStream<tokio::io::DuplexStream>, WebSocketStream<tokio::io::DuplexStream>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(b, Role::Client, None).await;
        (server, client)
    }

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (server, client) = pair().await;

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let handler: FrameHandler = Arc::new(move |text| sink.lock().push(text.to_string()));

        let _server = Connection::spawn(server, handler, Box::new(|_| {}));
        let client = Connection::spawn(client, Arc::new(|_| {}), Box::new(|_| {}));

        for i in 0..5 {
            client.send_text(format!("frame-{i}")).expect("send");
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while received.lock().len() < 5 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("frames delivered");

        let expected: Vec<_> = (0..5).map(|i| format!("frame-{i}")).collect();
        assert_eq!(*received.lock(), expected);
    }

    #[tokio::test]
    async fn test_shutdown_runs_close_handlers() {
        let (server, client) = pair().await;

        let (tx, rx) = oneshot::channel();
        let server = Connection::spawn(
            server,
            Arc::new(|_| {}),
            Box::new(move |id| {
                let _ = tx.send(id);
            }),
        );

        let (peer_tx, peer_rx) = oneshot::channel();
        let client = Connection::spawn(
            client,
            Arc::new(|_| {}),
            Box::new(move |_| {
                let _ = peer_tx.send(());
            }),
        );

        server.shutdown();

        let closed = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("closed in time")
            .expect("close handler");
        assert_eq!(closed, server.id());

        tokio::time::timeout(Duration::from_secs(5), peer_rx)
            .await
            .expect("peer closed in time")
            .expect("peer close handler");

        assert!(!server.is_open());
        assert!(!client.is_open());
        assert!(matches!(client.send_text("late".into()), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("conn-"));
    }
}
