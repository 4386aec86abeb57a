//! Dialing side of the bridge.
//!
//! The browser extension connects out to the tool server and keeps trying
//! until it succeeds.
//!
//! # Reconnect Policy
//!
//! A supervisor ticks every [`RECONNECT_INTERVAL`]:
//!
//! | Phase | Action |
//! |-------|--------|
//! | connecting, ≤ 2 checks | wait |
//! | connecting, > 2 checks | abort the attempt, start a fresh one |
//! | closed | start a fresh attempt |
//! | open | nothing |
//!
//! # Inbound Policy
//!
//! Unlike the listening side, a frame with a bad signature is answered with
//! a bare (unsigned) error message, so the issuer learns the secrets are
//! out of sync.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::AbortHandle;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};

use crate::dispatcher::ResourceSink;
use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;
use crate::protocol::{
    CommandRequest, ErrorMessage, InboundFrame, Payload, ResourceMessage, SignedEnvelope,
};

use super::connection::{CloseHandler, Connection, FrameHandler};

// ============================================================================
// Constants
// ============================================================================

/// Supervisor tick.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

/// Checks a connection attempt may stay pending before it is abandoned.
const MAX_CONNECTING_CHECKS: u32 = 2;

/// Error text sent back for frames whose signature does not verify.
pub const SIGNATURE_MISMATCH_MESSAGE: &str =
    "Invalid message signature - extension and server not in sync";

// ============================================================================
// Types
// ============================================================================

/// Callback receiving verified, decoded commands.
pub type MessageListener = Arc<dyn Fn(CommandRequest) + Send + Sync>;

/// Connection state machine.
#[derive(Debug)]
enum Phase {
    Connecting,
    Open(Connection),
    Closed,
}

#[derive(Debug)]
struct ConnectorState {
    phase: Phase,
    /// Supervisor checks seen while connecting.
    connecting_checks: u32,
    /// The in-flight connection attempt.
    attempt: Option<AbortHandle>,
    /// Bumped per attempt; callbacks from older attempts are ignored.
    generation: u64,
}

// ============================================================================
// ConnectorEndpoint
// ============================================================================

/// Self-healing outbound WebSocket connection.
///
/// # Example
///
/// ```ignore
/// let connector = ConnectorEndpoint::connect("ws://localhost:8089", secret);
/// connector.add_message_listener(Arc::new(|request| { /* dispatch */ }));
/// ```
pub struct ConnectorEndpoint {
    url: String,
    secret: RwLock<String>,
    state: Mutex<ConnectorState>,
    listener: RwLock<Option<MessageListener>>,
    supervisor: Mutex<Option<AbortHandle>>,
    disconnected: AtomicBool,
}

// ============================================================================
// ConnectorEndpoint - Constructor
// ============================================================================

impl ConnectorEndpoint {
    /// Starts connecting to `url` and supervising the connection.
    #[must_use]
    pub fn connect(url: impl Into<String>, secret: impl Into<String>) -> Arc<Self> {
        Self::connect_with_interval(url, secret, RECONNECT_INTERVAL)
    }

    /// Like [`ConnectorEndpoint::connect`] with a custom supervisor tick.
    #[must_use]
    pub fn connect_with_interval(
        url: impl Into<String>,
        secret: impl Into<String>,
        interval: Duration,
    ) -> Arc<Self> {
        let endpoint = Arc::new(Self {
            url: url.into(),
            secret: RwLock::new(secret.into()),
            state: Mutex::new(ConnectorState {
                phase: Phase::Closed,
                connecting_checks: 0,
                attempt: None,
                generation: 0,
            }),
            listener: RwLock::new(None),
            supervisor: Mutex::new(None),
            disconnected: AtomicBool::new(false),
        });

        endpoint.start_attempt();

        let task = tokio::spawn(Self::supervise(Arc::downgrade(&endpoint), interval));
        *endpoint.supervisor.lock() = Some(task.abort_handle());

        endpoint
    }
}

// ============================================================================
// ConnectorEndpoint - Public API
// ============================================================================

impl ConnectorEndpoint {
    /// Returns the URL being dialed.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns `true` if the connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.open_connection().is_some()
    }

    /// Replaces the shared secret.
    pub fn set_secret(&self, secret: impl Into<String>) {
        *self.secret.write() = secret.into();
        debug!(url = %self.url, "Connector secret updated");
    }

    /// Sets the command listener. The last registration wins.
    pub fn add_message_listener(&self, listener: MessageListener) {
        *self.listener.write() = Some(listener);
    }

    /// Signs and sends a resource message.
    ///
    /// Without an open connection this logs and does nothing.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Signature`] if the secret is empty
    /// - [`crate::Error::Json`] if serialization fails
    pub fn send(&self, message: &ResourceMessage) -> Result<()> {
        self.seal_and_send(message)
    }

    /// Signs and sends an error message.
    ///
    /// Without an open connection this logs and does nothing.
    ///
    /// # Errors
    ///
    /// Same as [`ConnectorEndpoint::send`].
    pub fn send_error_message(&self, correlation_id: CorrelationId, text: &str) -> Result<()> {
        self.seal_and_send(&ErrorMessage::new(correlation_id, text))
    }

    /// Stops reconnecting and closes the socket. Idempotent.
    pub fn disconnect(&self) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(task) = self.supervisor.lock().take() {
            task.abort();
        }

        let mut state = self.state.lock();
        state.generation += 1;
        if let Some(attempt) = state.attempt.take() {
            attempt.abort();
        }
        if let Phase::Open(connection) = std::mem::replace(&mut state.phase, Phase::Closed) {
            connection.shutdown();
        }

        info!(url = %self.url, "Connector disconnected");
    }
}

// ============================================================================
// ConnectorEndpoint - Internal
// ============================================================================

impl ConnectorEndpoint {
    fn open_connection(&self) -> Option<Connection> {
        match &self.state.lock().phase {
            Phase::Open(connection) if connection.is_open() => Some(connection.clone()),
            _ => None,
        }
    }

    fn seal_and_send<T: serde::Serialize>(&self, payload: &T) -> Result<()> {
        let secret = self.secret.read().clone();
        let frame = SignedEnvelope::seal(payload, &secret)?.to_frame()?;

        let Some(connection) = self.open_connection() else {
            warn!(url = %self.url, "WebSocket is not open, frame not sent");
            return Ok(());
        };

        if let Err(e) = connection.send_text(frame) {
            warn!(url = %self.url, error = %e, "Failed to queue frame");
        }
        Ok(())
    }

    async fn supervise(endpoint: Weak<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(ep) = endpoint.upgrade() else {
                break;
            };
            if ep.disconnected.load(Ordering::SeqCst) {
                break;
            }
            ep.check();
        }
    }

    /// One supervisor tick.
    fn check(self: &Arc<Self>) {
        let restart = {
            let mut state = self.state.lock();
            match state.phase {
                Phase::Connecting => {
                    state.connecting_checks += 1;
                    if state.connecting_checks > MAX_CONNECTING_CHECKS {
                        warn!(
                            url = %self.url,
                            checks = state.connecting_checks,
                            "Connection attempt stalled, retrying"
                        );
                        if let Some(attempt) = state.attempt.take() {
                            attempt.abort();
                        }
                        state.phase = Phase::Closed;
                        true
                    } else {
                        false
                    }
                }
                Phase::Closed => true,
                Phase::Open(_) => false,
            }
        };

        if restart {
            self.start_attempt();
        }
    }

    fn start_attempt(self: &Arc<Self>) {
        if self.disconnected.load(Ordering::SeqCst) {
            return;
        }

        let mut state = self.state.lock();
        state.generation += 1;
        state.phase = Phase::Connecting;
        state.connecting_checks = 0;

        let generation = state.generation;
        let endpoint = Arc::downgrade(self);
        let url = self.url.clone();

        debug!(url = %url, generation, "Connecting");

        let task = tokio::spawn(async move {
            let outcome = connect_async(url.as_str()).await.map_err(Error::from);
            let Some(ep) = endpoint.upgrade() else {
                return;
            };

            match outcome {
                Ok((ws_stream, _)) => {
                    let mut state = ep.state.lock();
                    if state.generation != generation || ep.disconnected.load(Ordering::SeqCst) {
                        return;
                    }

                    let connection = Connection::spawn(
                        ws_stream,
                        Self::frame_handler(Arc::downgrade(&ep)),
                        Self::close_handler(Arc::downgrade(&ep), generation),
                    );

                    info!(url = %ep.url, connection = %connection.id(), "Connected");
                    state.phase = Phase::Open(connection);
                    state.attempt = None;
                }
                Err(e) => {
                    debug!(url = %ep.url, error = %e, "Connection attempt failed");
                    let mut state = ep.state.lock();
                    if state.generation == generation {
                        state.phase = Phase::Closed;
                        state.attempt = None;
                    }
                }
            }
        });

        state.attempt = Some(task.abort_handle());
    }

    fn frame_handler(endpoint: Weak<Self>) -> FrameHandler {
        Arc::new(move |text| {
            if let Some(ep) = endpoint.upgrade() {
                ep.handle_frame(text);
            }
        })
    }

    fn close_handler(endpoint: Weak<Self>, generation: u64) -> CloseHandler {
        Box::new(move |id| {
            let Some(ep) = endpoint.upgrade() else {
                return;
            };

            let mut state = ep.state.lock();
            if state.generation == generation && matches!(state.phase, Phase::Open(_)) {
                state.phase = Phase::Closed;
                info!(url = %ep.url, connection = %id, "Connection closed, will reconnect");
            }
        })
    }

    fn handle_frame(&self, text: &str) {
        let envelope = match InboundFrame::parse(text) {
            Ok(InboundFrame::Signed(envelope)) => envelope,
            Ok(InboundFrame::UnsignedError(error)) => {
                warn!(
                    correlation_id = %error.correlation_id,
                    "Unexpected unsigned error message, dropping"
                );
                return;
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        let secret = self.secret.read().clone();
        if !envelope.verify(&secret) {
            let correlation_id = envelope.correlation_id();
            warn!(?correlation_id, "Invalid message signature");
            if let Some(correlation_id) = correlation_id {
                self.reply_unsigned_error(correlation_id, SIGNATURE_MISMATCH_MESSAGE);
            }
            return;
        }

        match Payload::parse(envelope.payload.get()) {
            Ok(Payload::Command(request)) => {
                let listener = self.listener.read().clone();
                match listener {
                    Some(listener) => listener(request),
                    None => warn!(
                        correlation_id = %request.correlation_id,
                        "No message listener, dropping command"
                    ),
                }
            }
            Ok(other) => {
                warn!(
                    correlation_id = %other.correlation_id(),
                    "Unexpected non-command payload, dropping"
                );
            }
            Err(e) => {
                warn!(error = %e, "Invalid command payload");
                if let Some(correlation_id) = envelope.correlation_id() {
                    self.reply_error(correlation_id, &format!("Invalid command: {e}"));
                }
            }
        }
    }

    fn reply_error(&self, correlation_id: CorrelationId, text: &str) {
        if let Err(e) = self.send_error_message(correlation_id, text) {
            warn!(error = %e, "Failed to send error message");
        }
    }

    /// The peer cannot verify a tag made with a secret it does not share,
    /// so mismatch replies use the bare error shape.
    fn reply_unsigned_error(&self, correlation_id: CorrelationId, text: &str) {
        let frame = match serde_json::to_string(&ErrorMessage::new(correlation_id, text)) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to serialize error message");
                return;
            }
        };

        let Some(connection) = self.open_connection() else {
            warn!(url = %self.url, "WebSocket is not open, frame not sent");
            return;
        };

        if let Err(e) = connection.send_text(frame) {
            warn!(url = %self.url, error = %e, "Failed to queue frame");
        }
    }
}

// ============================================================================
// ResourceSink
// ============================================================================

impl ResourceSink for ConnectorEndpoint {
    fn send_resource(&self, message: ResourceMessage) -> Result<()> {
        self.send(&message)
    }

    fn send_error(&self, correlation_id: CorrelationId, message: &str) -> Result<()> {
        self.send_error_message(correlation_id, message)
    }
}

impl Drop for ConnectorEndpoint {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::Message;

    use crate::protocol::{Command, Resource};

    const SECRET: &str = "connector-secret";
    const WAIT: Duration = Duration::from_secs(10);

    async fn server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let url = format!("ws://{}", listener.local_addr().expect("addr"));
        (listener, url)
    }

    async fn accept(listener: &TcpListener) -> WebSocketStream<tokio::net::TcpStream> {
        let (stream, _) = timeout(WAIT, listener.accept())
            .await
            .expect("accept in time")
            .expect("accept");
        tokio_tungstenite::accept_async(stream).await.expect("upgrade")
    }

    async fn next_payload(ws: &mut WebSocketStream<tokio::net::TcpStream>) -> Payload {
        let Some(Ok(Message::Text(text))) = timeout(WAIT, ws.next()).await.expect("frame") else {
            panic!("expected text frame");
        };
        let InboundFrame::Signed(envelope) = InboundFrame::parse(text.as_str()).expect("parse")
        else {
            panic!("expected signed frame");
        };
        envelope.open(SECRET).expect("open")
    }

    async fn wait_connected(connector: &ConnectorEndpoint) {
        timeout(WAIT, async {
            while !connector.is_connected() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connected");
    }

    #[tokio::test]
    async fn test_verified_command_reaches_listener() {
        let (listener, url) = server().await;
        let connector = ConnectorEndpoint::connect(url, SECRET);

        let (tx, mut rx) = mpsc::unbounded_channel();
        connector.add_message_listener(Arc::new(move |request| {
            let _ = tx.send(request);
        }));

        let mut ws = accept(&listener).await;
        let request = CommandRequest::new(Command::GetTabList);
        let frame = SignedEnvelope::seal(&request, SECRET)
            .and_then(|e| e.to_frame())
            .expect("seal");
        ws.send(Message::Text(frame.into())).await.expect("send");

        let received = timeout(WAIT, rx.recv()).await.expect("in time").expect("request");
        assert_eq!(received, request);
    }

    #[tokio::test]
    async fn test_bad_signature_is_answered() {
        let (listener, url) = server().await;
        let connector = ConnectorEndpoint::connect(url, SECRET);
        let mut ws = accept(&listener).await;
        wait_connected(&connector).await;

        let request = CommandRequest::new(Command::GetTabList);
        let frame = SignedEnvelope::seal(&request, "other-secret")
            .and_then(|e| e.to_frame())
            .expect("seal");
        ws.send(Message::Text(frame.into())).await.expect("send");

        let Some(Ok(Message::Text(text))) = timeout(WAIT, ws.next()).await.expect("frame") else {
            panic!("expected text frame");
        };
        let InboundFrame::UnsignedError(error) =
            InboundFrame::parse(text.as_str()).expect("parse")
        else {
            panic!("expected bare error message");
        };
        assert_eq!(error.correlation_id, request.correlation_id);
        assert_eq!(error.error_message, SIGNATURE_MISMATCH_MESSAGE);
    }

    #[tokio::test]
    async fn test_malformed_command_is_answered() {
        let (listener, url) = server().await;
        let connector = ConnectorEndpoint::connect(url, SECRET);
        let mut ws = accept(&listener).await;
        wait_connected(&connector).await;

        let payload = serde_json::json!({ "cmd": "launch-rockets", "correlationId": "c7" });
        let frame = SignedEnvelope::seal(&payload, SECRET)
            .and_then(|e| e.to_frame())
            .expect("seal");
        ws.send(Message::Text(frame.into())).await.expect("send");

        let Payload::Error(error) = next_payload(&mut ws).await else {
            panic!("expected error message");
        };
        assert_eq!(error.correlation_id.as_str(), "c7");
        assert!(error.error_message.starts_with("Invalid command:"));
    }

    #[tokio::test]
    async fn test_send_resource_is_signed() {
        let (listener, url) = server().await;
        let connector = ConnectorEndpoint::connect(url, SECRET);
        let mut ws = accept(&listener).await;
        wait_connected(&connector).await;

        let message = ResourceMessage::new(CorrelationId::from("c1"), Resource::TabsClosed);
        connector.send_resource(message.clone()).expect("send");

        assert_eq!(next_payload(&mut ws).await, Payload::Resource(message));
    }

    #[tokio::test]
    async fn test_send_while_disconnected_is_noop() {
        let (_listener, url) = server().await;
        let connector = ConnectorEndpoint::connect(url, SECRET);
        connector.disconnect();

        let message = ResourceMessage::new(CorrelationId::from("c1"), Resource::TabsClosed);
        assert!(connector.send_resource(message).is_ok());
    }

    #[tokio::test]
    async fn test_reconnects_after_close() {
        let (listener, url) = server().await;
        let connector = ConnectorEndpoint::connect_with_interval(url, SECRET, Duration::from_millis(50));

        let mut first = accept(&listener).await;
        wait_connected(&connector).await;
        first.close(None).await.expect("close");

        let _second = accept(&listener).await;
        wait_connected(&connector).await;
    }

    #[tokio::test]
    async fn test_stalled_attempt_is_restarted() {
        let (listener, url) = server().await;
        let connector =
            ConnectorEndpoint::connect_with_interval(url, SECRET, Duration::from_millis(50));

        // Accept TCP but never answer the handshake; hold the sockets open so
        // only the stalled-attempt check can trigger a new dial.
        let mut held = Vec::new();
        timeout(WAIT, async {
            while held.len() < 3 {
                let (stream, _) = listener.accept().await.expect("accept");
                held.push(stream);
            }
        })
        .await
        .expect("fresh attempts");

        assert!(!connector.is_connected());
        connector.disconnect();
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (listener, url) = server().await;
        let connector = ConnectorEndpoint::connect(url, SECRET);
        let _ws = accept(&listener).await;
        wait_connected(&connector).await;

        connector.disconnect();
        connector.disconnect();

        assert!(!connector.is_connected());
    }
}
