//! Listening side of the bridge.
//!
//! The tool server binds a local WebSocket server and waits for the browser
//! extension to dial in.
//!
//! # Connection Flow
//!
//! 1. Probe the candidate ports and bind the first free one
//! 2. Accept loop waits for the extension to connect
//! 3. Each accepted peer supersedes the previous one
//! 4. Commands go out signed; resources and errors come back and settle
//!    pending requests through the [`CorrelationRegistry`]
//!
//! # Inbound Policy
//!
//! | Frame | Action |
//! |-------|--------|
//! | malformed JSON | logged, dropped |
//! | bare `{correlationId, errorMessage}` | rejects the pending request |
//! | signed, bad signature | logged, dropped (nothing is sent back) |
//! | signed resource | resolves the pending request |
//! | signed error | rejects the pending request |
//! | signed command | forwarded to the request handler, if any |

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::dispatcher::ResourceSink;
use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;
use crate::protocol::{
    Command, CommandRequest, ErrorMessage, InboundFrame, Payload, Resource, ResourceMessage,
    SignedEnvelope,
};

use super::connection::{CloseHandler, Connection, ConnectionId, FrameHandler};
use super::port::select_port;
use super::registry::{CorrelationRegistry, DEFAULT_RESPONSE_TIMEOUT};

// ============================================================================
// Constants
// ============================================================================

/// Default bind address (localhost).
pub const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// How often the accept loop re-checks the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Types
// ============================================================================

/// Callback for verified commands arriving at the listener.
pub type RequestHandler = Arc<dyn Fn(CommandRequest) + Send + Sync>;

// ============================================================================
// ListenerEndpoint
// ============================================================================

/// WebSocket server holding at most one live peer.
///
/// # Example
///
/// ```ignore
/// let endpoint = ListenerEndpoint::bind(DEFAULT_BIND_IP, &[8089, 8090], "secret").await?;
/// endpoint.spawn_signal_handlers();
///
/// let tabs = endpoint.request(Command::GetTabList).await?;
/// ```
pub struct ListenerEndpoint {
    /// Bound address.
    addr: SocketAddr,

    /// Shared secret used to sign and verify frames.
    secret: RwLock<String>,

    /// Requests awaiting a response.
    registry: CorrelationRegistry,

    /// The current peer, if any.
    peer: RwLock<Option<Connection>>,

    /// Handler for inbound commands.
    request_handler: RwLock<Option<RequestHandler>>,

    /// Bound on waiting for each response.
    response_timeout: Duration,

    /// Accept loop task.
    accept_task: Mutex<Option<AbortHandle>>,

    /// Shutdown flag.
    shutdown: AtomicBool,
}

// ============================================================================
// ListenerEndpoint - Constructor
// ============================================================================

impl ListenerEndpoint {
    /// Binds to the first free port in `ports` and starts accepting.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `ports` is empty
    /// - [`Error::PortsUnavailable`] if every port is taken
    /// - [`Error::Io`] if binding the selected port fails
    pub async fn bind(ip: IpAddr, ports: &[u16], secret: impl Into<String>) -> Result<Arc<Self>> {
        Self::bind_with_timeout(ip, ports, secret, DEFAULT_RESPONSE_TIMEOUT).await
    }

    /// Like [`ListenerEndpoint::bind`] with a custom response bound.
    ///
    /// # Errors
    ///
    /// Same as [`ListenerEndpoint::bind`].
    pub async fn bind_with_timeout(
        ip: IpAddr,
        ports: &[u16],
        secret: impl Into<String>,
        response_timeout: Duration,
    ) -> Result<Arc<Self>> {
        if ports.is_empty() {
            return Err(Error::config("No candidate ports configured"));
        }

        let port = select_port(ip, ports).await?;
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let addr = listener.local_addr()?;

        let endpoint = Arc::new(Self {
            addr,
            secret: RwLock::new(secret.into()),
            registry: CorrelationRegistry::new(),
            peer: RwLock::new(None),
            request_handler: RwLock::new(None),
            response_timeout,
            accept_task: Mutex::new(None),
            shutdown: AtomicBool::new(false),
        });

        let task = tokio::spawn(Self::accept_loop(Arc::downgrade(&endpoint), listener));
        *endpoint.accept_task.lock() = Some(task.abort_handle());

        info!(port = addr.port(), ip = %addr.ip(), "Listener started");

        Ok(endpoint)
    }
}

// ============================================================================
// ListenerEndpoint - Public API
// ============================================================================

impl ListenerEndpoint {
    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the WebSocket URL peers should dial.
    ///
    /// Format: `ws://{ip}:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Returns `true` if a peer is connected and open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.current_peer().is_some()
    }

    /// Returns the correlation registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &CorrelationRegistry {
        &self.registry
    }

    /// Returns the response bound used by [`ListenerEndpoint::request`].
    #[inline]
    #[must_use]
    pub const fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Replaces the shared secret.
    pub fn set_secret(&self, secret: impl Into<String>) {
        *self.secret.write() = secret.into();
        debug!("Listener secret updated");
    }

    /// Sets the handler for verified inbound commands.
    pub fn set_request_handler(&self, handler: RequestHandler) {
        *self.request_handler.write() = Some(handler);
    }

    /// Clears the inbound command handler.
    pub fn clear_request_handler(&self) {
        *self.request_handler.write() = None;
    }

    /// Sends an already sealed envelope to the current peer.
    ///
    /// Without an open peer this logs and does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the envelope cannot be serialized.
    pub fn send(&self, envelope: &SignedEnvelope) -> Result<()> {
        let Some(peer) = self.current_peer() else {
            warn!(port = self.port(), "WebSocket is not open, frame not sent");
            return Ok(());
        };

        if let Err(e) = peer.send_text(envelope.to_frame()?) {
            warn!(connection = %peer.id(), error = %e, "Failed to queue frame");
        }
        Ok(())
    }

    /// Sends `command` and waits for its correlated resource.
    ///
    /// # Errors
    ///
    /// See [`ListenerEndpoint::request_with_timeout`].
    pub async fn request(&self, command: Command) -> Result<Resource> {
        self.request_with_timeout(command, self.response_timeout)
            .await
    }

    /// Sends `command` and waits at most `response_timeout` for its resource.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no peer is connected
    /// - [`Error::ResponseTimeout`] if no response arrived in time
    /// - [`Error::Remote`] if the peer answered with an error
    /// - [`Error::ConnectionClosed`] if the endpoint shut down meanwhile
    pub async fn request_with_timeout(
        &self,
        command: Command,
        response_timeout: Duration,
    ) -> Result<Resource> {
        let peer = self.current_peer().ok_or(Error::NotConnected)?;

        let request = CommandRequest::new(command);
        let correlation_id = request.correlation_id.clone();
        let pending = self.registry.register(
            correlation_id.clone(),
            request.command.expected_resource(),
            response_timeout,
        )?;

        let secret = self.secret.read().clone();
        let sent = SignedEnvelope::seal(&request, &secret)
            .and_then(|envelope| envelope.to_frame())
            .and_then(|frame| peer.send_text(frame));

        if let Err(e) = sent {
            self.registry.fail(&correlation_id, e);
        } else {
            debug!(
                correlation_id = %correlation_id,
                cmd = request.command.name(),
                "Command sent"
            );
        }

        Ok(pending.wait().await?.resource)
    }

    /// Fails pending requests, closes the peer and releases the port.
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
        }

        if let Some(peer) = self.peer.write().take() {
            peer.shutdown();
        }

        self.registry.fail_all();

        info!(port = self.port(), "Listener shut down");
    }

    /// Returns `true` once [`ListenerEndpoint::shutdown`] has run.
    #[inline]
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Shuts the endpoint down on Ctrl+C or SIGTERM.
    pub fn spawn_signal_handlers(self: &Arc<Self>) {
        let endpoint = Arc::downgrade(self);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C; shutting down listener");
                if let Some(endpoint) = endpoint.upgrade() {
                    endpoint.shutdown();
                }
            }
        });

        #[cfg(unix)]
        {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    return;
                }
            };

            let endpoint = Arc::downgrade(self);
            tokio::spawn(async move {
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM; shutting down listener");
                    if let Some(endpoint) = endpoint.upgrade() {
                        endpoint.shutdown();
                    }
                }
            });
        }
    }
}

// ============================================================================
// ListenerEndpoint - Internal
// ============================================================================

impl ListenerEndpoint {
    fn current_peer(&self) -> Option<Connection> {
        self.peer
            .read()
            .as_ref()
            .filter(|peer| peer.is_open())
            .cloned()
    }

    /// Accepts connections until shutdown or until the endpoint is dropped.
    async fn accept_loop(endpoint: Weak<Self>, listener: TcpListener) {
        loop {
            match endpoint.upgrade() {
                Some(ep) if !ep.is_shutdown() => {}
                _ => break,
            }

            let (stream, peer_addr) = match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await
            {
                Ok(Ok(accepted)) => accepted,
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                    continue;
                }
                Err(_) => continue,
            };

            debug!(?peer_addr, "TCP connection accepted");

            let endpoint = Weak::clone(&endpoint);
            tokio::spawn(async move {
                Self::upgrade_connection(endpoint, stream).await;
            });
        }

        debug!("Accept loop terminated");
    }

    async fn upgrade_connection(endpoint: Weak<Self>, stream: TcpStream) {
        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(error = %e, "WebSocket upgrade failed");
                return;
            }
        };

        let Some(ep) = endpoint.upgrade() else {
            return;
        };
        if ep.is_shutdown() {
            return;
        }

        let frames = Weak::clone(&endpoint);
        let on_frame: FrameHandler = Arc::new(move |text| {
            if let Some(ep) = frames.upgrade() {
                ep.handle_frame(text);
            }
        });

        let closes = Weak::clone(&endpoint);
        let on_close: CloseHandler = Box::new(move |id| {
            if let Some(ep) = closes.upgrade() {
                ep.clear_peer(id);
            }
        });

        let connection = Connection::spawn(ws_stream, on_frame, on_close);
        let id = connection.id();

        let previous = ep.peer.write().replace(connection);
        if let Some(previous) = previous {
            info!(old = %previous.id(), new = %id, "Peer superseded");
            previous.shutdown();
        }

        info!(connection = %id, port = ep.port(), "Peer connected");
    }

    fn clear_peer(&self, id: ConnectionId) {
        let mut peer = self.peer.write();
        if peer.as_ref().is_some_and(|current| current.id() == id) {
            *peer = None;
            info!(connection = %id, "Peer disconnected");
        }
    }

    fn handle_frame(&self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        let envelope = match frame {
            InboundFrame::UnsignedError(error) => {
                self.registry
                    .reject(&error.correlation_id, &error.error_message);
                return;
            }
            InboundFrame::Signed(envelope) => envelope,
        };

        let secret = self.secret.read().clone();
        let payload = match envelope.open(&secret) {
            Ok(payload) => payload,
            Err(Error::InvalidSignature) => {
                warn!(
                    correlation_id = ?envelope.correlation_id(),
                    "Invalid message signature, dropping frame"
                );
                return;
            }
            Err(e) => {
                warn!(error = %e, "Dropping undecodable payload");
                return;
            }
        };

        match payload {
            Payload::Resource(message) => {
                self.registry.resolve(message);
            }
            Payload::Error(error) => {
                self.registry
                    .reject(&error.correlation_id, &error.error_message);
            }
            Payload::Command(request) => {
                let handler = self.request_handler.read().clone();
                match handler {
                    Some(handler) => handler(request),
                    None => warn!(
                        correlation_id = %request.correlation_id,
                        cmd = request.command.name(),
                        "No request handler, dropping command"
                    ),
                }
            }
        }
    }
}

// ============================================================================
// ResourceSink
// ============================================================================

impl ResourceSink for ListenerEndpoint {
    fn send_resource(&self, message: ResourceMessage) -> Result<()> {
        let secret = self.secret.read().clone();
        self.send(&SignedEnvelope::seal(&message, &secret)?)
    }

    fn send_error(&self, correlation_id: CorrelationId, message: &str) -> Result<()> {
        let secret = self.secret.read().clone();
        let error = ErrorMessage::new(correlation_id, message);
        self.send(&SignedEnvelope::seal(&error, &secret)?)
    }
}

impl Drop for ListenerEndpoint {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================
