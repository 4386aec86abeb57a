//! Correlation of outbound requests with their responses.
//!
//! Every command sent by the issuing side registers a pending request keyed
//! by its correlation id. The entry is settled by exactly one of:
//!
//! - a resource message of the expected kind ([`CorrelationRegistry::resolve`])
//! - an error message ([`CorrelationRegistry::reject`])
//! - its expiry timer firing
//! - registry shutdown ([`CorrelationRegistry::fail_all`])
//!
//! Whatever comes first removes the entry; anything arriving for that id
//! afterwards is logged and ignored.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;
use crate::protocol::{ResourceKind, ResourceMessage};

use super::expiring::{ExpiringMap, ExpiryHook};

// ============================================================================
// Constants
// ============================================================================

/// Default bound on waiting for a correlated response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Maximum pending requests before rejecting new ones.
pub const MAX_PENDING_REQUESTS: usize = 100;

// ============================================================================
// Types
// ============================================================================

type Responder = oneshot::Sender<Result<ResourceMessage>>;

/// A request awaiting its response.
struct PendingRequest {
    expected: ResourceKind,
    responder: Responder,
    timeout_ms: u64,
}

// ============================================================================
// PendingResponse
// ============================================================================

/// Handle to the eventual outcome of a registered request.
#[derive(Debug)]
pub struct PendingResponse {
    correlation_id: CorrelationId,
    rx: oneshot::Receiver<Result<ResourceMessage>>,
}

impl PendingResponse {
    /// Returns the correlation id this handle waits on.
    #[inline]
    #[must_use]
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Waits for the request to settle.
    ///
    /// # Errors
    ///
    /// - [`Error::ResponseTimeout`] if the bound elapsed first
    /// - [`Error::Remote`] if the peer answered with an error message
    /// - [`Error::ConnectionClosed`] if the registry was shut down
    pub async fn wait(self) -> Result<ResourceMessage> {
        self.rx.await?
    }
}

// ============================================================================
// CorrelationRegistry
// ============================================================================

/// Pending requests keyed by correlation id.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct CorrelationRegistry {
    pending: ExpiringMap<CorrelationId, PendingRequest>,
}

impl Default for CorrelationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let on_expire: ExpiryHook<CorrelationId, PendingRequest> =
            Arc::new(|correlation_id, pending| {
                debug!(
                    correlation_id = %correlation_id,
                    expected = %pending.expected,
                    timeout_ms = pending.timeout_ms,
                    "Request timed out"
                );
                let timeout_ms = pending.timeout_ms;
                let _ = pending
                    .responder
                    .send(Err(Error::response_timeout(correlation_id, timeout_ms)));
            });

        Self {
            pending: ExpiringMap::with_expiry_hook(DEFAULT_RESPONSE_TIMEOUT, on_expire),
        }
    }

    /// Registers a pending request.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if [`MAX_PENDING_REQUESTS`] are already pending
    /// - [`Error::DuplicateCorrelation`] if `correlation_id` is already pending;
    ///   the existing entry is left untouched
    pub fn register(
        &self,
        correlation_id: CorrelationId,
        expected: ResourceKind,
        timeout: Duration,
    ) -> Result<PendingResponse> {
        let pending = self.pending.len();
        if pending >= MAX_PENDING_REQUESTS {
            warn!(pending, max = MAX_PENDING_REQUESTS, "Too many pending requests");
            return Err(Error::protocol(format!(
                "Too many pending requests: {pending}/{MAX_PENDING_REQUESTS}"
            )));
        }

        let (responder, rx) = oneshot::channel();
        let request = PendingRequest {
            expected,
            responder,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        };

        if self
            .pending
            .try_insert_with_ttl(correlation_id.clone(), request, timeout)
            .is_err()
        {
            return Err(Error::DuplicateCorrelation { correlation_id });
        }

        trace!(correlation_id = %correlation_id, %expected, "Request registered");

        Ok(PendingResponse { correlation_id, rx })
    }

    /// Settles a pending request with its resource.
    ///
    /// A resource whose kind differs from the expected one is logged and
    /// dropped; the request stays pending. Returns `true` if a request was
    /// settled.
    pub fn resolve(&self, message: ResourceMessage) -> bool {
        let kind = message.kind();
        let mut mismatch = None;

        let taken = self.pending.take_if(&message.correlation_id, |pending| {
            if pending.expected == kind {
                true
            } else {
                mismatch = Some(pending.expected);
                false
            }
        });

        match (taken, mismatch) {
            (Some(pending), _) => {
                trace!(correlation_id = %message.correlation_id, %kind, "Request resolved");
                let _ = pending.responder.send(Ok(message));
                true
            }
            (None, Some(expected)) => {
                error!(
                    correlation_id = %message.correlation_id,
                    %expected,
                    received = %kind,
                    "Resource kind mismatch, dropping response"
                );
                false
            }
            (None, None) => {
                warn!(
                    correlation_id = %message.correlation_id,
                    %kind,
                    "Response for unknown or expired request"
                );
                false
            }
        }
    }

    /// Settles a pending request with the peer's error text.
    ///
    /// Returns `true` if a request was settled.
    pub fn reject(&self, correlation_id: &CorrelationId, message: &str) -> bool {
        let Some(pending) = self.pending.take(correlation_id) else {
            warn!(correlation_id = %correlation_id, "Error for unknown or expired request");
            return false;
        };

        debug!(correlation_id = %correlation_id, error = message, "Request rejected by peer");
        let _ = pending
            .responder
            .send(Err(Error::remote(correlation_id.clone(), message)));
        true
    }

    /// Settles a pending request with a local error.
    ///
    /// Used when the request could not be sent at all.
    pub fn fail(&self, correlation_id: &CorrelationId, err: Error) -> bool {
        let Some(pending) = self.pending.take(correlation_id) else {
            return false;
        };

        let _ = pending.responder.send(Err(err));
        true
    }

    /// Fails every pending request with [`Error::ConnectionClosed`].
    pub fn fail_all(&self) {
        let drained = self.pending.drain();
        let count = drained.len();

        for (_, pending) in drained {
            let _ = pending.responder.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on shutdown");
        }
    }

    /// Returns `true` if `correlation_id` is pending.
    #[inline]
    #[must_use]
    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains_key(correlation_id)
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identifiers::TabId;
    use crate::protocol::Resource;

    const TIMEOUT: Duration = Duration::from_millis(1000);

    fn id(s: &str) -> CorrelationId {
        CorrelationId::from(s)
    }

    fn opened(correlation_id: &str, tab: u32) -> ResourceMessage {
        ResourceMessage::new(
            id(correlation_id),
            Resource::OpenedTabId {
                tab_id: Some(TabId::new(tab)),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_delivers_resource() {
        let registry = CorrelationRegistry::new();
        let pending = registry
            .register(id("a"), ResourceKind::OpenedTabId, TIMEOUT)
            .expect("register");

        assert!(registry.resolve(opened("a", 7)));
        assert_eq!(pending.wait().await.expect("resolved"), opened("a", 7));
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reject_delivers_remote_error() {
        let registry = CorrelationRegistry::new();
        let pending = registry
            .register(id("a"), ResourceKind::Tabs, TIMEOUT)
            .expect("register");

        assert!(registry.reject(&id("a"), "Invalid URL"));

        let err = pending.wait().await.unwrap_err();
        assert!(matches!(err, Error::Remote { .. }));
        assert_eq!(err.to_string(), "Invalid URL");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_response_is_ignored() {
        let registry = CorrelationRegistry::new();
        let pending = registry
            .register(id("a"), ResourceKind::OpenedTabId, TIMEOUT)
            .expect("register");

        tokio::time::sleep(TIMEOUT + Duration::from_millis(1)).await;

        let err = pending.wait().await.unwrap_err();
        assert!(err.is_timeout());

        assert!(!registry.resolve(opened("a", 1)));
        assert!(!registry.reject(&id("a"), "late"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_ids_are_noops() {
        let registry = CorrelationRegistry::new();
        assert!(!registry.resolve(opened("ghost", 1)));
        assert!(!registry.reject(&id("ghost"), "x"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_kind_mismatch_keeps_request_pending() {
        let registry = CorrelationRegistry::new();
        let pending = registry
            .register(id("a"), ResourceKind::Tabs, TIMEOUT)
            .expect("register");

        assert!(!registry.resolve(opened("a", 1)));
        assert!(registry.is_pending(&id("a")));

        let tabs = ResourceMessage::new(id("a"), Resource::Tabs { tabs: vec![] });
        assert!(registry.resolve(tabs.clone()));
        assert_eq!(pending.wait().await.expect("resolved"), tabs);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_registration_leaves_first_intact() {
        let registry = CorrelationRegistry::new();
        let first = registry
            .register(id("a"), ResourceKind::OpenedTabId, TIMEOUT)
            .expect("register");

        let err = registry
            .register(id("a"), ResourceKind::Tabs, TIMEOUT)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateCorrelation { .. }));

        assert!(registry.resolve(opened("a", 3)));
        assert_eq!(first.wait().await.expect("resolved"), opened("a", 3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_ids_do_not_interfere() {
        let registry = CorrelationRegistry::new();
        let a = registry
            .register(id("a"), ResourceKind::OpenedTabId, TIMEOUT)
            .expect("register");
        let b = registry
            .register(id("b"), ResourceKind::OpenedTabId, TIMEOUT)
            .expect("register");

        assert!(registry.resolve(opened("b", 2)));
        assert!(registry.resolve(opened("a", 1)));

        assert_eq!(a.wait().await.expect("a"), opened("a", 1));
        assert_eq!(b.wait().await.expect("b"), opened("b", 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_limit() {
        let registry = CorrelationRegistry::new();
        let _handles: Vec<_> = (0..MAX_PENDING_REQUESTS)
            .map(|i| {
                registry
                    .register(id(&i.to_string()), ResourceKind::Tabs, TIMEOUT)
                    .expect("register")
            })
            .collect();

        let err = registry
            .register(id("overflow"), ResourceKind::Tabs, TIMEOUT)
            .unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_all_closes_waiters() {
        let registry = CorrelationRegistry::new();
        let pending = registry
            .register(id("a"), ResourceKind::Tabs, TIMEOUT)
            .expect("register");

        registry.fail_all();

        assert!(matches!(pending.wait().await, Err(Error::ConnectionClosed)));
        assert_eq!(registry.pending_count(), 0);
    }
}
