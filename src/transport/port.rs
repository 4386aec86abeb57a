//! Port availability probing and selection.
//!
//! The listening side picks the first free port from an ordered candidate
//! list. An explicitly configured preferred port is tried first.

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Port used when nothing else is configured.
pub const DEFAULT_PORT: u16 = 8089;

// ============================================================================
// Functions
// ============================================================================

/// Returns `true` if `port` is already bound on `ip`.
///
/// Only an "address in use" failure counts as taken. Other bind errors are
/// logged and reported as free, so the real bind surfaces them.
pub async fn is_port_in_use(ip: IpAddr, port: u16) -> bool {
    match TcpListener::bind(SocketAddr::new(ip, port)).await {
        Ok(listener) => {
            drop(listener);
            false
        }
        Err(e) if e.kind() == ErrorKind::AddrInUse => true,
        Err(e) => {
            warn!(port, error = %e, "Port probe failed");
            false
        }
    }
}

/// Builds the probe order from a preferred port and a candidate list.
///
/// Duplicates are removed keeping first occurrence. The preferred port
/// goes first unless it already appears in `candidates`. With neither,
/// the order is `[DEFAULT_PORT]`.
#[must_use]
pub fn candidate_order(preferred: Option<u16>, candidates: &[u16]) -> Vec<u16> {
    let mut order = Vec::with_capacity(candidates.len() + 1);

    if let Some(port) = preferred
        && !candidates.contains(&port)
    {
        order.push(port);
    }

    for &port in candidates {
        if !order.contains(&port) {
            order.push(port);
        }
    }

    if order.is_empty() {
        order.push(preferred.unwrap_or(DEFAULT_PORT));
    }

    order
}

/// Probes `ports` in order and returns the first free one.
///
/// # Errors
///
/// Returns [`Error::PortsUnavailable`] listing every probed port if none
/// is free.
pub async fn select_port(ip: IpAddr, ports: &[u16]) -> Result<u16> {
    for &port in ports {
        if is_port_in_use(ip, port).await {
            debug!(port, "Candidate port in use");
            continue;
        }

        debug!(port, "Selected port");
        return Ok(port);
    }

    Err(Error::PortsUnavailable {
        ports: ports.to_vec(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn test_candidate_order_default() {
        assert_eq!(candidate_order(None, &[]), vec![DEFAULT_PORT]);
    }

    #[test]
    fn test_candidate_order_preferred_first() {
        assert_eq!(candidate_order(Some(9000), &[8089, 8090]), vec![9000, 8089, 8090]);
    }

    #[test]
    fn test_candidate_order_preferred_already_listed() {
        assert_eq!(candidate_order(Some(8090), &[8089, 8090]), vec![8089, 8090]);
    }

    #[test]
    fn test_candidate_order_dedupes() {
        assert_eq!(candidate_order(None, &[8089, 8090, 8089]), vec![8089, 8090]);
    }

    #[tokio::test]
    async fn test_busy_port_is_skipped() {
        let busy = TcpListener::bind((LOCALHOST, 0)).await.expect("bind");
        let busy_port = busy.local_addr().expect("addr").port();

        let free = TcpListener::bind((LOCALHOST, 0)).await.expect("bind");
        let free_port = free.local_addr().expect("addr").port();
        drop(free);

        assert!(is_port_in_use(LOCALHOST, busy_port).await);

        let selected = select_port(LOCALHOST, &[busy_port, free_port])
            .await
            .expect("select");
        assert_eq!(selected, free_port);
    }

    #[tokio::test]
    async fn test_all_busy_reports_ports() {
        let busy = TcpListener::bind((LOCALHOST, 0)).await.expect("bind");
        let port = busy.local_addr().expect("addr").port();

        let err = select_port(LOCALHOST, &[port]).await.unwrap_err();
        assert!(matches!(err, Error::PortsUnavailable { ref ports } if ports == &[port]));
        assert!(err.to_string().contains(&port.to_string()));
    }
}
