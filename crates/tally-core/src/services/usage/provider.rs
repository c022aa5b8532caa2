//! Backend seam for usage synchronization
//!
//! Defines the three capabilities the sync controller requires from a
//! backend, each as its own trait so tests can fake them independently:
//!
//! 1. [`SessionProbe`] - resolve the current identity, plus a
//!    session-change notification stream
//! 2. [`ProfileReader`] - point read of the quota record by identity
//! 3. [`QuotaChannel`] - live subscription delivering quota changes
//!    for one identity
//!
//! All three fail soft at the controller: an error here degrades the
//! projection to one of the `UsageState` variants and is never surfaced
//! to the UI boundary.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::types::{Identity, QuotaRecord, SessionEvent};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur at the backend boundary
#[derive(Error, Debug)]
pub enum BackendError {
    /// Could not determine whether a session exists; treated as no
    /// session by the controller
    #[error("identity resolution failed: {0}")]
    IdentityResolution(String),

    /// Quota record could not be read (missing row, permission denial,
    /// schema mismatch); treated as unknown state
    #[error("profile read failed: {0}")]
    ProfileRead(String),

    /// Subscription never opened or stopped delivering; the last value
    /// stays visible until the next rebind
    #[error("channel failed: {0}")]
    Channel(String),

    /// Network request failed
    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Network("request timed out".to_string())
        } else if err.is_connect() {
            BackendError::Network("connection failed".to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::ProfileRead(format!("malformed response: {}", err))
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Capacity of the push-event buffer per subscription
pub const SUBSCRIPTION_BUFFER: usize = 16;

/// One open quota channel bound to exactly one identity.
///
/// Owned exclusively by the sync controller; at most one is live per
/// controller at any time. `close` is idempotent, and once it returns
/// `recv` yields no further events (buffered or otherwise). Dropping a
/// subscription closes it.
pub struct Subscription {
    events: mpsc::Receiver<QuotaRecord>,
    close_tx: Option<oneshot::Sender<()>>,
    closed: bool,
}

impl Subscription {
    /// Wire up a subscription from its event receiver and close signal.
    ///
    /// The producer side must stop delivering when `close_tx` fires or
    /// when the event sender is dropped.
    pub fn new(events: mpsc::Receiver<QuotaRecord>, close_tx: oneshot::Sender<()>) -> Self {
        Self {
            events,
            close_tx: Some(close_tx),
            closed: false,
        }
    }

    /// Receive the next push event in delivery order.
    ///
    /// Returns `None` after `close`, or when the producer stops (channel
    /// failure - no distinct observable state).
    pub async fn recv(&mut self) -> Option<QuotaRecord> {
        if self.closed {
            return None;
        }
        self.events.recv().await
    }

    /// Close the subscription. Idempotent; no events are delivered
    /// after this returns.
    pub fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
        self.events.close();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Backend Traits
// ============================================================================

/// Resolves the current authenticated identity on demand.
#[async_trait]
pub trait SessionProbe: Send + Sync {
    /// Resolve the current identity. `Ok(None)` means no session; the
    /// controller treats `Err` exactly the same way.
    async fn resolve(&self) -> Result<Option<Identity>, BackendError>;

    /// Subscribe to "session possibly changed" notifications (sign-in,
    /// sign-out, token refresh). Delivery order only.
    fn subscribe_sessions(&self) -> broadcast::Receiver<SessionEvent>;
}

/// Point-in-time read of a user's profile row.
#[async_trait]
pub trait ProfileReader: Send + Sync {
    /// Read the quota record for the given identity. Missing numeric
    /// fields default to 0 and values are clamped before they reach
    /// the store.
    async fn read_quota(&self, identity: &Identity) -> Result<QuotaRecord, BackendError>;

    /// Read the plan label for the given identity, if the backend
    /// exposes one.
    async fn read_plan(&self, identity: &Identity) -> Result<Option<String>, BackendError> {
        let _ = identity;
        Ok(None)
    }
}

/// Opens a live subscription scoped to one identity's quota record.
#[async_trait]
pub trait QuotaChannel: Send + Sync {
    /// Open a subscription delivering full-record snapshots on each
    /// change, in server-delivery order. The controller never calls
    /// this without an identity.
    async fn open(&self, identity: &Identity) -> Result<Subscription, BackendError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_subscription() -> (mpsc::Sender<QuotaRecord>, oneshot::Receiver<()>, Subscription) {
        let (event_tx, event_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (close_tx, close_rx) = oneshot::channel();
        (event_tx, close_rx, Subscription::new(event_rx, close_tx))
    }

    #[tokio::test]
    async fn test_subscription_delivers_events_in_order() {
        let (tx, _close_rx, mut sub) = make_subscription();
        tx.send(QuotaRecord { left: 5, limit: 20 }).await.unwrap();
        tx.send(QuotaRecord { left: 4, limit: 20 }).await.unwrap();

        assert_eq!(sub.recv().await, Some(QuotaRecord { left: 5, limit: 20 }));
        assert_eq!(sub.recv().await, Some(QuotaRecord { left: 4, limit: 20 }));
    }

    #[tokio::test]
    async fn test_subscription_close_is_idempotent() {
        let (_tx, _close_rx, mut sub) = make_subscription();
        sub.close();
        sub.close();
        assert!(sub.is_closed());
    }

    #[tokio::test]
    async fn test_subscription_no_events_after_close() {
        let (tx, _close_rx, mut sub) = make_subscription();
        // Buffered before close, must still not come out afterwards
        tx.send(QuotaRecord { left: 9, limit: 10 }).await.unwrap();
        sub.close();
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_subscription_close_signals_producer() {
        let (_tx, close_rx, mut sub) = make_subscription();
        sub.close();
        // Producer side observes the close request
        assert!(close_rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_subscription_recv_none_when_producer_gone() {
        let (tx, _close_rx, mut sub) = make_subscription();
        drop(tx);
        assert_eq!(sub.recv().await, None);
    }

    #[test]
    fn test_backend_error_display() {
        assert_eq!(
            BackendError::IdentityResolution("timeout".to_string()).to_string(),
            "identity resolution failed: timeout"
        );
        assert_eq!(
            BackendError::ProfileRead("row not found".to_string()).to_string(),
            "profile read failed: row not found"
        );
        assert_eq!(
            BackendError::Channel("socket dropped".to_string()).to_string(),
            "channel failed: socket dropped"
        );
    }

    #[test]
    fn test_backend_error_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: BackendError = json_err.into();
        assert!(matches!(err, BackendError::ProfileRead(_)));
    }
}
