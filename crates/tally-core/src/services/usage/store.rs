//! Usage state store
//!
//! The single shared `UsageState` value that every consumer reads.
//! Backed by a `tokio::sync::watch` channel: reads are synchronous,
//! every setter replaces the projection atomically, and subscribers
//! observe each replacement in order.
//!
//! Only the sync controller and the optimistic-decrement trigger write
//! here; everything else holds a receiver.

use tokio::sync::watch;

use super::types::{QuotaRecord, UsageState};

/// Shared usage-state cell.
///
/// Cloning the store clones the sender side; all clones point at the
/// same value.
#[derive(Clone)]
pub struct UsageStateStore {
    tx: watch::Sender<UsageState>,
}

impl UsageStateStore {
    /// Create a store in the `Unknown` state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(UsageState::Unknown);
        Self { tx }
    }

    /// Current value, read synchronously.
    pub fn get(&self) -> UsageState {
        *self.tx.borrow()
    }

    /// Subscribe to state replacements.
    pub fn subscribe(&self) -> watch::Receiver<UsageState> {
        self.tx.subscribe()
    }

    /// Not yet resolved, or the profile read failed.
    pub fn set_unknown(&self) {
        self.tx.send_replace(UsageState::Unknown);
    }

    /// Explicitly no session.
    pub fn set_unauthenticated(&self) {
        self.tx.send_replace(UsageState::Unauthenticated);
    }

    /// Replace the projection with a known value, clamped to >= 0.
    pub fn set_known(&self, left: i64, limit: i64) {
        let record = QuotaRecord::clamped(left, limit);
        self.apply(&record);
    }

    /// Replace the projection with a server record.
    pub fn apply(&self, record: &QuotaRecord) {
        self.tx.send_replace(UsageState::Known {
            left: record.left,
            limit: record.limit,
        });
    }

    /// Local, client-only consumption hint applied ahead of server
    /// confirmation. Subtracts 1 from `left`, floored at 0, when the
    /// state is `Known`; otherwise a no-op (there is nothing to
    /// decrement against - no queueing, no retry). The next push event
    /// or fresh read overwrites it with the server's true value.
    pub fn optimistic_decrement(&self) {
        self.tx.send_modify(|state| {
            if let UsageState::Known { left, .. } = state {
                *left = left.saturating_sub(1);
            }
        });
    }
}

impl Default for UsageStateStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
