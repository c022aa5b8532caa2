//! Usage service facade
//!
//! The boundary the surrounding UI layer talks to: a synchronous read
//! of the current usage state, the optimistic-decrement trigger, the
//! account display projection, and the conversation-reset side
//! channel. Owns the store, the running sync controller, and the
//! conversation cache.

use std::sync::Arc;

use tokio::sync::watch;

use super::controller::{ControllerStatus, SyncController, SyncHandle};
use super::provider::{ProfileReader, QuotaChannel, SessionProbe};
use super::store::UsageStateStore;
use super::types::{AccountView, UsageState};
use crate::services::conversation::ConversationCache;

/// Running usage-sync facade.
pub struct UsageService {
    store: UsageStateStore,
    handle: SyncHandle,
    conversation: ConversationCache,
}

impl UsageService {
    /// Create the store, spawn the controller against the given
    /// backend collaborators, and return the facade.
    pub fn start(
        probe: Arc<dyn SessionProbe>,
        reader: Arc<dyn ProfileReader>,
        channel: Arc<dyn QuotaChannel>,
    ) -> Self {
        let store = UsageStateStore::new();
        let controller = SyncController::new(probe, reader, channel, store.clone());
        Self {
            handle: controller.spawn(),
            store,
            conversation: ConversationCache::new(),
        }
    }

    /// Current usage state, read synchronously.
    pub fn usage(&self) -> UsageState {
        self.store.get()
    }

    /// Subscribe to usage-state replacements.
    pub fn subscribe(&self) -> watch::Receiver<UsageState> {
        self.store.subscribe()
    }

    /// Optimistic-decrement trigger, invoked immediately before the
    /// caller expects the server to register one unit of consumption.
    pub fn consume_credit(&self) {
        self.store.optimistic_decrement();
    }

    /// Display projection of the current identity, if any.
    pub fn account(&self) -> Option<AccountView> {
        self.handle.account()
    }

    /// Controller status snapshot (phase + identity).
    pub fn status(&self) -> ControllerStatus {
        self.handle.status()
    }

    /// The locally cached conversation transcript.
    pub fn conversation(&self) -> &ConversationCache {
        &self.conversation
    }

    /// Clear the cached conversation and bump its epoch ("New Chat").
    /// Not part of usage synchronization.
    pub fn reset_conversation(&self) {
        self.conversation.reset();
    }

    /// Tear down: close any open channel and stop the controller.
    pub async fn stop(self) {
        self.handle.stop().await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::usage::provider::{BackendError, Subscription, SUBSCRIPTION_BUFFER};
    use crate::services::usage::types::{Identity, QuotaRecord, SessionEvent};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::{broadcast, mpsc, oneshot};

    /// Minimal backend: one fixed user with a fixed quota.
    struct StaticBackend {
        sessions: broadcast::Sender<SessionEvent>,
    }

    impl StaticBackend {
        fn new() -> Arc<Self> {
            let (sessions, _) = broadcast::channel(4);
            Arc::new(Self { sessions })
        }
    }

    #[async_trait]
    impl SessionProbe for StaticBackend {
        async fn resolve(&self) -> Result<Option<Identity>, BackendError> {
            Ok(Some(Identity::new("u1", "u1@example.com")))
        }

        fn subscribe_sessions(&self) -> broadcast::Receiver<SessionEvent> {
            self.sessions.subscribe()
        }
    }

    #[async_trait]
    impl ProfileReader for StaticBackend {
        async fn read_quota(&self, _identity: &Identity) -> Result<QuotaRecord, BackendError> {
            Ok(QuotaRecord { left: 5, limit: 20 })
        }
    }

    #[async_trait]
    impl QuotaChannel for StaticBackend {
        async fn open(&self, _identity: &Identity) -> Result<Subscription, BackendError> {
            let (_event_tx, event_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
            let (close_tx, _close_rx) = oneshot::channel();
            // Leak the sender so the channel stays open but silent
            std::mem::forget(_event_tx);
            Ok(Subscription::new(event_rx, close_tx))
        }
    }

    async fn wait_known(service: &UsageService) {
        let mut rx = service.subscribe();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !service.usage().is_known() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .expect("service never reached a known state");
    }

    #[tokio::test]
    async fn test_service_exposes_usage_and_account() {
        let backend = StaticBackend::new();
        let service = UsageService::start(backend.clone(), backend.clone(), backend.clone());
        wait_known(&service).await;

        assert_eq!(service.usage(), UsageState::Known { left: 5, limit: 20 });
        let account = service.account().unwrap();
        assert_eq!(account.email, "u1@example.com");
        assert_eq!(account.plan, Some("free".to_string()));

        service.consume_credit();
        assert_eq!(service.usage(), UsageState::Known { left: 4, limit: 20 });

        service.stop().await;
    }

    #[tokio::test]
    async fn test_reset_conversation_side_channel() {
        let backend = StaticBackend::new();
        let service = UsageService::start(backend.clone(), backend.clone(), backend.clone());

        service.conversation().push_message("hi");
        service.reset_conversation();
        assert!(service.conversation().messages().is_empty());
        assert_eq!(service.conversation().epoch(), 1);

        // Resetting the conversation does not touch usage sync
        wait_known(&service).await;
        assert!(service.usage().is_known());

        service.stop().await;
    }
}
