//! Sync controller
//!
//! Orchestrates the usage-sync lifecycle: on start and on every
//! session-change notification it re-resolves the identity, re-reads
//! the profile, and re-opens the quota channel against the new
//! identity, tearing down the previous subscription first.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ SyncController task (single tokio::select! loop)         │
//! │                                                          │
//! │   stop signal ──────────────► teardown                   │
//! │   session event ────────────► rebind (close, resolve,    │
//! │                                read, open)               │
//! │   push event ───────────────► store.apply(record)        │
//! └──────────────────────────────────────────────────────────┘
//!              │                          │
//!              ▼                          ▼
//!   SessionProbe / ProfileReader    UsageStateStore
//!   / QuotaChannel (injected)       (watch channel)
//! ```
//!
//! The controller is the only component that mutates subscription
//! lifetime, and all of its store writes go through an active-flag
//! guard so results of in-flight resolve/read calls arriving after
//! `stop()` are dropped instead of applied.
//!
//! Phase machine: `Idle -> Resolving -> Bound -> (Rebinding ->
//! Bound)* -> TornDown`. Rebinds serialize inside the task, so the
//! final observable state always reflects the last resolution to
//! complete after the last notification (eventual consistency).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use super::provider::{ProfileReader, QuotaChannel, SessionProbe, Subscription};
use super::store::UsageStateStore;
use super::types::{AccountView, Identity, QuotaRecord};

/// Plan label assumed for an authenticated user whose profile row has
/// no plan column
const DEFAULT_PLAN: &str = "free";

// ============================================================================
// Controller Status
// ============================================================================

/// Lifecycle phase of the controller state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    /// Created, task not yet running
    Idle,
    /// First identity resolution in progress
    Resolving,
    /// Resolution cycle complete (with or without an open channel)
    Bound,
    /// Session change received, previous channel closed, re-resolving
    Rebinding,
    /// Stopped; terminal, the controller is not reused
    TornDown,
}

/// Introspectable controller state, published through a watch channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerStatus {
    pub phase: ControllerPhase,
    /// Identity of the current binding, if any
    pub identity: Option<Identity>,
    /// Display projection (email + plan) for the surrounding UI
    pub account: Option<AccountView>,
}

impl Default for ControllerStatus {
    fn default() -> Self {
        Self {
            phase: ControllerPhase::Idle,
            identity: None,
            account: None,
        }
    }
}

// ============================================================================
// SyncController
// ============================================================================

/// Orchestrator for the usage-sync lifecycle.
///
/// Collaborators are constructor-injected so tests can substitute
/// fakes for any of the three backend capabilities.
pub struct SyncController {
    probe: Arc<dyn SessionProbe>,
    reader: Arc<dyn ProfileReader>,
    channel: Arc<dyn QuotaChannel>,
    store: UsageStateStore,
}

impl SyncController {
    pub fn new(
        probe: Arc<dyn SessionProbe>,
        reader: Arc<dyn ProfileReader>,
        channel: Arc<dyn QuotaChannel>,
        store: UsageStateStore,
    ) -> Self {
        Self {
            probe,
            reader,
            channel,
            store,
        }
    }

    /// Start the controller task and return its handle.
    pub fn spawn(self) -> SyncHandle {
        let active = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (status_tx, status_rx) = watch::channel(ControllerStatus::default());

        let runner = Runner {
            probe: self.probe,
            reader: self.reader,
            channel: self.channel,
            store: self.store,
            active: active.clone(),
            status_tx,
            subscription: None,
        };
        let task = tokio::spawn(runner.run(stop_rx));

        SyncHandle {
            active,
            stop_tx,
            status_rx,
            task,
        }
    }
}

// ============================================================================
// SyncHandle
// ============================================================================

/// Handle to a running controller task.
pub struct SyncHandle {
    active: Arc<AtomicBool>,
    stop_tx: mpsc::Sender<()>,
    status_rx: watch::Receiver<ControllerStatus>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Snapshot of the controller status.
    pub fn status(&self) -> ControllerStatus {
        self.status_rx.borrow().clone()
    }

    /// Display projection of the current identity, if bound to one.
    pub fn account(&self) -> Option<AccountView> {
        self.status_rx.borrow().account.clone()
    }

    /// Subscribe to status transitions.
    pub fn subscribe_status(&self) -> watch::Receiver<ControllerStatus> {
        self.status_rx.clone()
    }

    /// Stop the controller and wait for teardown.
    ///
    /// The active flag flips before the task is signaled, so a
    /// resolve/read still in flight can complete but its result is
    /// dropped rather than written to the store.
    pub async fn stop(self) {
        self.active.store(false, Ordering::SeqCst);
        let _ = self.stop_tx.send(()).await;
        let _ = self.task.await;
    }
}

// ============================================================================
// Runner (controller task)
// ============================================================================

struct Runner {
    probe: Arc<dyn SessionProbe>,
    reader: Arc<dyn ProfileReader>,
    channel: Arc<dyn QuotaChannel>,
    store: UsageStateStore,
    active: Arc<AtomicBool>,
    status_tx: watch::Sender<ControllerStatus>,
    subscription: Option<Subscription>,
}

impl Runner {
    async fn run(mut self, mut stop_rx: mpsc::Receiver<()>) {
        // Subscribe before the first resolution so a session change
        // racing with startup still triggers a rebind.
        let mut session_rx = self.probe.subscribe_sessions();

        self.set_phase(ControllerPhase::Resolving);
        self.rebind().await;

        loop {
            tokio::select! {
                _ = stop_rx.recv() => break,
                event = session_rx.recv() => match event {
                    Ok(ev) => {
                        log::debug!("[usage:controller] session event: {}", ev);
                        self.set_phase(ControllerPhase::Rebinding);
                        self.rebind().await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed notifications collapse into one rebind;
                        // the rebind re-resolves from scratch anyway.
                        log::debug!(
                            "[usage:controller] lagged {} session events, rebinding",
                            skipped
                        );
                        self.set_phase(ControllerPhase::Rebinding);
                        self.rebind().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                event = Self::next_push(&mut self.subscription) => match event {
                    Some(record) => {
                        // Push events for the current identity, applied
                        // in delivery order. Server wins over any local
                        // optimistic decrement.
                        self.store_guarded(|store| store.apply(&record));
                    }
                    None => {
                        // Producer stopped silently: no distinct state,
                        // the last value stays until the next rebind.
                        log::warn!("[usage:controller] quota channel stopped delivering");
                        self.subscription = None;
                    }
                },
            }
        }

        self.teardown();
    }

    /// Await the next push event, or park forever when no channel is
    /// open so the other select branches stay in charge.
    async fn next_push(subscription: &mut Option<Subscription>) -> Option<QuotaRecord> {
        match subscription.as_mut() {
            Some(sub) => sub.recv().await,
            None => std::future::pending().await,
        }
    }

    /// One full resolution cycle: close the previous channel, resolve
    /// the identity, read the profile, open a new channel.
    async fn rebind(&mut self) {
        // Close before reopening: at most one live subscription, and a
        // stale channel must never deliver events attributed to the
        // new identity.
        if let Some(mut sub) = self.subscription.take() {
            sub.close();
        }

        let identity = match self.probe.resolve().await {
            Ok(identity) => identity,
            Err(err) => {
                log::warn!("[usage:controller] identity resolution failed: {}", err);
                None
            }
        };

        let identity = match identity {
            Some(identity) => identity,
            None => {
                self.store_guarded(|store| store.set_unauthenticated());
                self.set_bound(None, None);
                return;
            }
        };

        match self.reader.read_quota(&identity).await {
            Ok(record) => self.store_guarded(|store| store.apply(&record)),
            Err(err) => {
                log::warn!("[usage:controller] profile read failed: {}", err);
                self.store_guarded(|store| store.set_unknown());
            }
        }

        let plan = match self.reader.read_plan(&identity).await {
            Ok(Some(plan)) => Some(plan),
            Ok(None) => Some(DEFAULT_PLAN.to_string()),
            Err(err) => {
                log::warn!("[usage:controller] plan read failed: {}", err);
                None
            }
        };

        match self.channel.open(&identity).await {
            Ok(sub) => self.subscription = Some(sub),
            Err(err) => {
                // Channel failure has no observable state of its own;
                // the value goes stale until the next rebind.
                log::warn!("[usage:controller] channel open failed: {}", err);
                self.subscription = None;
            }
        }

        let account = AccountView {
            email: identity.email.clone(),
            plan,
        };
        self.set_bound(Some(identity), Some(account));
    }

    fn teardown(&mut self) {
        if let Some(mut sub) = self.subscription.take() {
            sub.close();
        }
        self.status_tx.send_replace(ControllerStatus {
            phase: ControllerPhase::TornDown,
            identity: None,
            account: None,
        });
        log::debug!("[usage:controller] torn down");
    }

    /// Mounted guard: store writes are dropped once stop was requested.
    fn store_guarded(&self, write: impl FnOnce(&UsageStateStore)) {
        if self.active.load(Ordering::SeqCst) {
            write(&self.store);
        }
    }

    fn set_phase(&self, phase: ControllerPhase) {
        self.status_tx.send_modify(|status| status.phase = phase);
    }

    fn set_bound(&self, identity: Option<Identity>, account: Option<AccountView>) {
        self.status_tx.send_replace(ControllerStatus {
            phase: ControllerPhase::Bound,
            identity,
            account,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
