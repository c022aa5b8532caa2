//! Usage synchronization module
//!
//! Keeps one per-user message quota ("messages left" out of a
//! "message limit") consistent across three independent change
//! sources: the auth session (start/end/switch at any time), the
//! remote quota record (server-side decrements, admin resets), and
//! local optimistic consumption applied before the server confirms.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ UsageService (facade for the UI boundary)               │
//! │   - usage() / subscribe()                               │
//! │   - consume_credit()                                    │
//! │   - account() / reset_conversation()                    │
//! └─────────────────────────────────────────────────────────┘
//!          │
//! ┌─────────────────────────────────────────────────────────┐
//! │ SyncController (lifecycle owner)                        │
//! │   session change -> close channel -> resolve -> read    │
//! │   -> reopen channel                                     │
//! └─────────────────────────────────────────────────────────┘
//!     │             │              │
//!     ▼             ▼              ▼
//! ┌─────────┐  ┌──────────┐  ┌────────────┐      ┌─────────────┐
//! │ Session │  │ Profile  │  │   Quota    │ ───► │ UsageState  │
//! │  Probe  │  │  Reader  │  │  Channel   │      │   Store     │
//! └─────────┘  └──────────┘  └────────────┘      └─────────────┘
//!      (trait seam; RestBackend implements all three)
//! ```
//!
//! Every backend failure degrades to a `UsageState` variant
//! (`Unauthenticated`, `Unknown`, or a stale `Known`) instead of
//! propagating; the quota display never shows an error message.

pub mod controller;
pub mod history;
pub mod provider;
pub mod rest;
pub mod service;
pub mod store;
pub mod types;

// Re-export main types
pub use types::{AccountView, Identity, QuotaRecord, SessionEvent, UsageState};

// Re-export provider traits and error
pub use provider::{BackendError, ProfileReader, QuotaChannel, SessionProbe, Subscription};

// Re-export sync machinery
pub use controller::{ControllerPhase, ControllerStatus, SyncController, SyncHandle};
pub use service::UsageService;
pub use store::UsageStateStore;

// Re-export backends and history
pub use history::{StoredUsageSnapshot, UsageHistory, UsageSnapshot};
pub use rest::RestBackend;
