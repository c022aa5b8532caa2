//! Business logic services

pub mod conversation;
pub mod usage;

pub use conversation::ConversationCache;
pub use usage::{
    AccountView, BackendError, ControllerPhase, ControllerStatus, Identity, ProfileReader,
    QuotaChannel, QuotaRecord, RestBackend, SessionEvent, SessionProbe, Subscription,
    SyncController, SyncHandle, UsageHistory, UsageService, UsageSnapshot, UsageState,
    UsageStateStore,
};
