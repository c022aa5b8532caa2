//! # tally-core
//!
//! Core usage-sync logic for Tally - shared between the CLI and any
//! future shell.
//!
//! This crate provides:
//! - Usage-state synchronization (`services::usage` module): one
//!   in-memory quota projection kept consistent across auth
//!   transitions, server pushes, and local optimistic decrements
//! - Conversation cache side-channel (`services::conversation`)
//! - Database operations for local usage history (`db` module)
//! - Configuration (`models` module)
//! - Unified error handling (`error` module)

pub mod db;
pub mod error;
pub mod models;
pub mod services;

// Re-exports for convenience
pub use db::Database;
pub use error::{Error, Result};
pub use models::AppConfig;

// Re-export commonly used types from services
pub use services::{
    AccountView, BackendError, ControllerPhase, ControllerStatus, ConversationCache, Identity,
    ProfileReader, QuotaChannel, QuotaRecord, RestBackend, SessionEvent, SessionProbe,
    Subscription, SyncController, SyncHandle, UsageHistory, UsageService, UsageSnapshot,
    UsageState, UsageStateStore,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version
pub fn version() -> &'static str {
    VERSION
}
