//! Usage tracking types
//!
//! Types for the client-side projection of a user's message quota.

use serde::{Deserialize, Serialize};

// ============================================================================
// Identity
// ============================================================================

/// The resolved authenticated user for the current session.
///
/// Identities are resolved on demand by a [`SessionProbe`] and are not
/// stored beyond the current synchronization cycle.
///
/// [`SessionProbe`]: super::provider::SessionProbe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque user id assigned by the backend
    pub id: String,
    /// Email used as the display label
    pub email: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.email, self.id)
    }
}

// ============================================================================
// Quota Record
// ============================================================================

/// Server-owned pair of remaining/limit message counts for one identity.
///
/// The client only ever holds a read-only mirror of this record. Values
/// are clamped to non-negative integers at construction; the wire field
/// names are exactly `"messages left"` and `"message limit"` and any
/// other shape is treated as absent data (defaults to 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    /// Messages remaining in the current period
    #[serde(rename = "messages left", default)]
    pub left: u32,
    /// Total message allowance for the period
    #[serde(rename = "message limit", default)]
    pub limit: u32,
}

impl QuotaRecord {
    /// Build a record from raw (possibly negative or missing) backend
    /// values, clamping both fields to >= 0.
    pub fn clamped(left: i64, limit: i64) -> Self {
        Self {
            left: left.max(0) as u32,
            limit: limit.max(0) as u32,
        }
    }
}

impl std::fmt::Display for QuotaRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.left, self.limit)
    }
}

// ============================================================================
// Usage State
// ============================================================================

/// Client-side projection of the quota record.
///
/// This is the single logical value the rest of the application reads.
/// It starts as `Unknown`, becomes `Unauthenticated` or `Known` after
/// the first identity resolution, and is replaced wholesale by every
/// push event and every optimistic decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UsageState {
    /// Not yet resolved, or a profile read failed
    #[default]
    Unknown,
    /// Explicitly no session
    Unauthenticated,
    /// Mirrored quota value; `left` is never negative
    Known { left: u32, limit: u32 },
}

impl UsageState {
    /// Returns the record if the state is `Known`.
    pub fn record(&self) -> Option<QuotaRecord> {
        match *self {
            UsageState::Known { left, limit } => Some(QuotaRecord { left, limit }),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, UsageState::Known { .. })
    }
}

impl std::fmt::Display for UsageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UsageState::Unknown => write!(f, "unknown"),
            UsageState::Unauthenticated => write!(f, "unauthenticated"),
            UsageState::Known { left, limit } => write!(f, "{} / {}", left, limit),
        }
    }
}

// ============================================================================
// Session Events
// ============================================================================

/// "Session possibly changed" notification.
///
/// The variants exist for logging only; the sync controller reacts
/// identically to all of them by re-resolving the identity. No ordering
/// guarantee beyond delivery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::SignedIn => write!(f, "signed_in"),
            SessionEvent::SignedOut => write!(f, "signed_out"),
            SessionEvent::TokenRefreshed => write!(f, "token_refreshed"),
        }
    }
}

// ============================================================================
// Account View
// ============================================================================

/// Display projection of the current identity for the surrounding UI
/// ("Signed in as … • Plan: …").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub email: String,
    /// Plan label from the profile row; defaults to "free" when the
    /// row exists but carries no plan column
    pub plan: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
