//! Conversation cache
//!
//! Locally cached conversation transcript for the surrounding chat UI.
//! Not part of usage synchronization; the only capability the sync
//! boundary exposes for it is `reset`, which clears the transcript and
//! bumps an epoch so the owning view can remount its chat component.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// In-memory transcript with a reset epoch.
pub struct ConversationCache {
    messages: Mutex<Vec<String>>,
    epoch: AtomicU64,
}

impl ConversationCache {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            epoch: AtomicU64::new(0),
        }
    }

    /// Append one message to the transcript.
    pub fn push_message(&self, message: impl Into<String>) {
        self.messages
            .lock()
            .expect("conversation lock poisoned")
            .push(message.into());
    }

    /// Snapshot of the transcript.
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .expect("conversation lock poisoned")
            .clone()
    }

    /// Epoch counter; increments on every reset.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Clear the transcript and bump the epoch ("New Chat").
    pub fn reset(&self) {
        self.messages
            .lock()
            .expect("conversation lock poisoned")
            .clear();
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for ConversationCache {
    fn default() -> Self {
        Self::new()
    }
}
