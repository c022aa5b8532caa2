//! REST backend
//!
//! Implements the three backend traits against a Supabase-flavored
//! HTTP API:
//!
//! - identity resolution via `GET {base}/auth/v1/user` with a bearer
//!   token
//! - profile reads via `GET {base}/rest/v1/profiles?id=eq.{uid}`,
//!   parsed defensively (the quota columns are exactly
//!   `"messages left"` and `"message limit"`; anything else reads
//!   as 0)
//! - the quota channel, emulated by polling the same row on an
//!   interval and emitting a push event only when the record differs
//!   from the last one delivered
//!
//! The polling transport is a detail behind the [`QuotaChannel`]
//! trait; a websocket transport could implement the same trait
//! without touching the controller.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::provider::{
    BackendError, ProfileReader, QuotaChannel, SessionProbe, Subscription, SUBSCRIPTION_BUFFER,
};
use super::types::{Identity, QuotaRecord, SessionEvent};
use crate::models::AppConfig;

// ============================================================================
// Constants
// ============================================================================

/// Auth endpoint returning the current user
const AUTH_USER_PATH: &str = "/auth/v1/user";

/// REST endpoint for the profiles table
const PROFILES_PATH: &str = "/rest/v1/profiles";

/// Quota column: messages remaining
const FIELD_MESSAGES_LEFT: &str = "messages left";

/// Quota column: message allowance
const FIELD_MESSAGE_LIMIT: &str = "message limit";

/// Profile column: plan label
const FIELD_PLAN: &str = "plan";

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Session-change broadcast capacity
const SESSION_EVENT_BUFFER: usize = 16;

// ============================================================================
// Row Parsing
// ============================================================================

/// Extract a quota record from a profile row, defaulting missing or
/// non-numeric fields to 0 and clamping negatives.
fn parse_quota_row(row: &Value) -> QuotaRecord {
    let left = row.get(FIELD_MESSAGES_LEFT).and_then(Value::as_i64).unwrap_or(0);
    let limit = row.get(FIELD_MESSAGE_LIMIT).and_then(Value::as_i64).unwrap_or(0);
    QuotaRecord::clamped(left, limit)
}

/// Extract the plan label from a profile row, if present.
fn parse_plan(row: &Value) -> Option<String> {
    row.get(FIELD_PLAN)
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

/// Extract an identity from an auth user response.
fn parse_user(body: &Value) -> Option<Identity> {
    let id = body.get("id").and_then(Value::as_str)?;
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    Some(Identity::new(id, email))
}

// ============================================================================
// RestBackend
// ============================================================================

/// HTTP backend implementing [`SessionProbe`], [`ProfileReader`] and
/// [`QuotaChannel`].
pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: RwLock<Option<String>>,
    sessions: broadcast::Sender<SessionEvent>,
    poll_interval: Duration,
}

impl RestBackend {
    /// Build a backend from the app configuration.
    pub fn new(config: &AppConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let (sessions, _) = broadcast::channel(SESSION_EVENT_BUFFER);

        Ok(Self {
            client,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            access_token: RwLock::new(config.access_token()),
            sessions,
            // interval() panics on a zero period
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
        })
    }

    /// Install a new access token and notify subscribers that the
    /// session possibly changed.
    pub fn set_access_token(&self, token: Option<String>) {
        let event = match &token {
            Some(_) => SessionEvent::SignedIn,
            None => SessionEvent::SignedOut,
        };
        *self.access_token.write().expect("token lock poisoned") = token;
        let _ = self.sessions.send(event);
    }

    /// Emit a session-change notification without touching the token
    /// (e.g. after an out-of-band refresh).
    pub fn notify_session_changed(&self) {
        let _ = self.sessions.send(SessionEvent::TokenRefreshed);
    }

    fn token(&self) -> Option<String> {
        self.access_token.read().expect("token lock poisoned").clone()
    }

    /// Fetch the profile row for one identity.
    async fn fetch_profile_row(&self, identity: &Identity) -> Result<Value, BackendError> {
        let url = format!("{}{}", self.base_url, PROFILES_PATH);
        let mut request = self
            .client
            .get(&url)
            .query(&[("id", format!("eq.{}", identity.id)), ("select", "*".to_string())])
            .header("apikey", &self.api_key);
        if let Some(token) = self.token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::ProfileRead(format!("HTTP {}", status)));
        }

        let rows: Value = response.json().await?;
        rows.as_array()
            .and_then(|rows| rows.first())
            .cloned()
            .ok_or_else(|| BackendError::ProfileRead("profile row not found".to_string()))
    }
}

#[async_trait]
impl SessionProbe for RestBackend {
    async fn resolve(&self) -> Result<Option<Identity>, BackendError> {
        let token = match self.token() {
            Some(token) => token,
            None => return Ok(None),
        };

        let url = format!("{}{}", self.base_url, AUTH_USER_PATH);
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            // Expired or revoked token is "no session", not a fault
            return Ok(None);
        }
        if !status.is_success() {
            return Err(BackendError::IdentityResolution(format!("HTTP {}", status)));
        }

        let body: Value = response.json().await?;
        Ok(parse_user(&body))
    }

    fn subscribe_sessions(&self) -> broadcast::Receiver<SessionEvent> {
        self.sessions.subscribe()
    }
}

#[async_trait]
impl ProfileReader for RestBackend {
    async fn read_quota(&self, identity: &Identity) -> Result<QuotaRecord, BackendError> {
        let row = self.fetch_profile_row(identity).await?;
        Ok(parse_quota_row(&row))
    }

    async fn read_plan(&self, identity: &Identity) -> Result<Option<String>, BackendError> {
        let row = self.fetch_profile_row(identity).await?;
        Ok(parse_plan(&row))
    }
}

#[async_trait]
impl QuotaChannel for RestBackend {
    async fn open(&self, identity: &Identity) -> Result<Subscription, BackendError> {
        let (event_tx, event_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (close_tx, mut close_rx) = oneshot::channel();

        let poller = RowPoller {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            token: self.token(),
            identity: identity.clone(),
        };
        let interval = self.poll_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last: Option<QuotaRecord> = None;

            loop {
                tokio::select! {
                    _ = &mut close_rx => break,
                    _ = ticker.tick() => {
                        match poller.fetch().await {
                            Ok(record) => {
                                // The first observation counts as a change
                                if last != Some(record) {
                                    last = Some(record);
                                    if event_tx.send(record).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(err) => {
                                // Keep polling; a transient failure is
                                // indistinguishable from "no change"
                                log::warn!("[usage:rest] poll failed for {}: {}", poller.identity.id, err);
                            }
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(event_rx, close_tx))
    }
}

/// Captured request state for the polling task.
struct RowPoller {
    client: Client,
    base_url: String,
    api_key: String,
    token: Option<String>,
    identity: Identity,
}

impl RowPoller {
    async fn fetch(&self) -> Result<QuotaRecord, BackendError> {
        let url = format!("{}{}", self.base_url, PROFILES_PATH);
        let mut request = self
            .client
            .get(&url)
            .query(&[
                ("id", format!("eq.{}", self.identity.id)),
                ("select", "*".to_string()),
            ])
            .header("apikey", &self.api_key);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Channel(format!("HTTP {}", status)));
        }

        let rows: Value = response.json().await?;
        let row = rows
            .as_array()
            .and_then(|rows| rows.first())
            .ok_or_else(|| BackendError::Channel("profile row not found".to_string()))?;
        Ok(parse_quota_row(row))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // =========================================================================
    // Row Parsing Tests
    // =========================================================================

    #[test]
    fn test_parse_quota_row_exact_field_names() {
        let row = json!({"messages left": 5, "message limit": 20});
        assert_eq!(parse_quota_row(&row), QuotaRecord { left: 5, limit: 20 });
    }

    #[test]
    fn test_parse_quota_row_missing_fields_default_to_zero() {
        let row = json!({"plan": "pro"});
        assert_eq!(parse_quota_row(&row), QuotaRecord { left: 0, limit: 0 });
    }

    #[test]
    fn test_parse_quota_row_wrong_shape_reads_as_zero() {
        // Any other shape is treated as absent data
        let row = json!({"messages left": "lots", "message limit": {"n": 20}});
        assert_eq!(parse_quota_row(&row), QuotaRecord { left: 0, limit: 0 });
    }

    #[test]
    fn test_parse_quota_row_clamps_negative() {
        let row = json!({"messages left": -4, "message limit": -1});
        assert_eq!(parse_quota_row(&row), QuotaRecord { left: 0, limit: 0 });
    }

    #[test]
    fn test_parse_plan() {
        assert_eq!(parse_plan(&json!({"plan": "pro"})), Some("pro".to_string()));
        assert_eq!(parse_plan(&json!({})), None);
        assert_eq!(parse_plan(&json!({"plan": 3})), None);
    }

    #[test]
    fn test_parse_user() {
        let body = json!({"id": "u1", "email": "u1@example.com"});
        assert_eq!(
            parse_user(&body),
            Some(Identity::new("u1", "u1@example.com"))
        );
    }

    #[test]
    fn test_parse_user_requires_id() {
        assert_eq!(parse_user(&json!({"email": "x@example.com"})), None);
    }

    #[test]
    fn test_parse_user_tolerates_missing_email() {
        let identity = parse_user(&json!({"id": "u1"})).unwrap();
        assert_eq!(identity.id, "u1");
        assert_eq!(identity.email, "");
    }

    // =========================================================================
    // Backend Construction Tests
    // =========================================================================

    fn test_config() -> AppConfig {
        AppConfig {
            backend_url: "https://project.supabase.co/".to_string(),
            api_key: "anon-key".to_string(),
            access_token_path: None,
            poll_interval_secs: 5,
        }
    }

    #[test]
    fn test_backend_trims_trailing_slash() {
        let backend = RestBackend::new(&test_config()).unwrap();
        assert_eq!(backend.base_url, "https://project.supabase.co");
    }

    #[tokio::test]
    async fn test_resolve_without_token_is_no_session() {
        let backend = RestBackend::new(&test_config()).unwrap();
        // No token, no network call: explicitly unauthenticated
        assert_eq!(backend.resolve().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_access_token_notifies_sessions() {
        let backend = RestBackend::new(&test_config()).unwrap();
        let mut rx = backend.subscribe_sessions();

        backend.set_access_token(Some("token".to_string()));
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::SignedIn);

        backend.set_access_token(None);
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::SignedOut);

        backend.notify_session_changed();
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::TokenRefreshed);
    }
}
