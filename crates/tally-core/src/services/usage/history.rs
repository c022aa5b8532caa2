//! Usage history storage
//!
//! Persists snapshots of observed `Known` usage values to SQLite so
//! the CLI can show how the quota moved over time. History is written
//! by whoever watches the store (the CLI watcher); the sync core never
//! reads it back - usage state is always re-derived from the remote
//! source.

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::types::QuotaRecord;
use crate::error::Result;

// ============================================================================
// Row Types
// ============================================================================

/// Database row representation of a usage snapshot
#[derive(Debug, Clone, FromRow)]
pub struct StoredUsageSnapshot {
    pub id: String,
    pub user_id: String,
    pub messages_left: i64,
    pub message_limit: i64,
    /// When this snapshot was observed (ISO 8601 or sqlite datetime)
    pub recorded_at: String,
}

impl StoredUsageSnapshot {
    /// Convert a database row to a domain snapshot.
    ///
    /// Returns `None` if the timestamp cannot be parsed.
    pub fn to_snapshot(&self) -> Option<UsageSnapshot> {
        Some(UsageSnapshot {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            record: QuotaRecord::clamped(self.messages_left, self.message_limit),
            recorded_at: parse_datetime(&self.recorded_at)?,
        })
    }
}

/// One observed usage value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub id: String,
    pub user_id: String,
    pub record: QuotaRecord,
    pub recorded_at: DateTime<Utc>,
}

/// Parse datetime string (RFC3339 or sqlite's naive format)
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    log::warn!("[usage:history] failed to parse datetime: {}", s);
    None
}

// ============================================================================
// UsageHistory
// ============================================================================

/// Storage layer for usage snapshots
pub struct UsageHistory {
    pool: SqlitePool,
}

impl UsageHistory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record one observed usage value for a user.
    pub async fn save(&self, user_id: &str, record: &QuotaRecord) -> Result<UsageSnapshot> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO usage_snapshots (id, user_id, messages_left, message_limit, recorded_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(record.left as i64)
        .bind(record.limit as i64)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(UsageSnapshot {
            id,
            user_id: user_id.to_string(),
            record: *record,
            recorded_at: now,
        })
    }

    /// Most recent snapshot for a user, if any.
    pub async fn latest(&self, user_id: &str) -> Result<Option<UsageSnapshot>> {
        let row: Option<StoredUsageSnapshot> = sqlx::query_as(
            "SELECT * FROM usage_snapshots WHERE user_id = ? ORDER BY recorded_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|row| row.to_snapshot()))
    }

    /// Recent snapshots for a user, newest first.
    pub async fn recent(&self, user_id: &str, limit: u32) -> Result<Vec<UsageSnapshot>> {
        let rows: Vec<StoredUsageSnapshot> = sqlx::query_as(
            "SELECT * FROM usage_snapshots WHERE user_id = ? ORDER BY recorded_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(|row| row.to_snapshot()).collect())
    }

    /// Delete all snapshots for a user. Returns the number removed.
    pub async fn clear(&self, user_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM usage_snapshots WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn history() -> UsageHistory {
        let db = Database::in_memory().await.unwrap();
        UsageHistory::new(db.pool)
    }

    #[tokio::test]
    async fn test_save_and_latest() {
        let history = history().await;
        history
            .save("u1", &QuotaRecord { left: 5, limit: 20 })
            .await
            .unwrap();
        history
            .save("u1", &QuotaRecord { left: 4, limit: 20 })
            .await
            .unwrap();

        let latest = history.latest("u1").await.unwrap().unwrap();
        assert_eq!(latest.record, QuotaRecord { left: 4, limit: 20 });
    }

    #[tokio::test]
    async fn test_latest_empty_is_none() {
        let history = history().await;
        assert!(history.latest("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_newest_first_and_limited() {
        let history = history().await;
        for left in [9, 8, 7, 6] {
            history
                .save("u1", &QuotaRecord { left, limit: 10 })
                .await
                .unwrap();
            // Distinct timestamps for deterministic ordering
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let recent = history.recent("u1", 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].record.left, 6);
        assert_eq!(recent[2].record.left, 8);
    }

    #[tokio::test]
    async fn test_snapshots_scoped_by_user() {
        let history = history().await;
        history
            .save("u1", &QuotaRecord { left: 5, limit: 20 })
            .await
            .unwrap();
        history
            .save("u2", &QuotaRecord { left: 1, limit: 10 })
            .await
            .unwrap();

        let u1 = history.recent("u1", 10).await.unwrap();
        assert_eq!(u1.len(), 1);
        assert_eq!(u1[0].record.left, 5);
    }

    #[tokio::test]
    async fn test_clear() {
        let history = history().await;
        history
            .save("u1", &QuotaRecord { left: 5, limit: 20 })
            .await
            .unwrap();
        assert_eq!(history.clear("u1").await.unwrap(), 1);
        assert!(history.latest("u1").await.unwrap().is_none());
    }

    #[test]
    fn test_parse_datetime_formats() {
        assert!(parse_datetime("2026-08-30T10:30:00Z").is_some());
        assert!(parse_datetime("2026-08-30 10:30:00").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }
}
