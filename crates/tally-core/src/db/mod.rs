//! Database module - SQLx with SQLite
//!
//! Holds only the local usage-snapshot history. Usage state itself is
//! never loaded from here; it is always re-derived from the remote
//! source when synchronization starts.

use crate::error::{Error, Result};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::PathBuf;

/// Database state
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    /// Create a new database connection with default path
    pub async fn new() -> Result<Self> {
        let db_path = get_db_path()?;
        Self::open(db_path).await
    }

    /// Create a new database connection with a specific path
    pub async fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        log::info!("Connecting to database: {}", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// In-memory database, for tests and ephemeral runs
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        log::info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS usage_snapshots (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                messages_left INTEGER NOT NULL,
                message_limit INTEGER NOT NULL,
                recorded_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_usage_snapshots_user
            ON usage_snapshots (user_id, recorded_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Resolve the database path: `TALLY_DB_PATH` env var, or
/// `<data dir>/tally/tally.db`.
pub fn get_db_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("TALLY_DB_PATH") {
        return Ok(PathBuf::from(path));
    }
    let dir = dirs::data_dir().ok_or_else(|| Error::config("could not determine data directory"))?;
    Ok(dir.join("tally").join("tally.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_migrations() {
        let db = Database::in_memory().await.unwrap();
        // Table exists and is queryable
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM usage_snapshots")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_open_creates_file_and_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("tally.db");
        let _db = Database::open(path.clone()).await.unwrap();
        assert!(path.exists());
    }
}
