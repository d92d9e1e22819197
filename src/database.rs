//! SQLite database for persistent storage.
//!
//! Holds the per-guild log channel routing for the protection systems.
//! Detector state is deliberately in-memory only; a restart starts all
//! windows empty.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::{Result, WardenError};

/// One configured log channel route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChannelRoute {
    pub system: String,
    pub channel_id: u64,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection.
    ///
    /// Creates the database file and initializes schema if needed.
    pub async fn new(path: &str) -> Result<Self> {
        let db_path = Path::new(path);

        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    WardenError::Database(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| WardenError::Database(format!("Failed to connect to database: {}", e)))?;

        let db = Self { pool };
        db.initialize_schema().await?;

        Ok(db)
    }

    /// Create an in-memory database for testing.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| WardenError::Database(format!("Failed to create in-memory db: {}", e)))?;

        let db = Self { pool };
        db.initialize_schema().await?;

        Ok(db)
    }

    /// Initialize database schema.
    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| WardenError::Database(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if the database is healthy.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| WardenError::Database(format!("Health check failed: {}", e)))?;

        Ok(())
    }

    /// Get the log channel configured for a protection system, if any.
    pub async fn get_log_channel(&self, guild_id: u64, system: &str) -> Result<Option<u64>> {
        let row = sqlx::query(
            "SELECT channel_id FROM log_channels WHERE guild_id = ? AND system = ?",
        )
        .bind(guild_id as i64)
        .bind(system)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| WardenError::Database(format!("Failed to get log channel: {}", e)))?;

        Ok(row.map(|r| r.get::<i64, _>("channel_id") as u64))
    }

    /// Set or replace the log channel for a protection system.
    pub async fn set_log_channel(
        &self,
        guild_id: u64,
        system: &str,
        channel_id: u64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO log_channels (guild_id, system, channel_id, updated_at)
             VALUES (?, ?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(guild_id, system) DO UPDATE SET
                channel_id = excluded.channel_id,
                updated_at = CURRENT_TIMESTAMP",
        )
        .bind(guild_id as i64)
        .bind(system)
        .bind(channel_id as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| WardenError::Database(format!("Failed to set log channel: {}", e)))?;

        Ok(())
    }

    /// Remove the log channel route for a protection system.
    /// Returns false when no route was configured.
    pub async fn remove_log_channel(&self, guild_id: u64, system: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM log_channels WHERE guild_id = ? AND system = ?")
            .bind(guild_id as i64)
            .bind(system)
            .execute(&self.pool)
            .await
            .map_err(|e| WardenError::Database(format!("Failed to remove log channel: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    /// All log channel routes for a guild, sorted by system name.
    pub async fn list_log_channels(&self, guild_id: u64) -> Result<Vec<LogChannelRoute>> {
        let rows = sqlx::query(
            "SELECT system, channel_id FROM log_channels
             WHERE guild_id = ?
             ORDER BY system",
        )
        .bind(guild_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WardenError::Database(format!("Failed to list log channels: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| LogChannelRoute {
                system: row.get("system"),
                channel_id: row.get::<i64, _>("channel_id") as u64,
            })
            .collect())
    }
}

/// Database schema SQL.
const SCHEMA: &str = r#"
-- Log channel routing per protection system
CREATE TABLE IF NOT EXISTS log_channels (
    guild_id INTEGER NOT NULL,
    system TEXT NOT NULL,
    channel_id INTEGER NOT NULL,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (guild_id, system)
);

CREATE INDEX IF NOT EXISTS idx_log_channels_guild ON log_channels(guild_id);
"#;
