//! Database lifecycle and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

use super::Database;

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let db = Self { pool };

        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?
                .flatten();

        if current_version.unwrap_or(0) < 1 {
            Self::migrate_v1(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: Create initial schema
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying database migration v1");

        // Wrap migration in a transaction so partial failures don't leave the DB in a broken state
        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;

        let result = async {
            Self::create_posts_schema(conn).await?;
            Self::create_articles_schema(conn).await?;
            Self::create_crawl_errors_schema(conn).await?;
            Self::record_migration(conn, 1).await?;
            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::MigrationFailed(format!(
                            "Failed to commit migration v1: {}",
                            e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!("Database migration v1 complete");
        Ok(())
    }

    /// Execute one DDL statement as part of a migration
    async fn execute_ddl(conn: &mut SqliteConnection, sql: &str, what: &str) -> Result<()> {
        sqlx::query(sql).execute(&mut *conn).await.map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create {}: {}",
                what, e
            )))
        })?;
        Ok(())
    }

    /// Create posts table and its indexes
    async fn create_posts_schema(conn: &mut SqliteConnection) -> Result<()> {
        Self::execute_ddl(
            conn,
            r#"
            CREATE TABLE posts (
                source_id TEXT NOT NULL,
                post_id TEXT NOT NULL,
                page_name TEXT NOT NULL,
                link TEXT,
                resolved_url TEXT,
                base_domain TEXT,
                shares INTEGER,
                created_time INTEGER NOT NULL,
                retrieved_on INTEGER NOT NULL,
                PRIMARY KEY (source_id, post_id)
            )
            "#,
            "posts table",
        )
        .await?;

        Self::execute_ddl(
            conn,
            "CREATE INDEX idx_posts_source_created ON posts(source_id, created_time DESC)",
            "index",
        )
        .await?;

        Self::execute_ddl(
            conn,
            "CREATE INDEX idx_posts_retrieved_on ON posts(retrieved_on)",
            "index",
        )
        .await
    }

    /// Create articles table and its indexes
    async fn create_articles_schema(conn: &mut SqliteConnection) -> Result<()> {
        Self::execute_ddl(
            conn,
            r#"
            CREATE TABLE articles (
                post_id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                url TEXT NOT NULL,
                base_domain TEXT,
                title TEXT NOT NULL,
                authors TEXT NOT NULL DEFAULT '[]',
                body_text TEXT NOT NULL,
                post_created_time INTEGER NOT NULL,
                retrieved_on INTEGER NOT NULL
            )
            "#,
            "articles table",
        )
        .await?;

        Self::execute_ddl(
            conn,
            "CREATE INDEX idx_articles_source ON articles(source_id)",
            "index",
        )
        .await
    }

    /// Create crawl_errors table
    async fn create_crawl_errors_schema(conn: &mut SqliteConnection) -> Result<()> {
        Self::execute_ddl(
            conn,
            r#"
            CREATE TABLE crawl_errors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id TEXT NOT NULL,
                cause TEXT NOT NULL,
                occurred_at INTEGER NOT NULL
            )
            "#,
            "crawl_errors table",
        )
        .await?;

        Self::execute_ddl(
            conn,
            "CREATE INDEX idx_crawl_errors_source ON crawl_errors(source_id)",
            "index",
        )
        .await
    }

    /// Record that a migration version has been applied
    async fn record_migration(conn: &mut SqliteConnection, version: i32) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to record migration: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Close the database connection pool
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
