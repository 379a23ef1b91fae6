//! Durable lookup log.
//!
//! Every resolved lookup is appended as its own row; rows are never updated.
//! The log doubles as the second lookup tier: the newest row for a domain
//! name answers later lookups once the volatile cache has expired.

use crate::{config::Config, errors::WhoisError, LookupResult, NameServers};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::{debug, info};

const MIGRATION_V1: &str = r#"
CREATE TABLE IF NOT EXISTS domain_lookups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain_name TEXT NOT NULL,
    status TEXT NOT NULL,
    registrar TEXT NOT NULL,
    name_servers TEXT NOT NULL,
    created_on TEXT NOT NULL,
    last_updated_on TEXT NOT NULL,
    expiration_date TEXT NOT NULL,
    timestamp INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_domain_lookups_domain_name ON domain_lookups(domain_name);
"#;

/// One row of the lookup log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LookupRecord {
    pub id: i64,
    /// Domain name as requested, the key later lookups match on
    pub domain_name: String,
    pub status: String,
    pub registrar: String,
    /// Comma-joined, or "N/A"
    pub name_servers: String,
    pub created_on: String,
    pub last_updated_on: String,
    pub expiration_date: String,
    /// Write time, unix seconds
    pub timestamp: i64,
}

impl LookupRecord {
    pub fn written_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }

    pub fn into_result(self) -> LookupResult {
        let timestamp = self.written_at();

        LookupResult {
            domain_name: self.domain_name,
            status: self.status,
            registrar: self.registrar,
            name_servers: NameServers::from_joined(&self.name_servers),
            created_on: self.created_on,
            last_updated_on: self.last_updated_on,
            expiration_date: self.expiration_date,
            timestamp,
        }
    }
}

/// Second lookup tier and audit trail.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Newest row whose domain name matches exactly.
    async fn find_latest(&self, domain_name: &str) -> Result<Option<LookupRecord>, WhoisError>;

    /// Append one row for `domain_name`; the store assigns id and timestamp.
    async fn append(&self, domain_name: &str, result: &LookupResult) -> Result<LookupRecord, WhoisError>;

    /// Release connections. Called once at shutdown.
    async fn close(&self);
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `config.database_url` and
    /// run migrations.
    pub async fn connect(config: &Config) -> Result<Self, WhoisError> {
        info!("Opening lookup store at: {}", config.database_url);

        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;

        info!("Lookup store initialized successfully");
        Ok(Self { pool })
    }

    /// Open an in-memory database (for testing)
    pub async fn open_in_memory() -> Result<Self, WhoisError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // A single connection, otherwise each one sees its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), WhoisError> {
        debug!("Running lookup store migrations...");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn count(&self, domain_name: &str) -> Result<i64, WhoisError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM domain_lookups WHERE domain_name = ?")
            .bind(domain_name)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn find_latest(&self, domain_name: &str) -> Result<Option<LookupRecord>, WhoisError> {
        let record = sqlx::query_as::<_, LookupRecord>(
            "SELECT * FROM domain_lookups WHERE domain_name = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(domain_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn append(&self, domain_name: &str, result: &LookupResult) -> Result<LookupRecord, WhoisError> {
        let record = sqlx::query_as::<_, LookupRecord>(
            r#"
            INSERT INTO domain_lookups
                (domain_name, status, registrar, name_servers,
                 created_on, last_updated_on, expiration_date)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(domain_name)
        .bind(&result.status)
        .bind(&result.registrar)
        .bind(result.name_servers.to_joined())
        .bind(&result.created_on)
        .bind(&result.last_updated_on)
        .bind(&result.expiration_date)
        .fetch_one(&self.pool)
        .await?;

        debug!("Appended lookup row {} for {}", record.id, domain_name);
        Ok(record)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
