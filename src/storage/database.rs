//! SQLite store with migrations
//!
//! Alert records are kept one row per record, with the full record as JSON
//! next to the columns used for filtering. The metrics snapshot is a single row.

use crate::error::{Result, VigiaError};
use crate::ledger::{parse_date, AlertRecord, DATE_FORMAT};
use crate::metrics::MetricsState;
use crate::storage::AlertStore;
use chrono::{NaiveDate, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// `AlertStore` backed by a pooled SQLite database
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Open (or create) the database and bring its schema up to date
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VigiaError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);

        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| VigiaError::Storage(format!("Failed to create connection pool: {}", e)))?;

        {
            let conn = pool
                .get()
                .map_err(|e| VigiaError::Storage(format!("Failed to get connection: {}", e)))?;

            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let store = Self { pool };
        store.migrate()?;

        tracing::debug!("Opened alert store at {}", db_path.display());
        Ok(store)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| VigiaError::Storage(format!("Failed to get connection: {}", e)))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.get_conn()?;

        let alert_count: i64 = conn.query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))?;
        let partition_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT partition_date) FROM alerts",
            [],
            |row| row.get(0),
        )?;
        let suppressed_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM alerts WHERE suppressed = 1",
            [],
            |row| row.get(0),
        )?;
        let metrics_saved_at: Option<String> = conn
            .query_row(
                "SELECT saved_at FROM metrics_snapshot WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(StoreStats {
            alert_count: alert_count as usize,
            partition_count: partition_count as usize,
            suppressed_count: suppressed_count as usize,
            metrics_saved_at,
        })
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

impl AlertStore for SqliteStore {
    fn save_partition(&self, date: NaiveDate, records: &[AlertRecord]) -> Result<()> {
        let key = date_key(date);
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM alerts WHERE partition_date = ?1", params![key])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO alerts
                    (id, partition_date, seq, fingerprint, source_handle, tier, suppressed, processed_at, record)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for (seq, record) in records.iter().enumerate() {
                let json = serde_json::to_string(record).map_err(|e| VigiaError::Json {
                    source: e,
                    context: format!("Failed to serialize alert {}", record.id),
                })?;
                stmt.execute(params![
                    record.id,
                    key,
                    seq as i64,
                    record.fingerprint.as_str(),
                    record.item.source_handle,
                    record.tier().as_str(),
                    record.suppressed,
                    record.processed_at.to_rfc3339(),
                    json,
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!("Saved partition {} ({} records)", key, records.len());
        Ok(())
    }

    fn load_partition(&self, date: NaiveDate) -> Result<Vec<AlertRecord>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT record FROM alerts WHERE partition_date = ?1 ORDER BY seq")?;
        let rows = stmt.query_map(params![date_key(date)], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            let json = row?;
            let record = serde_json::from_str(&json).map_err(|e| VigiaError::Json {
                source: e,
                context: format!("Failed to deserialize alert in partition {}", date),
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn partition_dates(&self) -> Result<Vec<NaiveDate>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT partition_date FROM alerts ORDER BY partition_date")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut dates = Vec::new();
        for row in rows {
            dates.push(parse_date(&row?)?);
        }
        Ok(dates)
    }

    fn purge_before(&self, date: NaiveDate) -> Result<usize> {
        let conn = self.get_conn()?;
        let removed = conn.execute(
            "DELETE FROM alerts WHERE partition_date < ?1",
            params![date_key(date)],
        )?;
        if removed > 0 {
            tracing::info!("Purged {} stored alerts older than {}", removed, date);
        }
        Ok(removed)
    }

    fn save_metrics(&self, state: &MetricsState) -> Result<()> {
        let json = serde_json::to_string(state).map_err(|e| VigiaError::Json {
            source: e,
            context: "Failed to serialize metrics snapshot".to_string(),
        })?;
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO metrics_snapshot (id, state, saved_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET state = excluded.state, saved_at = excluded.saved_at",
            params![json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn load_metrics(&self) -> Result<Option<MetricsState>> {
        let conn = self.get_conn()?;
        let json: Option<String> = conn
            .query_row("SELECT state FROM metrics_snapshot WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        json.map(|json| {
            serde_json::from_str(&json).map_err(|e| VigiaError::Json {
                source: e,
                context: "Failed to deserialize metrics snapshot".to_string(),
            })
        })
        .transpose()
    }
}

/// Store statistics
#[derive(Debug)]
pub struct StoreStats {
    pub alert_count: usize,
    pub partition_count: usize,
    pub suppressed_count: usize,
    pub metrics_saved_at: Option<String>,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    CREATE TABLE alerts (
        id TEXT PRIMARY KEY,
        partition_date TEXT NOT NULL,
        seq INTEGER NOT NULL,
        fingerprint TEXT NOT NULL,
        source_handle TEXT NOT NULL,
        tier TEXT NOT NULL,
        suppressed BOOLEAN NOT NULL,
        processed_at TEXT NOT NULL,
        record TEXT NOT NULL  -- JSON AlertRecord
    );

    CREATE INDEX idx_alerts_partition ON alerts(partition_date, seq);
    CREATE INDEX idx_alerts_fingerprint ON alerts(fingerprint);
    CREATE INDEX idx_alerts_tier ON alerts(tier);

    CREATE TABLE metrics_snapshot (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        state TEXT NOT NULL,  -- JSON MetricsState
        saved_at TEXT NOT NULL
    );
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");

        let _store = SqliteStore::new(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let store = SqliteStore::new(&db_path).unwrap();
        let conn = store.get_conn().unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.len() as i32);
        drop(conn);

        // Reopening does not reapply
        let _again = SqliteStore::new(&db_path).unwrap();
    }

    #[test]
    fn test_schema_exists() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::new(&temp_dir.path().join("test.db")).unwrap();
        let conn = store.get_conn().unwrap();

        for table in ["alerts", "metrics_snapshot"] {
            let count: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::new(&temp_dir.path().join("test.db")).unwrap();

        assert!(store.load_metrics().unwrap().is_none());
        assert!(store.partition_dates().unwrap().is_empty());

        let stats = store.stats().unwrap();
        assert_eq!(stats.alert_count, 0);
        assert!(stats.metrics_saved_at.is_none());
    }
}
