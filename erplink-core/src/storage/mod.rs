//! SQLite storage backend for devices, mirrored records and the sync log.

mod devices;
pub mod models;
mod records;
mod runs;
mod tokens;

pub use models::{CachedToken, StoredRecord};

use crate::sync::models::SyncScope;
use crate::DatabaseError;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Thread-safe local store.
///
/// Cloning is cheap; clones share the same connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (creating if needed) a database at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create a new in-memory store for testing
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS devices (
                tenant_id TEXT NOT NULL,
                integration_id INTEGER NOT NULL,
                serial TEXT NOT NULL,
                title TEXT,
                public_key_xml TEXT NOT NULL,
                cypher_from_server TEXT,
                iv_from_server TEXT,
                is_registered INTEGER NOT NULL DEFAULT 0,
                generation_version TEXT NOT NULL,
                lock_number TEXT,
                last_registered_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (tenant_id, integration_id)
            );

            CREATE TABLE IF NOT EXISTS sync_runs (
                run_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                scope TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                finished_at INTEGER,
                status TEXT NOT NULL DEFAULT 'running',
                details TEXT,
                error TEXT
            );

            CREATE TABLE IF NOT EXISTS service_tokens (
                tenant_id TEXT NOT NULL,
                integration_id INTEGER NOT NULL,
                principal TEXT NOT NULL,
                token TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (tenant_id, integration_id, principal)
            );

            CREATE INDEX IF NOT EXISTS idx_sync_runs_tenant_started
                ON sync_runs(tenant_id, started_at);

            CREATE TRIGGER IF NOT EXISTS sync_runs_immutable_once_finished
            BEFORE UPDATE ON sync_runs
            FOR EACH ROW WHEN OLD.finished_at IS NOT NULL
            BEGIN
                SELECT RAISE(ABORT, 'sync run already finalized');
            END;

            CREATE TRIGGER IF NOT EXISTS sync_runs_append_only
            BEFORE DELETE ON sync_runs
            BEGIN
                SELECT RAISE(ABORT, 'sync runs are append-only');
            END;",
        )?;

        for scope in SyncScope::ALL {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    tenant_id TEXT NOT NULL,
                    natural_key TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    last_synced_at INTEGER NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (tenant_id, natural_key)
                );",
                table = scope.table()
            ))?;
        }

        Ok(())
    }

    /// Lock and borrow the underlying connection
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn
            .lock()
            .map_err(|e| DatabaseError::LockPoisoned(e.to_string()))
    }
}
