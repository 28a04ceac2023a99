//! Mirrored ERP record persistence.
//!
//! One table per scope, keyed by `(tenant_id, natural_key)`. Upserts replace
//! the whole payload; nothing here deletes records.

use super::models::StoredRecord;
use super::Store;
use crate::sync::models::SyncScope;
use crate::DatabaseError;
use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<(StoredRecord, String)> {
    let payload: String = row.get(2)?;
    Ok((
        StoredRecord {
            tenant_id: row.get(0)?,
            natural_key: row.get(1)?,
            payload: Value::Null,
            last_synced_at: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        },
        payload,
    ))
}

fn decode_payload((mut record, payload): (StoredRecord, String)) -> Result<StoredRecord, DatabaseError> {
    record.payload =
        serde_json::from_str(&payload).map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    Ok(record)
}

impl Store {
    /// Insert or fully replace one record by its natural key.
    pub fn upsert_record(
        &self,
        scope: SyncScope,
        tenant_id: &str,
        natural_key: &str,
        payload: &Value,
        synced_at: i64,
    ) -> Result<(), DatabaseError> {
        let payload =
            serde_json::to_string(payload).map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (tenant_id, natural_key, payload, last_synced_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?4)
                 ON CONFLICT(tenant_id, natural_key) DO UPDATE SET
                    payload = excluded.payload,
                    last_synced_at = excluded.last_synced_at,
                    updated_at = excluded.updated_at",
                scope.table()
            ),
            params![tenant_id, natural_key, payload, synced_at],
        )?;
        Ok(())
    }

    /// Load one record by natural key.
    pub fn get_record(
        &self,
        scope: SyncScope,
        tenant_id: &str,
        natural_key: &str,
    ) -> Result<Option<StoredRecord>, DatabaseError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT tenant_id, natural_key, payload, last_synced_at, created_at, updated_at
                     FROM {} WHERE tenant_id = ?1 AND natural_key = ?2",
                    scope.table()
                ),
                params![tenant_id, natural_key],
                record_from_row,
            )
            .optional()?;
        row.map(decode_payload).transpose()
    }

    /// All records of a scope for a tenant, ordered by natural key.
    pub fn list_records(
        &self,
        scope: SyncScope,
        tenant_id: &str,
    ) -> Result<Vec<StoredRecord>, DatabaseError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT tenant_id, natural_key, payload, last_synced_at, created_at, updated_at
             FROM {} WHERE tenant_id = ?1 ORDER BY natural_key",
            scope.table()
        ))?;
        let rows = stmt
            .query_map([tenant_id], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(decode_payload).collect()
    }

    /// Number of records of a scope for a tenant.
    pub fn count_records(&self, scope: SyncScope, tenant_id: &str) -> Result<usize, DatabaseError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE tenant_id = ?1", scope.table()),
            [tenant_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
