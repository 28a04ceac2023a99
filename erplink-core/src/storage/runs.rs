//! Append-only sync run log.
//!
//! A run is inserted as `running` and finalized exactly once. Triggers in the
//! schema reject any later update or delete.

use super::Store;
use crate::sync::models::{SyncRun, SyncRunStatus, SyncScope};
use crate::DatabaseError;
use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;
use uuid::Uuid;

const RUN_COLUMNS: &str =
    "run_id, tenant_id, scope, started_at, finished_at, status, details, error";

struct RawRun {
    run_id: String,
    tenant_id: String,
    scope: String,
    started_at: i64,
    finished_at: Option<i64>,
    status: String,
    details: Option<String>,
    error: Option<String>,
}

fn raw_run_from_row(row: &Row<'_>) -> rusqlite::Result<RawRun> {
    Ok(RawRun {
        run_id: row.get(0)?,
        tenant_id: row.get(1)?,
        scope: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        status: row.get(5)?,
        details: row.get(6)?,
        error: row.get(7)?,
    })
}

fn parse_json(text: Option<String>) -> Result<Option<Value>, DatabaseError> {
    text.map(|t| serde_json::from_str(&t))
        .transpose()
        .map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn encode_json(value: Option<&Value>) -> Result<Option<String>, DatabaseError> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DatabaseError::Serialization(e.to_string()))
}

impl TryFrom<RawRun> for SyncRun {
    type Error = DatabaseError;

    fn try_from(raw: RawRun) -> Result<Self, Self::Error> {
        let run_id = Uuid::parse_str(&raw.run_id)
            .map_err(|e| DatabaseError::Serialization(format!("run id: {}", e)))?;
        let scope = SyncScope::parse(&raw.scope)
            .ok_or_else(|| DatabaseError::Serialization(format!("unknown scope {}", raw.scope)))?;
        let status = SyncRunStatus::parse(&raw.status).ok_or_else(|| {
            DatabaseError::Serialization(format!("unknown run status {}", raw.status))
        })?;

        Ok(SyncRun {
            run_id,
            tenant_id: raw.tenant_id,
            scope,
            started_at: raw.started_at,
            finished_at: raw.finished_at,
            status,
            details: parse_json(raw.details)?,
            error: parse_json(raw.error)?,
        })
    }
}

impl Store {
    /// Open a new `running` sync run.
    pub fn start_sync_run(
        &self,
        tenant_id: &str,
        scope: SyncScope,
        started_at: i64,
    ) -> Result<SyncRun, DatabaseError> {
        let run = SyncRun {
            run_id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            scope,
            started_at,
            finished_at: None,
            status: SyncRunStatus::Running,
            details: None,
            error: None,
        };

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_runs (run_id, tenant_id, scope, started_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run.run_id.to_string(),
                run.tenant_id,
                run.scope.as_str(),
                run.started_at,
                run.status.as_str(),
            ],
        )?;

        Ok(run)
    }

    /// Finalize a running sync run.
    ///
    /// Fails with `RunAlreadyFinalized` if the run does not exist or has
    /// already been finalized.
    pub fn finish_sync_run(
        &self,
        run_id: Uuid,
        status: SyncRunStatus,
        details: Option<&Value>,
        error: Option<&Value>,
        finished_at: i64,
    ) -> Result<(), DatabaseError> {
        if status == SyncRunStatus::Running {
            return Err(DatabaseError::Other(
                "a sync run cannot be finalized as running".to_string(),
            ));
        }

        let details = encode_json(details)?;
        let error = encode_json(error)?;

        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE sync_runs
             SET finished_at = ?1, status = ?2, details = ?3, error = ?4
             WHERE run_id = ?5 AND finished_at IS NULL",
            params![finished_at, status.as_str(), details, error, run_id.to_string()],
        )?;

        if changed == 0 {
            return Err(DatabaseError::RunAlreadyFinalized(run_id.to_string()));
        }
        Ok(())
    }

    /// Load one sync run.
    pub fn get_sync_run(&self, run_id: Uuid) -> Result<Option<SyncRun>, DatabaseError> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM sync_runs WHERE run_id = ?1", RUN_COLUMNS),
                [run_id.to_string()],
                raw_run_from_row,
            )
            .optional()?;
        raw.map(SyncRun::try_from).transpose()
    }

    /// Most recent sync runs of a tenant, newest first.
    pub fn list_sync_runs(&self, tenant_id: &str, limit: usize) -> Result<Vec<SyncRun>, DatabaseError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sync_runs WHERE tenant_id = ?1
             ORDER BY started_at DESC, rowid DESC LIMIT ?2",
            RUN_COLUMNS
        ))?;
        let raws = stmt
            .query_map(params![tenant_id, limit as i64], raw_run_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(SyncRun::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_lifecycle() {
        let store = Store::in_memory().unwrap();
        let run = store.start_sync_run("t1", SyncScope::Items, 100).unwrap();
        assert_eq!(run.status, SyncRunStatus::Running);

        store
            .finish_sync_run(run.run_id, SyncRunStatus::Ok, Some(&json!({"count": 2})), None, 110)
            .unwrap();

        let stored = store.get_sync_run(run.run_id).unwrap().unwrap();
        assert_eq!(stored.scope, SyncScope::Items);
        assert_eq!(stored.status, SyncRunStatus::Ok);
        assert_eq!(stored.finished_at, Some(110));
        assert_eq!(stored.details, Some(json!({"count": 2})));
        assert!(stored.error.is_none());
    }

    #[test]
    fn run_is_finalized_exactly_once() {
        let store = Store::in_memory().unwrap();
        let run = store.start_sync_run("t1", SyncScope::Customers, 100).unwrap();
        store
            .finish_sync_run(
                run.run_id,
                SyncRunStatus::Error,
                None,
                Some(&json!({"kind": "transport"})),
                101,
            )
            .unwrap();

        let second = store.finish_sync_run(run.run_id, SyncRunStatus::Ok, None, None, 102);
        assert!(matches!(second, Err(DatabaseError::RunAlreadyFinalized(_))));

        let stored = store.get_sync_run(run.run_id).unwrap().unwrap();
        assert_eq!(stored.status, SyncRunStatus::Error);
        assert_eq!(stored.finished_at, Some(101));
    }

    #[test]
    fn finalized_runs_reject_direct_updates_and_deletes() {
        let store = Store::in_memory().unwrap();
        let run = store.start_sync_run("t1", SyncScope::Items, 100).unwrap();
        store
            .finish_sync_run(run.run_id, SyncRunStatus::Ok, None, None, 101)
            .unwrap();

        let conn = store.conn().unwrap();
        assert!(conn
            .execute(
                "UPDATE sync_runs SET status = 'error' WHERE run_id = ?1",
                [run.run_id.to_string()],
            )
            .is_err());
        assert!(conn
            .execute("DELETE FROM sync_runs WHERE run_id = ?1", [run.run_id.to_string()])
            .is_err());
    }

    #[test]
    fn corrupt_status_is_reported() {
        let store = Store::in_memory().unwrap();
        let run_id = Uuid::new_v4();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO sync_runs (run_id, tenant_id, scope, started_at, status)
                 VALUES (?1, 't1', 'items', 100, 'paused')",
                [run_id.to_string()],
            )
            .unwrap();

        assert!(matches!(
            store.get_sync_run(run_id),
            Err(DatabaseError::Serialization(_))
        ));
        assert!(store.list_sync_runs("t1", 10).is_err());
    }

    #[test]
    fn unknown_run_cannot_be_finalized() {
        let store = Store::in_memory().unwrap();
        let result = store.finish_sync_run(Uuid::new_v4(), SyncRunStatus::Ok, None, None, 1);
        assert!(matches!(result, Err(DatabaseError::RunAlreadyFinalized(_))));
    }

    #[test]
    fn runs_cannot_be_finalized_as_running() {
        let store = Store::in_memory().unwrap();
        let run = store.start_sync_run("t1", SyncScope::Items, 100).unwrap();
        assert!(store
            .finish_sync_run(run.run_id, SyncRunStatus::Running, None, None, 101)
            .is_err());
    }

    #[test]
    fn list_is_newest_first_and_tenant_scoped() {
        let store = Store::in_memory().unwrap();
        store.start_sync_run("t1", SyncScope::Items, 100).unwrap();
        store.start_sync_run("t1", SyncScope::Inventories, 200).unwrap();
        store.start_sync_run("t2", SyncScope::Items, 300).unwrap();

        let runs = store.list_sync_runs("t1", 10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].scope, SyncScope::Inventories);
        assert_eq!(runs[1].scope, SyncScope::Items);

        assert_eq!(store.list_sync_runs("t1", 1).unwrap().len(), 1);
    }
}
