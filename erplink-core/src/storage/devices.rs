//! Device record persistence.

use super::Store;
use crate::device::Device;
use crate::DatabaseError;
use rusqlite::{params, OptionalExtension, Row};

const DEVICE_COLUMNS: &str = "tenant_id, integration_id, serial, title, public_key_xml,
     cypher_from_server, iv_from_server, is_registered, generation_version,
     lock_number, last_registered_at, created_at, updated_at";

fn device_from_row(row: &Row<'_>) -> rusqlite::Result<Device> {
    Ok(Device {
        tenant_id: row.get(0)?,
        integration_id: row.get(1)?,
        serial: row.get(2)?,
        title: row.get(3)?,
        public_key_xml: row.get(4)?,
        cypher_from_server: row.get(5)?,
        iv_from_server: row.get(6)?,
        is_registered: row.get(7)?,
        generation_version: row.get(8)?,
        lock_number: row.get(9)?,
        last_registered_at: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

impl Store {
    /// Insert or overwrite the device for `(tenant_id, integration_id)`.
    ///
    /// The handshake fields are replaced; `generation_version` and
    /// `lock_number` survive re-registration because they are owned by the
    /// generation-info refresh. Returns the stored row.
    pub fn upsert_device(&self, device: &Device) -> Result<Device, DatabaseError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO devices (tenant_id, integration_id, serial, title, public_key_xml,
                                  cypher_from_server, iv_from_server, is_registered,
                                  generation_version, lock_number, last_registered_at,
                                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(tenant_id, integration_id) DO UPDATE SET
                serial = excluded.serial,
                title = COALESCE(excluded.title, devices.title),
                public_key_xml = excluded.public_key_xml,
                cypher_from_server = excluded.cypher_from_server,
                iv_from_server = excluded.iv_from_server,
                is_registered = excluded.is_registered,
                last_registered_at = excluded.last_registered_at,
                updated_at = excluded.updated_at",
            params![
                device.tenant_id,
                device.integration_id,
                device.serial,
                device.title,
                device.public_key_xml,
                device.cypher_from_server,
                device.iv_from_server,
                device.is_registered,
                device.generation_version,
                device.lock_number,
                device.last_registered_at,
                device.created_at,
                device.updated_at,
            ],
        )?;

        conn.query_row(
            &format!(
                "SELECT {} FROM devices WHERE tenant_id = ?1 AND integration_id = ?2",
                DEVICE_COLUMNS
            ),
            params![device.tenant_id, device.integration_id],
            device_from_row,
        )
        .map_err(DatabaseError::from)
    }

    /// Load the device for `(tenant_id, integration_id)`, registered or not.
    pub fn find_device(
        &self,
        tenant_id: &str,
        integration_id: u32,
    ) -> Result<Option<Device>, DatabaseError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM devices WHERE tenant_id = ?1 AND integration_id = ?2",
                DEVICE_COLUMNS
            ),
            params![tenant_id, integration_id],
            device_from_row,
        )
        .optional()
        .map_err(DatabaseError::from)
    }

    /// All devices of a tenant, ordered by integration id.
    pub fn list_devices(&self, tenant_id: &str) -> Result<Vec<Device>, DatabaseError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM devices WHERE tenant_id = ?1 ORDER BY integration_id",
            DEVICE_COLUMNS
        ))?;
        let devices = stmt
            .query_map([tenant_id], device_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(devices)
    }

    /// Record the ERP generation version and lock number for a device.
    ///
    /// Returns `false` if no such device exists.
    pub fn update_generation_info(
        &self,
        tenant_id: &str,
        integration_id: u32,
        generation_version: &str,
        lock_number: Option<&str>,
        now: i64,
    ) -> Result<bool, DatabaseError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE devices SET generation_version = ?1, lock_number = ?2, updated_at = ?3
             WHERE tenant_id = ?4 AND integration_id = ?5",
            params![generation_version, lock_number, now, tenant_id, integration_id],
        )?;
        Ok(changed > 0)
    }
}
