//! Cached ERP bearer tokens.

use super::models::CachedToken;
use super::Store;
use crate::DatabaseError;
use rusqlite::{params, OptionalExtension};

impl Store {
    /// Store or replace the token for a principal.
    pub fn save_token(&self, token: &CachedToken, now: i64) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO service_tokens (tenant_id, integration_id, principal, token, expires_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(tenant_id, integration_id, principal) DO UPDATE SET
                token = excluded.token,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
            params![
                token.tenant_id,
                token.integration_id,
                token.principal,
                token.token,
                token.expires_at,
                now,
            ],
        )?;
        Ok(())
    }

    /// Load the token cached for a principal, expired or not.
    pub fn find_token(
        &self,
        tenant_id: &str,
        integration_id: u32,
        principal: &str,
    ) -> Result<Option<CachedToken>, DatabaseError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT tenant_id, integration_id, principal, token, expires_at
             FROM service_tokens
             WHERE tenant_id = ?1 AND integration_id = ?2 AND principal = ?3",
            params![tenant_id, integration_id, principal],
            |row| {
                Ok(CachedToken {
                    tenant_id: row.get(0)?,
                    integration_id: row.get(1)?,
                    principal: row.get(2)?,
                    token: row.get(3)?,
                    expires_at: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(DatabaseError::from)
    }
}
