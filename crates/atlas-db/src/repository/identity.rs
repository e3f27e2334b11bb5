//! # Terminal Identity Repository
//!
//! Single-row persistence for [`TerminalIdentity`].
//!
//! The identity is written in exactly two situations: a successful pairing
//! approval, and a successful background by-fingerprint refresh. Both go
//! through [`IdentityRepository::store`], which replaces the whole row in
//! one transaction, so a concurrent reader sees the old identity or the new
//! one, never an in-place mutation half applied.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use atlas_core::types::TerminalIdentity;

use crate::error::{DbError, DbResult};

/// Repository for the persisted terminal identity.
#[derive(Debug, Clone)]
pub struct IdentityRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    payload: String,
}

impl IdentityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        IdentityRepository { pool }
    }

    /// Loads the persisted identity, if this terminal has ever paired.
    pub async fn load(&self) -> DbResult<Option<TerminalIdentity>> {
        let row: Option<IdentityRow> =
            sqlx::query_as("SELECT payload FROM terminal_identity WHERE slot = 0")
                .fetch_optional(&self.pool)
                .await?;

        match row {
            None => Ok(None),
            Some(row) => serde_json::from_str(&row.payload)
                .map(Some)
                .map_err(|e| DbError::corrupt("terminal_identity", &e)),
        }
    }

    /// Atomically replaces the persisted identity.
    pub async fn store(&self, identity: &TerminalIdentity) -> DbResult<()> {
        let payload = serde_json::to_string(identity)
            .map_err(|e| DbError::corrupt("terminal_identity", &e))?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM terminal_identity").execute(&mut *tx).await?;
        sqlx::query(
            "INSERT INTO terminal_identity (slot, device_id, device_fingerprint, payload, updated_at) \
             VALUES (0, ?1, ?2, ?3, ?4)",
        )
        .bind(&identity.device_id)
        .bind(&identity.device_fingerprint)
        .bind(payload)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(device_id = %identity.device_id, "Stored terminal identity");
        Ok(())
    }

    /// Removes the persisted identity (unpair).
    pub async fn clear(&self) -> DbResult<()> {
        sqlx::query("DELETE FROM terminal_identity")
            .execute(&self.pool)
            .await?;
        debug!("Cleared terminal identity");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{DbConfig, Store};
    use atlas_core::types::OfflineLimits;

    fn identity(device_id: &str) -> TerminalIdentity {
        TerminalIdentity {
            device_id: device_id.into(),
            device_fingerprint: "fp-abc123".into(),
            tenant_id: "tenant-1".into(),
            tenant_slug: "demo-cafe".into(),
            location_id: "loc-1".into(),
            location_name: "Downtown".into(),
            signing_secret: "secret".into(),
            offline_limits: OfflineLimits::default(),
        }
    }

    #[tokio::test]
    async fn test_store_load_clear() {
        let repo = Store::open(DbConfig::in_memory()).await.unwrap().identity();

        assert!(repo.load().await.unwrap().is_none());

        let id = identity("dev-1");
        repo.store(&id).await.unwrap();
        assert_eq!(repo.load().await.unwrap(), Some(id));

        repo.clear().await.unwrap();
        assert!(repo.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_replaces_whole_row() {
        let repo = Store::open(DbConfig::in_memory()).await.unwrap().identity();

        repo.store(&identity("dev-1")).await.unwrap();
        repo.store(&identity("dev-2")).await.unwrap();

        let loaded = repo.load().await.unwrap().unwrap();
        assert_eq!(loaded.device_id, "dev-2");
    }
}
