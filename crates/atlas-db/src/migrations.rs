//! # Database Migrations
//!
//! Embedded SQL migrations for the local store.
//!
//! The `sqlx::migrate!()` macro embeds all SQL files from `migrations/` into
//! the binary at compile time; no runtime file access is needed. Applied
//! versions are tracked in the `_sqlx_migrations` table, so running them is
//! idempotent.
//!
//! ## Adding New Migrations
//! 1. Create a new file in `migrations/` with the next sequence number
//!    (`NNN_description.sql`)
//! 2. Never modify an existing migration, always add a new one

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the `migrations/` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Runs all pending migrations in order.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Running database migrations");
    MIGRATOR.run(pool).await?;
    info!("Migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        // Second run is a no-op, not an error
        run_migrations(&pool).await.unwrap();
    }
}
