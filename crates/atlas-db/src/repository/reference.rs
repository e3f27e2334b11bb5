//! # Reference Dataset Repository
//!
//! Bulk readers and sync-time writers for the backend-owned reference
//! datasets: categories, product types, tax rates, discounts, and
//! calculation settings.
//!
//! ## Access Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ReferenceCache ──── all_*() ────────────► full dataset, read once      │
//! │                                            per process per dataset      │
//! │                                                                         │
//! │  SyncOrchestrator ── replace_*() ────────► DELETE + INSERT inside one   │
//! │                                            transaction: a reader sees   │
//! │                                            the old rows or the new      │
//! │                                            rows, never a torn mix       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There are deliberately no point-read queries here: the cache serves point
//! lookups from its in-memory index, and hydrates it with one full read.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use atlas_core::types::{
    CalculationSettings, Category, DiscountDefinition, ProductType, TaxRate,
};

use crate::error::{DbError, DbResult};

/// Repository for reference dataset storage.
#[derive(Debug, Clone)]
pub struct ReferenceRepository {
    pool: SqlitePool,
}

// =============================================================================
// Row Types
// =============================================================================
// Discounts need a row type of their own: the enum tags and id lists are
// stored as TEXT and decoded here, so a corrupt row surfaces as a DbError
// instead of a silent wrong answer.

#[derive(sqlx::FromRow)]
struct DiscountRow {
    id: String,
    name: String,
    discount_type: String,
    scope: String,
    value: i64,
    min_purchase_amount: i64,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    is_active: bool,
    applicable_product_ids: String,
    applicable_category_ids: String,
    buy_quantity: Option<i64>,
    get_quantity: Option<i64>,
    stackable: bool,
}

impl DiscountRow {
    fn into_definition(self) -> DbResult<DiscountDefinition> {
        let corrupt = |reason: &dyn std::fmt::Display| DbError::corrupt("discounts", reason);

        Ok(DiscountDefinition {
            discount_type: self
                .discount_type
                .parse()
                .map_err(|e| corrupt(&e))?,
            scope: self.scope.parse().map_err(|e| corrupt(&e))?,
            applicable_product_ids: serde_json::from_str(&self.applicable_product_ids)
                .map_err(|e| corrupt(&e))?,
            applicable_category_ids: serde_json::from_str(&self.applicable_category_ids)
                .map_err(|e| corrupt(&e))?,
            id: self.id,
            name: self.name,
            value: self.value,
            min_purchase_amount: self.min_purchase_amount,
            start_date: self.start_date,
            end_date: self.end_date,
            is_active: self.is_active,
            buy_quantity: self.buy_quantity,
            get_quantity: self.get_quantity,
            stackable: self.stackable,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: String,
    name: String,
    parent_id: Option<String>,
    is_active: bool,
}

#[derive(sqlx::FromRow)]
struct ProductTypeRow {
    id: String,
    name: String,
    exclude_from_discounts: bool,
    is_active: bool,
}

#[derive(sqlx::FromRow)]
struct TaxRateRow {
    id: String,
    name: String,
    rate_bps: i64,
    is_active: bool,
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    id: String,
    currency: String,
    price_includes_tax: bool,
    rounding_mode: String,
}

// =============================================================================
// Repository
// =============================================================================

impl ReferenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReferenceRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Bulk readers (cache hydration)
    // -------------------------------------------------------------------------

    pub async fn all_categories(&self) -> DbResult<Vec<Category>> {
        let rows: Vec<CategoryRow> =
            sqlx::query_as("SELECT id, name, parent_id, is_active FROM categories")
                .fetch_all(&self.pool)
                .await?;
        debug!(count = rows.len(), "Loaded categories");
        Ok(rows
            .into_iter()
            .map(|r| Category {
                id: r.id,
                name: r.name,
                parent_id: r.parent_id,
                is_active: r.is_active,
            })
            .collect())
    }

    pub async fn all_product_types(&self) -> DbResult<Vec<ProductType>> {
        let rows: Vec<ProductTypeRow> = sqlx::query_as(
            "SELECT id, name, exclude_from_discounts, is_active FROM product_types",
        )
        .fetch_all(&self.pool)
        .await?;
        debug!(count = rows.len(), "Loaded product types");
        Ok(rows
            .into_iter()
            .map(|r| ProductType {
                id: r.id,
                name: r.name,
                exclude_from_discounts: r.exclude_from_discounts,
                is_active: r.is_active,
            })
            .collect())
    }

    pub async fn all_tax_rates(&self) -> DbResult<Vec<TaxRate>> {
        let rows: Vec<TaxRateRow> =
            sqlx::query_as("SELECT id, name, rate_bps, is_active FROM tax_rates")
                .fetch_all(&self.pool)
                .await?;
        debug!(count = rows.len(), "Loaded tax rates");
        Ok(rows
            .into_iter()
            .map(|r| TaxRate {
                id: r.id,
                name: r.name,
                rate_bps: r.rate_bps,
                is_active: r.is_active,
            })
            .collect())
    }

    pub async fn all_discounts(&self) -> DbResult<Vec<DiscountDefinition>> {
        let rows: Vec<DiscountRow> = sqlx::query_as(
            "SELECT id, name, discount_type, scope, value, min_purchase_amount, \
             start_date, end_date, is_active, applicable_product_ids, \
             applicable_category_ids, buy_quantity, get_quantity, stackable \
             FROM discounts",
        )
        .fetch_all(&self.pool)
        .await?;
        debug!(count = rows.len(), "Loaded discounts");
        rows.into_iter().map(DiscountRow::into_definition).collect()
    }

    /// The single logical settings row, or None before first sync.
    pub async fn calculation_settings(&self) -> DbResult<Option<CalculationSettings>> {
        let row: Option<SettingsRow> = sqlx::query_as(
            "SELECT id, currency, price_includes_tax, rounding_mode \
             FROM calculation_settings LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| CalculationSettings {
            id: r.id,
            currency: r.currency,
            price_includes_tax: r.price_includes_tax,
            rounding_mode: r.rounding_mode,
        }))
    }

    // -------------------------------------------------------------------------
    // Sync writers (all-or-nothing per dataset)
    // -------------------------------------------------------------------------

    pub async fn replace_categories(&self, records: &[Category]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM categories").execute(&mut *tx).await?;
        for c in records {
            sqlx::query(
                "INSERT INTO categories (id, name, parent_id, is_active) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&c.id)
            .bind(&c.name)
            .bind(&c.parent_id)
            .bind(c.is_active)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(count = records.len(), "Replaced categories");
        Ok(())
    }

    pub async fn replace_product_types(&self, records: &[ProductType]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM product_types").execute(&mut *tx).await?;
        for t in records {
            sqlx::query(
                "INSERT INTO product_types (id, name, exclude_from_discounts, is_active) \
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&t.id)
            .bind(&t.name)
            .bind(t.exclude_from_discounts)
            .bind(t.is_active)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(count = records.len(), "Replaced product types");
        Ok(())
    }

    pub async fn replace_tax_rates(&self, records: &[TaxRate]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM tax_rates").execute(&mut *tx).await?;
        for t in records {
            sqlx::query(
                "INSERT INTO tax_rates (id, name, rate_bps, is_active) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&t.id)
            .bind(&t.name)
            .bind(t.rate_bps)
            .bind(t.is_active)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(count = records.len(), "Replaced tax rates");
        Ok(())
    }

    pub async fn replace_discounts(&self, records: &[DiscountDefinition]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM discounts").execute(&mut *tx).await?;
        for d in records {
            let product_ids = serde_json::to_string(&d.applicable_product_ids)
                .map_err(|e| DbError::corrupt("discounts", &e))?;
            let category_ids = serde_json::to_string(&d.applicable_category_ids)
                .map_err(|e| DbError::corrupt("discounts", &e))?;
            sqlx::query(
                "INSERT INTO discounts (id, name, discount_type, scope, value, \
                 min_purchase_amount, start_date, end_date, is_active, \
                 applicable_product_ids, applicable_category_ids, buy_quantity, \
                 get_quantity, stackable) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )
            .bind(&d.id)
            .bind(&d.name)
            .bind(d.discount_type.as_str())
            .bind(d.scope.as_str())
            .bind(d.value)
            .bind(d.min_purchase_amount)
            .bind(d.start_date)
            .bind(d.end_date)
            .bind(d.is_active)
            .bind(product_ids)
            .bind(category_ids)
            .bind(d.buy_quantity)
            .bind(d.get_quantity)
            .bind(d.stackable)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(count = records.len(), "Replaced discounts");
        Ok(())
    }

    pub async fn replace_calculation_settings(
        &self,
        settings: &CalculationSettings,
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM calculation_settings").execute(&mut *tx).await?;
        sqlx::query(
            "INSERT INTO calculation_settings (id, currency, price_includes_tax, rounding_mode) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&settings.id)
        .bind(&settings.currency)
        .bind(settings.price_includes_tax)
        .bind(&settings.rounding_mode)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        debug!("Replaced calculation settings");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Sync cursors
    // -------------------------------------------------------------------------

    /// Cursor for delta syncs. None means the dataset has never synced and
    /// the next pull must be a full one.
    pub async fn last_synced_at(&self, dataset: &str) -> DbResult<Option<DateTime<Utc>>> {
        let row: Option<(DateTime<Utc>,)> =
            sqlx::query_as("SELECT last_synced_at FROM sync_state WHERE dataset = ?1")
                .bind(dataset)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(at,)| at))
    }

    pub async fn set_last_synced_at(&self, dataset: &str, at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO sync_state (dataset, last_synced_at) VALUES (?1, ?2) \
             ON CONFLICT(dataset) DO UPDATE SET last_synced_at = excluded.last_synced_at",
        )
        .bind(dataset)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
