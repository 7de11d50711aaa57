//! Postgres-backed product store.

use crate::error::StoreError;
use crate::traits::ProductStore;
use async_trait::async_trait;
use rates_core::{BetterProduct, ComparisonResult, ProductBatch, Subscriber};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Row};
use std::time::Duration;
use tracing::{debug, info};

const MIGRATION_0001: &str = include_str!("../migrations/0001_init.sql");

/// Rows per `INSERT` statement. 13 binds per row keeps each statement far
/// below the 65535 bind-parameter limit.
const UPSERT_CHUNK: usize = 500;

const PRODUCT_COLUMNS: &str = "collected_at, product_type, fin_co_no, fin_prdt_cd, save_trm, \
     intr_rate_type, rsrv_type_nm, kor_co_nm, fin_prdt_nm, intr_rate, intr_rate2, \
     dcls_strt_day, spcl_cnd";

const UPSERT_CONFLICT: &str = " ON CONFLICT (fin_prdt_cd, save_trm, fin_co_no) DO UPDATE SET \
     collected_at = EXCLUDED.collected_at, \
     product_type = EXCLUDED.product_type, \
     intr_rate_type = EXCLUDED.intr_rate_type, \
     rsrv_type_nm = EXCLUDED.rsrv_type_nm, \
     kor_co_nm = EXCLUDED.kor_co_nm, \
     fin_prdt_nm = EXCLUDED.fin_prdt_nm, \
     intr_rate = EXCLUDED.intr_rate, \
     intr_rate2 = EXCLUDED.intr_rate2, \
     dcls_strt_day = EXCLUDED.dcls_strt_day, \
     spcl_cnd = EXCLUDED.spcl_cnd";

/// Connection and naming settings for [`PgProductStore`].
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Connection URL including credentials
    pub database_url: String,
    /// Products table
    pub products_table: String,
    /// Subscribers table
    pub subscribers_table: String,
    /// Comparison procedure
    pub comparison_procedure: String,
    /// Pool size
    pub max_connections: u32,
    /// Time to wait for a pooled connection
    pub acquire_timeout: Duration,
}

impl StoreSettings {
    /// Settings with the default table and procedure names.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            products_table: "finance_data".to_string(),
            subscribers_table: "user_emails".to_string(),
            comparison_procedure: "get_new_better_products_v3".to_string(),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// Whether `name` is a plain, optionally schema-qualified SQL identifier.
///
/// Table and procedure names are spliced into statements, so only
/// `[A-Za-z_][A-Za-z0-9_]*` segments joined by a single dot are accepted.
pub fn is_sql_identifier(name: &str) -> bool {
    let segments: Vec<&str> = name.split('.').collect();
    segments.len() <= 2
        && segments.iter().all(|seg| {
            let mut chars = seg.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Product store on a Postgres pool.
#[derive(Clone)]
pub struct PgProductStore {
    pool: PgPool,
    settings: StoreSettings,
}

impl PgProductStore {
    /// Build a store whose pool connects on first use.
    ///
    /// Nothing touches the network here; the credential probe is the first
    /// statement to do so.
    pub fn connect_lazy(settings: StoreSettings) -> Result<Self, StoreError> {
        for name in [
            &settings.products_table,
            &settings.subscribers_table,
            &settings.comparison_procedure,
        ] {
            if !is_sql_identifier(name) {
                return Err(StoreError::Unreachable {
                    operation: "configure store",
                    message: format!("invalid SQL identifier: {name}"),
                });
            }
        }

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect_lazy(&settings.database_url)
            .map_err(|e| StoreError::classify("configure store", e))?;
        Ok(Self { pool, settings })
    }

    /// Create the products and subscribers tables if missing.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let sql = render_migration(&self.settings.products_table, &self.settings.subscribers_table);
        sqlx::raw_sql(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::classify("apply migrations", e))?;
        info!(
            products_table = %self.settings.products_table,
            subscribers_table = %self.settings.subscribers_table,
            "Schema up to date"
        );
        Ok(())
    }
}

fn render_migration(products_table: &str, subscribers_table: &str) -> String {
    MIGRATION_0001
        .replace("{products_table}", products_table)
        .replace("{subscribers_table}", subscribers_table)
}

/// `save_trm` is an `INTEGER` column.
fn term_binds(batch: &ProductBatch) -> Result<Vec<i32>, StoreError> {
    batch
        .rows()
        .iter()
        .map(|row| {
            i32::try_from(row.term_months).map_err(|_| StoreError::InvalidRow {
                operation: "upsert products",
                message: format!(
                    "term of {} months for {}/{} does not fit save_trm",
                    row.term_months, row.institution_id, row.product_code
                ),
            })
        })
        .collect()
}

#[async_trait]
impl ProductStore for PgProductStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn validate_credentials(&self) -> Result<(), StoreError> {
        let sql = format!("SELECT 1 FROM {} LIMIT 1", self.settings.products_table);
        sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::classify("credential probe", e))?;
        debug!(table = %self.settings.products_table, "Store credentials accepted");
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, batch), fields(rows = batch.len()))]
    async fn upsert_products(&self, batch: &ProductBatch) -> Result<u64, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let terms = term_binds(batch)?;

        // One transaction for the whole batch: a mid-batch failure leaves
        // the table as it was.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::classify("begin upsert", e))?;
        let mut written = 0u64;

        for (chunk, terms) in batch
            .rows()
            .chunks(UPSERT_CHUNK)
            .zip(terms.chunks(UPSERT_CHUNK))
        {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} ({}) ",
                self.settings.products_table, PRODUCT_COLUMNS
            ));
            qb.push_values(chunk.iter().zip(terms), |mut b, (row, term)| {
                b.push_bind(row.collected_at)
                    .push_bind(row.product_type.as_str())
                    .push_bind(row.institution_id.clone())
                    .push_bind(row.product_code.clone())
                    .push_bind(*term)
                    .push_bind(row.rate_type.clone())
                    .push_bind(row.reserve_type.clone())
                    .push_bind(row.institution_name.clone())
                    .push_bind(row.product_name.clone())
                    .push_bind(row.base_rate)
                    .push_bind(row.max_rate)
                    .push_bind(row.disclosure_start_day.clone())
                    .push_bind(row.special_conditions.clone());
            });
            qb.push(UPSERT_CONFLICT);

            let result = qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::classify("upsert products", e))?;
            written += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::classify("commit upsert", e))?;

        info!(
            table = %self.settings.products_table,
            rows = written,
            "Upserted products"
        );
        Ok(written)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn compare_products(&self) -> Result<ComparisonResult, StoreError> {
        let sql = format!(
            "SELECT to_jsonb(r) AS entry FROM {}() AS r",
            self.settings.comparison_procedure
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::classify("comparison procedure", e))?;

        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let value: Option<Value> =
                row.try_get("entry")
                    .map_err(|e| StoreError::Decode {
                        operation: "comparison procedure",
                        message: e.to_string(),
                    })?;
            values.extend(value);
        }

        let entries = decode_comparison(values)?;
        info!(
            procedure = %self.settings.comparison_procedure,
            entries = entries.len(),
            "Executed comparison procedure"
        );
        Ok(ComparisonResult::from_entries(entries))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn active_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        let sql = format!(
            "SELECT email, is_active FROM {} WHERE is_active = TRUE",
            self.settings.subscribers_table
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::classify("subscriber query", e))?;

        rows.iter()
            .map(|row| {
                let email: Option<String> = row.try_get("email")?;
                let is_active: bool = row.try_get("is_active")?;
                Ok(Subscriber::new(email.unwrap_or_default(), is_active))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| StoreError::Decode {
                operation: "subscriber query",
                message: e.to_string(),
            })
    }
}

/// Decode the rows returned by the comparison procedure.
///
/// A set-returning procedure yields one JSON object per row. A procedure
/// returning a single JSON value is wrapped by `to_jsonb` into an object with
/// one key; that wrapper is unwrapped. `null` values are skipped.
pub fn decode_comparison(values: Vec<Value>) -> Result<Vec<BetterProduct>, StoreError> {
    let mut entries = Vec::new();
    for value in values {
        collect_entries(value, &mut entries)?;
    }
    Ok(entries)
}

fn collect_entries(value: Value, out: &mut Vec<BetterProduct>) -> Result<(), StoreError> {
    match value {
        Value::Null => Ok(()),
        Value::Array(items) => {
            for item in items {
                collect_entries(item, out)?;
            }
            Ok(())
        }
        Value::Object(map)
            if map.len() == 1
                && map
                    .values()
                    .all(|v| v.is_array() || v.is_null() || v.is_object()) =>
        {
            for inner in map.into_iter().map(|(_, v)| v) {
                collect_entries(inner, out)?;
            }
            Ok(())
        }
        object @ Value::Object(_) => {
            let entry = serde_json::from_value(object).map_err(|e| StoreError::Decode {
                operation: "comparison procedure",
                message: e.to_string(),
            })?;
            out.push(entry);
            Ok(())
        }
        other => Err(StoreError::Decode {
            operation: "comparison procedure",
            message: format!("unexpected value: {other}"),
        }),
    }
}
