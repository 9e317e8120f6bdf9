use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::billing::{BillItem, BillItemFields, BillItemRecord, BillItemStore};
use crate::error::{BillingError, BillingResult};

const UNIQUE_VIOLATION: &str = "23505";

/// key: billing-store-postgres -> bill_items table
#[derive(Clone)]
pub struct PgBillItems {
    pool: PgPool,
}

impl PgBillItems {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillItemStore for PgBillItems {
    async fn find_by_key(
        &self,
        enterprise_id: i64,
        begins_at: DateTime<Utc>,
    ) -> BillingResult<Option<BillItem>> {
        let record = sqlx::query_as::<_, BillItemRecord>(
            "SELECT * FROM bill_items WHERE enterprise_id = $1 AND begins_at = $2",
        )
        .bind(enterprise_id)
        .bind(begins_at)
        .fetch_optional(&self.pool)
        .await?;

        record.map(BillItem::try_from).transpose()
    }

    async fn create(&self, fields: BillItemFields) -> BillingResult<BillItem> {
        let record = sqlx::query_as::<_, BillItemRecord>(
            r#"
            INSERT INTO bill_items (
                enterprise_id,
                owner_id,
                begins_at,
                ends_at,
                sells,
                trial,
                turnover_cents
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(fields.enterprise_id)
        .bind(fields.owner_id)
        .bind(fields.begins_at)
        .bind(fields.ends_at)
        .bind(fields.sells.as_str())
        .bind(fields.trial)
        .bind(fields.turnover_cents)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                BillingError::DuplicateBillItem {
                    enterprise_id: fields.enterprise_id,
                    begins_at: fields.begins_at,
                }
            }
            other => BillingError::Db(other),
        })?;

        BillItem::try_from(record)
    }

    async fn update(&self, id: i64, fields: BillItemFields) -> BillingResult<BillItem> {
        let record = sqlx::query_as::<_, BillItemRecord>(
            r#"
            UPDATE bill_items
            SET
                owner_id = $2,
                ends_at = $3,
                sells = $4,
                trial = $5,
                turnover_cents = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(fields.owner_id)
        .bind(fields.ends_at)
        .bind(fields.sells.as_str())
        .bind(fields.trial)
        .bind(fields.turnover_cents)
        .fetch_optional(&self.pool)
        .await?;

        let Some(record) = record else {
            return Err(BillingError::NotFound(id));
        };
        BillItem::try_from(record)
    }

    async fn bill_items_for(
        &self,
        enterprise_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BillingResult<Vec<BillItem>> {
        let records = sqlx::query_as::<_, BillItemRecord>(
            r#"
            SELECT * FROM bill_items
            WHERE enterprise_id = $1
              AND begins_at >= $2
              AND begins_at < $3
            ORDER BY begins_at
            "#,
        )
        .bind(enterprise_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(BillItem::try_from).collect()
    }
}
