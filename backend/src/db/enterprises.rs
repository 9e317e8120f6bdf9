use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};

use crate::billing::{EligibilitySource, Enterprise};
use crate::error::BillingResult;

#[derive(Debug, Clone, FromRow)]
struct EnterpriseRow {
    id: i64,
    owner_id: i64,
    sells: String,
    created_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    shop_trial_start_date: Option<DateTime<Utc>>,
}

/// key: billing-eligibility-postgres -> current sellers
///
/// The trial expiry is not stored; it is derived from the trial start and the
/// configured trial length.
#[derive(Clone)]
pub struct PgEnterprises {
    pool: PgPool,
    trial_length: Duration,
}

impl PgEnterprises {
    pub fn new(pool: PgPool, trial_length: Duration) -> Self {
        Self { pool, trial_length }
    }

    fn to_enterprise(&self, row: EnterpriseRow) -> BillingResult<Enterprise> {
        Ok(Enterprise {
            id: row.id,
            owner_id: row.owner_id,
            sells: row.sells.parse()?,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
            trial_start: row.shop_trial_start_date,
            trial_expiry: row
                .shop_trial_start_date
                .map(|started_at| started_at + self.trial_length),
        })
    }
}

#[async_trait]
impl EligibilitySource for PgEnterprises {
    async fn eligible_enterprises(&self) -> BillingResult<Vec<Enterprise>> {
        let rows = sqlx::query_as::<_, EnterpriseRow>(
            r#"
            SELECT
                id,
                owner_id,
                sells,
                created_at,
                deleted_at,
                shop_trial_start_date
            FROM enterprises
            WHERE sells IN ('own', 'any')
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| self.to_enterprise(row))
            .collect()
    }
}
