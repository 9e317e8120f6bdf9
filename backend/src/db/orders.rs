use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::billing::TurnoverSource;
use crate::error::BillingResult;

pub async fn completed_total_cents(
    pool: &PgPool,
    distributor_id: i64,
    begins_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(total_cents), 0)::BIGINT
        FROM orders
        WHERE distributor_id = $1
          AND completed_at >= $2
          AND completed_at < $3
        "#,
    )
    .bind(distributor_id)
    .bind(begins_at)
    .bind(ends_at)
    .fetch_one(pool)
    .await
}

/// key: billing-turnover-postgres -> completed order sums
#[derive(Clone)]
pub struct PgOrders {
    pool: PgPool,
}

impl PgOrders {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TurnoverSource for PgOrders {
    async fn turnover_for(
        &self,
        enterprise_id: i64,
        begins_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> BillingResult<i64> {
        Ok(completed_total_cents(&self.pool, enterprise_id, begins_at, ends_at).await?)
    }
}
