use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::billing::{ChangeEvent, ChangeHistory, Enterprise, EnterpriseSnapshot, TrackedAttribute};
use crate::error::{BillingError, BillingResult};

#[derive(Debug, Clone, PartialEq)]
pub struct EnterpriseVersion {
    pub id: i64,
    pub enterprise_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub changed_attributes: Vec<String>,
    pub object: Value,
}

#[derive(Debug, Clone)]
pub struct NewEnterpriseVersion<'a> {
    pub enterprise_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub changed_attributes: &'a [&'a str],
    pub object: &'a EnterpriseSnapshot,
}

pub async fn insert_version(
    pool: &PgPool,
    input: NewEnterpriseVersion<'_>,
) -> BillingResult<EnterpriseVersion> {
    let object = serde_json::to_value(input.object).map_err(|source| {
        BillingError::CorruptSnapshot {
            enterprise_id: input.enterprise_id,
            source,
        }
    })?;
    let changed: Vec<String> = input
        .changed_attributes
        .iter()
        .map(|name| name.to_string())
        .collect();

    let row = sqlx::query(
        r#"
        INSERT INTO enterprise_versions (
            enterprise_id,
            occurred_at,
            changed_attributes,
            object
        ) VALUES ($1, $2, $3, $4)
        RETURNING id, enterprise_id, occurred_at, changed_attributes, object
        "#,
    )
    .bind(input.enterprise_id)
    .bind(input.occurred_at)
    .bind(changed)
    .bind(object)
    .fetch_one(pool)
    .await?;

    Ok(map_row(&row))
}

/// Versions touching `attributes` with `from < occurred_at < to`, in
/// recording order within each instant.
pub async fn versions_between(
    pool: &PgPool,
    enterprise_id: i64,
    attributes: &[TrackedAttribute],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<EnterpriseVersion>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, enterprise_id, occurred_at, changed_attributes, object
        FROM enterprise_versions
        WHERE enterprise_id = $1
          AND changed_attributes && $2
          AND occurred_at > $3
          AND occurred_at < $4
        ORDER BY occurred_at ASC, id ASC
        "#,
    )
    .bind(enterprise_id)
    .bind(attribute_names(attributes))
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(map_row).collect())
}

/// First version touching `attributes` recorded strictly after `as_of`.
pub async fn next_version_after(
    pool: &PgPool,
    enterprise_id: i64,
    attributes: &[TrackedAttribute],
    as_of: DateTime<Utc>,
) -> Result<Option<EnterpriseVersion>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, enterprise_id, occurred_at, changed_attributes, object
        FROM enterprise_versions
        WHERE enterprise_id = $1
          AND changed_attributes && $2
          AND occurred_at > $3
        ORDER BY occurred_at ASC, id ASC
        LIMIT 1
        "#,
    )
    .bind(enterprise_id)
    .bind(attribute_names(attributes))
    .bind(as_of)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| map_row(&row)))
}

fn attribute_names(attributes: &[TrackedAttribute]) -> Vec<String> {
    attributes
        .iter()
        .map(|attribute| attribute.as_str().to_string())
        .collect()
}

fn map_row(row: &PgRow) -> EnterpriseVersion {
    EnterpriseVersion {
        id: row.get("id"),
        enterprise_id: row.get("enterprise_id"),
        occurred_at: row.get("occurred_at"),
        changed_attributes: row.get("changed_attributes"),
        object: row.get("object"),
    }
}

impl EnterpriseVersion {
    pub fn snapshot(&self) -> BillingResult<EnterpriseSnapshot> {
        serde_json::from_value(self.object.clone()).map_err(|source| BillingError::CorruptSnapshot {
            enterprise_id: self.enterprise_id,
            source,
        })
    }

    fn into_event(self) -> BillingResult<ChangeEvent> {
        let before = self.snapshot()?;
        Ok(ChangeEvent {
            enterprise_id: self.enterprise_id,
            occurred_at: self.occurred_at,
            changed: self.changed_attributes,
            before,
        })
    }
}

/// key: billing-history-postgres -> version table reader
#[derive(Clone)]
pub struct PgChangeHistory {
    pool: PgPool,
}

impl PgChangeHistory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChangeHistory for PgChangeHistory {
    async fn changes_between(
        &self,
        enterprise_id: i64,
        attributes: &[TrackedAttribute],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BillingResult<Vec<ChangeEvent>> {
        versions_between(&self.pool, enterprise_id, attributes, from, to)
            .await
            .map_err(|err| history_unavailable(enterprise_id, err))?
            .into_iter()
            .map(EnterpriseVersion::into_event)
            .collect()
    }

    async fn reconstruct(
        &self,
        enterprise: &Enterprise,
        as_of: DateTime<Utc>,
    ) -> BillingResult<EnterpriseSnapshot> {
        let next = next_version_after(&self.pool, enterprise.id, &TrackedAttribute::ALL, as_of)
            .await
            .map_err(|err| history_unavailable(enterprise.id, err))?;

        match next {
            Some(version) => version.snapshot(),
            None => Ok(enterprise.snapshot()),
        }
    }
}

fn history_unavailable(enterprise_id: i64, err: sqlx::Error) -> BillingError {
    BillingError::History {
        enterprise_id,
        reason: err.to_string(),
    }
}
