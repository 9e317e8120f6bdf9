use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BillingResult;

use super::models::{
    BillItem, BillItemFields, ChangeEvent, Enterprise, EnterpriseSnapshot, TrackedAttribute,
};

/// key: billing-adapter-eligibility -> enterprises billed by a run
#[async_trait]
pub trait EligibilitySource: Send + Sync {
    async fn eligible_enterprises(&self) -> BillingResult<Vec<Enterprise>>;
}

/// key: billing-adapter-history -> audit trail access
///
/// Implementations must return events in chronological order and keep the
/// original recording order for events sharing an instant.
#[async_trait]
pub trait ChangeHistory: Send + Sync {
    /// Changes touching any of `attributes` with `from < occurred_at < to`.
    async fn changes_between(
        &self,
        enterprise_id: i64,
        attributes: &[TrackedAttribute],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BillingResult<Vec<ChangeEvent>>;

    /// Tracked state in effect at `as_of`. Changes recorded exactly at `as_of`
    /// are already applied; with no later tracked change this is the live state.
    async fn reconstruct(
        &self,
        enterprise: &Enterprise,
        as_of: DateTime<Utc>,
    ) -> BillingResult<EnterpriseSnapshot>;
}

/// key: billing-adapter-turnover -> completed order totals
#[async_trait]
pub trait TurnoverSource: Send + Sync {
    /// Sum of order totals in cents completed within `[begins_at, ends_at)`.
    async fn turnover_for(
        &self,
        enterprise_id: i64,
        begins_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> BillingResult<i64>;
}

/// key: billing-adapter-store -> bill item persistence
#[async_trait]
pub trait BillItemStore: Send + Sync {
    async fn find_by_key(
        &self,
        enterprise_id: i64,
        begins_at: DateTime<Utc>,
    ) -> BillingResult<Option<BillItem>>;

    async fn create(&self, fields: BillItemFields) -> BillingResult<BillItem>;

    async fn update(&self, id: i64, fields: BillItemFields) -> BillingResult<BillItem>;

    /// Items of one enterprise beginning within `[from, to)`, oldest first.
    async fn bill_items_for(
        &self,
        enterprise_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BillingResult<Vec<BillItem>>;
}
