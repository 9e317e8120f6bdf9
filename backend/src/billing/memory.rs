//! In-process implementations of the billing collaborators. Used by the test
//! suites and handy for dry runs against hand-built fixtures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{BillingError, BillingResult};

use super::adapters::{BillItemStore, ChangeHistory, EligibilitySource, TurnoverSource};
use super::models::{
    BillItem, BillItemFields, ChangeEvent, Enterprise, EnterpriseSnapshot, Sells,
    TrackedAttribute,
};

#[derive(Default)]
pub struct InMemoryEnterprises {
    enterprises: Vec<Enterprise>,
}

impl InMemoryEnterprises {
    pub fn new(enterprises: Vec<Enterprise>) -> Self {
        Self { enterprises }
    }
}

#[async_trait]
impl EligibilitySource for InMemoryEnterprises {
    async fn eligible_enterprises(&self) -> BillingResult<Vec<Enterprise>> {
        Ok(self
            .enterprises
            .iter()
            .filter(|enterprise| enterprise.sells != Sells::None)
            .cloned()
            .collect())
    }
}

/// Append-only change log kept in recording order.
#[derive(Default)]
pub struct InMemoryHistory {
    events: RwLock<Vec<ChangeEvent>>,
}

impl InMemoryHistory {
    pub fn record(
        &self,
        enterprise_id: i64,
        occurred_at: DateTime<Utc>,
        changed: &[&str],
        before: EnterpriseSnapshot,
    ) {
        self.events.write().push(ChangeEvent {
            enterprise_id,
            occurred_at,
            changed: changed.iter().map(|name| name.to_string()).collect(),
            before,
        });
    }

    fn tracked_for(&self, enterprise_id: i64, attributes: &[TrackedAttribute]) -> Vec<ChangeEvent> {
        let mut events: Vec<ChangeEvent> = self
            .events
            .read()
            .iter()
            .filter(|event| event.enterprise_id == enterprise_id && event.touches(attributes))
            .cloned()
            .collect();
        events.sort_by_key(|event| event.occurred_at);
        events
    }
}

#[async_trait]
impl ChangeHistory for InMemoryHistory {
    async fn changes_between(
        &self,
        enterprise_id: i64,
        attributes: &[TrackedAttribute],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BillingResult<Vec<ChangeEvent>> {
        Ok(self
            .tracked_for(enterprise_id, attributes)
            .into_iter()
            .filter(|event| event.occurred_at > from && event.occurred_at < to)
            .collect())
    }

    async fn reconstruct(
        &self,
        enterprise: &Enterprise,
        as_of: DateTime<Utc>,
    ) -> BillingResult<EnterpriseSnapshot> {
        Ok(self
            .tracked_for(enterprise.id, &TrackedAttribute::ALL)
            .into_iter()
            .find(|event| event.occurred_at > as_of)
            .map(|event| event.before)
            .unwrap_or_else(|| enterprise.snapshot()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedOrder {
    pub distributor_id: i64,
    pub completed_at: DateTime<Utc>,
    pub total_cents: i64,
}

#[derive(Default)]
pub struct InMemoryOrders {
    orders: RwLock<Vec<CompletedOrder>>,
}

impl InMemoryOrders {
    pub fn complete(&self, distributor_id: i64, completed_at: DateTime<Utc>, total_cents: i64) {
        self.orders.write().push(CompletedOrder {
            distributor_id,
            completed_at,
            total_cents,
        });
    }
}

#[async_trait]
impl TurnoverSource for InMemoryOrders {
    async fn turnover_for(
        &self,
        enterprise_id: i64,
        begins_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> BillingResult<i64> {
        Ok(self
            .orders
            .read()
            .iter()
            .filter(|order| {
                order.distributor_id == enterprise_id
                    && order.completed_at >= begins_at
                    && order.completed_at < ends_at
            })
            .map(|order| order.total_cents)
            .sum())
    }
}

#[derive(Default)]
pub struct InMemoryBillItems {
    items: RwLock<Vec<BillItem>>,
}

impl InMemoryBillItems {
    /// Every stored item in insertion order.
    pub fn all(&self) -> Vec<BillItem> {
        self.items.read().clone()
    }

    pub fn count(&self) -> usize {
        self.items.read().len()
    }
}

#[async_trait]
impl BillItemStore for InMemoryBillItems {
    async fn find_by_key(
        &self,
        enterprise_id: i64,
        begins_at: DateTime<Utc>,
    ) -> BillingResult<Option<BillItem>> {
        Ok(self
            .items
            .read()
            .iter()
            .find(|item| item.enterprise_id == enterprise_id && item.begins_at == begins_at)
            .cloned())
    }

    async fn create(&self, fields: BillItemFields) -> BillingResult<BillItem> {
        let mut items = self.items.write();
        let taken = items.iter().any(|item| {
            item.enterprise_id == fields.enterprise_id && item.begins_at == fields.begins_at
        });
        if taken {
            return Err(BillingError::DuplicateBillItem {
                enterprise_id: fields.enterprise_id,
                begins_at: fields.begins_at,
            });
        }

        let now = Utc::now();
        let item = BillItem {
            id: items.iter().map(|item| item.id).max().unwrap_or(0) + 1,
            enterprise_id: fields.enterprise_id,
            owner_id: fields.owner_id,
            begins_at: fields.begins_at,
            ends_at: fields.ends_at,
            sells: fields.sells,
            trial: fields.trial,
            turnover_cents: fields.turnover_cents,
            created_at: now,
            updated_at: now,
        };
        items.push(item.clone());
        Ok(item)
    }

    async fn update(&self, id: i64, fields: BillItemFields) -> BillingResult<BillItem> {
        let mut items = self.items.write();
        let item = items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(BillingError::NotFound(id))?;

        item.owner_id = fields.owner_id;
        item.ends_at = fields.ends_at;
        item.sells = fields.sells;
        item.trial = fields.trial;
        item.turnover_cents = fields.turnover_cents;
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn bill_items_for(
        &self,
        enterprise_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BillingResult<Vec<BillItem>> {
        let mut items: Vec<BillItem> = self
            .items
            .read()
            .iter()
            .filter(|item| {
                item.enterprise_id == enterprise_id && item.begins_at >= from && item.begins_at < to
            })
            .cloned()
            .collect();
        items.sort_by_key(|item| item.begins_at);
        Ok(items)
    }
}
