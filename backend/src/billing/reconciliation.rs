use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{BillingError, BillingResult};

use super::adapters::{BillItemStore, TurnoverSource};
use super::models::{BillItem, BillItemFields, BillingPeriod};

/// key: billing-reconciliation -> outcome of writing one period
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created(BillItem),
    Updated(BillItem),
}

impl ReconcileOutcome {
    pub fn bill_item(&self) -> &BillItem {
        match self {
            ReconcileOutcome::Created(item) | ReconcileOutcome::Updated(item) => item,
        }
    }
}

/// key: billing-reconciliation -> create-or-update keyed on (enterprise, begins_at)
#[derive(Clone)]
pub struct BillItemReconciler {
    turnover: Arc<dyn TurnoverSource>,
    store: Arc<dyn BillItemStore>,
}

impl BillItemReconciler {
    pub fn new(turnover: Arc<dyn TurnoverSource>, store: Arc<dyn BillItemStore>) -> Self {
        Self { turnover, store }
    }

    /// Writes `period` with its turnover. Rerunning with the same period
    /// overwrites the same row.
    pub async fn reconcile(&self, period: &BillingPeriod) -> BillingResult<ReconcileOutcome> {
        if period.begins_at >= period.ends_at {
            return Err(BillingError::InvalidRange {
                begins_at: period.begins_at,
                ends_at: period.ends_at,
            });
        }

        let turnover_cents = self
            .turnover
            .turnover_for(period.enterprise_id, period.begins_at, period.ends_at)
            .await?;
        let fields = BillItemFields::for_period(period, turnover_cents);

        match self
            .store
            .find_by_key(period.enterprise_id, period.begins_at)
            .await?
        {
            Some(existing) => {
                let item = self.store.update(existing.id, fields).await?;
                debug!(
                    enterprise_id = item.enterprise_id,
                    bill_item = item.id,
                    begins_at = %item.begins_at,
                    ends_at = %item.ends_at,
                    turnover_cents = item.turnover_cents,
                    "bill item updated"
                );
                Ok(ReconcileOutcome::Updated(item))
            }
            None => {
                let item = self.store.create(fields).await?;
                info!(
                    enterprise_id = item.enterprise_id,
                    bill_item = item.id,
                    begins_at = %item.begins_at,
                    ends_at = %item.ends_at,
                    trial = item.trial,
                    turnover_cents = item.turnover_cents,
                    "bill item created"
                );
                Ok(ReconcileOutcome::Created(item))
            }
        }
    }
}
