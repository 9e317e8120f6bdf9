use std::sync::Arc;

use async_trait::async_trait;
use bill_items::billing::memory::{
    InMemoryBillItems, InMemoryEnterprises, InMemoryHistory, InMemoryOrders,
};
use bill_items::billing::{
    BillItem, BillItemFields, BillItemStore, ChangeEvent, ChangeHistory, Enterprise,
    EnterpriseSnapshot, FailureStage, Sells, TrackedAttribute, UpdateBillItems,
};
use bill_items::error::{BillingError, BillingResult};
use chrono::{DateTime, Duration, TimeZone, Utc};

// key: bill-items-tests -> run windows, segmentation, reconciliation end to end

const ENTERPRISE_ID: i64 = 1;
const ORIGINAL_OWNER: i64 = 100;
const NEW_OWNER: i64 = 200;

fn start_of_july() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap()
}

fn day(n: i64) -> DateTime<Utc> {
    start_of_july() + Duration::days(n)
}

fn snapshot(owner_id: i64, sells: Sells) -> EnterpriseSnapshot {
    EnterpriseSnapshot { owner_id, sells }
}

fn supplier(created_at: DateTime<Utc>) -> Enterprise {
    Enterprise {
        id: ENTERPRISE_ID,
        owner_id: ORIGINAL_OWNER,
        sells: Sells::Any,
        created_at: Some(created_at),
        deleted_at: None,
        trial_start: None,
        trial_expiry: None,
    }
}

struct Harness {
    history: Arc<InMemoryHistory>,
    orders: Arc<InMemoryOrders>,
    store: Arc<InMemoryBillItems>,
    updater: UpdateBillItems,
}

fn harness(enterprises: Vec<Enterprise>) -> Harness {
    let history = Arc::new(InMemoryHistory::default());
    let orders = Arc::new(InMemoryOrders::default());
    let store = Arc::new(InMemoryBillItems::default());
    let updater = UpdateBillItems::new(
        Arc::new(InMemoryEnterprises::new(enterprises)),
        history.clone(),
        orders.clone(),
        store.clone(),
    );
    Harness {
        history,
        orders,
        store,
        updater,
    }
}

fn ranges(harness: &Harness) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    harness
        .store
        .all()
        .iter()
        .map(|item| (item.begins_at, item.ends_at))
        .collect()
}

#[tokio::test]
async fn first_of_month_processes_previous_month() {
    let harness = harness(vec![supplier(start_of_july() - Duration::days(31))]);

    let report = harness
        .updater
        .perform(start_of_july() + Duration::hours(3))
        .await
        .unwrap();

    assert_eq!(report.window.starts_at, Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap());
    assert_eq!(report.window.ends_at, start_of_july());
    assert_eq!(
        ranges(&harness),
        vec![(Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(), start_of_july())]
    );
}

#[tokio::test]
async fn other_days_process_current_month_until_previous_midnight() {
    let harness = harness(vec![supplier(start_of_july() - Duration::days(31))]);

    harness
        .updater
        .perform(day(1) + Duration::hours(3))
        .await
        .unwrap();

    assert_eq!(ranges(&harness), vec![(start_of_july(), day(1))]);
}

#[tokio::test]
async fn unchanged_enterprise_is_billed_from_start_of_month() {
    let harness = harness(vec![supplier(start_of_july() - Duration::days(31))]);

    let report = harness.updater.perform(day(28)).await.unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(ranges(&harness), vec![(start_of_july(), day(28))]);
    let item = &harness.store.all()[0];
    assert_eq!(item.owner_id, ORIGINAL_OWNER);
    assert_eq!(item.sells, Sells::Any);
    assert!(!item.trial);
}

#[tokio::test]
async fn sells_change_splits_the_month() {
    let mut enterprise = supplier(start_of_july() - Duration::days(31));
    enterprise.sells = Sells::Own;
    let harness = harness(vec![enterprise]);
    harness.history.record(
        ENTERPRISE_ID,
        day(10),
        &["sells"],
        snapshot(ORIGINAL_OWNER, Sells::Any),
    );

    harness.updater.perform(day(28)).await.unwrap();

    let items = harness.store.all();
    assert_eq!(ranges(&harness), vec![(start_of_july(), day(10)), (day(10), day(28))]);
    assert_eq!(items[0].sells, Sells::Any);
    assert_eq!(items[1].sells, Sells::Own);
}

#[tokio::test]
async fn owner_change_splits_the_month() {
    let mut enterprise = supplier(start_of_july() - Duration::days(31));
    enterprise.owner_id = NEW_OWNER;
    let harness = harness(vec![enterprise]);
    harness.history.record(
        ENTERPRISE_ID,
        day(10),
        &["owner_id"],
        snapshot(ORIGINAL_OWNER, Sells::Any),
    );

    harness.updater.perform(day(28)).await.unwrap();

    let items = harness.store.all();
    assert_eq!(ranges(&harness), vec![(start_of_july(), day(10)), (day(10), day(28))]);
    assert_eq!(items[0].owner_id, ORIGINAL_OWNER);
    assert_eq!(items[1].owner_id, NEW_OWNER);
}

#[tokio::test]
async fn other_attribute_change_does_not_split() {
    let harness = harness(vec![supplier(start_of_july() - Duration::days(31))]);
    harness.history.record(
        ENTERPRISE_ID,
        day(10),
        &["name"],
        snapshot(ORIGINAL_OWNER, Sells::Any),
    );

    harness.updater.perform(day(28)).await.unwrap();

    assert_eq!(ranges(&harness), vec![(start_of_july(), day(28))]);
}

#[tokio::test]
async fn changes_from_previous_month_are_ignored() {
    let mut enterprise = supplier(start_of_july() - Duration::days(31));
    enterprise.sells = Sells::Own;
    enterprise.owner_id = NEW_OWNER;
    let harness = harness(vec![enterprise]);
    harness.history.record(
        ENTERPRISE_ID,
        day(-20),
        &["sells"],
        snapshot(ORIGINAL_OWNER, Sells::Any),
    );
    harness.history.record(
        ENTERPRISE_ID,
        day(-10),
        &["owner_id"],
        snapshot(ORIGINAL_OWNER, Sells::Own),
    );

    harness.updater.perform(day(28)).await.unwrap();

    let items = harness.store.all();
    assert_eq!(ranges(&harness), vec![(start_of_july(), day(28))]);
    assert_eq!(items[0].owner_id, NEW_OWNER);
    assert_eq!(items[0].sells, Sells::Own);
}

#[tokio::test]
async fn enterprise_created_mid_month_begins_at_creation() {
    let harness = harness(vec![supplier(day(10))]);

    harness.updater.perform(day(28)).await.unwrap();

    assert_eq!(ranges(&harness), vec![(day(10), day(28))]);
}

#[tokio::test]
async fn enterprise_deleted_mid_month_ends_at_deletion() {
    let mut enterprise = supplier(start_of_july() - Duration::days(31));
    enterprise.deleted_at = Some(day(20));
    let harness = harness(vec![enterprise]);

    harness.updater.perform(day(28)).await.unwrap();

    assert_eq!(ranges(&harness), vec![(start_of_july(), day(20))]);
}

#[tokio::test]
async fn enterprise_outside_window_is_skipped_silently() {
    let mut gone = supplier(start_of_july() - Duration::days(60));
    gone.deleted_at = Some(start_of_july() - Duration::days(2));
    let harness = harness(vec![gone, Enterprise { id: 2, ..supplier(day(28)) }]);

    let report = harness.updater.perform(day(28)).await.unwrap();

    assert_eq!(report.skipped, 2);
    assert!(report.is_clean());
    assert_eq!(harness.store.count(), 0);
}

#[tokio::test]
async fn missing_creation_timestamp_skips_only_that_enterprise() {
    let broken = Enterprise {
        id: 2,
        created_at: None,
        ..supplier(start_of_july())
    };
    let harness = harness(vec![broken, supplier(start_of_july() - Duration::days(31))]);

    let report = harness.updater.perform(day(28)).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].enterprise_id, 2);
    assert_eq!(report.failures[0].stage, FailureStage::Window);
    assert_eq!(report.processed, 1);
    assert_eq!(harness.store.count(), 1);
}

/// History that is unreachable for one enterprise and delegates otherwise.
struct FlakyHistory {
    broken_enterprise: i64,
    inner: InMemoryHistory,
}

#[async_trait]
impl ChangeHistory for FlakyHistory {
    async fn changes_between(
        &self,
        enterprise_id: i64,
        attributes: &[TrackedAttribute],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BillingResult<Vec<ChangeEvent>> {
        if enterprise_id == self.broken_enterprise {
            return Err(BillingError::History {
                enterprise_id,
                reason: "version store offline".to_string(),
            });
        }
        self.inner
            .changes_between(enterprise_id, attributes, from, to)
            .await
    }

    async fn reconstruct(
        &self,
        enterprise: &Enterprise,
        as_of: DateTime<Utc>,
    ) -> BillingResult<EnterpriseSnapshot> {
        self.inner.reconstruct(enterprise, as_of).await
    }
}

#[tokio::test]
async fn history_failure_does_not_stop_other_enterprises() {
    let store = Arc::new(InMemoryBillItems::default());
    let updater = UpdateBillItems::new(
        Arc::new(InMemoryEnterprises::new(vec![
            Enterprise {
                id: 7,
                ..supplier(start_of_july() - Duration::days(31))
            },
            supplier(start_of_july() - Duration::days(31)),
        ])),
        Arc::new(FlakyHistory {
            broken_enterprise: 7,
            inner: InMemoryHistory::default(),
        }),
        Arc::new(InMemoryOrders::default()),
        store.clone(),
    );

    let report = updater.perform(day(28)).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].enterprise_id, 7);
    assert_eq!(report.failures[0].stage, FailureStage::History);
    assert_eq!(store.count(), 1);
    assert_eq!(store.all()[0].enterprise_id, ENTERPRISE_ID);
}

/// Store that refuses to insert one enterprise's item for one period start.
struct RejectingStore {
    rejected_enterprise: i64,
    rejected_begins_at: DateTime<Utc>,
    inner: InMemoryBillItems,
}

#[async_trait]
impl BillItemStore for RejectingStore {
    async fn find_by_key(
        &self,
        enterprise_id: i64,
        begins_at: DateTime<Utc>,
    ) -> BillingResult<Option<BillItem>> {
        self.inner.find_by_key(enterprise_id, begins_at).await
    }

    async fn create(&self, fields: BillItemFields) -> BillingResult<BillItem> {
        if fields.enterprise_id == self.rejected_enterprise
            && fields.begins_at == self.rejected_begins_at
        {
            return Err(BillingError::Db(sqlx::Error::PoolTimedOut));
        }
        self.inner.create(fields).await
    }

    async fn update(&self, id: i64, fields: BillItemFields) -> BillingResult<BillItem> {
        self.inner.update(id, fields).await
    }

    async fn bill_items_for(
        &self,
        enterprise_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BillingResult<Vec<BillItem>> {
        self.inner.bill_items_for(enterprise_id, from, to).await
    }
}

#[tokio::test]
async fn write_failure_abandons_enterprise_and_continues_run() {
    let history = Arc::new(InMemoryHistory::default());
    // Two periods for enterprise 7: [Jul 1, Jul 11) and [Jul 11, Jul 29).
    history.record(7, day(10), &["sells"], snapshot(ORIGINAL_OWNER, Sells::Any));
    let store = Arc::new(RejectingStore {
        rejected_enterprise: 7,
        rejected_begins_at: start_of_july(),
        inner: InMemoryBillItems::default(),
    });
    let updater = UpdateBillItems::new(
        Arc::new(InMemoryEnterprises::new(vec![
            Enterprise {
                id: 7,
                sells: Sells::Own,
                ..supplier(start_of_july() - Duration::days(31))
            },
            supplier(start_of_july() - Duration::days(31)),
        ])),
        history,
        Arc::new(InMemoryOrders::default()),
        store.clone(),
    );

    let report = updater.perform(day(28)).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].enterprise_id, 7);
    assert_eq!(report.failures[0].stage, FailureStage::Reconcile);
    assert_eq!(report.processed, 1);
    assert_eq!(report.created, 1);

    // The later period of enterprise 7 would have been accepted, but is never written.
    assert_eq!(store.inner.count(), 1);
    assert_eq!(store.inner.all()[0].enterprise_id, ENTERPRISE_ID);
    assert!(store
        .bill_items_for(7, start_of_july(), day(31))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn rerunning_the_same_day_updates_without_duplicating() {
    let harness = harness(vec![supplier(start_of_july() - Duration::days(31))]);
    harness.orders.complete(ENTERPRISE_ID, day(3), 1_000);

    let first = harness.updater.perform(day(10)).await.unwrap();
    harness.orders.complete(ENTERPRISE_ID, day(4), 500);
    let second = harness.updater.perform(day(10)).await.unwrap();

    assert_eq!(first.created, 1);
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 1);
    assert_eq!(harness.store.count(), 1);
    assert_eq!(harness.store.all()[0].turnover_cents, 1_500);
}

#[tokio::test]
async fn complex_history_produces_contiguous_bill_items() {
    // Live state after every change below: new owner, sells own, trial [8, 14).
    let enterprise = Enterprise {
        id: ENTERPRISE_ID,
        owner_id: NEW_OWNER,
        sells: Sells::Own,
        created_at: Some(day(2)),
        deleted_at: None,
        trial_start: Some(day(8)),
        trial_expiry: Some(day(14)),
    };
    let harness = harness(vec![enterprise]);

    let history = &harness.history;
    history.record(ENTERPRISE_ID, day(4), &["sells"], snapshot(ORIGINAL_OWNER, Sells::Any));
    history.record(ENTERPRISE_ID, day(6), &["owner_id"], snapshot(ORIGINAL_OWNER, Sells::Own));
    history.record(ENTERPRISE_ID, day(10), &["owner_id"], snapshot(NEW_OWNER, Sells::Own));
    history.record(ENTERPRISE_ID, day(12), &["sells"], snapshot(ORIGINAL_OWNER, Sells::Own));
    history.record(ENTERPRISE_ID, day(16), &["sells"], snapshot(ORIGINAL_OWNER, Sells::Any));
    history.record(ENTERPRISE_ID, day(18), &["owner_id"], snapshot(ORIGINAL_OWNER, Sells::Own));

    let totals = [1_256, 8_744, 5_000, 7_337, 2_246, 4_485, 9_345, 5_938, 4_723, 235];
    for (index, total) in totals.iter().enumerate() {
        let completed_day = 1 + 2 * index as i64;
        harness
            .orders
            .complete(ENTERPRISE_ID, day(completed_day), *total);
    }

    let report = harness.updater.perform(day(20)).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.created, 9);

    let items = harness.store.all();
    assert_eq!(items.len(), 9);
    assert_eq!(
        items.iter().map(|item| item.begins_at).collect::<Vec<_>>(),
        [2, 4, 6, 8, 10, 12, 14, 16, 18].map(day).to_vec()
    );
    assert_eq!(
        items.iter().map(|item| item.ends_at).collect::<Vec<_>>(),
        [4, 6, 8, 10, 12, 14, 16, 18, 20].map(day).to_vec()
    );
    assert_eq!(
        items.iter().map(|item| item.owner_id).collect::<Vec<_>>(),
        vec![
            ORIGINAL_OWNER,
            ORIGINAL_OWNER,
            NEW_OWNER,
            NEW_OWNER,
            ORIGINAL_OWNER,
            ORIGINAL_OWNER,
            ORIGINAL_OWNER,
            ORIGINAL_OWNER,
            NEW_OWNER,
        ]
    );
    assert_eq!(
        items.iter().map(|item| item.sells).collect::<Vec<_>>(),
        vec![
            Sells::Any,
            Sells::Own,
            Sells::Own,
            Sells::Own,
            Sells::Own,
            Sells::Any,
            Sells::Any,
            Sells::Own,
            Sells::Own,
        ]
    );
    assert_eq!(
        items.iter().map(|item| item.trial).collect::<Vec<_>>(),
        vec![false, false, false, true, true, true, false, false, false]
    );
    assert_eq!(
        items.iter().map(|item| item.turnover_cents).collect::<Vec<_>>(),
        totals[1..].to_vec()
    );

    let july = harness
        .store
        .bill_items_for(ENTERPRISE_ID, start_of_july(), day(31))
        .await
        .unwrap();
    assert_eq!(july, items);
}
