use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

use super::adapters::{BillItemStore, ChangeHistory, EligibilitySource, TurnoverSource};
use super::models::{BillingPeriod, Enterprise};
use super::reconciliation::{BillItemReconciler, ReconcileOutcome};
use super::segmenter::PeriodSegmenter;
use super::trial::split_for_trial;
use super::window::{EnterpriseWindow, RunWindow};

/// Pipeline step an enterprise failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Window,
    History,
    Reconcile,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnterpriseFailure {
    pub enterprise_id: i64,
    pub stage: FailureStage,
    pub error: String,
}

/// key: billing-run-report -> what one run did
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub window: RunWindow,
    pub processed: usize,
    pub skipped: usize,
    pub created: usize,
    pub updated: usize,
    pub failures: Vec<EnterpriseFailure>,
}

impl RunReport {
    fn new(window: RunWindow) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            window,
            processed: 0,
            skipped: 0,
            created: 0,
            updated: 0,
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, enterprise_id: i64, stage: FailureStage, err: &BillingError) {
        self.failures.push(EnterpriseFailure {
            enterprise_id,
            stage,
            error: err.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// key: billing-service -> daily bill item run
#[derive(Clone)]
pub struct UpdateBillItems {
    eligibility: Arc<dyn EligibilitySource>,
    segmenter: PeriodSegmenter,
    reconciler: BillItemReconciler,
}

impl UpdateBillItems {
    pub fn new(
        eligibility: Arc<dyn EligibilitySource>,
        history: Arc<dyn ChangeHistory>,
        turnover: Arc<dyn TurnoverSource>,
        store: Arc<dyn BillItemStore>,
    ) -> Self {
        Self {
            eligibility,
            segmenter: PeriodSegmenter::new(history),
            reconciler: BillItemReconciler::new(turnover, store),
        }
    }

    /// Bills every eligible enterprise for the window implied by `now`. Only a
    /// failure to list enterprises aborts the run; anything else is recorded
    /// against the enterprise and the run moves on. A failed write abandons the
    /// enterprise's remaining periods; the next run rewrites them by key.
    pub async fn perform(&self, now: DateTime<Utc>) -> BillingResult<RunReport> {
        let window = RunWindow::at(now)?;
        let mut report = RunReport::new(window);
        let enterprises = self.eligibility.eligible_enterprises().await?;

        info!(
            run_id = %report.run_id,
            starts_at = %window.starts_at,
            ends_at = %window.ends_at,
            enterprises = enterprises.len(),
            "bill item run started"
        );

        'enterprises: for enterprise in &enterprises {
            let clamped = match window.clamp_to(enterprise) {
                Ok(Some(clamped)) => clamped,
                Ok(None) => {
                    report.skipped += 1;
                    continue;
                }
                Err(err) => {
                    warn!(?err, enterprise_id = enterprise.id, "skipping enterprise");
                    report.fail(enterprise.id, FailureStage::Window, &err);
                    continue;
                }
            };

            let periods = match self.billing_periods(enterprise, clamped).await {
                Ok(periods) => periods,
                Err(err) => {
                    error!(
                        ?err,
                        enterprise_id = enterprise.id,
                        "failed to reconstruct enterprise history"
                    );
                    report.fail(enterprise.id, FailureStage::History, &err);
                    continue;
                }
            };

            for period in &periods {
                match self.reconciler.reconcile(period).await {
                    Ok(ReconcileOutcome::Created(_)) => report.created += 1,
                    Ok(ReconcileOutcome::Updated(_)) => report.updated += 1,
                    Err(err) => {
                        error!(
                            ?err,
                            enterprise_id = enterprise.id,
                            begins_at = %period.begins_at,
                            "failed to write bill item"
                        );
                        report.fail(enterprise.id, FailureStage::Reconcile, &err);
                        continue 'enterprises;
                    }
                }
            }
            report.processed += 1;
        }

        info!(
            run_id = %report.run_id,
            processed = report.processed,
            skipped = report.skipped,
            created = report.created,
            updated = report.updated,
            failures = report.failures.len(),
            "bill item run finished"
        );
        Ok(report)
    }

    /// Attribute-stable, trial-split periods for `enterprise` over `window`,
    /// in chronological order.
    pub async fn billing_periods(
        &self,
        enterprise: &Enterprise,
        window: EnterpriseWindow,
    ) -> BillingResult<Vec<BillingPeriod>> {
        let trial = enterprise.trial_window();
        let mut periods = Vec::new();
        for segment in self.segmenter.segment(enterprise, window).await? {
            for slice in split_for_trial(segment.begins_at, segment.ends_at, trial) {
                periods.push(BillingPeriod {
                    enterprise_id: enterprise.id,
                    begins_at: slice.begins_at,
                    ends_at: slice.ends_at,
                    owner_id: segment.snapshot.owner_id,
                    sells: segment.snapshot.sells,
                    trial: slice.trial,
                });
            }
        }
        Ok(periods)
    }
}
