pub mod adapters;
pub mod memory;
pub mod models;
pub mod reconciliation;
pub mod scheduler;
pub mod segmenter;
pub mod service;
pub mod trial;
pub mod window;

pub use adapters::{BillItemStore, ChangeHistory, EligibilitySource, TurnoverSource};
pub use models::{
    AttributePeriod, BillItem, BillItemFields, BillItemRecord, BillingPeriod, ChangeEvent,
    Enterprise, EnterpriseSnapshot, Sells, TrackedAttribute, TrialWindow,
};
pub use reconciliation::{BillItemReconciler, ReconcileOutcome};
pub use scheduler::spawn as spawn_bill_items_scheduler;
pub use segmenter::PeriodSegmenter;
pub use service::{EnterpriseFailure, FailureStage, RunReport, UpdateBillItems};
pub use trial::{split_for_trial, TrialSlice};
pub use window::{EnterpriseWindow, RunWindow};
