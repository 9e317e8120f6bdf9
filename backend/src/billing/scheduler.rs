use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration as TokioDuration};
use tracing::{debug, info, warn};

use super::service::{RunReport, UpdateBillItems};

/// key: bill-item-scheduler -> once-a-day trigger
pub fn spawn(updater: Arc<UpdateBillItems>, interval_secs: u64) -> JoinHandle<()> {
    let interval = TokioDuration::from_secs(interval_secs);

    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        let mut last_run = None;
        loop {
            ticker.tick().await;
            if let Err(err) = process_tick(&updater, &mut last_run, Utc::now()).await {
                warn!(?err, "bill item scheduler tick failed");
            }
        }
    })
}

/// key: bill-item-scheduler -> tick handler
///
/// Runs the updater when `now` falls on a later date than the previous run.
/// `last_run` only advances when the run itself completed.
pub async fn process_tick(
    updater: &UpdateBillItems,
    last_run: &mut Option<NaiveDate>,
    now: DateTime<Utc>,
) -> Result<Option<RunReport>> {
    let today = now.date_naive();
    if matches!(*last_run, Some(date) if date >= today) {
        debug!(%today, "bill items already updated today");
        return Ok(None);
    }

    let report = updater.perform(now).await?;
    *last_run = Some(today);

    if report.is_clean() {
        info!(run_id = %report.run_id, %today, "bill items updated");
    } else {
        warn!(
            run_id = %report.run_id,
            %today,
            failures = report.failures.len(),
            "bill items updated with failures"
        );
    }
    Ok(Some(report))
}
