use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::BillingResult;

use super::adapters::ChangeHistory;
use super::models::{AttributePeriod, Enterprise, EnterpriseSnapshot, TrackedAttribute};
use super::window::EnterpriseWindow;

/// key: billing-segmenter -> split a window at owner/sells changes
#[derive(Clone)]
pub struct PeriodSegmenter {
    history: Arc<dyn ChangeHistory>,
}

impl PeriodSegmenter {
    pub fn new(history: Arc<dyn ChangeHistory>) -> Self {
        Self { history }
    }

    /// Contiguous periods covering `window`, each carrying the tracked
    /// attributes in effect throughout it.
    pub async fn segment(
        &self,
        enterprise: &Enterprise,
        window: EnterpriseWindow,
    ) -> BillingResult<Vec<AttributePeriod>> {
        let mut events = self
            .history
            .changes_between(
                enterprise.id,
                &TrackedAttribute::ALL,
                window.begins_at,
                window.ends_at,
            )
            .await?;
        // stable: same-instant changes keep their recorded order
        events.sort_by_key(|event| event.occurred_at);

        let mut cuts: Vec<(DateTime<Utc>, EnterpriseSnapshot)> = Vec::with_capacity(events.len());
        for event in events {
            if event.occurred_at <= window.begins_at || event.occurred_at >= window.ends_at {
                continue;
            }
            if cuts.last().map(|(at, _)| *at) == Some(event.occurred_at) {
                continue;
            }
            cuts.push((event.occurred_at, event.before));
        }

        let mut periods = Vec::with_capacity(cuts.len() + 1);
        let mut begins_at = window.begins_at;
        for (occurred_at, before) in cuts {
            periods.push(AttributePeriod {
                begins_at,
                ends_at: occurred_at,
                snapshot: before,
            });
            begins_at = occurred_at;
        }

        let snapshot = self.history.reconstruct(enterprise, begins_at).await?;
        periods.push(AttributePeriod {
            begins_at,
            ends_at: window.ends_at,
            snapshot,
        });

        debug!(
            enterprise_id = enterprise.id,
            periods = periods.len(),
            begins_at = %window.begins_at,
            ends_at = %window.ends_at,
            "segmented billing window"
        );
        Ok(periods)
    }
}
