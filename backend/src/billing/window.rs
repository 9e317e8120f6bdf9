use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::error::{BillingError, BillingResult};

use super::models::Enterprise;

/// key: billing-run-window -> calendar month being billed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunWindow {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl RunWindow {
    /// On the first of a month the previous month is closed out; on every
    /// other day the current month is billed up to the last midnight.
    pub fn at(now: DateTime<Utc>) -> BillingResult<Self> {
        let today = now.date_naive();
        let month_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
            .ok_or(BillingError::WindowOutOfRange(now))?;

        let (start_date, end_date) = if today.day() == 1 {
            let previous = month_start
                .checked_sub_months(Months::new(1))
                .ok_or(BillingError::WindowOutOfRange(now))?;
            (previous, month_start)
        } else {
            (month_start, today)
        };

        Ok(Self {
            starts_at: midnight(start_date).ok_or(BillingError::WindowOutOfRange(now))?,
            ends_at: midnight(end_date).ok_or(BillingError::WindowOutOfRange(now))?,
        })
    }

    /// Narrows the run to the lifetime of `enterprise`. `Ok(None)` means the
    /// enterprise did not exist during the run.
    pub fn clamp_to(&self, enterprise: &Enterprise) -> BillingResult<Option<EnterpriseWindow>> {
        let created_at = enterprise
            .created_at
            .ok_or(BillingError::MissingCreatedAt {
                enterprise_id: enterprise.id,
            })?;

        let begins_at = self.starts_at.max(created_at);
        let ends_at = match enterprise.deleted_at {
            Some(deleted_at) if deleted_at < self.ends_at => deleted_at,
            _ => self.ends_at,
        };

        if begins_at >= ends_at {
            return Ok(None);
        }
        Ok(Some(EnterpriseWindow { begins_at, ends_at }))
    }
}

/// Run window clamped to one enterprise; always non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnterpriseWindow {
    pub begins_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive))
}
