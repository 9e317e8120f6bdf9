use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::BillingError;

/// key: billing-models -> sales category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sells {
    None,
    Own,
    Any,
}

impl Sells {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sells::None => "none",
            Sells::Own => "own",
            Sells::Any => "any",
        }
    }
}

impl FromStr for Sells {
    type Err = BillingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "none" => Ok(Sells::None),
            "own" => Ok(Sells::Own),
            "any" => Ok(Sells::Any),
            other => Err(BillingError::UnknownSells(other.to_string())),
        }
    }
}

impl fmt::Display for Sells {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes whose changes open a new billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackedAttribute {
    OwnerId,
    Sells,
}

impl TrackedAttribute {
    pub const ALL: [TrackedAttribute; 2] = [TrackedAttribute::OwnerId, TrackedAttribute::Sells];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackedAttribute::OwnerId => "owner_id",
            TrackedAttribute::Sells => "sells",
        }
    }
}

/// Tracked attribute values in effect over some stretch of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterpriseSnapshot {
    pub owner_id: i64,
    pub sells: Sells,
}

/// key: billing-enterprise -> live seller state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Enterprise {
    pub id: i64,
    pub owner_id: i64,
    pub sells: Sells,
    pub created_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_expiry: Option<DateTime<Utc>>,
}

impl Enterprise {
    pub fn snapshot(&self) -> EnterpriseSnapshot {
        EnterpriseSnapshot {
            owner_id: self.owner_id,
            sells: self.sells,
        }
    }

    pub fn trial_window(&self) -> TrialWindow {
        TrialWindow {
            starts_at: self.trial_start,
            expires_at: self.trial_expiry,
        }
    }
}

/// key: billing-history -> audited change to an enterprise
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub enterprise_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub changed: Vec<String>,
    /// State valid for the period ending at `occurred_at`.
    pub before: EnterpriseSnapshot,
}

impl ChangeEvent {
    pub fn touches(&self, attributes: &[TrackedAttribute]) -> bool {
        attributes
            .iter()
            .any(|attribute| self.changed.iter().any(|name| name == attribute.as_str()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrialWindow {
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Half-open range over which the tracked attributes do not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributePeriod {
    pub begins_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub snapshot: EnterpriseSnapshot,
}

/// key: billing-period -> final unit handed to reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BillingPeriod {
    pub enterprise_id: i64,
    pub begins_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub owner_id: i64,
    pub sells: Sells,
    pub trial: bool,
}

/// key: billing-bill-item -> persisted output record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillItem {
    pub id: i64,
    pub enterprise_id: i64,
    pub owner_id: i64,
    pub begins_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub sells: Sells,
    pub trial: bool,
    pub turnover_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row shape of `bill_items`; `sells` is stored as text.
#[derive(Debug, Clone, FromRow)]
pub struct BillItemRecord {
    pub id: i64,
    pub enterprise_id: i64,
    pub owner_id: i64,
    pub begins_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub sells: String,
    pub trial: bool,
    pub turnover_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BillItemRecord> for BillItem {
    type Error = BillingError;

    fn try_from(record: BillItemRecord) -> Result<Self, Self::Error> {
        Ok(BillItem {
            id: record.id,
            enterprise_id: record.enterprise_id,
            owner_id: record.owner_id,
            begins_at: record.begins_at,
            ends_at: record.ends_at,
            sells: record.sells.parse()?,
            trial: record.trial,
            turnover_cents: record.turnover_cents,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

/// Field set written by reconciliation, for both inserts and in-place updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillItemFields {
    pub enterprise_id: i64,
    pub owner_id: i64,
    pub begins_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub sells: Sells,
    pub trial: bool,
    pub turnover_cents: i64,
}

impl BillItemFields {
    pub fn for_period(period: &BillingPeriod, turnover_cents: i64) -> Self {
        Self {
            enterprise_id: period.enterprise_id,
            owner_id: period.owner_id,
            begins_at: period.begins_at,
            ends_at: period.ends_at,
            sells: period.sells,
            trial: period.trial,
            turnover_cents,
        }
    }
}
