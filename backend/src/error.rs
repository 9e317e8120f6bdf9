use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("enterprise {enterprise_id} has no creation timestamp")]
    MissingCreatedAt { enterprise_id: i64 },
    #[error("history for enterprise {enterprise_id} is unavailable: {reason}")]
    History { enterprise_id: i64, reason: String },
    #[error("snapshot for enterprise {enterprise_id} could not be decoded: {source}")]
    CorruptSnapshot {
        enterprise_id: i64,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown sells value `{0}`")]
    UnknownSells(String),
    #[error("range begins at {begins_at} but ends at {ends_at}")]
    InvalidRange {
        begins_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },
    #[error("no run window can be derived from {0}")]
    WindowOutOfRange(DateTime<Utc>),
    #[error("bill item for enterprise {enterprise_id} beginning {begins_at} already exists")]
    DuplicateBillItem {
        enterprise_id: i64,
        begins_at: DateTime<Utc>,
    },
    #[error("bill item {0} not found")]
    NotFound(i64),
}

pub type BillingResult<T> = Result<T, BillingError>;
