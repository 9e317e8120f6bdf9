pub mod billing;
pub mod db;
pub mod error;

mod config;

pub use config::{
    ALLOW_MIGRATION_FAILURE, BILL_ITEMS_SCAN_INTERVAL_SECS, DATABASE_MAX_CONNECTIONS,
    DATABASE_URL, SHOP_TRIAL_LENGTH_DAYS,
};
