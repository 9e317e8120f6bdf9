use std::sync::Arc;

use bill_items::billing::{spawn_bill_items_scheduler, UpdateBillItems};
use bill_items::db::{PgBillItems, PgChangeHistory, PgEnterprises, PgOrders};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    let pool = PgPoolOptions::new()
        .max_connections(*bill_items::DATABASE_MAX_CONNECTIONS)
        .connect(bill_items::DATABASE_URL.as_str())
        .await?;

    if let Err(error) = sqlx::migrate!().run(&pool).await {
        if *bill_items::ALLOW_MIGRATION_FAILURE {
            tracing::warn!(
                ?error,
                "Database migrations failed but continuing due to ALLOW_MIGRATION_FAILURE"
            );
        } else {
            return Err(error.into());
        }
    }

    let trial_length = chrono::Duration::days(*bill_items::SHOP_TRIAL_LENGTH_DAYS);
    let updater = Arc::new(UpdateBillItems::new(
        Arc::new(PgEnterprises::new(pool.clone(), trial_length)),
        Arc::new(PgChangeHistory::new(pool.clone())),
        Arc::new(PgOrders::new(pool.clone())),
        Arc::new(PgBillItems::new(pool.clone())),
    ));

    let scheduler = spawn_bill_items_scheduler(updater, *bill_items::BILL_ITEMS_SCAN_INTERVAL_SECS);
    tracing::info!("bill item scheduler started");

    tokio::select! {
        result = scheduler => {
            if let Err(error) = result {
                tracing::error!(?error, "bill item scheduler stopped");
                return Err(error.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
        }
    }

    Ok(())
}
