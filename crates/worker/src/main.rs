//! Rebill Background Worker
//!
//! Runs the scheduled jobs around the billing core:
//! - Overdue scan pass (daily by default, cron configurable via `SCAN_CRON`)
//! - Health check heartbeat (every 5 minutes)
//!
//! The scan interval is deployment configuration; the scanner itself
//! guarantees single-flight and same-day idempotence, so an aggressive
//! schedule is safe.

use std::sync::Arc;
use std::time::Duration;

use rebill_billing::{
    NotificationDispatcher, NullDispatcher, OverdueScanner, PgStore, ScanOutcome, SmsConfig,
    SmsDispatcher, SystemClock, DEFAULT_REMINDER_WINDOW_DAYS,
};
use sqlx::postgres::PgPoolOptions;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<sqlx::PgPool> {
    #[allow(clippy::expect_used)] // Fail-fast on startup if required config is missing
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

fn reminder_window_days() -> i64 {
    std::env::var("REMINDER_WINDOW_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_REMINDER_WINDOW_DAYS)
}

fn build_dispatcher() -> Arc<dyn NotificationDispatcher> {
    match SmsConfig::from_env() {
        Some(config) => {
            info!("SMS gateway configured");
            Arc::new(SmsDispatcher::new(config))
        }
        None => {
            warn!("SMS_GATEWAY_URL not set - notifications will be dropped");
            Arc::new(NullDispatcher)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Rebill Worker");

    let pool = create_db_pool().await?;
    sqlx::migrate!("../billing/migrations").run(&pool).await?;

    let scanner = Arc::new(OverdueScanner::new(
        Arc::new(PgStore::new(pool)),
        build_dispatcher(),
        Arc::new(SystemClock),
        reminder_window_days(),
    ));

    let scheduler = JobScheduler::new().await?;

    // Job 1: Overdue scan pass (daily at 02:00 UTC unless overridden)
    let scan_cron =
        std::env::var("SCAN_CRON").unwrap_or_else(|_| "0 0 2 * * *".to_string());
    let scan_scanner = scanner.clone();
    scheduler
        .add(Job::new_async(scan_cron.as_str(), move |_uuid, _l| {
            let scanner = scan_scanner.clone();
            Box::pin(async move {
                info!("Running scheduled overdue scan pass");
                match scanner.run_scan().await {
                    Ok(ScanOutcome::Completed(report)) => {
                        if report.errors > 0 {
                            warn!(
                                errors = report.errors,
                                examined = report.examined,
                                "Scan pass completed with errors"
                            );
                        }
                    }
                    Ok(ScanOutcome::Skipped) => {
                        warn!("Scan tick skipped: a pass is already running");
                    }
                    Err(e) => {
                        error!(error = %e, "Scan pass failed");
                    }
                }
            })
        })?)
        .await?;
    info!(cron = %scan_cron, "Scheduled: Overdue scan pass");

    // Job 2: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    info!("Starting job scheduler");
    scheduler.start().await?;

    // Keep the main task running; the scheduler runs jobs in background tasks.
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
