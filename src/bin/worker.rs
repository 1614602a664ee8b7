//! LedgerLens Worker
//!
//! Enqueues the promotion job on the configured cron schedule and processes
//! it from the Redis queue. Run one worker per deployment.

use apalis_redis::RedisStorage;
use dotenvy::dotenv;
use ledgerlens::config;
use ledgerlens::core::bootstrap::{connect_store, ServiceOptions, Services};
use ledgerlens::core::runtime::PromotionRuntime;
use ledgerlens::core::scheduler::JobScheduler;
use ledgerlens::jobs::context::JobContext;
use ledgerlens::jobs::types::PromoteHintsJob;
use ledgerlens::logging;
use ledgerlens::metrics::Metrics;
use std::env;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    logging::init_logging();

    let env = config::get_environment();
    info!("Starting LedgerLens Worker");
    info!(environment = %env, "Environment");

    let seed_majority = env::var("PROMOTION_SEED_MAJORITY")
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    let cron_expr = config::get_promotion_cron();

    let metrics = Arc::new(Metrics::new()?);
    let store = connect_store(config::get_store_backend(), &metrics).await?;
    let options = ServiceOptions::from_env(&metrics).await;
    let services = Services::build(store, options, metrics).await;

    info!("Initializing Apalis Redis storage...");
    let conn = apalis_redis::connect(config::get_redis_url()).await?;
    let storage: RedisStorage<PromoteHintsJob> = RedisStorage::new(conn);

    let job_context = Arc::new(JobContext::new(services.promotion.clone()));
    let runtime = PromotionRuntime::new(job_context, storage.clone());
    let worker_handle = runtime.start_worker();

    let scheduler = JobScheduler::new(
        storage,
        &cron_expr,
        PromoteHintsJob {
            dry_run: false,
            seed_majority,
        },
    )?;
    if let Some(next) = scheduler.next_tick() {
        info!(cron = %cron_expr, next = %next, "Promotion scheduled");
    }
    scheduler.start().await;

    info!("Worker started, waiting for shutdown signal...");
    signal::ctrl_c().await?;
    info!("Shutting down worker...");
    scheduler.stop().await;
    worker_handle.abort();
    info!("Worker stopped");

    Ok(())
}
