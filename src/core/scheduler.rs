//! Cron-based scheduler for enqueuing the promotion job

use crate::jobs::types::PromoteHintsJob;
use apalis::prelude::*;
use apalis_redis::RedisStorage;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// Scheduler that enqueues `PromoteHintsJob` on a cron schedule
pub struct JobScheduler {
    storage: RedisStorage<PromoteHintsJob>,
    schedule: Schedule,
    job: PromoteHintsJob,
    handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl JobScheduler {
    /// Cron format: second minute hour day month weekday
    pub fn new(
        storage: RedisStorage<PromoteHintsJob>,
        cron_expr: &str,
        job: PromoteHintsJob,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid cron expression '{}': {}", cron_expr, e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;

        info!(cron = %cron_expr, seed_majority = job.seed_majority, "JobScheduler: created");

        Ok(Self {
            storage,
            schedule,
            job,
            handle: Arc::new(RwLock::new(None)),
        })
    }

    /// Next time the job will be enqueued
    pub fn next_tick(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.schedule.upcoming(chrono::Utc).next()
    }

    pub async fn start(&self) {
        let storage = self.storage.clone();
        let schedule = self.schedule.clone();
        let job = self.job;

        let handle = tokio::spawn(async move {
            info!("JobScheduler: started, waiting for cron schedule...");

            loop {
                let Some(next_tick) = schedule.upcoming(chrono::Utc).next() else {
                    tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;
                    continue;
                };
                let now = chrono::Utc::now();
                if next_tick > now {
                    let duration = (next_tick - now).to_std().unwrap_or_default();
                    tokio::time::sleep(duration).await;
                }

                let mut storage = storage.clone();
                match storage.push(job).await {
                    Ok(_) => info!("JobScheduler: enqueued PromoteHintsJob"),
                    Err(e) => error!(error = %e, "JobScheduler: failed to enqueue PromoteHintsJob"),
                }
            }
        });

        *self.handle.write().await = Some(handle);
    }

    pub async fn stop(&self) {
        if let Some(h) = self.handle.write().await.take() {
            h.abort();
            info!("JobScheduler: stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle.read().await.is_some()
    }
}
