//! Apalis worker setup for the promotion job

use crate::jobs::context::JobContext;
use crate::jobs::handlers;
use crate::jobs::types::PromoteHintsJob;
use apalis::prelude::*;
use apalis_redis::RedisStorage;
use std::sync::Arc;
use tracing::info;

/// Runtime that consumes `PromoteHintsJob` from the Redis queue.
///
/// Promotion is exclusive, so there is exactly one worker.
pub struct PromotionRuntime {
    job_context: Arc<JobContext>,
    storage: RedisStorage<PromoteHintsJob>,
}

impl PromotionRuntime {
    pub fn new(job_context: Arc<JobContext>, storage: RedisStorage<PromoteHintsJob>) -> Self {
        Self {
            job_context,
            storage,
        }
    }

    /// Start the worker and return its handle for shutdown
    pub fn start_worker(&self) -> tokio::task::JoinHandle<()> {
        let storage = self.storage.clone();
        let job_context = self.job_context.clone();
        tokio::spawn(async move {
            let worker = WorkerBuilder::new("promote-hints-worker")
                .data(job_context)
                .backend(storage)
                .build_fn(handlers::handle_promote_hints);

            info!("PromotionRuntime: PromoteHintsJob worker started");
            worker.run().await;
        })
    }
}
