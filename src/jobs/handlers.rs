//! Job handlers for the promotion batch

use crate::error::PromotionError;
use crate::jobs::context::JobContext;
use crate::jobs::types::PromoteHintsJob;
use apalis::prelude::*;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Handler for the promotion job
///
/// A run that finds another one in progress is not an error: the other run
/// covers the same snapshot. Store failures are returned so apalis retries
/// the whole job, which is safe because promotion is idempotent.
pub async fn handle_promote_hints(
    job: PromoteHintsJob,
    ctx: Data<Arc<JobContext>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!(
        dry_run = job.dry_run,
        seed_majority = job.seed_majority,
        "PromoteHintsJob: starting promotion run"
    );

    match ctx.promotion.run(job.into(), Utc::now()).await {
        Ok(report) => {
            info!(
                candidates = report.candidates.len(),
                written = report.written,
                "PromoteHintsJob: finished"
            );
            Ok(())
        }
        Err(PromotionError::AlreadyRunning) => {
            warn!("PromoteHintsJob: another promotion run holds the lock, skipping");
            Ok(())
        }
        Err(e) => Err(Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    }
}
