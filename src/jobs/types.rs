//! Job types for the promotion batch

use serde::{Deserialize, Serialize};

use crate::promotion::PromotionOptions;

/// Run one promotion pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoteHintsJob {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub seed_majority: bool,
}

impl From<PromoteHintsJob> for PromotionOptions {
    fn from(job: PromoteHintsJob) -> Self {
        Self {
            dry_run: job.dry_run,
            seed_majority: job.seed_majority,
        }
    }
}
