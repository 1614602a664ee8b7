use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::FeedbackStore;
use crate::error::{FeedbackError, StoreError};
use crate::models::{FeedbackEvent, FeedbackStats, StatsKey};

/// Maintains per `(merchant, category)` accept/reject counters
#[derive(Clone)]
pub struct FeedbackAggregator {
    store: Arc<dyn FeedbackStore>,
}

impl FeedbackAggregator {
    pub fn new(store: Arc<dyn FeedbackStore>) -> Self {
        Self { store }
    }

    /// Append the event and increment exactly one counter for its key.
    ///
    /// Callers on the categorization path may discard the result; see
    /// [`FeedbackAggregator::record_best_effort`].
    pub async fn record(&self, event: &FeedbackEvent) -> Result<FeedbackStats, FeedbackError> {
        let stats = self.store.record_feedback(event).await?;
        debug!(
            key = %event.key(),
            action = %event.action,
            accept_count = stats.accept_count,
            reject_count = stats.reject_count,
            "Recorded feedback"
        );
        Ok(stats)
    }

    /// Record and swallow any failure after logging it. Returns whether the
    /// event was stored.
    pub async fn record_best_effort(&self, event: &FeedbackEvent) -> bool {
        match self.record(event).await {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    key = %event.key(),
                    transaction_id = %event.transaction_id,
                    error = %e,
                    "Failed to record feedback, continuing"
                );
                false
            }
        }
    }

    /// Current statistics for every requested key in one store read. Keys
    /// without history map to zero counts.
    pub async fn load_many(
        &self,
        keys: &[StatsKey],
    ) -> Result<HashMap<StatsKey, FeedbackStats>, StoreError> {
        let mut unique: Vec<StatsKey> = keys.to_vec();
        unique.sort();
        unique.dedup();

        let mut stats = if unique.is_empty() {
            HashMap::new()
        } else {
            self.store.load_stats(&unique).await?
        };
        for key in unique {
            stats.entry(key).or_default();
        }
        Ok(stats)
    }

    pub async fn snapshot(&self) -> Result<Vec<(StatsKey, FeedbackStats)>, StoreError> {
        self.store.stats_snapshot().await
    }
}
