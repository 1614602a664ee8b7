use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::merchant::NormalizedMerchant;

/// Historical (transaction, category) assignment, read-only input to the
/// majority labeler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLabel {
    pub transaction_id: String,
    pub merchant: NormalizedMerchant,
    pub category_slug: String,
    pub labeled_at: DateTime<Utc>,
}

/// Dominant category for a merchant together with its support
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantMajority {
    pub merchant: NormalizedMerchant,
    pub category_slug: String,
    pub support_count: u64,
    pub total_count: u64,
    pub majority_fraction: f64,
}
