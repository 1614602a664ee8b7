//! Quality gates and the confidence model for promoted hints

use chrono::NaiveDate;

use crate::models::FeedbackStats;

const RATIO_WEIGHT: f64 = 0.5;
const SUPPORT_WEIGHT: f64 = 0.3;
const RECENCY_WEIGHT: f64 = 0.2;
/// Feedback volume at which the support term reaches ~63%
const SUPPORT_SCALE: f64 = 10.0;
const RECENCY_DECAY_DAYS: f64 = 30.0;

/// Minimum sample size and accept ratio a key needs before promotion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromotionFilters {
    pub min_total: u64,
    pub min_accept_ratio: f64,
}

impl Default for PromotionFilters {
    fn default() -> Self {
        Self {
            min_total: 2,
            min_accept_ratio: 0.70,
        }
    }
}

impl PromotionFilters {
    pub fn qualifies(&self, stats: &FeedbackStats) -> bool {
        if stats.total() < self.min_total.max(1) {
            return false;
        }
        stats
            .accept_ratio()
            .is_some_and(|ratio| ratio >= self.min_accept_ratio)
    }
}

/// Confidence for a promoted hint, rounded to four decimals.
///
/// Monotone non-decreasing in accept ratio and in total volume, and
/// non-increasing in days since the last feedback. Days are counted between
/// calendar dates so every run on the same `as_of` day agrees.
pub fn promotion_confidence(stats: &FeedbackStats, as_of: NaiveDate) -> f64 {
    let total = stats.total();
    let ratio = stats.accept_ratio().unwrap_or(0.0);
    let support = 1.0 - (-(total as f64) / SUPPORT_SCALE).exp();
    let recency = match stats.last_feedback_at {
        Some(at) => {
            let days = (as_of - at.date_naive()).num_days().max(0) as f64;
            (-days / RECENCY_DECAY_DAYS).exp()
        }
        None => 0.0,
    };

    let raw = RATIO_WEIGHT * ratio + SUPPORT_WEIGHT * support + RECENCY_WEIGHT * recency;
    round4(raw.clamp(0.0, 1.0))
}

pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
