//! Feedback-driven confidence adjustment

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::FeedbackStats;

/// Coefficients of the adjustment formula
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackWeights {
    pub accept_boost: f64,
    pub reject_penalty: f64,
    pub recency_bonus: f64,
    pub recency_window_days: i64,
}

impl FeedbackWeights {
    pub const ACCEPT_BOOST: f64 = 0.20;
    pub const REJECT_PENALTY: f64 = 0.30;
    pub const RECENCY_BONUS: f64 = 0.05;
    pub const RECENCY_WINDOW_DAYS: i64 = 30;

    pub fn with_recency_window(mut self, days: i64) -> Self {
        self.recency_window_days = days;
        self
    }
}

impl Default for FeedbackWeights {
    fn default() -> Self {
        Self {
            accept_boost: Self::ACCEPT_BOOST,
            reject_penalty: Self::REJECT_PENALTY,
            recency_bonus: Self::RECENCY_BONUS,
            recency_window_days: Self::RECENCY_WINDOW_DAYS,
        }
    }
}

/// Breakdown of one adjustment, kept for rationale strings
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreAdjustment {
    pub base: f64,
    pub boost: f64,
    pub penalty: f64,
    pub recency_bonus: f64,
    pub adjusted: f64,
}

impl ScoreAdjustment {
    pub fn is_noop(&self) -> bool {
        self.boost == 0.0 && self.penalty == 0.0 && self.recency_bonus == 0.0
    }
}

/// ```text
/// boost    = accept_boost   * ln(1 + accepts)
/// penalty  = reject_penalty * ln(1 + rejects)
/// recency  = recency_bonus if last feedback within the window, else 0
/// adjusted = clamp(base + boost - penalty + recency, 0, 1)
/// ```
/// With no feedback history the result is exactly `base`.
pub fn adjust_score(
    base: f64,
    stats: &FeedbackStats,
    now: DateTime<Utc>,
    weights: &FeedbackWeights,
) -> ScoreAdjustment {
    if stats.is_empty() {
        return ScoreAdjustment {
            base,
            boost: 0.0,
            penalty: 0.0,
            recency_bonus: 0.0,
            adjusted: base,
        };
    }

    let boost = weights.accept_boost * (stats.accept_count as f64).ln_1p();
    let penalty = weights.reject_penalty * (stats.reject_count as f64).ln_1p();
    let recent = stats
        .last_feedback_at
        .is_some_and(|at| now.signed_duration_since(at) <= Duration::days(weights.recency_window_days));
    let recency_bonus = if recent { weights.recency_bonus } else { 0.0 };

    ScoreAdjustment {
        base,
        boost,
        penalty,
        recency_bonus,
        adjusted: (base + boost - penalty + recency_bonus).clamp(0.0, 1.0),
    }
}
