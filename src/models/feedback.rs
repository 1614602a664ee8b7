//! Feedback events and their per-key aggregates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::merchant::NormalizedMerchant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackAction {
    Accept,
    Reject,
}

impl FeedbackAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for FeedbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(Self::Accept),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown feedback action '{}'", other)),
        }
    }
}

/// Append-only record of a user accepting or rejecting a suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub transaction_id: String,
    pub merchant: NormalizedMerchant,
    pub category_slug: String,
    pub action: FeedbackAction,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FeedbackEvent {
    pub fn key(&self) -> StatsKey {
        StatsKey::new(self.merchant.clone(), &self.category_slug)
    }
}

/// `(merchant, category)` join key for statistics and hints
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatsKey {
    pub merchant: NormalizedMerchant,
    pub category_slug: String,
}

impl StatsKey {
    pub fn new(merchant: NormalizedMerchant, category_slug: &str) -> Self {
        Self {
            merchant,
            category_slug: category_slug.to_string(),
        }
    }
}

impl fmt::Display for StatsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.merchant, self.category_slug)
    }
}

/// Accept/reject counters for one key. Counters only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackStats {
    pub accept_count: u64,
    pub reject_count: u64,
    pub last_feedback_at: Option<DateTime<Utc>>,
}

impl FeedbackStats {
    pub fn new(accept_count: u64, reject_count: u64, last_feedback_at: Option<DateTime<Utc>>) -> Self {
        Self {
            accept_count,
            reject_count,
            last_feedback_at,
        }
    }

    pub fn total(&self) -> u64 {
        self.accept_count + self.reject_count
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// `None` when there is no feedback at all
    pub fn accept_ratio(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.accept_count as f64 / total as f64),
        }
    }

    /// Fold one event into the counters
    pub fn apply(&mut self, action: FeedbackAction, at: DateTime<Utc>) {
        match action {
            FeedbackAction::Accept => self.accept_count += 1,
            FeedbackAction::Reject => self.reject_count += 1,
        }
        self.last_feedback_at = Some(match self.last_feedback_at {
            Some(prev) if prev > at => prev,
            _ => at,
        });
    }
}
