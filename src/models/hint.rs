use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::merchant::NormalizedMerchant;

/// Where a merchant hint came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintSource {
    Manual,
    MlFeedback,
    Majority,
}

impl HintSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::MlFeedback => "ml_feedback",
            Self::Majority => "majority",
        }
    }
}

impl fmt::Display for HintSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HintSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "ml_feedback" => Ok(Self::MlFeedback),
            "majority" => Ok(Self::Majority),
            other => Err(format!("unknown hint source '{}'", other)),
        }
    }
}

/// Durable merchant -> category association. One row per
/// `(merchant, category_slug)`; writers upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantCategoryHint {
    pub merchant: NormalizedMerchant,
    pub category_slug: String,
    /// Always within [0, 1]
    pub confidence: f64,
    pub source: HintSource,
    pub support: u64,
    pub updated_at: DateTime<Utc>,
}

impl MerchantCategoryHint {
    pub fn new(
        merchant: NormalizedMerchant,
        category_slug: &str,
        confidence: f64,
        source: HintSource,
        support: u64,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            merchant,
            category_slug: category_slug.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            source,
            support,
            updated_at,
        }
    }
}
