//! Suggestion candidates, served suggestions and the request/response contract

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::feedback::FeedbackAction;
use crate::error::RequestError;
use super::merchant::NormalizedMerchant;

/// Signal source a candidate was drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    Rule,
    Hint,
    Model,
    Majority,
}

impl SuggestionSource {
    /// Tie-break rank: rule > hint > model > majority
    pub fn priority(self) -> u8 {
        match self {
            Self::Rule => 4,
            Self::Hint => 3,
            Self::Model => 2,
            Self::Majority => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Hint => "hint",
            Self::Model => "model",
            Self::Majority => "majority",
        }
    }
}

impl fmt::Display for SuggestionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unadjusted candidate from one signal source
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub category_slug: String,
    pub base_score: f64,
    pub source: SuggestionSource,
    pub why: Vec<String>,
}

impl Candidate {
    pub fn new(category_slug: &str, base_score: f64, source: SuggestionSource) -> Self {
        Self {
            category_slug: category_slug.to_string(),
            base_score: base_score.clamp(0.0, 1.0),
            source,
            why: Vec::new(),
        }
    }

    pub fn because(mut self, reason: impl Into<String>) -> Self {
        self.why.push(reason.into());
        self
    }
}

/// Ranked, feedback-adjusted suggestion for one transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub transaction_id: String,
    pub category_slug: String,
    pub label: String,
    pub score: f64,
    pub base_score: f64,
    pub source: SuggestionSource,
    pub why: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionMode {
    #[default]
    Auto,
    RulesOnly,
    ModelOnly,
}

impl FromStr for SuggestionMode {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "rules_only" => Ok(Self::RulesOnly),
            "model_only" => Ok(Self::ModelOnly),
            other => Err(RequestError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionRequest {
    pub txn_ids: Vec<String>,
    /// Signed so out-of-range values reach validation instead of failing to parse
    #[serde(default)]
    pub top_k: Option<i64>,
    #[serde(default)]
    pub mode: SuggestionMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateView {
    pub category_slug: String,
    pub label: String,
    pub score: f64,
    pub source: SuggestionSource,
    pub why: Vec<String>,
    /// Reference for accept/reject feedback
    pub event_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionItem {
    pub txn: String,
    pub candidates: Vec<CandidateView>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionResponse {
    pub items: Vec<SuggestionItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub event_id: String,
    pub action: FeedbackAction,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub ok: bool,
}

/// Audit row for a candidate that was shown to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServedSuggestion {
    pub event_id: Uuid,
    pub transaction_id: String,
    pub merchant: NormalizedMerchant,
    pub category_slug: String,
    pub score: f64,
    pub source: SuggestionSource,
    pub served_at: DateTime<Utc>,
}

/// Model output recorded in shadow mode for later comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowPrediction {
    pub transaction_id: String,
    pub category_slug: String,
    pub probability: f64,
    pub predicted_at: DateTime<Utc>,
}
