//! Deterministic categorization rules

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ModelError;
use crate::models::{NormalizedMerchant, TransactionFeatures};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub rule_id: String,
    pub category_slug: String,
    pub score: f64,
}

pub trait RuleEngine: Send + Sync {
    fn evaluate(&self, features: &TransactionFeatures) -> Vec<RuleMatch>;
}

/// Matches when any keyword appears as a whole word (or a run of whole
/// words) in the merchant or description, and the amount is inside the
/// optional bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRule {
    pub id: String,
    pub category_slug: String,
    pub score: f64,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub min_amount: Option<f64>,
    #[serde(default)]
    pub max_amount: Option<f64>,
}

impl KeywordRule {
    fn matches(&self, features: &TransactionFeatures) -> bool {
        if self.min_amount.is_some_and(|min| features.amount < min) {
            return false;
        }
        if self.max_amount.is_some_and(|max| features.amount > max) {
            return false;
        }
        let merchant_words: Vec<&str> = features.merchant.as_str().split(' ').collect();
        self.keywords.iter().any(|kw| {
            let phrase = NormalizedMerchant::new(kw);
            let words: Vec<&str> = phrase.as_str().split_whitespace().collect();
            match words.as_slice() {
                [] => false,
                [word] => {
                    features.tokens.iter().any(|t| t.as_str() == *word)
                        || merchant_words.contains(word)
                }
                _ => merchant_words.windows(words.len()).any(|w| w == words.as_slice()),
            }
        })
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.keywords.is_empty() {
            return Err(ModelError::Load(format!("rule '{}' has no keywords", self.id)));
        }
        if self
            .keywords
            .iter()
            .any(|kw| NormalizedMerchant::new(kw).is_empty())
        {
            return Err(ModelError::Load(format!("rule '{}' has an empty keyword", self.id)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordRuleSet {
    pub rules: Vec<KeywordRule>,
}

impl KeywordRuleSet {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    /// Parse and validate a rule set; blank keywords are rejected
    pub fn from_json(raw: &str) -> Result<Self, ModelError> {
        let set: Self = serde_json::from_str(raw).map_err(|e| ModelError::Load(e.to_string()))?;
        for rule in &set.rules {
            rule.validate()?;
        }
        Ok(set)
    }
}

impl RuleEngine for KeywordRuleSet {
    fn evaluate(&self, features: &TransactionFeatures) -> Vec<RuleMatch> {
        self.rules
            .iter()
            .filter(|r| r.matches(features))
            .map(|r| RuleMatch {
                rule_id: r.id.clone(),
                category_slug: r.category_slug.clone(),
                score: r.score.clamp(0.0, 1.0),
            })
            .collect()
    }
}
