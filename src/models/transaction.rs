//! Transactions as handed over by the ingestion subsystem

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::merchant::NormalizedMerchant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub merchant: String,
    /// Absolute amount
    pub amount: f64,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
}

impl Transaction {
    pub fn new(
        id: impl Into<String>,
        merchant: impl Into<String>,
        amount: f64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            merchant: merchant.into(),
            amount: amount.abs(),
            occurred_at,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn normalized_merchant(&self) -> NormalizedMerchant {
        NormalizedMerchant::new(&self.merchant)
    }

    pub fn features(&self) -> TransactionFeatures {
        let weekday = self.occurred_at.weekday();
        TransactionFeatures {
            merchant: self.normalized_merchant(),
            amount: self.amount.abs(),
            hour: self.occurred_at.hour(),
            day_of_week: weekday.num_days_from_monday(),
            is_weekend: weekday.num_days_from_monday() >= 5,
            tokens: tokenize(&format!("{} {}", self.merchant, self.description)),
        }
    }
}

/// Feature view consumed by rules and the trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionFeatures {
    pub merchant: NormalizedMerchant,
    pub amount: f64,
    pub hour: u32,
    /// 0 = Monday
    pub day_of_week: u32,
    pub is_weekend: bool,
    pub tokens: Vec<String>,
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(str::to_string)
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}
