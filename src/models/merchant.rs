//! Canonical merchant keys

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowercased, punctuation-stripped merchant string used as the join key
/// between label history, feedback statistics and hints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedMerchant(String);

impl NormalizedMerchant {
    pub fn new(raw: &str) -> Self {
        let mut cleaned = String::with_capacity(raw.len());
        for ch in raw.chars() {
            if ch.is_alphanumeric() {
                cleaned.extend(ch.to_lowercase());
            } else if ch.is_whitespace() {
                cleaned.push(' ');
            }
        }
        Self(cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    /// Wrap a value that is already canonical (e.g. read back from a store)
    pub fn from_canonical(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NormalizedMerchant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NormalizedMerchant {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}
