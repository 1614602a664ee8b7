use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::cache::MajorityCache;
use crate::config::EngineConfig;
use crate::db::LabelHistory;
use crate::error::StoreError;
use crate::models::{CategoryLabel, MerchantMajority, NormalizedMerchant};

/// Acceptance thresholds for a majority category
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MajorityThresholds {
    pub min_support: u64,
    pub majority_threshold: f64,
}

impl Default for MajorityThresholds {
    fn default() -> Self {
        Self {
            min_support: 3,
            majority_threshold: 0.70,
        }
    }
}

impl From<&EngineConfig> for MajorityThresholds {
    fn from(config: &EngineConfig) -> Self {
        Self {
            min_support: config.min_support,
            majority_threshold: config.majority_threshold,
        }
    }
}

struct CategoryTally<'a> {
    slug: &'a str,
    count: u64,
    last_labeled_at: DateTime<Utc>,
}

/// Pick the dominant category among `labels`.
///
/// Categories rank by count, then most recent labeling, then slug. The top
/// row is accepted only when it meets both thresholds; otherwise `None`.
pub fn majority_from_labels(
    merchant: &NormalizedMerchant,
    labels: &[CategoryLabel],
    thresholds: MajorityThresholds,
) -> Option<MerchantMajority> {
    let mut tallies: HashMap<&str, CategoryTally<'_>> = HashMap::new();
    for label in labels {
        let tally = tallies
            .entry(label.category_slug.as_str())
            .or_insert(CategoryTally {
                slug: label.category_slug.as_str(),
                count: 0,
                last_labeled_at: label.labeled_at,
            });
        tally.count += 1;
        if label.labeled_at > tally.last_labeled_at {
            tally.last_labeled_at = label.labeled_at;
        }
    }

    let total: u64 = tallies.values().map(|t| t.count).sum();
    if total == 0 {
        return None;
    }

    let top = tallies.into_values().min_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| b.last_labeled_at.cmp(&a.last_labeled_at))
            .then_with(|| a.slug.cmp(b.slug))
    })?;

    let fraction = top.count as f64 / total as f64;
    if top.count < thresholds.min_support || fraction < thresholds.majority_threshold {
        return None;
    }

    Some(MerchantMajority {
        merchant: merchant.clone(),
        category_slug: top.slug.to_string(),
        support_count: top.count,
        total_count: total,
        majority_fraction: fraction,
    })
}

/// Derives majorities on demand from label history, optionally through a
/// freshness-window cache.
pub struct MerchantMajorityLabeler {
    labels: Arc<dyn LabelHistory>,
    cache: Option<Arc<dyn MajorityCache>>,
    thresholds: MajorityThresholds,
    lookback: Duration,
}

impl MerchantMajorityLabeler {
    pub fn new(labels: Arc<dyn LabelHistory>, config: &EngineConfig) -> Self {
        Self {
            labels,
            cache: None,
            thresholds: MajorityThresholds::from(config),
            lookback: Duration::days(config.label_lookback_days),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn MajorityCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn thresholds(&self) -> MajorityThresholds {
        self.thresholds
    }

    /// Majority for one merchant over the lookback window ending at `now`.
    /// Cache failures degrade to a direct read.
    pub async fn majority_for(
        &self,
        merchant: &NormalizedMerchant,
        now: DateTime<Utc>,
    ) -> Result<Option<MerchantMajority>, StoreError> {
        if merchant.is_empty() {
            return Ok(None);
        }

        if let Some(cache) = &self.cache {
            match cache.get(merchant).await {
                Ok(Some(cached)) => return Ok(cached),
                Ok(None) => {}
                Err(e) => debug!(merchant = %merchant, error = %e, "Majority cache read failed"),
            }
        }

        let labels = self
            .labels
            .labels_for_merchant(merchant, now - self.lookback)
            .await?;
        let majority = majority_from_labels(merchant, &labels, self.thresholds);

        debug!(
            merchant = %merchant,
            labels = labels.len(),
            majority = ?majority.as_ref().map(|m| m.category_slug.as_str()),
            "Computed merchant majority"
        );

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(merchant, majority.as_ref()).await {
                debug!(merchant = %merchant, error = %e, "Majority cache write failed");
            }
        }

        Ok(majority)
    }

    /// Majorities for several merchants; merchants without one are absent
    pub async fn majorities_for(
        &self,
        merchants: &[NormalizedMerchant],
        now: DateTime<Utc>,
    ) -> Result<HashMap<NormalizedMerchant, MerchantMajority>, StoreError> {
        let mut out = HashMap::new();
        for merchant in merchants {
            if out.contains_key(merchant) {
                continue;
            }
            if let Some(majority) = self.majority_for(merchant, now).await? {
                out.insert(merchant.clone(), majority);
            }
        }
        Ok(out)
    }

    /// Every merchant labeled inside the lookback window
    pub async fn labeled_merchants(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<NormalizedMerchant>, StoreError> {
        self.labels.labeled_merchants(now - self.lookback).await
    }
}
