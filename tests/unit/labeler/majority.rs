//! Unit tests for the merchant majority labeler

use async_trait::async_trait;
use ledgerlens::cache::MajorityCache;
use ledgerlens::config::EngineConfig;
use ledgerlens::db::MemoryStore;
use ledgerlens::error::StoreError;
use ledgerlens::labeler::{majority_from_labels, MajorityThresholds, MerchantMajorityLabeler};
use ledgerlens::models::{MerchantMajority, NormalizedMerchant};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::fixtures::{days_ago, label, merchant, now, seed_labels};

#[test]
fn seventy_percent_with_enough_support_is_a_majority() {
    let mut labels = Vec::new();
    for i in 0..7 {
        labels.push(label(&format!("d{i}"), "cafe", "dining", days_ago(i)));
    }
    for i in 0..3 {
        labels.push(label(&format!("g{i}"), "cafe", "groceries", days_ago(i)));
    }

    let m = majority_from_labels(&merchant("cafe"), &labels, MajorityThresholds::default())
        .expect("majority");
    assert_eq!(m.category_slug, "dining");
    assert_eq!(m.support_count, 7);
    assert_eq!(m.total_count, 10);
    assert!((m.majority_fraction - 0.7).abs() < 1e-12);
}

#[test]
fn too_few_labels_yield_none() {
    let labels = vec![
        label("a", "cafe", "dining", days_ago(1)),
        label("b", "cafe", "dining", days_ago(2)),
    ];
    assert!(majority_from_labels(&merchant("cafe"), &labels, MajorityThresholds::default()).is_none());
}

#[test]
fn split_history_yields_none() {
    let mut labels = Vec::new();
    for i in 0..6 {
        labels.push(label(&format!("d{i}"), "cafe", "dining", days_ago(i)));
    }
    for i in 0..4 {
        labels.push(label(&format!("g{i}"), "cafe", "groceries", days_ago(i)));
    }
    assert!(majority_from_labels(&merchant("cafe"), &labels, MajorityThresholds::default()).is_none());
}

#[test]
fn tied_counts_prefer_most_recent_category() {
    let labels = vec![
        label("a", "cafe", "dining", days_ago(9)),
        label("b", "cafe", "dining", days_ago(8)),
        label("c", "cafe", "travel", days_ago(3)),
        label("d", "cafe", "travel", days_ago(7)),
    ];
    let thresholds = MajorityThresholds {
        min_support: 1,
        majority_threshold: 0.5,
    };
    let m = majority_from_labels(&merchant("cafe"), &labels, thresholds).unwrap();
    assert_eq!(m.category_slug, "travel");
}

proptest! {
    #[test]
    fn accepted_majorities_meet_both_thresholds(
        counts in proptest::collection::vec(0usize..12, 1..5),
    ) {
        let slugs = ["dining", "groceries", "travel", "utilities", "rent"];
        let mut labels = Vec::new();
        for (slug, count) in slugs.iter().zip(&counts) {
            for i in 0..*count {
                labels.push(label(&format!("{slug}{i}"), "shop", slug, days_ago(i as i64)));
            }
        }
        let thresholds = MajorityThresholds::default();
        if let Some(m) = majority_from_labels(&merchant("shop"), &labels, thresholds) {
            prop_assert!(m.support_count >= thresholds.min_support);
            prop_assert!(m.majority_fraction >= thresholds.majority_threshold);
            prop_assert_eq!(m.total_count as usize, labels.len());
            let max = *counts.iter().max().unwrap() as u64;
            prop_assert_eq!(m.support_count, max);
        }
    }
}

#[tokio::test]
async fn labels_outside_lookback_are_ignored() {
    let store = Arc::new(MemoryStore::new());
    for i in 0..3 {
        store
            .insert_label(label(&format!("old{i}"), "cafe", "dining", days_ago(400 + i)))
            .await;
    }
    let labeler = MerchantMajorityLabeler::new(store, &EngineConfig::default());
    assert!(labeler.majority_for(&merchant("cafe"), now()).await.unwrap().is_none());
}

#[tokio::test]
async fn empty_merchant_has_no_majority() {
    let store = Arc::new(MemoryStore::new());
    let labeler = MerchantMajorityLabeler::new(store, &EngineConfig::default());
    assert!(labeler
        .majority_for(&merchant("!!!"), now())
        .await
        .unwrap()
        .is_none());
}

#[derive(Default)]
struct RecordingCache {
    entries: Mutex<HashMap<String, Option<MerchantMajority>>>,
    hits: AtomicUsize,
}

#[async_trait]
impl MajorityCache for RecordingCache {
    async fn get(
        &self,
        merchant: &NormalizedMerchant,
    ) -> Result<Option<Option<MerchantMajority>>, StoreError> {
        let entry = self.entries.lock().unwrap().get(merchant.as_str()).cloned();
        if entry.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
        Ok(entry)
    }

    async fn put(
        &self,
        merchant: &NormalizedMerchant,
        majority: Option<&MerchantMajority>,
    ) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap()
            .insert(merchant.as_str().to_string(), majority.cloned());
        Ok(())
    }
}

#[tokio::test]
async fn cached_majority_is_reused_including_negative_results() {
    let store = Arc::new(MemoryStore::new());
    seed_labels(&store, "cafe", "dining", 3).await;
    let cache = Arc::new(RecordingCache::default());
    let labeler =
        MerchantMajorityLabeler::new(store, &EngineConfig::default()).with_cache(cache.clone());

    let first = labeler.majority_for(&merchant("cafe"), now()).await.unwrap();
    let second = labeler.majority_for(&merchant("cafe"), now()).await.unwrap();
    assert_eq!(first, second);
    assert!(labeler.majority_for(&merchant("nobody"), now()).await.unwrap().is_none());
    assert!(labeler.majority_for(&merchant("nobody"), now()).await.unwrap().is_none());
    assert_eq!(cache.hits.load(Ordering::SeqCst), 2);
}
