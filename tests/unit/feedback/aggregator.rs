//! Unit tests for the feedback statistics aggregator

use ledgerlens::db::MemoryStore;
use ledgerlens::feedback::FeedbackAggregator;
use ledgerlens::models::{FeedbackAction, FeedbackEvent, FeedbackStats};
use std::sync::Arc;

use crate::fixtures::{days_ago, key, merchant, now, stats};

fn event(raw_merchant: &str, slug: &str, action: FeedbackAction, days: i64) -> FeedbackEvent {
    FeedbackEvent {
        transaction_id: format!("txn-{slug}-{days}"),
        merchant: merchant(raw_merchant),
        category_slug: slug.to_string(),
        action,
        occurred_at: days_ago(days),
        reason: None,
    }
}

#[tokio::test]
async fn record_increments_exactly_one_counter() {
    let store = Arc::new(MemoryStore::new());
    let aggregator = FeedbackAggregator::new(store.clone());

    aggregator
        .record(&event("Coffee Co", "dining", FeedbackAction::Accept, 3))
        .await
        .unwrap();
    let after = aggregator
        .record(&event("Coffee Co", "dining", FeedbackAction::Reject, 5))
        .await
        .unwrap();

    assert_eq!(after.accept_count, 1);
    assert_eq!(after.reject_count, 1);
    assert_eq!(after.last_feedback_at, Some(days_ago(3)));
    assert_eq!(store.feedback_events().await.len(), 2);
}

#[tokio::test]
async fn load_many_is_one_read_with_defaults_for_missing_keys() {
    let store = Arc::new(MemoryStore::new());
    store
        .put_stats(key("Coffee Co", "dining"), stats(5, 0, Some(now())))
        .await;
    let aggregator = FeedbackAggregator::new(store.clone());

    let keys = vec![
        key("Coffee Co", "dining"),
        key("Coffee Co", "groceries"),
        key("Coffee Co", "dining"),
    ];
    let loaded = aggregator.load_many(&keys).await.unwrap();

    assert_eq!(store.stats_reads(), 1);
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[&key("Coffee Co", "dining")].accept_count, 5);
    assert_eq!(loaded[&key("Coffee Co", "groceries")], FeedbackStats::default());
}

#[tokio::test]
async fn empty_key_set_skips_the_store() {
    let store = Arc::new(MemoryStore::new());
    let aggregator = FeedbackAggregator::new(store.clone());
    assert!(aggregator.load_many(&[]).await.unwrap().is_empty());
    assert_eq!(store.stats_reads(), 0);
}

#[tokio::test]
async fn concurrent_records_lose_no_updates() {
    let store = Arc::new(MemoryStore::new());
    let aggregator = FeedbackAggregator::new(store.clone());

    let mut handles = Vec::new();
    for i in 0..64 {
        let aggregator = aggregator.clone();
        handles.push(tokio::spawn(async move {
            let action = if i % 4 == 0 {
                FeedbackAction::Reject
            } else {
                FeedbackAction::Accept
            };
            aggregator
                .record(&event("Coffee Co", "dining", action, i % 7))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let loaded = aggregator
        .load_many(&[key("Coffee Co", "dining")])
        .await
        .unwrap();
    let s = &loaded[&key("Coffee Co", "dining")];
    assert_eq!(s.accept_count, 48);
    assert_eq!(s.reject_count, 16);
    assert_eq!(s.last_feedback_at, Some(days_ago(0)));
}

#[tokio::test]
async fn best_effort_record_swallows_store_failure() {
    let store = Arc::new(MemoryStore::new());
    store.set_fail_writes(true);
    let aggregator = FeedbackAggregator::new(store.clone());

    let stored = aggregator
        .record_best_effort(&event("Coffee Co", "dining", FeedbackAction::Accept, 1))
        .await;
    assert!(!stored);
    assert!(store.feedback_events().await.is_empty());
}
