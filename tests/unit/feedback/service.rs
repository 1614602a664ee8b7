//! Unit tests for the feedback endpoint flow

use ledgerlens::config::ShadowComparison;
use ledgerlens::db::{MemoryStore, ShadowLog, SuggestionLog};
use ledgerlens::error::FeedbackError;
use ledgerlens::feedback::{FeedbackAggregator, FeedbackService};
use ledgerlens::metrics::Metrics;
use ledgerlens::models::{
    FeedbackAction, FeedbackRequest, ServedSuggestion, ShadowPrediction, SuggestionSource,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::fixtures::{key, merchant, now};

async fn served(store: &MemoryStore, txn: &str, slug: &str) -> Uuid {
    let event_id = Uuid::new_v4();
    store
        .record_served(&[ServedSuggestion {
            event_id,
            transaction_id: txn.to_string(),
            merchant: merchant("Coffee Co"),
            category_slug: slug.to_string(),
            score: 0.9,
            source: SuggestionSource::Hint,
            served_at: now(),
        }])
        .await
        .unwrap();
    event_id
}

fn service(store: Arc<MemoryStore>, comparison: ShadowComparison) -> (FeedbackService, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new().unwrap());
    let svc = FeedbackService::new(
        FeedbackAggregator::new(store.clone()),
        store.clone(),
        store,
        comparison,
    )
    .with_metrics(metrics.clone());
    (svc, metrics)
}

fn request(event_id: &str, action: FeedbackAction) -> FeedbackRequest {
    FeedbackRequest {
        event_id: event_id.to_string(),
        action,
        reason: None,
    }
}

#[tokio::test]
async fn accept_resolves_served_event_into_stats() {
    let store = Arc::new(MemoryStore::new());
    let event_id = served(&store, "t1", "dining").await;
    let (svc, metrics) = service(store.clone(), ShadowComparison::Served);

    let stats = svc
        .apply(&request(&event_id.to_string(), FeedbackAction::Accept), now())
        .await
        .unwrap();
    assert_eq!(stats.accept_count, 1);
    assert_eq!(stats.last_feedback_at, Some(now()));

    let events = store.feedback_events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key(), key("Coffee Co", "dining"));
    assert_eq!(events[0].transaction_id, "t1");
    assert_eq!(
        metrics
            .feedback_recorded_total
            .with_label_values(&["accept"])
            .get(),
        1
    );
}

#[tokio::test]
async fn unknown_or_malformed_event_ids_are_rejected() {
    let store = Arc::new(MemoryStore::new());
    let (svc, _) = service(store, ShadowComparison::Served);

    for raw in ["not-a-uuid".to_string(), Uuid::new_v4().to_string()] {
        let err = svc
            .apply(&request(&raw, FeedbackAction::Reject), now())
            .await
            .unwrap_err();
        assert!(matches!(err, FeedbackError::UnknownEvent(_)));
    }
}

#[tokio::test]
async fn submit_reports_failure_without_propagating() {
    let store = Arc::new(MemoryStore::new());
    let event_id = served(&store, "t1", "dining").await;
    let (svc, metrics) = service(store.clone(), ShadowComparison::Served);
    store.set_fail_writes(true);

    let response = svc
        .submit(&request(&event_id.to_string(), FeedbackAction::Accept), now())
        .await;
    assert!(!response.ok);
    assert_eq!(metrics.feedback_failures_total.get(), 1);
}

#[tokio::test]
async fn feedback_is_compared_with_stored_shadow_prediction() {
    let store = Arc::new(MemoryStore::new());
    let event_id = served(&store, "t1", "dining").await;
    store
        .record_shadow(&ShadowPrediction {
            transaction_id: "t1".to_string(),
            category_slug: "groceries".to_string(),
            probability: 0.8,
            predicted_at: now(),
        })
        .await
        .unwrap();
    let (svc, metrics) = service(store, ShadowComparison::Feedback);

    let response = svc
        .submit(&request(&event_id.to_string(), FeedbackAction::Accept), now())
        .await;
    assert!(response.ok);
    assert_eq!(
        metrics
            .shadow_agreement_total
            .with_label_values(&["feedback", "disagree"])
            .get(),
        1
    );
}
