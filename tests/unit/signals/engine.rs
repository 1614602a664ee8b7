//! Unit tests for the suggestion request path

use ledgerlens::config::{EngineConfig, ShadowComparison};
use ledgerlens::core::bootstrap::{ServiceOptions, Services};
use ledgerlens::db::{MemoryStore, ShadowLog, StoreHandles};
use ledgerlens::error::SuggestError;
use ledgerlens::metrics::Metrics;
use ledgerlens::models::{SuggestionMode, SuggestionRequest, SuggestionSource};
use ledgerlens::routing::CanaryMode;
use std::sync::Arc;
use uuid::Uuid;

use crate::fixtures::{
    coffee_rules, now, seed_labels, seed_transaction, services, BrokenModel, FixedModel,
};

fn request(ids: &[&str]) -> SuggestionRequest {
    SuggestionRequest {
        txn_ids: ids.iter().map(|s| s.to_string()).collect(),
        top_k: None,
        mode: SuggestionMode::Auto,
    }
}

async fn coffee_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    seed_transaction(&store, "t1", "COFFEE CO", 4.50).await;
    seed_transaction(&store, "t2", "Grocer Mart", 82.10).await;
    seed_labels(&store, "COFFEE CO", "dining", 4).await;
    seed_labels(&store, "Grocer Mart", "groceries", 3).await;
    store.insert_category("dining", "Dining out").await;
    store
}

fn grocery_model() -> Option<Arc<dyn ledgerlens::services::CategoryModel>> {
    Some(Arc::new(FixedModel(vec![("groceries", 0.8), ("dining", 0.2)])))
}

#[tokio::test]
async fn validation_rejects_malformed_requests_with_codes() {
    let store = coffee_store().await;
    let svc = services(store, CanaryMode::Off, None).await;

    let cases: Vec<(SuggestionRequest, &str)> = vec![
        (request(&[]), "empty_batch"),
        (request(&["  "]), "empty_batch"),
        (
            SuggestionRequest {
                txn_ids: (0..101).map(|i| format!("t{i}")).collect(),
                ..request(&[])
            },
            "batch_too_large",
        ),
        (
            SuggestionRequest {
                top_k: Some(0),
                ..request(&["t1"])
            },
            "top_k_out_of_range",
        ),
        (
            SuggestionRequest {
                top_k: Some(11),
                ..request(&["t1"])
            },
            "top_k_out_of_range",
        ),
        (request(&["t1", "missing"]), "unknown_transaction"),
    ];

    for (req, code) in cases {
        match svc.engine.suggest(&req, now()).await {
            Err(SuggestError::Request(e)) => assert_eq!(e.code(), code),
            other => panic!("expected {code}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn duplicate_ids_are_served_once() {
    let store = coffee_store().await;
    let svc = services(store, CanaryMode::Off, None).await;
    let response = svc.engine.suggest(&request(&["t1", "t1"]), now()).await.unwrap();
    assert_eq!(response.items.len(), 1);
}

#[tokio::test]
async fn heuristic_route_merges_rule_and_majority() {
    let store = coffee_store().await;
    let svc = services(store.clone(), CanaryMode::Off, grocery_model()).await;

    let response = svc.engine.suggest(&request(&["t1"]), now()).await.unwrap();
    let item = &response.items[0];
    assert_eq!(item.txn, "t1");
    assert_eq!(item.candidates.len(), 1);

    let top = &item.candidates[0];
    assert_eq!(top.category_slug, "dining");
    assert_eq!(top.label, "Dining out");
    assert_eq!(top.score, 1.0);
    assert_eq!(top.source, SuggestionSource::Majority);
    assert!(top.why.iter().any(|w| w == "rule coffee-keyword"));
    assert!(top.why.iter().any(|w| w.contains("4 of 4 past labels")));
    assert!(Uuid::parse_str(&top.event_id).is_ok());
    assert_eq!(store.served_count().await, 1);
}

#[tokio::test]
async fn full_canary_serves_model_candidates() {
    let store = coffee_store().await;
    let svc = services(store, CanaryMode::Full, grocery_model()).await;

    let response = svc.engine.suggest(&request(&["t1"]), now()).await.unwrap();
    let candidates = &response.items[0].candidates;
    let groceries = candidates
        .iter()
        .find(|c| c.category_slug == "groceries")
        .expect("model candidate");
    assert_eq!(groceries.source, SuggestionSource::Model);
    assert_eq!(groceries.label, "groceries");
    assert_eq!(candidates[0].category_slug, "dining");
}

#[tokio::test]
async fn broken_model_falls_back_to_heuristics() {
    let store = coffee_store().await;
    let svc = services(store, CanaryMode::Full, Some(Arc::new(BrokenModel))).await;

    let response = svc.engine.suggest(&request(&["t1", "t2"]), now()).await.unwrap();
    assert_eq!(response.items[0].candidates[0].category_slug, "dining");
    assert_eq!(response.items[1].candidates[0].category_slug, "groceries");
    assert!(response
        .items
        .iter()
        .flat_map(|i| &i.candidates)
        .all(|c| c.source != SuggestionSource::Model));
    assert_eq!(svc.metrics.model_fallbacks_total.get(), 2);
}

#[tokio::test]
async fn missing_model_falls_back_to_heuristics() {
    let store = coffee_store().await;
    let svc = services(store, CanaryMode::Full, None).await;
    let response = svc.engine.suggest(&request(&["t1"]), now()).await.unwrap();
    assert_eq!(response.items[0].candidates[0].category_slug, "dining");
    assert_eq!(svc.metrics.model_fallbacks_total.get(), 1);
}

#[tokio::test]
async fn rules_only_never_consults_the_model() {
    let store = coffee_store().await;
    let svc = services(store, CanaryMode::Full, grocery_model()).await;
    let req = SuggestionRequest {
        mode: SuggestionMode::RulesOnly,
        ..request(&["t1"])
    };
    let response = svc.engine.suggest(&req, now()).await.unwrap();
    assert!(response.items[0]
        .candidates
        .iter()
        .all(|c| c.source != SuggestionSource::Model));
}

#[tokio::test]
async fn model_only_serves_model_candidates_alone() {
    let store = coffee_store().await;
    let svc = services(store, CanaryMode::Partial(1), grocery_model()).await;
    let req = SuggestionRequest {
        mode: SuggestionMode::ModelOnly,
        ..request(&["t1"])
    };
    let response = svc.engine.suggest(&req, now()).await.unwrap();
    let slugs: Vec<_> = response.items[0]
        .candidates
        .iter()
        .map(|c| (c.category_slug.as_str(), c.source))
        .collect();
    assert_eq!(
        slugs,
        vec![
            ("groceries", SuggestionSource::Model),
            ("dining", SuggestionSource::Model)
        ]
    );
}

#[tokio::test]
async fn model_only_with_canary_off_serves_heuristics() {
    let store = coffee_store().await;
    let svc = services(store, CanaryMode::Off, grocery_model()).await;
    let req = SuggestionRequest {
        mode: SuggestionMode::ModelOnly,
        ..request(&["t1"])
    };
    let response = svc.engine.suggest(&req, now()).await.unwrap();
    let candidates = &response.items[0].candidates;
    assert_eq!(candidates[0].category_slug, "dining");
    assert!(candidates.iter().all(|c| c.source != SuggestionSource::Model));
    assert_eq!(svc.metrics.model_fallbacks_total.get(), 0);
}

#[tokio::test]
async fn model_only_with_shadow_canary_never_serves_the_model() {
    let store = coffee_store().await;
    let svc = services(store.clone(), CanaryMode::Shadow, grocery_model()).await;
    let req = SuggestionRequest {
        mode: SuggestionMode::ModelOnly,
        ..request(&["t1"])
    };
    let response = svc.engine.suggest(&req, now()).await.unwrap();
    assert!(response.items[0]
        .candidates
        .iter()
        .all(|c| c.source != SuggestionSource::Model));
    assert!(!response.items[0].candidates.is_empty());
}

#[tokio::test]
async fn feedback_stats_are_loaded_once_per_request() {
    let store = coffee_store().await;
    let svc = services(store.clone(), CanaryMode::Full, grocery_model()).await;
    let before = store.stats_reads();
    svc.engine.suggest(&request(&["t1", "t2"]), now()).await.unwrap();
    assert_eq!(store.stats_reads() - before, 1);
}

#[tokio::test]
async fn top_k_limits_candidates() {
    let store = coffee_store().await;
    let svc = services(store, CanaryMode::Full, grocery_model()).await;
    let req = SuggestionRequest {
        top_k: Some(1),
        ..request(&["t1"])
    };
    let response = svc.engine.suggest(&req, now()).await.unwrap();
    assert_eq!(response.items[0].candidates.len(), 1);
}

#[tokio::test]
async fn unknown_merchant_gets_empty_candidates() {
    let store = coffee_store().await;
    seed_transaction(&store, "t3", "Unheard Of Ltd", 12.0).await;
    let svc = services(store, CanaryMode::Off, None).await;
    let response = svc.engine.suggest(&request(&["t3"]), now()).await.unwrap();
    assert_eq!(response.items.len(), 1);
    assert!(response.items[0].candidates.is_empty());
}

#[tokio::test]
async fn audit_log_failure_does_not_fail_the_request() {
    let store = coffee_store().await;
    let svc = services(store.clone(), CanaryMode::Off, None).await;
    store.set_fail_writes(true);
    let response = svc.engine.suggest(&request(&["t1"]), now()).await.unwrap();
    assert_eq!(response.items[0].candidates.len(), 1);
    assert_eq!(store.served_count().await, 0);
}

#[tokio::test]
async fn shadow_mode_records_but_never_serves_the_model() {
    let store = coffee_store().await;
    let options = ServiceOptions {
        config: EngineConfig {
            shadow_comparison: ShadowComparison::Both,
            ..EngineConfig::default()
        },
        canary: CanaryMode::Shadow,
        model: grocery_model(),
        rules: Arc::new(coffee_rules()),
        cache: None,
    };
    let metrics = Arc::new(Metrics::new().unwrap());
    let svc = Services::build(StoreHandles::from_store(store.clone()), options, metrics).await;

    let response = svc.engine.suggest(&request(&["t1"]), now()).await.unwrap();
    assert!(response.items[0]
        .candidates
        .iter()
        .all(|c| c.source != SuggestionSource::Model));

    let shadow = store.shadow_for_transaction("t1").await.unwrap().unwrap();
    assert_eq!(shadow.category_slug, "groceries");
    assert_eq!(
        svc.metrics
            .shadow_agreement_total
            .with_label_values(&["served", "disagree"])
            .get(),
        1
    );
}
