//! Unit tests for the promotion batch

use chrono::{Duration, NaiveDate};
use ledgerlens::db::{HintStore, MemoryStore};
use ledgerlens::error::PromotionError;
use ledgerlens::models::{HintSource, MerchantCategoryHint};
use ledgerlens::promotion::{
    promotion_confidence, PromotionAction, PromotionOptions, PromotionService,
};
use ledgerlens::routing::CanaryMode;
use proptest::prelude::*;
use std::sync::Arc;

use crate::fixtures::{days_ago, key, merchant, now, seed_labels, services, stats};

const LIVE: PromotionOptions = PromotionOptions {
    dry_run: false,
    seed_majority: false,
};
const DRY: PromotionOptions = PromotionOptions {
    dry_run: true,
    seed_majority: false,
};

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.put_stats(key("Coffee Co", "dining"), stats(8, 2, Some(days_ago(1)))).await;
    store.put_stats(key("Coffee Co", "groceries"), stats(1, 0, Some(days_ago(1)))).await;
    store.put_stats(key("Grocer Mart", "groceries"), stats(3, 2, Some(days_ago(2)))).await;
    store.put_stats(key("Book Nook", "books"), stats(7, 3, Some(days_ago(40)))).await;
    store
}

async fn promotion(store: Arc<MemoryStore>) -> Arc<PromotionService> {
    services(store, CanaryMode::Off, None).await.promotion
}

#[tokio::test]
async fn only_qualifying_keys_are_promoted() {
    let store = seeded_store().await;
    let report = promotion(store.clone()).await.run(LIVE, now()).await.unwrap();

    let keys: Vec<_> = report
        .candidates
        .iter()
        .map(|c| (c.merchant.as_str(), c.category_slug.as_str()))
        .collect();
    assert_eq!(keys, vec![("book nook", "books"), ("coffee co", "dining")]);
    assert_eq!(report.written, 2);

    let hints = store.all_hints().await;
    assert_eq!(hints.len(), 2);
    assert!(hints.iter().all(|h| h.source == HintSource::MlFeedback));
    let coffee = hints.iter().find(|h| h.category_slug == "dining").unwrap();
    assert_eq!(coffee.support, 10);
    assert_eq!(
        coffee.confidence,
        promotion_confidence(&stats(8, 2, Some(days_ago(1))), now().date_naive())
    );
}

#[tokio::test]
async fn rerun_on_unchanged_stats_is_a_no_op() {
    let store = seeded_store().await;
    let service = promotion(store.clone()).await;

    service.run(LIVE, now()).await.unwrap();
    let first = store.all_hints().await;
    let second_report = service.run(LIVE, now() + Duration::hours(2)).await.unwrap();
    let second = store.all_hints().await;

    assert_eq!(first, second);
    assert_eq!(second_report.written, 0);
    assert!(second_report
        .candidates
        .iter()
        .all(|c| c.action == PromotionAction::Unchanged));
}

#[tokio::test]
async fn dry_run_reports_the_live_candidate_set_without_writing() {
    let store = seeded_store().await;
    let service = promotion(store.clone()).await;

    let dry = service.run(DRY, now()).await.unwrap();
    assert!(store.all_hints().await.is_empty());
    assert_eq!(dry.written, 0);

    let live = service.run(LIVE, now()).await.unwrap();
    assert_eq!(dry.candidates, live.candidates);
    assert!(dry.dry_run && !live.dry_run);
    assert_eq!(live.written, live.candidates.len());
}

#[tokio::test]
async fn new_feedback_updates_existing_hint() {
    let store = seeded_store().await;
    let service = promotion(store.clone()).await;
    service.run(LIVE, now()).await.unwrap();

    store.put_stats(key("Coffee Co", "dining"), stats(12, 2, Some(now()))).await;
    let report = service.run(LIVE, now()).await.unwrap();
    let dining = report
        .candidates
        .iter()
        .find(|c| c.category_slug == "dining")
        .unwrap();
    assert_eq!(dining.action, PromotionAction::Updated);
    assert_eq!(report.written, 1);
    assert_eq!(store.all_hints().await.len(), 2);
}

#[tokio::test]
async fn manual_hints_are_never_overwritten() {
    let store = seeded_store().await;
    let manual = MerchantCategoryHint::new(
        merchant("Coffee Co"),
        "dining",
        0.99,
        HintSource::Manual,
        0,
        days_ago(100),
    );
    store.upsert_hint(&manual).await.unwrap();

    let report = promotion(store.clone()).await.run(LIVE, now()).await.unwrap();
    assert_eq!(report.count(PromotionAction::SkippedManual), 1);
    assert_eq!(
        store.get_hint(&key("Coffee Co", "dining")).await.unwrap(),
        Some(manual)
    );
}

#[tokio::test]
async fn concurrent_run_is_refused() {
    let store = seeded_store().await;
    let service = promotion(store.clone()).await;

    assert!(store.try_lock_promotion().await.unwrap());
    let err = service.run(LIVE, now()).await.unwrap_err();
    assert!(matches!(err, PromotionError::AlreadyRunning));

    // Dry runs never take the lock
    assert!(service.run(DRY, now()).await.is_ok());

    store.unlock_promotion().await.unwrap();
    assert!(service.run(LIVE, now()).await.is_ok());
    assert!(store.try_lock_promotion().await.unwrap(), "lock released after run");
}

#[tokio::test]
async fn store_failure_aborts_and_releases_lock() {
    let store = seeded_store().await;
    let service = promotion(store.clone()).await;
    store.set_fail_writes(true);

    match service.run(LIVE, now()).await {
        Err(PromotionError::Aborted { committed, .. }) => assert_eq!(committed, 0),
        other => panic!("expected abort, got {other:?}"),
    }
    assert!(store.all_hints().await.is_empty());

    store.set_fail_writes(false);
    assert_eq!(service.run(LIVE, now()).await.unwrap().written, 2);
}

#[tokio::test]
async fn majority_seeding_fills_gaps_without_replacing_learned_hints() {
    let store = seeded_store().await;
    seed_labels(&store, "Coffee Co", "dining", 5).await;
    seed_labels(&store, "Fuel Stop", "transport", 4).await;
    let service = promotion(store.clone()).await;

    let report = service
        .run(
            PromotionOptions {
                dry_run: false,
                seed_majority: true,
            },
            now(),
        )
        .await
        .unwrap();

    let fuel = store
        .get_hint(&key("Fuel Stop", "transport"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fuel.source, HintSource::Majority);
    assert_eq!(fuel.confidence, 1.0);
    assert_eq!(fuel.support, 4);

    let coffee = store.get_hint(&key("Coffee Co", "dining")).await.unwrap().unwrap();
    assert_eq!(coffee.source, HintSource::MlFeedback);
    assert_eq!(
        report
            .candidates
            .iter()
            .filter(|c| c.source == HintSource::Majority)
            .count(),
        1
    );
}

proptest! {
    #[test]
    fn promoted_keys_always_pass_the_filters(
        rows in proptest::collection::vec((0u64..20, 0u64..20), 1..25),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let report = runtime.block_on(async {
            let store = Arc::new(MemoryStore::new());
            for (i, (accept, reject)) in rows.iter().enumerate() {
                store
                    .put_stats(
                        key(&format!("merchant {i}"), "dining"),
                        stats(*accept, *reject, Some(days_ago(i as i64))),
                    )
                    .await;
            }
            promotion(store).await.run(DRY, now()).await.unwrap()
        });

        let expected = rows
            .iter()
            .filter(|(a, r)| a + r >= 2 && (*a as f64) / ((a + r) as f64) >= 0.70)
            .count();
        prop_assert_eq!(report.candidates.len(), expected);
        for c in &report.candidates {
            prop_assert!(c.accept_count + c.reject_count >= 2);
            prop_assert!(c.accept_count as f64 / (c.accept_count + c.reject_count) as f64 >= 0.70);
            prop_assert!((0.0..=1.0).contains(&c.confidence));
        }
    }

    #[test]
    fn confidence_is_monotone_in_each_input(
        accept in 0u64..200,
        reject in 0u64..200,
        age in 0i64..365,
    ) {
        let as_of: NaiveDate = now().date_naive();
        let at = Some(days_ago(age));
        let base = promotion_confidence(&stats(accept, reject, at), as_of);
        prop_assert!(promotion_confidence(&stats(accept + 1, reject, at), as_of) >= base);
        prop_assert!(promotion_confidence(&stats(accept, reject, Some(days_ago(age + 1))), as_of) <= base);
        prop_assert!((0.0..=1.0).contains(&base));
    }
}
