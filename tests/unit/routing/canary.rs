//! Unit tests for canary routing

use ledgerlens::models::SuggestionMode;
use ledgerlens::routing::{bucket_for, CanaryMode, CanaryRouter, RouteDecision};
use proptest::prelude::*;

fn ids(n: usize) -> impl Iterator<Item = String> {
    (0..n).map(|i| format!("txn-{i:05}"))
}

#[test]
fn zero_percent_never_selects_the_model() {
    let router = CanaryRouter::new(CanaryMode::parse_or_off("0%"));
    assert!(ids(1000).all(|id| router.route(&id) == RouteDecision::Heuristic));
}

#[test]
fn hundred_percent_always_selects_the_model() {
    let router = CanaryRouter::new(CanaryMode::parse_or_off("100%"));
    assert!(ids(1000).all(|id| router.route(&id) == RouteDecision::Model));
}

#[test]
fn partial_split_is_close_to_configured_share() {
    let router = CanaryRouter::new(CanaryMode::Partial(10));
    let model = ids(10_000)
        .filter(|id| router.route(id) == RouteDecision::Model)
        .count();
    assert!((700..=1300).contains(&model), "{model}");
}

#[test]
fn shadow_mode_consults_but_does_not_serve() {
    let router = CanaryRouter::new(CanaryMode::Shadow);
    let decision = router.route("txn-1");
    assert_eq!(decision, RouteDecision::Shadow);
    assert!(decision.consults_model());
}

#[test]
fn request_mode_overrides_canary() {
    let off = CanaryRouter::new(CanaryMode::Off);
    let full = CanaryRouter::new(CanaryMode::Full);
    let partial = CanaryRouter::new(CanaryMode::Partial(1));
    assert_eq!(full.route_for_mode("a", SuggestionMode::RulesOnly), RouteDecision::Heuristic);
    assert_eq!(full.route_for_mode("a", SuggestionMode::Auto), RouteDecision::Model);
    assert!(ids(200).all(|id| partial.route_for_mode(&id, SuggestionMode::ModelOnly)
        == RouteDecision::Model));
    assert_eq!(off.route_for_mode("a", SuggestionMode::Auto), RouteDecision::Heuristic);
}

#[test]
fn model_only_cannot_enable_a_disabled_model() {
    let off = CanaryRouter::new(CanaryMode::Off);
    assert!(ids(200).all(|id| off.route_for_mode(&id, SuggestionMode::ModelOnly)
        == RouteDecision::Heuristic));
}

#[test]
fn model_only_under_shadow_stays_in_shadow() {
    let shadow = CanaryRouter::new(CanaryMode::Shadow);
    assert_eq!(
        shadow.route_for_mode("a", SuggestionMode::ModelOnly),
        RouteDecision::Shadow
    );
}

#[test]
fn unparseable_values_fail_closed() {
    for raw in ["fifty", "101%", "50", "%", "ten%"] {
        assert!(raw.parse::<CanaryMode>().is_err(), "{raw}");
        assert_eq!(CanaryMode::parse_or_off(raw), CanaryMode::Off);
    }
    assert_eq!(CanaryMode::parse_or_off(" 25% "), CanaryMode::Partial(25));
    assert_eq!(CanaryMode::parse_or_off("SHADOW"), CanaryMode::Shadow);
}

proptest! {
    #[test]
    fn routing_is_stable_per_transaction(id in "[a-zA-Z0-9-]{1,40}", percent in 1u8..100) {
        let router = CanaryRouter::new(CanaryMode::Partial(percent));
        let first = router.route(&id);
        for _ in 0..5 {
            prop_assert_eq!(router.route(&id), first);
        }
        prop_assert!(bucket_for(&id) < 100);
    }

    #[test]
    fn higher_percentages_only_add_model_traffic(id in "[a-z0-9]{1,24}", low in 1u8..99) {
        let high = low + 1;
        let low_router = CanaryRouter::new(CanaryMode::Partial(low));
        let high_router = CanaryRouter::new(CanaryMode::Partial(high));
        if low_router.route(&id) == RouteDecision::Model {
            prop_assert_eq!(high_router.route(&id), RouteDecision::Model);
        }
    }
}
