//! Suggestion request path: validation, candidate sourcing, routing,
//! batched feedback lookup and response shaping.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::aggregation::{ScoreBlender, ScoredCandidate};
use super::scoring::FeedbackWeights;
use crate::config::{EngineConfig, ShadowComparison};
use crate::db::{HintStore, ShadowLog, SuggestionLog, TransactionStore};
use crate::error::{ModelError, RequestError, SuggestError};
use crate::feedback::FeedbackAggregator;
use crate::labeler::MerchantMajorityLabeler;
use crate::metrics::Metrics;
use crate::models::{
    Candidate, CandidateView, CategoryCatalog, HintSource, MerchantCategoryHint,
    MerchantMajority, NormalizedMerchant, ServedSuggestion, ShadowPrediction, StatsKey,
    Suggestion, SuggestionItem, SuggestionMode, SuggestionRequest, SuggestionResponse,
    SuggestionSource, Transaction,
};
use crate::routing::{CanaryRouter, RouteDecision};
use crate::services::{CategoryModel, CategoryProbability, RuleEngine};

/// A request that passed boundary validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    /// Deduplicated, in request order
    pub txn_ids: Vec<String>,
    pub top_k: usize,
    pub mode: SuggestionMode,
}

/// Per-transaction working state between sourcing and ranking
struct Pending {
    txn: Transaction,
    merchant: NormalizedMerchant,
    route: RouteDecision,
    candidates: Vec<Candidate>,
    shadow: Option<CategoryProbability>,
}

pub struct SuggestionEngine {
    config: EngineConfig,
    blender: ScoreBlender,
    router: CanaryRouter,
    rules: Arc<dyn RuleEngine>,
    model: Option<Arc<dyn CategoryModel>>,
    labeler: Arc<MerchantMajorityLabeler>,
    feedback: FeedbackAggregator,
    transactions: Arc<dyn TransactionStore>,
    hints: Arc<dyn HintStore>,
    suggestion_log: Arc<dyn SuggestionLog>,
    shadow_log: Arc<dyn ShadowLog>,
    catalog: Arc<CategoryCatalog>,
    metrics: Option<Arc<Metrics>>,
}

impl SuggestionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        router: CanaryRouter,
        rules: Arc<dyn RuleEngine>,
        labeler: Arc<MerchantMajorityLabeler>,
        feedback: FeedbackAggregator,
        transactions: Arc<dyn TransactionStore>,
        hints: Arc<dyn HintStore>,
        suggestion_log: Arc<dyn SuggestionLog>,
        shadow_log: Arc<dyn ShadowLog>,
    ) -> Self {
        let weights = FeedbackWeights::default().with_recency_window(config.recency_window_days);
        Self {
            blender: ScoreBlender::new(weights, config.min_score),
            config,
            router,
            rules,
            model: None,
            labeler,
            feedback,
            transactions,
            hints,
            suggestion_log,
            shadow_log,
            catalog: Arc::new(CategoryCatalog::default()),
            metrics: None,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn CategoryModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_catalog(mut self, catalog: CategoryCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn router(&self) -> &CanaryRouter {
        &self.router
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Reject malformed requests before any store or model work
    pub fn validate(&self, request: &SuggestionRequest) -> Result<ValidatedRequest, RequestError> {
        let mut seen = HashSet::new();
        let txn_ids: Vec<String> = request
            .txn_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect();

        if txn_ids.is_empty() {
            return Err(RequestError::EmptyBatch);
        }
        if txn_ids.len() > self.config.max_batch {
            return Err(RequestError::BatchTooLarge {
                count: txn_ids.len(),
                max: self.config.max_batch,
            });
        }

        let top_k = request
            .top_k
            .unwrap_or(self.config.default_top_k as i64);
        if top_k < 1 || top_k > self.config.max_top_k as i64 {
            return Err(RequestError::TopKOutOfRange {
                got: top_k.to_string(),
                max: self.config.max_top_k,
            });
        }

        Ok(ValidatedRequest {
            txn_ids,
            top_k: top_k as usize,
            mode: request.mode,
        })
    }

    /// Serve a suggestion request end to end
    pub async fn suggest(
        &self,
        request: &SuggestionRequest,
        now: DateTime<Utc>,
    ) -> Result<SuggestionResponse, SuggestError> {
        let validated = self.validate(request)?;
        let start = Instant::now();

        let (suggestions, shadows) = self.rank_transactions(&validated, now).await?;
        let merchants: HashMap<&str, &NormalizedMerchant> = shadows
            .iter()
            .map(|(txn_id, (merchant, _))| (txn_id.as_str(), merchant))
            .collect();

        let mut items = Vec::with_capacity(validated.txn_ids.len());
        let mut served = Vec::new();
        for txn_id in &validated.txn_ids {
            let ranked = suggestions.get(txn_id).cloned().unwrap_or_default();
            let mut candidates = Vec::with_capacity(ranked.len());
            for suggestion in ranked {
                let event_id = Uuid::new_v4();
                if let Some(merchant) = merchants.get(txn_id.as_str()) {
                    served.push(ServedSuggestion {
                        event_id,
                        transaction_id: txn_id.clone(),
                        merchant: (*merchant).clone(),
                        category_slug: suggestion.category_slug.clone(),
                        score: suggestion.score,
                        source: suggestion.source,
                        served_at: now,
                    });
                }
                if let Some(metrics) = &self.metrics {
                    metrics
                        .suggestions_served_total
                        .with_label_values(&[suggestion.source.as_str()])
                        .inc();
                }
                candidates.push(CandidateView {
                    category_slug: suggestion.category_slug,
                    label: suggestion.label,
                    score: suggestion.score,
                    source: suggestion.source,
                    why: suggestion.why,
                    event_id: event_id.to_string(),
                });
            }
            items.push(SuggestionItem {
                txn: txn_id.clone(),
                candidates,
            });
        }

        if let Err(e) = self.suggestion_log.record_served(&served).await {
            warn!(error = %e, count = served.len(), "Failed to write served-suggestion audit log");
        }

        for (txn_id, (_, shadow)) in &shadows {
            if let Some(prediction) = shadow {
                let served_top = suggestions
                    .get(txn_id)
                    .and_then(|s| s.first())
                    .map(|s| s.category_slug.as_str());
                self.compare_shadow(txn_id, prediction, served_top, now).await;
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics
                .suggestion_duration_seconds
                .observe(start.elapsed().as_secs_f64());
        }
        Ok(SuggestionResponse { items })
    }

    /// Ranked suggestions per transaction id plus the merchant and any
    /// shadow prediction per transaction.
    #[allow(clippy::type_complexity)]
    pub async fn rank_transactions(
        &self,
        request: &ValidatedRequest,
        now: DateTime<Utc>,
    ) -> Result<
        (
            HashMap<String, Vec<Suggestion>>,
            HashMap<String, (NormalizedMerchant, Option<CategoryProbability>)>,
        ),
        SuggestError,
    > {
        let mut transactions = self.transactions.transactions_by_ids(&request.txn_ids).await?;
        let unknown: Vec<String> = request
            .txn_ids
            .iter()
            .filter(|id| !transactions.contains_key(*id))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(RequestError::UnknownTransactions(unknown).into());
        }

        let mut merchants: Vec<NormalizedMerchant> = transactions
            .values()
            .map(Transaction::normalized_merchant)
            .filter(|m| !m.is_empty())
            .collect();
        merchants.sort();
        merchants.dedup();

        let hints = self.hints.hints_for_merchants(&merchants).await?;
        let mut hints_by_merchant: HashMap<&NormalizedMerchant, Vec<&MerchantCategoryHint>> =
            HashMap::new();
        for hint in &hints {
            hints_by_merchant.entry(&hint.merchant).or_default().push(hint);
        }
        let majorities = self.labeler.majorities_for(&merchants, now).await?;

        let mut pending = Vec::with_capacity(request.txn_ids.len());
        for txn_id in &request.txn_ids {
            let Some(txn) = transactions.remove(txn_id) else {
                continue;
            };
            let merchant = txn.normalized_merchant();
            let merchant_hints: &[&MerchantCategoryHint] = hints_by_merchant
                .get(&merchant)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let majority = majorities.get(&merchant);
            let route = self.router.route_for_mode(txn_id, request.mode);
            let mut item = Pending {
                txn,
                merchant,
                route,
                candidates: Vec::new(),
                shadow: None,
            };
            self.source_candidates(&mut item, request.mode, merchant_hints, majority);
            pending.push(item);
        }

        let keys: Vec<StatsKey> = pending
            .iter()
            .flat_map(|p| ScoreBlender::stats_keys(&p.merchant, &p.candidates))
            .collect();
        let stats = self.feedback.load_many(&keys).await?;

        let mut ranked = HashMap::with_capacity(pending.len());
        let mut context = HashMap::with_capacity(pending.len());
        for item in pending {
            let scored = self.blender.blend(
                &item.merchant,
                item.candidates,
                &stats,
                request.top_k,
                now,
            );
            debug!(
                txn_id = %item.txn.id,
                merchant = %item.merchant,
                route = item.route.as_str(),
                candidates = scored.len(),
                "Ranked suggestions"
            );
            let suggestions = scored
                .into_iter()
                .map(|s| self.to_suggestion(&item.txn.id, s))
                .collect::<Vec<_>>();
            ranked.insert(item.txn.id.clone(), suggestions);
            context.insert(item.txn.id, (item.merchant, item.shadow));
        }
        Ok((ranked, context))
    }

    fn source_candidates(
        &self,
        item: &mut Pending,
        mode: SuggestionMode,
        hints: &[&MerchantCategoryHint],
        majority: Option<&MerchantMajority>,
    ) {
        let model_output = if item.route.consults_model() {
            Some(self.model_candidates(&item.txn))
        } else {
            None
        };

        let route_label = match (item.route, &model_output) {
            (RouteDecision::Model, Some(Err(e))) => {
                warn!(
                    txn_id = %item.txn.id,
                    error = %e,
                    "Model unavailable, falling back to heuristic sources"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.model_fallbacks_total.inc();
                }
                "fallback"
            }
            (route, _) => route.as_str(),
        };
        if let Some(metrics) = &self.metrics {
            metrics
                .route_decisions_total
                .with_label_values(&[route_label])
                .inc();
        }

        let model_served = match (item.route, model_output) {
            (RouteDecision::Model, Some(Ok(probs))) => Some(probs),
            (RouteDecision::Shadow, Some(Ok(probs))) => {
                item.shadow = probs.into_iter().next();
                None
            }
            (RouteDecision::Shadow, Some(Err(e))) => {
                debug!(txn_id = %item.txn.id, error = %e, "Shadow model evaluation failed");
                None
            }
            _ => None,
        };

        let model_only = mode == SuggestionMode::ModelOnly;
        if let Some(probs) = model_served {
            let version = self.model.as_ref().map(|m| m.name().to_string()).unwrap_or_default();
            item.candidates.extend(probs.into_iter().take(self.config.max_top_k).map(|p| {
                Candidate::new(&p.category_slug, p.probability, SuggestionSource::Model)
                    .because(format!("model {}: p={:.2}", version, p.probability))
            }));
            if model_only {
                return;
            }
        }

        let features = item.txn.features();
        for rule in self.rules.evaluate(&features) {
            item.candidates.push(
                Candidate::new(&rule.category_slug, rule.score, SuggestionSource::Rule)
                    .because(format!("rule {}", rule.rule_id)),
            );
        }

        for hint in hints {
            let source = match hint.source {
                HintSource::Manual | HintSource::MlFeedback => SuggestionSource::Hint,
                HintSource::Majority => SuggestionSource::Majority,
            };
            item.candidates.push(
                Candidate::new(&hint.category_slug, hint.confidence, source).because(format!(
                    "{} hint for this merchant (support {})",
                    hint.source, hint.support
                )),
            );
        }

        if let Some(m) = majority {
            item.candidates.push(
                Candidate::new(&m.category_slug, m.majority_fraction, SuggestionSource::Majority)
                    .because(format!(
                        "{} of {} past labels for this merchant",
                        m.support_count, m.total_count
                    )),
            );
        }
    }

    fn model_candidates(&self, txn: &Transaction) -> Result<Vec<CategoryProbability>, ModelError> {
        let model = self.model.as_ref().ok_or(ModelError::NotLoaded)?;
        let probs = model.predict(&txn.features())?;
        if probs
            .iter()
            .any(|p| !(p.probability.is_finite() && (0.0..=1.0).contains(&p.probability)))
        {
            return Err(ModelError::InvalidOutput(
                "probability outside [0, 1]".to_string(),
            ));
        }
        Ok(probs)
    }

    fn to_suggestion(&self, txn_id: &str, scored: ScoredCandidate) -> Suggestion {
        let label = self.catalog.label_for(&scored.candidate.category_slug);
        Suggestion {
            transaction_id: txn_id.to_string(),
            category_slug: scored.candidate.category_slug,
            label,
            score: scored.adjustment.adjusted,
            base_score: scored.adjustment.base,
            source: scored.candidate.source,
            why: scored.candidate.why,
        }
    }

    async fn compare_shadow(
        &self,
        txn_id: &str,
        prediction: &CategoryProbability,
        served_top: Option<&str>,
        now: DateTime<Utc>,
    ) {
        let comparison: ShadowComparison = self.config.shadow_comparison;

        if comparison.compares_served() {
            let outcome = match served_top {
                Some(slug) if slug == prediction.category_slug => "agree",
                Some(_) => "disagree",
                None => "no_served",
            };
            info!(
                txn_id = %txn_id,
                shadow = %prediction.category_slug,
                probability = prediction.probability,
                served = served_top.unwrap_or("-"),
                outcome = outcome,
                "Shadow prediction compared with served suggestion"
            );
            if let Some(metrics) = &self.metrics {
                metrics
                    .shadow_agreement_total
                    .with_label_values(&["served", outcome])
                    .inc();
            }
        }

        if comparison.compares_feedback() {
            let record = ShadowPrediction {
                transaction_id: txn_id.to_string(),
                category_slug: prediction.category_slug.clone(),
                probability: prediction.probability,
                predicted_at: now,
            };
            if let Err(e) = self.shadow_log.record_shadow(&record).await {
                warn!(txn_id = %txn_id, error = %e, "Failed to record shadow prediction");
            }
        }
    }
}
