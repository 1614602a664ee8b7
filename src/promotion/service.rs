use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::confidence::{promotion_confidence, round4, PromotionFilters};
use crate::db::HintStore;
use crate::error::{PromotionError, StoreError};
use crate::feedback::FeedbackAggregator;
use crate::labeler::MerchantMajorityLabeler;
use crate::metrics::Metrics;
use crate::models::{HintSource, MerchantCategoryHint, NormalizedMerchant, StatsKey};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionOptions {
    #[serde(default)]
    pub dry_run: bool,
    /// Also upsert labeler majorities as `majority` hints
    #[serde(default)]
    pub seed_majority: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionAction {
    Created,
    Updated,
    Unchanged,
    /// A manual hint already owns the key
    SkippedManual,
}

impl PromotionAction {
    fn writes(self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

/// One key that passed the quality filters, with the values that qualified it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionCandidate {
    pub merchant: NormalizedMerchant,
    pub category_slug: String,
    pub source: HintSource,
    pub accept_count: u64,
    pub reject_count: u64,
    pub support: u64,
    pub accept_ratio: f64,
    pub confidence: f64,
    pub action: PromotionAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionReport {
    pub dry_run: bool,
    pub as_of: NaiveDate,
    pub candidates: Vec<PromotionCandidate>,
    /// Hints actually written; always zero for a dry run
    pub written: usize,
}

impl PromotionReport {
    pub fn count(&self, action: PromotionAction) -> usize {
        self.candidates.iter().filter(|c| c.action == action).count()
    }
}

/// Nightly batch turning feedback statistics into durable merchant hints
pub struct PromotionService {
    feedback: FeedbackAggregator,
    hints: Arc<dyn HintStore>,
    labeler: Option<Arc<MerchantMajorityLabeler>>,
    filters: PromotionFilters,
    running: Mutex<()>,
    metrics: Option<Arc<Metrics>>,
}

impl PromotionService {
    pub fn new(feedback: FeedbackAggregator, hints: Arc<dyn HintStore>) -> Self {
        Self {
            feedback,
            hints,
            labeler: None,
            filters: PromotionFilters::default(),
            running: Mutex::new(()),
            metrics: None,
        }
    }

    /// Labeler used by the optional majority seeding pass
    pub fn with_labeler(mut self, labeler: Arc<MerchantMajorityLabeler>) -> Self {
        self.labeler = Some(labeler);
        self
    }

    pub fn with_filters(mut self, filters: PromotionFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run one promotion pass as of `now`.
    ///
    /// A live run holds both the in-process guard and the store lock; a
    /// second live run fails with `AlreadyRunning`. A dry run computes the
    /// same candidates and writes nothing.
    pub async fn run(
        &self,
        options: PromotionOptions,
        now: DateTime<Utc>,
    ) -> Result<PromotionReport, PromotionError> {
        let mode = if options.dry_run { "dry_run" } else { "live" };
        let result = if options.dry_run {
            self.run_unlocked(options, now).await
        } else {
            self.run_exclusive(options, now).await
        };

        let status = match &result {
            Ok(_) => "ok",
            Err(PromotionError::AlreadyRunning) => "busy",
            Err(PromotionError::Aborted { .. }) => "aborted",
            Err(PromotionError::Store(_)) => "failed",
        };
        if let Some(metrics) = &self.metrics {
            metrics
                .promotion_runs_total
                .with_label_values(&[mode, status])
                .inc();
            if let Ok(report) = &result {
                metrics.hints_promoted_total.inc_by(report.written as u64);
            }
        }

        match &result {
            Ok(report) => info!(
                dry_run = report.dry_run,
                as_of = %report.as_of,
                candidates = report.candidates.len(),
                created = report.count(PromotionAction::Created),
                updated = report.count(PromotionAction::Updated),
                unchanged = report.count(PromotionAction::Unchanged),
                skipped_manual = report.count(PromotionAction::SkippedManual),
                written = report.written,
                "Promotion run finished"
            ),
            Err(e) => warn!(dry_run = options.dry_run, error = %e, "Promotion run failed"),
        }
        result
    }

    async fn run_exclusive(
        &self,
        options: PromotionOptions,
        now: DateTime<Utc>,
    ) -> Result<PromotionReport, PromotionError> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| PromotionError::AlreadyRunning)?;
        if !self.hints.try_lock_promotion().await? {
            return Err(PromotionError::AlreadyRunning);
        }

        let result = self.run_unlocked(options, now).await;

        if let Err(e) = self.hints.unlock_promotion().await {
            warn!(error = %e, "Failed to release promotion lock");
        }
        result
    }

    async fn run_unlocked(
        &self,
        options: PromotionOptions,
        now: DateTime<Utc>,
    ) -> Result<PromotionReport, PromotionError> {
        let as_of = now.date_naive();
        let mut planned = self.plan_feedback_hints(now, as_of).await?;
        if options.seed_majority {
            let promoted: HashSet<StatsKey> = planned
                .iter()
                .map(|(hint, _)| StatsKey::new(hint.merchant.clone(), &hint.category_slug))
                .collect();
            planned.extend(self.plan_majority_hints(now, &promoted).await?);
        }

        let mut written = 0;
        if !options.dry_run {
            for (hint, candidate) in &planned {
                if !candidate.action.writes() {
                    continue;
                }
                self.hints
                    .upsert_hint(hint)
                    .await
                    .map_err(|source| PromotionError::Aborted {
                        committed: written,
                        source,
                    })?;
                written += 1;
                debug!(
                    merchant = %hint.merchant,
                    category = %hint.category_slug,
                    confidence = hint.confidence,
                    source = %hint.source,
                    "Promoted hint"
                );
            }
        }

        Ok(PromotionReport {
            dry_run: options.dry_run,
            as_of,
            candidates: planned.into_iter().map(|(_, c)| c).collect(),
            written,
        })
    }

    /// Qualifying feedback keys, in key order, paired with the hint row
    /// each would write
    async fn plan_feedback_hints(
        &self,
        now: DateTime<Utc>,
        as_of: NaiveDate,
    ) -> Result<Vec<(MerchantCategoryHint, PromotionCandidate)>, StoreError> {
        let mut snapshot = self.feedback.snapshot().await?;
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));

        let mut planned = Vec::new();
        for (key, stats) in snapshot {
            if !self.filters.qualifies(&stats) {
                continue;
            }
            let hint = MerchantCategoryHint::new(
                key.merchant.clone(),
                &key.category_slug,
                promotion_confidence(&stats, as_of),
                HintSource::MlFeedback,
                stats.total(),
                now,
            );
            let action = self.classify(&key, &hint).await?;
            planned.push((
                hint.clone(),
                PromotionCandidate {
                    merchant: key.merchant,
                    category_slug: key.category_slug,
                    source: HintSource::MlFeedback,
                    accept_count: stats.accept_count,
                    reject_count: stats.reject_count,
                    support: stats.total(),
                    accept_ratio: round4(stats.accept_ratio().unwrap_or(0.0)),
                    confidence: hint.confidence,
                    action,
                },
            ));
        }
        Ok(planned)
    }

    /// Labeler majorities for merchants that have no feedback-driven hint
    /// for the same category in this run. Existing learned hints are kept.
    async fn plan_majority_hints(
        &self,
        now: DateTime<Utc>,
        promoted: &HashSet<StatsKey>,
    ) -> Result<Vec<(MerchantCategoryHint, PromotionCandidate)>, StoreError> {
        let Some(labeler) = &self.labeler else {
            warn!("Majority seeding requested without a labeler, skipping");
            return Ok(Vec::new());
        };

        let mut merchants = labeler.labeled_merchants(now).await?;
        merchants.sort();
        merchants.dedup();

        let mut planned = Vec::new();
        for merchant in merchants {
            let Some(majority) = labeler.majority_for(&merchant, now).await? else {
                continue;
            };
            let key = StatsKey::new(merchant.clone(), &majority.category_slug);
            if promoted.contains(&key) {
                continue;
            }
            let existing = self.hints.get_hint(&key).await?;
            if existing
                .as_ref()
                .is_some_and(|h| h.source == HintSource::MlFeedback)
            {
                debug!(key = %key, "Learned hint present, not seeding majority");
                continue;
            }

            let hint = MerchantCategoryHint::new(
                merchant.clone(),
                &majority.category_slug,
                round4(majority.majority_fraction),
                HintSource::Majority,
                majority.support_count,
                now,
            );
            let action = compare_existing(existing.as_ref(), &hint);
            planned.push((
                hint.clone(),
                PromotionCandidate {
                    merchant,
                    category_slug: majority.category_slug,
                    source: HintSource::Majority,
                    accept_count: 0,
                    reject_count: 0,
                    support: majority.support_count,
                    accept_ratio: 0.0,
                    confidence: hint.confidence,
                    action,
                },
            ));
        }
        Ok(planned)
    }

    async fn classify(
        &self,
        key: &StatsKey,
        hint: &MerchantCategoryHint,
    ) -> Result<PromotionAction, StoreError> {
        let existing = self.hints.get_hint(key).await?;
        Ok(compare_existing(existing.as_ref(), hint))
    }
}

fn compare_existing(
    existing: Option<&MerchantCategoryHint>,
    proposed: &MerchantCategoryHint,
) -> PromotionAction {
    match existing {
        None => PromotionAction::Created,
        Some(current) if current.source == HintSource::Manual => PromotionAction::SkippedManual,
        Some(current)
            if current.source == proposed.source
                && current.support == proposed.support
                && round4(current.confidence) == proposed.confidence =>
        {
            PromotionAction::Unchanged
        }
        Some(_) => PromotionAction::Updated,
    }
}
