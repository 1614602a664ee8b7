//! Feedback endpoint flow: resolve the served suggestion, record the event,
//! compare against any shadow prediction.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::aggregator::FeedbackAggregator;
use crate::config::ShadowComparison;
use crate::db::{ShadowLog, SuggestionLog};
use crate::error::FeedbackError;
use crate::metrics::Metrics;
use crate::models::{
    FeedbackAction, FeedbackEvent, FeedbackRequest, FeedbackResponse, FeedbackStats,
    ServedSuggestion,
};

pub struct FeedbackService {
    aggregator: FeedbackAggregator,
    suggestions: Arc<dyn SuggestionLog>,
    shadow: Arc<dyn ShadowLog>,
    comparison: ShadowComparison,
    metrics: Option<Arc<Metrics>>,
}

impl FeedbackService {
    pub fn new(
        aggregator: FeedbackAggregator,
        suggestions: Arc<dyn SuggestionLog>,
        shadow: Arc<dyn ShadowLog>,
        comparison: ShadowComparison,
    ) -> Self {
        Self {
            aggregator,
            suggestions,
            shadow,
            comparison,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Handle a feedback request. Never fails: problems are logged and
    /// reported as `ok: false`.
    pub async fn submit(&self, request: &FeedbackRequest, now: DateTime<Utc>) -> FeedbackResponse {
        match self.apply(request, now).await {
            Ok(_) => FeedbackResponse { ok: true },
            Err(e) => {
                warn!(event_id = %request.event_id, error = %e, "Feedback not recorded");
                if let Some(metrics) = &self.metrics {
                    metrics.feedback_failures_total.inc();
                }
                FeedbackResponse { ok: false }
            }
        }
    }

    /// Resolve and record one feedback request
    pub async fn apply(
        &self,
        request: &FeedbackRequest,
        now: DateTime<Utc>,
    ) -> Result<FeedbackStats, FeedbackError> {
        let served = self.resolve(&request.event_id).await?;
        let event = FeedbackEvent {
            transaction_id: served.transaction_id.clone(),
            merchant: served.merchant.clone(),
            category_slug: served.category_slug.clone(),
            action: request.action,
            occurred_at: now,
            reason: request.reason.clone(),
        };

        let stats = self.aggregator.record(&event).await?;
        if let Some(metrics) = &self.metrics {
            metrics
                .feedback_recorded_total
                .with_label_values(&[request.action.as_str()])
                .inc();
        }

        if self.comparison.compares_feedback() {
            self.compare_shadow(&served, request.action).await;
        }

        Ok(stats)
    }

    async fn resolve(&self, raw_event_id: &str) -> Result<ServedSuggestion, FeedbackError> {
        let event_id = Uuid::parse_str(raw_event_id)
            .map_err(|_| FeedbackError::UnknownEvent(raw_event_id.to_string()))?;
        self.suggestions
            .served_by_event(&event_id)
            .await?
            .ok_or_else(|| FeedbackError::UnknownEvent(raw_event_id.to_string()))
    }

    /// An accept confirms the served category; a reject only tells us the
    /// served category was wrong.
    async fn compare_shadow(&self, served: &ServedSuggestion, action: FeedbackAction) {
        let prediction = match self.shadow.shadow_for_transaction(&served.transaction_id).await {
            Ok(Some(p)) => p,
            Ok(None) => return,
            Err(e) => {
                debug!(transaction_id = %served.transaction_id, error = %e, "Shadow lookup failed");
                return;
            }
        };

        let same_category = prediction.category_slug == served.category_slug;
        let outcome = match (action, same_category) {
            (FeedbackAction::Accept, true) => "agree",
            (FeedbackAction::Accept, false) => "disagree",
            (FeedbackAction::Reject, true) => "disagree",
            (FeedbackAction::Reject, false) => "inconclusive",
        };

        info!(
            transaction_id = %served.transaction_id,
            served = %served.category_slug,
            shadow = %prediction.category_slug,
            action = %action,
            outcome = outcome,
            "Shadow prediction compared with feedback"
        );
        if let Some(metrics) = &self.metrics {
            metrics
                .shadow_agreement_total
                .with_label_values(&["feedback", outcome])
                .inc();
        }
    }
}
