//! Candidate merging, feedback adjustment and ranking

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;

use super::scoring::{adjust_score, FeedbackWeights, ScoreAdjustment};
use crate::models::{Candidate, FeedbackStats, NormalizedMerchant, StatsKey};

/// Candidate after feedback adjustment
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub adjustment: ScoreAdjustment,
}

impl ScoredCandidate {
    pub fn score(&self) -> f64 {
        self.adjustment.adjusted
    }
}

/// Collapse candidates naming the same category into one: the highest base
/// score wins (ties go to the higher-priority source) and rationales are
/// unioned in arrival order.
pub fn merge_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, Candidate> = HashMap::new();

    for candidate in candidates {
        match merged.get_mut(&candidate.category_slug) {
            None => {
                order.push(candidate.category_slug.clone());
                merged.insert(candidate.category_slug.clone(), candidate);
            }
            Some(existing) => {
                let mut why = std::mem::take(&mut existing.why);
                for reason in &candidate.why {
                    if !why.contains(reason) {
                        why.push(reason.clone());
                    }
                }
                let replace = match candidate.base_score.total_cmp(&existing.base_score) {
                    Ordering::Greater => true,
                    Ordering::Equal => candidate.source.priority() > existing.source.priority(),
                    Ordering::Less => false,
                };
                if replace {
                    existing.base_score = candidate.base_score;
                    existing.source = candidate.source;
                }
                existing.why = why;
            }
        }
    }

    order
        .into_iter()
        .filter_map(|slug| merged.remove(&slug))
        .collect()
}

/// Adjusted score desc, then base score desc, then source priority, then slug
pub fn rank(scored: &mut [ScoredCandidate]) {
    scored.sort_by(|a, b| {
        b.score()
            .total_cmp(&a.score())
            .then_with(|| b.candidate.base_score.total_cmp(&a.candidate.base_score))
            .then_with(|| {
                b.candidate
                    .source
                    .priority()
                    .cmp(&a.candidate.source.priority())
            })
            .then_with(|| a.candidate.category_slug.cmp(&b.candidate.category_slug))
    });
}

/// Applies feedback statistics to candidates and produces the ranked top-K
#[derive(Debug, Clone, Copy)]
pub struct ScoreBlender {
    weights: FeedbackWeights,
    min_score: f64,
}

impl ScoreBlender {
    pub fn new(weights: FeedbackWeights, min_score: f64) -> Self {
        Self { weights, min_score }
    }

    pub fn weights(&self) -> &FeedbackWeights {
        &self.weights
    }

    /// Stats keys for every candidate of a merchant
    pub fn stats_keys(merchant: &NormalizedMerchant, candidates: &[Candidate]) -> Vec<StatsKey> {
        candidates
            .iter()
            .map(|c| StatsKey::new(merchant.clone(), &c.category_slug))
            .collect()
    }

    /// Merge, adjust, drop candidates under the floor, rank and truncate.
    /// Keys missing from `stats` are treated as having no history.
    pub fn blend(
        &self,
        merchant: &NormalizedMerchant,
        candidates: Vec<Candidate>,
        stats: &HashMap<StatsKey, FeedbackStats>,
        top_k: usize,
        now: DateTime<Utc>,
    ) -> Vec<ScoredCandidate> {
        let empty = FeedbackStats::default();
        let mut scored: Vec<ScoredCandidate> = merge_candidates(candidates)
            .into_iter()
            .map(|mut candidate| {
                let key = StatsKey::new(merchant.clone(), &candidate.category_slug);
                let feedback = stats.get(&key).unwrap_or(&empty);
                let adjustment =
                    adjust_score(candidate.base_score, feedback, now, &self.weights);
                if !feedback.is_empty() {
                    candidate.why.push(format!(
                        "feedback: {} accepted, {} rejected",
                        feedback.accept_count, feedback.reject_count
                    ));
                }
                ScoredCandidate {
                    candidate,
                    adjustment,
                }
            })
            .filter(|s| s.score() >= self.min_score)
            .collect();

        rank(&mut scored);
        scored.truncate(top_k);
        scored
    }
}
