//! Suggestion scoring: feedback adjustment, blending and the request path.

pub mod aggregation;
pub mod engine;
pub mod scoring;

pub use aggregation::{merge_candidates, rank, ScoreBlender, ScoredCandidate};
pub use engine::{SuggestionEngine, ValidatedRequest};
pub use scoring::{adjust_score, FeedbackWeights, ScoreAdjustment};
