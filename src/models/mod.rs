//! Shared data models spanning the engine layers.

pub mod category;
pub mod feedback;
pub mod hint;
pub mod label;
pub mod merchant;
pub mod suggestion;
pub mod transaction;

pub use category::CategoryCatalog;
pub use feedback::{FeedbackAction, FeedbackEvent, FeedbackStats, StatsKey};
pub use hint::{HintSource, MerchantCategoryHint};
pub use label::{CategoryLabel, MerchantMajority};
pub use merchant::NormalizedMerchant;
pub use suggestion::{
    Candidate, CandidateView, FeedbackRequest, FeedbackResponse, ServedSuggestion,
    ShadowPrediction, Suggestion, SuggestionItem, SuggestionMode, SuggestionRequest,
    SuggestionResponse, SuggestionSource,
};
pub use transaction::{Transaction, TransactionFeatures};
