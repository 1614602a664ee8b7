//! Error types shared across the engine, stores and batch jobs

use thiserror::Error;

/// Rejections raised while validating a suggestion request, before any
/// scoring work starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("request names no transactions")]
    EmptyBatch,
    #[error("request names {count} transactions, at most {max} are allowed")]
    BatchTooLarge { count: usize, max: usize },
    #[error("top_k must be an integer between 1 and {max}, got {got}")]
    TopKOutOfRange { got: String, max: usize },
    #[error("unknown transaction ids: {}", .0.join(", "))]
    UnknownTransactions(Vec<String>),
    #[error("unknown mode '{0}', expected auto, rules_only or model_only")]
    InvalidMode(String),
    #[error("malformed request body: {0}")]
    Malformed(String),
}

impl RequestError {
    /// Stable machine-readable code, distinct from "no suggestions available"
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyBatch => "empty_batch",
            Self::BatchTooLarge { .. } => "batch_too_large",
            Self::TopKOutOfRange { .. } => "top_k_out_of_range",
            Self::UnknownTransactions(_) => "unknown_transaction",
            Self::InvalidMode(_) => "invalid_mode",
            Self::Malformed(_) => "malformed_request",
        }
    }
}

/// Persistence failures from any store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection unavailable: {0}")]
    Unavailable(String),
    #[error("store query failed: {0}")]
    Query(String),
    #[error("stored data is malformed: {0}")]
    Corrupt(String),
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        if e.is_closed() {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Query(e.to_string())
        }
    }
}

/// Failures while producing model probabilities
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model not loaded")]
    NotLoaded,
    #[error("model file could not be read: {0}")]
    Load(String),
    #[error("model produced invalid output: {0}")]
    InvalidOutput(String),
}

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("unknown suggestion event '{0}'")]
    UnknownEvent(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the top-level suggestion path
#[derive(Debug, Error)]
pub enum SuggestError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum PromotionError {
    #[error("a promotion run is already in progress")]
    AlreadyRunning,
    #[error("promotion aborted after {committed} committed hints: {source}")]
    Aborted {
        committed: usize,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}
