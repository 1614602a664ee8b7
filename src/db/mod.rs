//! Storage seams for the engine.
//!
//! Each concern gets its own trait so components only see what they read or
//! write. `PostgresStore` and `MemoryStore` implement all of them.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    CategoryCatalog, CategoryLabel, FeedbackEvent, FeedbackStats, MerchantCategoryHint,
    NormalizedMerchant, ServedSuggestion, ShadowPrediction, StatsKey, Transaction,
};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Transactions for the ids that exist; missing ids are simply absent
    async fn transactions_by_ids(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, Transaction>, StoreError>;
}

#[async_trait]
pub trait LabelHistory: Send + Sync {
    async fn labels_for_merchant(
        &self,
        merchant: &NormalizedMerchant,
        since: DateTime<Utc>,
    ) -> Result<Vec<CategoryLabel>, StoreError>;

    /// Merchants with at least one label since `since`
    async fn labeled_merchants(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<NormalizedMerchant>, StoreError>;
}

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Append the event and atomically bump the counter for its key.
    /// Returns the aggregate after the increment.
    async fn record_feedback(&self, event: &FeedbackEvent) -> Result<FeedbackStats, StoreError>;

    /// Stored aggregates for the requested keys in one read. Keys without
    /// history are absent from the map.
    async fn load_stats(
        &self,
        keys: &[StatsKey],
    ) -> Result<HashMap<StatsKey, FeedbackStats>, StoreError>;

    async fn stats_snapshot(&self) -> Result<Vec<(StatsKey, FeedbackStats)>, StoreError>;
}

#[async_trait]
pub trait HintStore: Send + Sync {
    async fn hints_for_merchants(
        &self,
        merchants: &[NormalizedMerchant],
    ) -> Result<Vec<MerchantCategoryHint>, StoreError>;

    async fn get_hint(&self, key: &StatsKey) -> Result<Option<MerchantCategoryHint>, StoreError>;

    /// Insert or replace the single row for `(merchant, category_slug)`
    async fn upsert_hint(&self, hint: &MerchantCategoryHint) -> Result<(), StoreError>;

    /// Cross-process exclusion for the promotion batch
    async fn try_lock_promotion(&self) -> Result<bool, StoreError>;

    async fn unlock_promotion(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SuggestionLog: Send + Sync {
    async fn record_served(&self, served: &[ServedSuggestion]) -> Result<(), StoreError>;

    async fn served_by_event(&self, event_id: &Uuid)
        -> Result<Option<ServedSuggestion>, StoreError>;
}

#[async_trait]
pub trait ShadowLog: Send + Sync {
    async fn record_shadow(&self, prediction: &ShadowPrediction) -> Result<(), StoreError>;

    /// Most recent shadow prediction for a transaction
    async fn shadow_for_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<ShadowPrediction>, StoreError>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn load_catalog(&self) -> Result<CategoryCatalog, StoreError>;
}

/// Everything a backend has to provide
pub trait Store:
    TransactionStore
    + LabelHistory
    + FeedbackStore
    + HintStore
    + SuggestionLog
    + ShadowLog
    + CategoryStore
{
}

impl<T> Store for T where
    T: TransactionStore
        + LabelHistory
        + FeedbackStore
        + HintStore
        + SuggestionLog
        + ShadowLog
        + CategoryStore
{
}

/// One backend viewed through each of its traits
#[derive(Clone)]
pub struct StoreHandles {
    pub transactions: Arc<dyn TransactionStore>,
    pub labels: Arc<dyn LabelHistory>,
    pub feedback: Arc<dyn FeedbackStore>,
    pub hints: Arc<dyn HintStore>,
    pub suggestions: Arc<dyn SuggestionLog>,
    pub shadow: Arc<dyn ShadowLog>,
    pub categories: Arc<dyn CategoryStore>,
}

impl StoreHandles {
    pub fn from_store<S: Store + 'static>(store: Arc<S>) -> Self {
        Self {
            transactions: store.clone(),
            labels: store.clone(),
            feedback: store.clone(),
            hints: store.clone(),
            suggestions: store.clone(),
            shadow: store.clone(),
            categories: store,
        }
    }
}
