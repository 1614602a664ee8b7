//! In-process store used for development and tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CategoryStore, FeedbackStore, HintStore, LabelHistory, ShadowLog, SuggestionLog,
    TransactionStore,
};
use crate::error::StoreError;
use crate::models::{
    CategoryCatalog, CategoryLabel, FeedbackEvent, FeedbackStats, MerchantCategoryHint,
    NormalizedMerchant, ServedSuggestion, ShadowPrediction, StatsKey, Transaction,
};

#[derive(Default)]
struct MemoryState {
    transactions: HashMap<String, Transaction>,
    labels: Vec<CategoryLabel>,
    categories: CategoryCatalog,
    feedback_events: Vec<FeedbackEvent>,
    feedback_stats: HashMap<StatsKey, FeedbackStats>,
    hints: HashMap<StatsKey, MerchantCategoryHint>,
    served: HashMap<Uuid, ServedSuggestion>,
    shadow: HashMap<String, ShadowPrediction>,
}

/// All state behind one lock so every write is atomic with respect to readers
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    promotion_locked: AtomicBool,
    stats_reads: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_transaction(&self, txn: Transaction) {
        self.state
            .write()
            .await
            .transactions
            .insert(txn.id.clone(), txn);
    }

    pub async fn insert_label(&self, label: CategoryLabel) {
        self.state.write().await.labels.push(label);
    }

    pub async fn insert_category(&self, slug: &str, label: &str) {
        self.state.write().await.categories.insert(slug, label);
    }

    /// Overwrite the aggregate for a key, bypassing event history
    pub async fn put_stats(&self, key: StatsKey, stats: FeedbackStats) {
        self.state.write().await.feedback_stats.insert(key, stats);
    }

    pub async fn feedback_events(&self) -> Vec<FeedbackEvent> {
        self.state.read().await.feedback_events.clone()
    }

    pub async fn all_hints(&self) -> Vec<MerchantCategoryHint> {
        let mut hints: Vec<_> = self.state.read().await.hints.values().cloned().collect();
        hints.sort_by(|a, b| {
            (a.merchant.as_str(), a.category_slug.as_str())
                .cmp(&(b.merchant.as_str(), b.category_slug.as_str()))
        });
        hints
    }

    pub async fn served_count(&self) -> usize {
        self.state.read().await.served.len()
    }

    /// Number of `load_stats` calls served so far
    pub fn stats_reads(&self) -> usize {
        self.stats_reads.load(Ordering::SeqCst)
    }

    /// Make every subsequent write fail, to exercise failure isolation
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store is read-only".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn transactions_by_ids(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, Transaction>, StoreError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.transactions.get(id).map(|t| (id.clone(), t.clone())))
            .collect())
    }
}

#[async_trait]
impl LabelHistory for MemoryStore {
    async fn labels_for_merchant(
        &self,
        merchant: &NormalizedMerchant,
        since: DateTime<Utc>,
    ) -> Result<Vec<CategoryLabel>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .labels
            .iter()
            .filter(|l| &l.merchant == merchant && l.labeled_at >= since)
            .cloned()
            .collect())
    }

    async fn labeled_merchants(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<NormalizedMerchant>, StoreError> {
        let state = self.state.read().await;
        let mut merchants: Vec<_> = state
            .labels
            .iter()
            .filter(|l| l.labeled_at >= since)
            .map(|l| l.merchant.clone())
            .collect();
        merchants.sort();
        merchants.dedup();
        Ok(merchants)
    }
}

#[async_trait]
impl FeedbackStore for MemoryStore {
    async fn record_feedback(&self, event: &FeedbackEvent) -> Result<FeedbackStats, StoreError> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        state.feedback_events.push(event.clone());
        let stats = state.feedback_stats.entry(event.key()).or_default();
        stats.apply(event.action, event.occurred_at);
        Ok(stats.clone())
    }

    async fn load_stats(
        &self,
        keys: &[StatsKey],
    ) -> Result<HashMap<StatsKey, FeedbackStats>, StoreError> {
        self.stats_reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read().await;
        Ok(keys
            .iter()
            .filter_map(|k| state.feedback_stats.get(k).map(|s| (k.clone(), s.clone())))
            .collect())
    }

    async fn stats_snapshot(&self) -> Result<Vec<(StatsKey, FeedbackStats)>, StoreError> {
        let state = self.state.read().await;
        let mut rows: Vec<_> = state
            .feedback_stats
            .iter()
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }
}

#[async_trait]
impl HintStore for MemoryStore {
    async fn hints_for_merchants(
        &self,
        merchants: &[NormalizedMerchant],
    ) -> Result<Vec<MerchantCategoryHint>, StoreError> {
        let state = self.state.read().await;
        let mut hints: Vec<_> = state
            .hints
            .values()
            .filter(|h| merchants.contains(&h.merchant))
            .cloned()
            .collect();
        hints.sort_by(|a, b| a.category_slug.cmp(&b.category_slug));
        Ok(hints)
    }

    async fn get_hint(&self, key: &StatsKey) -> Result<Option<MerchantCategoryHint>, StoreError> {
        Ok(self.state.read().await.hints.get(key).cloned())
    }

    async fn upsert_hint(&self, hint: &MerchantCategoryHint) -> Result<(), StoreError> {
        self.check_writable()?;
        let key = StatsKey::new(hint.merchant.clone(), &hint.category_slug);
        self.state.write().await.hints.insert(key, hint.clone());
        Ok(())
    }

    async fn try_lock_promotion(&self) -> Result<bool, StoreError> {
        Ok(self
            .promotion_locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok())
    }

    async fn unlock_promotion(&self) -> Result<(), StoreError> {
        self.promotion_locked.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SuggestionLog for MemoryStore {
    async fn record_served(&self, served: &[ServedSuggestion]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        for row in served {
            state.served.insert(row.event_id, row.clone());
        }
        Ok(())
    }

    async fn served_by_event(
        &self,
        event_id: &Uuid,
    ) -> Result<Option<ServedSuggestion>, StoreError> {
        Ok(self.state.read().await.served.get(event_id).cloned())
    }
}

#[async_trait]
impl ShadowLog for MemoryStore {
    async fn record_shadow(&self, prediction: &ShadowPrediction) -> Result<(), StoreError> {
        self.check_writable()?;
        self.state
            .write()
            .await
            .shadow
            .insert(prediction.transaction_id.clone(), prediction.clone());
        Ok(())
    }

    async fn shadow_for_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<ShadowPrediction>, StoreError> {
        Ok(self.state.read().await.shadow.get(transaction_id).cloned())
    }
}

#[async_trait]
impl CategoryStore for MemoryStore {
    async fn load_catalog(&self) -> Result<CategoryCatalog, StoreError> {
        Ok(self.state.read().await.categories.clone())
    }
}
