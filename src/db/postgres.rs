//! PostgreSQL-backed store

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    CategoryStore, FeedbackStore, HintStore, LabelHistory, ShadowLog, SuggestionLog,
    TransactionStore,
};
use crate::config;
use crate::error::StoreError;
use crate::models::{
    CategoryCatalog, CategoryLabel, FeedbackAction, FeedbackEvent, FeedbackStats,
    MerchantCategoryHint, NormalizedMerchant, ServedSuggestion, ShadowPrediction, StatsKey,
    SuggestionSource, Transaction,
};

/// Advisory lock key held for the duration of a promotion run
const PROMOTION_LOCK_KEY: i64 = 0x6c65_6467_7072_6f6d;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    merchant TEXT NOT NULL,
    amount DOUBLE PRECISION NOT NULL,
    occurred_at TIMESTAMPTZ NOT NULL,
    description TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS categories (
    slug TEXT PRIMARY KEY,
    label TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS category_labels (
    transaction_id TEXT NOT NULL,
    merchant TEXT NOT NULL,
    category_slug TEXT NOT NULL,
    labeled_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS category_labels_merchant_idx
    ON category_labels (merchant, labeled_at);
CREATE TABLE IF NOT EXISTS feedback_events (
    id BIGSERIAL PRIMARY KEY,
    transaction_id TEXT NOT NULL,
    merchant TEXT NOT NULL,
    category_slug TEXT NOT NULL,
    action TEXT NOT NULL,
    reason TEXT,
    occurred_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE IF NOT EXISTS feedback_stats (
    merchant TEXT NOT NULL,
    category_slug TEXT NOT NULL,
    accept_count BIGINT NOT NULL DEFAULT 0,
    reject_count BIGINT NOT NULL DEFAULT 0,
    last_feedback_at TIMESTAMPTZ,
    PRIMARY KEY (merchant, category_slug)
);
CREATE TABLE IF NOT EXISTS merchant_category_hints (
    merchant TEXT NOT NULL,
    category_slug TEXT NOT NULL,
    confidence DOUBLE PRECISION NOT NULL CHECK (confidence >= 0 AND confidence <= 1),
    source TEXT NOT NULL,
    support BIGINT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (merchant, category_slug)
);
CREATE TABLE IF NOT EXISTS suggestion_events (
    event_id TEXT PRIMARY KEY,
    transaction_id TEXT NOT NULL,
    merchant TEXT NOT NULL,
    category_slug TEXT NOT NULL,
    score DOUBLE PRECISION NOT NULL,
    source TEXT NOT NULL,
    served_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE IF NOT EXISTS shadow_predictions (
    transaction_id TEXT NOT NULL,
    category_slug TEXT NOT NULL,
    probability DOUBLE PRECISION NOT NULL,
    predicted_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS shadow_predictions_txn_idx
    ON shadow_predictions (transaction_id, predicted_at);
";

pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    /// Connect using `DATABASE_URL`, retrying with exponential backoff
    pub async fn new() -> Result<Self, StoreError> {
        Self::connect(&config::get_database_url()).await
    }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let (client, connection) = (|| async { tokio_postgres::connect(url, NoTls).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(200))
                    .with_max_times(5),
            )
            .notify(|e, delay| {
                warn!(error = %e, delay_ms = delay.as_millis(), "Postgres connect failed, retrying");
            })
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect to Postgres: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "Postgres connection error");
            }
        });

        let store = Self { client };
        store.init_schema().await?;
        info!("Postgres store ready");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.client
            .batch_execute(SCHEMA)
            .await
            .map_err(|e| StoreError::Query(format!("Failed to create schema: {}", e)))
    }
}

fn count(value: i64) -> u64 {
    value.max(0) as u64
}

fn suggestion_source(raw: &str) -> Result<SuggestionSource, StoreError> {
    match raw {
        "rule" => Ok(SuggestionSource::Rule),
        "hint" => Ok(SuggestionSource::Hint),
        "model" => Ok(SuggestionSource::Model),
        "majority" => Ok(SuggestionSource::Majority),
        other => Err(StoreError::Corrupt(format!("unknown suggestion source '{}'", other))),
    }
}

fn hint_from_row(row: &Row) -> Result<MerchantCategoryHint, StoreError> {
    let merchant: String = row.get(0);
    let category_slug: String = row.get(1);
    let source: String = row.get(3);
    Ok(MerchantCategoryHint {
        merchant: NormalizedMerchant::from_canonical(merchant),
        category_slug,
        confidence: row.get(2),
        source: source.parse().map_err(StoreError::Corrupt)?,
        support: count(row.get(4)),
        updated_at: row.get(5),
    })
}

#[async_trait]
impl TransactionStore for PostgresStore {
    async fn transactions_by_ids(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, Transaction>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT id, merchant, amount, occurred_at, description
                 FROM transactions WHERE id = ANY($1)",
                &[&ids],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let txn = Transaction {
                    id: row.get(0),
                    merchant: row.get(1),
                    amount: row.get::<_, f64>(2).abs(),
                    occurred_at: row.get(3),
                    description: row.get(4),
                };
                (txn.id.clone(), txn)
            })
            .collect())
    }
}

#[async_trait]
impl LabelHistory for PostgresStore {
    async fn labels_for_merchant(
        &self,
        merchant: &NormalizedMerchant,
        since: DateTime<Utc>,
    ) -> Result<Vec<CategoryLabel>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT transaction_id, category_slug, labeled_at
                 FROM category_labels
                 WHERE merchant = $1 AND labeled_at >= $2",
                &[&merchant.as_str(), &since],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| CategoryLabel {
                transaction_id: row.get(0),
                merchant: merchant.clone(),
                category_slug: row.get(1),
                labeled_at: row.get(2),
            })
            .collect())
    }

    async fn labeled_merchants(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<NormalizedMerchant>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT DISTINCT merchant FROM category_labels
                 WHERE labeled_at >= $1 ORDER BY merchant",
                &[&since],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| NormalizedMerchant::from_canonical(row.get::<_, String>(0)))
            .collect())
    }
}

#[async_trait]
impl FeedbackStore for PostgresStore {
    async fn record_feedback(&self, event: &FeedbackEvent) -> Result<FeedbackStats, StoreError> {
        let (accept, reject): (i64, i64) = match event.action {
            FeedbackAction::Accept => (1, 0),
            FeedbackAction::Reject => (0, 1),
        };

        // Single statement: the event insert and the counter upsert commit together,
        // and ON CONFLICT row locking serializes concurrent increments.
        let row = self
            .client
            .query_one(
                "WITH appended AS (
                    INSERT INTO feedback_events
                        (transaction_id, merchant, category_slug, action, reason, occurred_at)
                    VALUES ($1, $2, $3, $4, $5, $8)
                 )
                 INSERT INTO feedback_stats AS s
                    (merchant, category_slug, accept_count, reject_count, last_feedback_at)
                 VALUES ($2, $3, $6, $7, $8)
                 ON CONFLICT (merchant, category_slug) DO UPDATE SET
                    accept_count = s.accept_count + EXCLUDED.accept_count,
                    reject_count = s.reject_count + EXCLUDED.reject_count,
                    last_feedback_at = GREATEST(s.last_feedback_at, EXCLUDED.last_feedback_at)
                 RETURNING accept_count, reject_count, last_feedback_at",
                &[
                    &event.transaction_id,
                    &event.merchant.as_str(),
                    &event.category_slug,
                    &event.action.as_str(),
                    &event.reason,
                    &accept,
                    &reject,
                    &event.occurred_at,
                ],
            )
            .await?;

        Ok(FeedbackStats::new(
            count(row.get(0)),
            count(row.get(1)),
            row.get(2),
        ))
    }

    async fn load_stats(
        &self,
        keys: &[StatsKey],
    ) -> Result<HashMap<StatsKey, FeedbackStats>, StoreError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let merchants: Vec<&str> = keys.iter().map(|k| k.merchant.as_str()).collect();
        let categories: Vec<&str> = keys.iter().map(|k| k.category_slug.as_str()).collect();

        let rows = self
            .client
            .query(
                "SELECT s.merchant, s.category_slug, s.accept_count, s.reject_count, s.last_feedback_at
                 FROM feedback_stats s
                 JOIN UNNEST($1::text[], $2::text[]) AS k(merchant, category_slug)
                   ON s.merchant = k.merchant AND s.category_slug = k.category_slug",
                &[&merchants, &categories],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let key = StatsKey::new(
                    NormalizedMerchant::from_canonical(row.get::<_, String>(0)),
                    row.get::<_, &str>(1),
                );
                let stats = FeedbackStats::new(count(row.get(2)), count(row.get(3)), row.get(4));
                (key, stats)
            })
            .collect())
    }

    async fn stats_snapshot(&self) -> Result<Vec<(StatsKey, FeedbackStats)>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT merchant, category_slug, accept_count, reject_count, last_feedback_at
                 FROM feedback_stats ORDER BY merchant, category_slug",
                &[],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    StatsKey::new(
                        NormalizedMerchant::from_canonical(row.get::<_, String>(0)),
                        row.get::<_, &str>(1),
                    ),
                    FeedbackStats::new(count(row.get(2)), count(row.get(3)), row.get(4)),
                )
            })
            .collect())
    }
}

#[async_trait]
impl HintStore for PostgresStore {
    async fn hints_for_merchants(
        &self,
        merchants: &[NormalizedMerchant],
    ) -> Result<Vec<MerchantCategoryHint>, StoreError> {
        if merchants.is_empty() {
            return Ok(Vec::new());
        }
        let names: Vec<&str> = merchants.iter().map(NormalizedMerchant::as_str).collect();
        let rows = self
            .client
            .query(
                "SELECT merchant, category_slug, confidence, source, support, updated_at
                 FROM merchant_category_hints
                 WHERE merchant = ANY($1)
                 ORDER BY merchant, category_slug",
                &[&names],
            )
            .await?;
        rows.iter().map(hint_from_row).collect()
    }

    async fn get_hint(&self, key: &StatsKey) -> Result<Option<MerchantCategoryHint>, StoreError> {
        let row = self
            .client
            .query_opt(
                "SELECT merchant, category_slug, confidence, source, support, updated_at
                 FROM merchant_category_hints
                 WHERE merchant = $1 AND category_slug = $2",
                &[&key.merchant.as_str(), &key.category_slug],
            )
            .await?;
        row.as_ref().map(hint_from_row).transpose()
    }

    async fn upsert_hint(&self, hint: &MerchantCategoryHint) -> Result<(), StoreError> {
        let support = hint.support as i64;
        self.client
            .execute(
                "INSERT INTO merchant_category_hints
                    (merchant, category_slug, confidence, source, support, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (merchant, category_slug) DO UPDATE SET
                    confidence = EXCLUDED.confidence,
                    source = EXCLUDED.source,
                    support = EXCLUDED.support,
                    updated_at = EXCLUDED.updated_at",
                &[
                    &hint.merchant.as_str(),
                    &hint.category_slug,
                    &hint.confidence,
                    &hint.source.as_str(),
                    &support,
                    &hint.updated_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn try_lock_promotion(&self) -> Result<bool, StoreError> {
        let row = self
            .client
            .query_one("SELECT pg_try_advisory_lock($1)", &[&PROMOTION_LOCK_KEY])
            .await?;
        Ok(row.get(0))
    }

    async fn unlock_promotion(&self) -> Result<(), StoreError> {
        self.client
            .query_one("SELECT pg_advisory_unlock($1)", &[&PROMOTION_LOCK_KEY])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SuggestionLog for PostgresStore {
    async fn record_served(&self, served: &[ServedSuggestion]) -> Result<(), StoreError> {
        if served.is_empty() {
            return Ok(());
        }
        let event_ids: Vec<String> = served.iter().map(|s| s.event_id.to_string()).collect();
        let txn_ids: Vec<&str> = served.iter().map(|s| s.transaction_id.as_str()).collect();
        let merchants: Vec<&str> = served.iter().map(|s| s.merchant.as_str()).collect();
        let categories: Vec<&str> = served.iter().map(|s| s.category_slug.as_str()).collect();
        let scores: Vec<f64> = served.iter().map(|s| s.score).collect();
        let sources: Vec<&str> = served.iter().map(|s| s.source.as_str()).collect();
        let served_at: Vec<DateTime<Utc>> = served.iter().map(|s| s.served_at).collect();

        self.client
            .execute(
                "INSERT INTO suggestion_events
                    (event_id, transaction_id, merchant, category_slug, score, source, served_at)
                 SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[],
                                      $5::float8[], $6::text[], $7::timestamptz[])",
                &[
                    &event_ids,
                    &txn_ids,
                    &merchants,
                    &categories,
                    &scores,
                    &sources,
                    &served_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn served_by_event(
        &self,
        event_id: &Uuid,
    ) -> Result<Option<ServedSuggestion>, StoreError> {
        let row = self
            .client
            .query_opt(
                "SELECT transaction_id, merchant, category_slug, score, source, served_at
                 FROM suggestion_events WHERE event_id = $1",
                &[&event_id.to_string()],
            )
            .await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(ServedSuggestion {
                event_id: *event_id,
                transaction_id: row.get(0),
                merchant: NormalizedMerchant::from_canonical(row.get::<_, String>(1)),
                category_slug: row.get(2),
                score: row.get(3),
                source: suggestion_source(row.get(4))?,
                served_at: row.get(5),
            })),
        }
    }
}

#[async_trait]
impl ShadowLog for PostgresStore {
    async fn record_shadow(&self, prediction: &ShadowPrediction) -> Result<(), StoreError> {
        self.client
            .execute(
                "INSERT INTO shadow_predictions (transaction_id, category_slug, probability, predicted_at)
                 VALUES ($1, $2, $3, $4)",
                &[
                    &prediction.transaction_id,
                    &prediction.category_slug,
                    &prediction.probability,
                    &prediction.predicted_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn shadow_for_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<ShadowPrediction>, StoreError> {
        let row = self
            .client
            .query_opt(
                "SELECT category_slug, probability, predicted_at
                 FROM shadow_predictions
                 WHERE transaction_id = $1
                 ORDER BY predicted_at DESC
                 LIMIT 1",
                &[&transaction_id],
            )
            .await?;
        Ok(row.map(|row| ShadowPrediction {
            transaction_id: transaction_id.to_string(),
            category_slug: row.get(0),
            probability: row.get(1),
            predicted_at: row.get(2),
        }))
    }
}

#[async_trait]
impl CategoryStore for PostgresStore {
    async fn load_catalog(&self) -> Result<CategoryCatalog, StoreError> {
        let rows = self
            .client
            .query("SELECT slug, label FROM categories", &[])
            .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get::<_, String>(0), row.get::<_, String>(1)))
            .collect())
    }
}
