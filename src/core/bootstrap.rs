//! Wiring shared by the binaries and the integration tests: store backend,
//! collaborators and the services built on top of them.

use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{MajorityCache, RedisCache};
use crate::config::{self, EngineConfig, StoreBackend};
use crate::db::{HintStore, MemoryStore, PostgresStore, StoreHandles};
use crate::error::StoreError;
use crate::feedback::{FeedbackAggregator, FeedbackService};
use crate::labeler::MerchantMajorityLabeler;
use crate::metrics::Metrics;
use crate::promotion::PromotionService;
use crate::routing::{CanaryMode, CanaryRouter};
use crate::services::{CategoryModel, KeywordRuleSet, LinearCategoryModel, RuleEngine};
use crate::signals::SuggestionEngine;

/// Collaborators outside the store
#[derive(Clone)]
pub struct ServiceOptions {
    pub config: EngineConfig,
    pub canary: CanaryMode,
    pub model: Option<Arc<dyn CategoryModel>>,
    pub rules: Arc<dyn RuleEngine>,
    pub cache: Option<Arc<dyn MajorityCache>>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            canary: CanaryMode::Off,
            model: None,
            rules: Arc::new(KeywordRuleSet::default()),
            cache: None,
        }
    }
}

impl ServiceOptions {
    /// Everything from the environment. Missing or broken model and rule
    /// files degrade to "model unavailable" and an empty rule set.
    pub async fn from_env(metrics: &Metrics) -> Self {
        Self {
            config: EngineConfig::from_env(),
            canary: config::get_canary_mode(),
            model: load_model(),
            rules: load_rules(),
            cache: connect_cache(metrics).await,
        }
    }
}

pub struct Services {
    pub store: StoreHandles,
    pub hints: Arc<dyn HintStore>,
    pub labeler: Arc<MerchantMajorityLabeler>,
    pub engine: Arc<SuggestionEngine>,
    pub feedback: Arc<FeedbackService>,
    pub promotion: Arc<PromotionService>,
    pub metrics: Arc<Metrics>,
}

impl Services {
    pub async fn build(store: StoreHandles, options: ServiceOptions, metrics: Arc<Metrics>) -> Self {
        let ServiceOptions {
            config,
            canary,
            model,
            rules,
            cache,
        } = options;

        let mut labeler = MerchantMajorityLabeler::new(store.labels.clone(), &config);
        if let Some(cache) = cache {
            labeler = labeler.with_cache(cache);
        }
        let labeler = Arc::new(labeler);
        let aggregator = FeedbackAggregator::new(store.feedback.clone());

        let catalog = match store.categories.load_catalog().await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(error = %e, "Failed to load category catalog, labels fall back to slugs");
                Default::default()
            }
        };

        info!(
            canary = %canary,
            model = model.as_ref().map(|m| m.name()).unwrap_or("none"),
            categories = catalog.len(),
            "Suggestion engine configured"
        );

        let mut engine = SuggestionEngine::new(
            config.clone(),
            CanaryRouter::new(canary),
            rules,
            labeler.clone(),
            aggregator.clone(),
            store.transactions.clone(),
            store.hints.clone(),
            store.suggestions.clone(),
            store.shadow.clone(),
        )
        .with_catalog(catalog)
        .with_metrics(metrics.clone());
        if let Some(model) = model {
            engine = engine.with_model(model);
        }

        let feedback = FeedbackService::new(
            aggregator.clone(),
            store.suggestions.clone(),
            store.shadow.clone(),
            config.shadow_comparison,
        )
        .with_metrics(metrics.clone());

        let promotion = PromotionService::new(aggregator, store.hints.clone())
            .with_labeler(labeler.clone())
            .with_metrics(metrics.clone());

        Self {
            hints: store.hints.clone(),
            store,
            labeler,
            engine: Arc::new(engine),
            feedback: Arc::new(feedback),
            promotion: Arc::new(promotion),
            metrics,
        }
    }
}

/// Connect the configured store backend
pub async fn connect_store(backend: StoreBackend, metrics: &Metrics) -> Result<StoreHandles, StoreError> {
    match backend {
        StoreBackend::Postgres => {
            let store = PostgresStore::new().await?;
            metrics.database_connected.set(1.0);
            info!("PostgreSQL connected");
            Ok(StoreHandles::from_store(Arc::new(store)))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store, data is lost on restart");
            Ok(StoreHandles::from_store(Arc::new(MemoryStore::new())))
        }
    }
}

pub fn load_model() -> Option<Arc<dyn CategoryModel>> {
    let path = config::get_model_path()?;
    match LinearCategoryModel::load(&path) {
        Ok(model) => {
            info!(path = %path, model = model.name(), "Category model loaded");
            Some(Arc::new(model))
        }
        Err(e) => {
            warn!(path = %path, error = %e, "Category model unavailable, serving heuristics only");
            None
        }
    }
}

pub fn load_rules() -> Arc<dyn RuleEngine> {
    let Some(path) = config::get_rules_path() else {
        return Arc::new(KeywordRuleSet::default());
    };
    match KeywordRuleSet::load(&path) {
        Ok(rules) => {
            info!(path = %path, rules = rules.len(), "Rule set loaded");
            Arc::new(rules)
        }
        Err(e) => {
            warn!(path = %path, error = %e, "Failed to load rule set, continuing without rules");
            Arc::new(KeywordRuleSet::default())
        }
    }
}

/// Majority cache is optional; the labeler reads history directly without it
pub async fn connect_cache(metrics: &Metrics) -> Option<Arc<dyn MajorityCache>> {
    match RedisCache::new().await {
        Ok(cache) => {
            metrics.cache_connected.set(1.0);
            info!("Redis majority cache connected");
            Some(Arc::new(cache))
        }
        Err(e) => {
            warn!(error = %e, "Redis unavailable, majority cache disabled");
            None
        }
    }
}
