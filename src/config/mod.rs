//! Environment-driven configuration
//!
//! Values are read from the process environment (after `dotenvy` has loaded a
//! `.env` file, if present). Everything has a default so the binaries start
//! in a development setup without extra wiring.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::warn;

use crate::routing::CanaryMode;

pub const DEFAULT_DATABASE_URL: &str = "host=localhost user=postgres dbname=ledgerlens";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/";
pub const DEFAULT_PROMOTION_CRON: &str = "0 0 3 * * *";

/// Deployment environment name (`production`, `sandbox`, ...)
pub fn get_environment() -> String {
    env::var("APP_ENV").unwrap_or_else(|_| "sandbox".to_string())
}

pub fn get_database_url() -> String {
    env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

pub fn get_redis_url() -> String {
    env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string())
}

pub fn get_promotion_cron() -> String {
    env::var("PROMOTION_CRON").unwrap_or_else(|_| DEFAULT_PROMOTION_CRON.to_string())
}

pub fn get_model_path() -> Option<String> {
    env::var("MODEL_PATH").ok().filter(|p| !p.trim().is_empty())
}

pub fn get_rules_path() -> Option<String> {
    env::var("RULES_PATH").ok().filter(|p| !p.trim().is_empty())
}

pub fn get_majority_cache_ttl_seconds() -> u64 {
    parse_env("MAJORITY_CACHE_TTL_SECONDS", 900)
}

/// Canary configuration from `MODEL_CANARY`. Unset means off.
pub fn get_canary_mode() -> CanaryMode {
    match env::var("MODEL_CANARY") {
        Ok(raw) => CanaryMode::parse_or_off(&raw),
        Err(_) => CanaryMode::Off,
    }
}

pub fn get_shadow_comparison() -> ShadowComparison {
    match env::var("SHADOW_COMPARISON") {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(value = %raw, "Unknown SHADOW_COMPARISON value, using 'served'");
            ShadowComparison::Served
        }),
        Err(_) => ShadowComparison::Served,
    }
}

pub fn get_store_backend() -> StoreBackend {
    match env::var("STORE_BACKEND") {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(value = %raw, "Unknown STORE_BACKEND value, using 'postgres'");
            StoreBackend::Postgres
        }),
        Err(_) => StoreBackend::Postgres,
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Which persistence backend the binaries wire up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// What a shadow-mode model prediction is compared against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowComparison {
    /// The heuristic top candidate served in the same request
    Served,
    /// The user's later accept/reject feedback for the transaction
    Feedback,
    Both,
}

impl ShadowComparison {
    pub fn compares_served(self) -> bool {
        matches!(self, Self::Served | Self::Both)
    }

    pub fn compares_feedback(self) -> bool {
        matches!(self, Self::Feedback | Self::Both)
    }
}

impl FromStr for ShadowComparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "served" => Ok(Self::Served),
            "feedback" => Ok(Self::Feedback),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown shadow comparison '{}'", other)),
        }
    }
}

/// Tunables for labeling, scoring and request validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum label count for a majority category
    pub min_support: u64,
    /// Minimum share of a merchant's labels held by the majority category
    pub majority_threshold: f64,
    pub label_lookback_days: i64,
    /// Candidates scoring below this after adjustment are dropped
    pub min_score: f64,
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub max_batch: usize,
    pub recency_window_days: i64,
    pub shadow_comparison: ShadowComparison,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_support: 3,
            majority_threshold: 0.70,
            label_lookback_days: 365,
            min_score: 0.05,
            default_top_k: 3,
            max_top_k: 10,
            max_batch: 100,
            recency_window_days: 30,
            shadow_comparison: ShadowComparison::Served,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by any `ENGINE_*` variables present in the environment
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_support: parse_env("ENGINE_MIN_SUPPORT", defaults.min_support),
            majority_threshold: parse_env(
                "ENGINE_MAJORITY_THRESHOLD",
                defaults.majority_threshold,
            ),
            label_lookback_days: parse_env(
                "ENGINE_LABEL_LOOKBACK_DAYS",
                defaults.label_lookback_days,
            ),
            min_score: parse_env("ENGINE_MIN_SCORE", defaults.min_score),
            default_top_k: parse_env("ENGINE_DEFAULT_TOP_K", defaults.default_top_k),
            max_top_k: parse_env("ENGINE_MAX_TOP_K", defaults.max_top_k),
            max_batch: parse_env("ENGINE_MAX_BATCH", defaults.max_batch),
            recency_window_days: parse_env(
                "ENGINE_RECENCY_WINDOW_DAYS",
                defaults.recency_window_days,
            ),
            shadow_comparison: get_shadow_comparison(),
        }
    }
}
