//! Trained category model interface and a linear softmax implementation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::ModelError;
use crate::models::TransactionFeatures;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryProbability {
    pub category_slug: String,
    pub probability: f64,
}

/// Produces a calibrated probability per category for a feature vector.
/// Implementations are local and fast; no network I/O.
pub trait CategoryModel: Send + Sync {
    fn name(&self) -> &str;

    /// Probabilities sorted descending
    fn predict(&self, features: &TransactionFeatures)
        -> Result<Vec<CategoryProbability>, ModelError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryWeights {
    pub slug: String,
    #[serde(default)]
    pub bias: f64,
    #[serde(default)]
    pub log_amount: f64,
    #[serde(default)]
    pub weekend: f64,
    #[serde(default)]
    pub hour_sin: f64,
    #[serde(default)]
    pub hour_cos: f64,
    #[serde(default)]
    pub tokens: HashMap<String, f64>,
}

/// Multinomial logistic model exported by the training pipeline as JSON.
///
/// `temperature` is the calibration scale applied to logits before softmax.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearCategoryModel {
    pub version: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    pub categories: Vec<CategoryWeights>,
}

fn default_temperature() -> f64 {
    1.0
}

impl LinearCategoryModel {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ModelError> {
        let model: Self =
            serde_json::from_str(raw).map_err(|e| ModelError::Load(e.to_string()))?;
        if model.categories.is_empty() {
            return Err(ModelError::Load("model has no categories".to_string()));
        }
        if !(model.temperature.is_finite() && model.temperature > 0.0) {
            return Err(ModelError::Load(format!(
                "temperature must be positive, got {}",
                model.temperature
            )));
        }
        Ok(model)
    }

    fn logit(&self, weights: &CategoryWeights, features: &TransactionFeatures) -> f64 {
        let angle = std::f64::consts::TAU * features.hour as f64 / 24.0;
        let token_sum: f64 = features
            .tokens
            .iter()
            .filter_map(|t| weights.tokens.get(t))
            .sum();
        weights.bias
            + weights.log_amount * features.amount.abs().ln_1p()
            + weights.weekend * if features.is_weekend { 1.0 } else { 0.0 }
            + weights.hour_sin * angle.sin()
            + weights.hour_cos * angle.cos()
            + token_sum
    }
}

impl CategoryModel for LinearCategoryModel {
    fn name(&self) -> &str {
        &self.version
    }

    fn predict(
        &self,
        features: &TransactionFeatures,
    ) -> Result<Vec<CategoryProbability>, ModelError> {
        let logits: Vec<f64> = self
            .categories
            .iter()
            .map(|w| self.logit(w, features) / self.temperature)
            .collect();

        let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return Err(ModelError::InvalidOutput("non-finite logits".to_string()));
        }
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let sum: f64 = exps.iter().sum();

        let mut out: Vec<CategoryProbability> = self
            .categories
            .iter()
            .zip(exps)
            .map(|(w, e)| CategoryProbability {
                category_slug: w.slug.clone(),
                probability: e / sum,
            })
            .collect();
        out.sort_by(|a, b| {
            b.probability
                .total_cmp(&a.probability)
                .then_with(|| a.category_slug.cmp(&b.category_slug))
        });
        Ok(out)
    }
}
