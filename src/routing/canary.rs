use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

use crate::models::SuggestionMode;

const BUCKET_SALT: &[u8] = b"ledgerlens-canary:";

/// How much traffic the model is authoritative for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "percent")]
pub enum CanaryMode {
    /// Model never consulted
    Off,
    /// Model evaluated and logged, never served
    Shadow,
    /// Model served for a stable `percent` share of transactions (1..=99)
    Partial(u8),
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid canary value '{0}', expected 0, shadow, <n>% or 100%")]
pub struct CanaryParseError(pub String);

impl CanaryMode {
    /// Parse a canary value, failing closed to `Off` on anything invalid
    pub fn parse_or_off(raw: &str) -> Self {
        raw.parse().unwrap_or_else(|e: CanaryParseError| {
            warn!(error = %e, "Canary configuration rejected, model routing is off");
            CanaryMode::Off
        })
    }
}

impl FromStr for CanaryMode {
    type Err = CanaryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase();
        match value.as_str() {
            "0" | "off" => return Ok(Self::Off),
            "shadow" => return Ok(Self::Shadow),
            "full" => return Ok(Self::Full),
            _ => {}
        }

        let percent = value
            .strip_suffix('%')
            .and_then(|n| n.trim().parse::<u8>().ok())
            .ok_or_else(|| CanaryParseError(s.to_string()))?;

        match percent {
            0 => Ok(Self::Off),
            100 => Ok(Self::Full),
            1..=99 => Ok(Self::Partial(percent)),
            _ => Err(CanaryParseError(s.to_string())),
        }
    }
}

impl fmt::Display for CanaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("0"),
            Self::Shadow => f.write_str("shadow"),
            Self::Partial(p) => write!(f, "{}%", p),
            Self::Full => f.write_str("100%"),
        }
    }
}

/// Which path is authoritative for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteDecision {
    Heuristic,
    /// Heuristic served, model evaluated for comparison
    Shadow,
    Model,
}

impl RouteDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::Shadow => "shadow",
            Self::Model => "model",
        }
    }

    pub fn consults_model(self) -> bool {
        !matches!(self, Self::Heuristic)
    }
}

/// Stable bucket in `[0, 100)` for a transaction id
pub fn bucket_for(transaction_id: &str) -> u8 {
    let mut hasher = Sha256::new();
    hasher.update(BUCKET_SALT);
    hasher.update(transaction_id.as_bytes());
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % 100) as u8
}

/// Routes requests between the heuristic path and the model. The mode is
/// fixed at construction so every decision within a process is reproducible.
#[derive(Debug, Clone, Copy)]
pub struct CanaryRouter {
    mode: CanaryMode,
}

impl CanaryRouter {
    pub fn new(mode: CanaryMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> CanaryMode {
        self.mode
    }

    pub fn route(&self, transaction_id: &str) -> RouteDecision {
        match self.mode {
            CanaryMode::Off => RouteDecision::Heuristic,
            CanaryMode::Shadow => RouteDecision::Shadow,
            CanaryMode::Partial(percent) => {
                if bucket_for(transaction_id) < percent {
                    RouteDecision::Model
                } else {
                    RouteDecision::Heuristic
                }
            }
            CanaryMode::Full => RouteDecision::Model,
        }
    }

    /// Request modes narrow the canary but never widen it past `off` or
    /// `shadow`: `rules_only` never touches the model, `model_only` serves
    /// the model for every transaction once any rollout share is enabled.
    pub fn route_for_mode(&self, transaction_id: &str, mode: SuggestionMode) -> RouteDecision {
        match (mode, self.mode) {
            (SuggestionMode::Auto, _) => self.route(transaction_id),
            (SuggestionMode::RulesOnly, _) => RouteDecision::Heuristic,
            (SuggestionMode::ModelOnly, CanaryMode::Off) => RouteDecision::Heuristic,
            (SuggestionMode::ModelOnly, CanaryMode::Shadow) => RouteDecision::Shadow,
            (SuggestionMode::ModelOnly, CanaryMode::Partial(_) | CanaryMode::Full) => {
                RouteDecision::Model
            }
        }
    }
}
