//! Canary and shadow routing for the trained model

pub mod canary;

pub use canary::{bucket_for, CanaryMode, CanaryParseError, CanaryRouter, RouteDecision};
