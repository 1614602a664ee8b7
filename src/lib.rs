//! Transaction category suggestions blended from rules, a trained model and
//! learned per-merchant priors.

pub mod cache;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod feedback;
pub mod jobs;
pub mod labeler;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod promotion;
pub mod routing;
pub mod services;
pub mod signals;
