//! Job queue system for the promotion batch

pub mod context;
pub mod handlers;
pub mod types;

pub use context::JobContext;
pub use types::PromoteHintsJob;
