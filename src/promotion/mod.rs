//! Promotion of durable feedback associations into merchant hints

pub mod confidence;
pub mod service;

pub use confidence::{promotion_confidence, PromotionFilters};
pub use service::{
    PromotionAction, PromotionCandidate, PromotionOptions, PromotionReport, PromotionService,
};
