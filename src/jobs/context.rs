//! Job context for dependency injection

use crate::promotion::PromotionService;
use std::sync::Arc;

/// Context passed to job handlers via Apalis Data<T> pattern
pub struct JobContext {
    pub promotion: Arc<PromotionService>,
}

impl JobContext {
    pub fn new(promotion: Arc<PromotionService>) -> Self {
        Self { promotion }
    }
}
