//! Feedback statistics: recording accept/reject events and batched reads

pub mod aggregator;
pub mod service;

pub use aggregator::FeedbackAggregator;
pub use service::FeedbackService;
