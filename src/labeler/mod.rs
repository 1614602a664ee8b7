//! Merchant majority labeling from historical category labels

pub mod majority;

pub use majority::{majority_from_labels, MajorityThresholds, MerchantMajorityLabeler};
