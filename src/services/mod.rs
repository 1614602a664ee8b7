//! External collaborator seams: the trained category model and the rule set.

pub mod model;
pub mod rules;

pub use model::{CategoryModel, CategoryProbability, LinearCategoryModel};
pub use rules::{KeywordRule, KeywordRuleSet, RuleEngine, RuleMatch};
