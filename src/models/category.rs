use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Category slug to display label
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryCatalog {
    labels: HashMap<String, String>,
}

impl CategoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, slug: &str, label: &str) -> Self {
        self.insert(slug, label);
        self
    }

    pub fn insert(&mut self, slug: &str, label: &str) {
        self.labels.insert(slug.to_string(), label.to_string());
    }

    /// Unknown slugs are labelled with the slug itself
    pub fn label_for(&self, slug: &str) -> String {
        self.labels
            .get(slug)
            .cloned()
            .unwrap_or_else(|| slug.to_string())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl FromIterator<(String, String)> for CategoryCatalog {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().collect(),
        }
    }
}
