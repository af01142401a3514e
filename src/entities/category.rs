// 🏷️ Category - Product category with its cached significant characteristics
//
// The significant list is empty until the analyzer runs for the category.
// Once filled it is reused as-is until someone explicitly clears it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pseudo category id for entities that arrive without a category.
pub const UNKNOWN_CATEGORY_ID: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Stable category identifier from the source catalog
    pub category_id: String,

    /// Display name
    pub name: String,

    /// Canonical characteristic names, most frequent first
    pub significant_characteristics: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(category_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();

        Category {
            category_id: category_id.into(),
            name: name.into(),
            significant_characteristics: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the significance analysis has produced a usable list
    pub fn is_analyzed(&self) -> bool {
        !self.significant_characteristics.is_empty()
    }

    /// Replace the cached significant list
    pub fn set_significant(&mut self, characteristics: Vec<String>) {
        self.significant_characteristics = characteristics;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_category_is_not_analyzed() {
        let category = Category::new("drills", "Drills");
        assert!(!category.is_analyzed());
        assert_eq!(category.created_at, category.updated_at);
    }

    #[test]
    fn test_set_significant() {
        let mut category = Category::new("drills", "Drills");
        category.set_significant(vec!["voltage".to_string(), "chuck".to_string()]);

        assert!(category.is_analyzed());
        assert_eq!(category.significant_characteristics[0], "voltage");
        assert!(category.updated_at >= category.created_at);
    }
}
