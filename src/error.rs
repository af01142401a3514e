// ⚠️ Error Types - Failures callers need to tell apart
//
// Storage and orchestration code returns anyhow::Result like the rest of the
// crate. The enums here are the cases an outer layer (HTTP, CLI) must branch
// on, so they are downcast from the anyhow chain instead of string-matched.

use thiserror::Error;

/// Domain failures raised by aggregation editing and rating.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("aggregation {0} not found")]
    AggregationNotFound(i64),

    #[error("entity {0} not found")]
    EntityNotFound(i64),

    #[error("item {item_id} not found in aggregation {aggregation_id}")]
    ItemNotFound { aggregation_id: i64, item_id: i64 },

    #[error("entity {entity_id} is already a member of aggregation {aggregation_id}")]
    AlreadyMember { aggregation_id: i64, entity_id: i64 },

    #[error("rating {0} is outside the allowed range 1..=5")]
    InvalidRating(f64),

    #[error("invalid grouping options: {0}")]
    InvalidOptions(String),
}

impl CatalogError {
    /// True for "the thing you asked about does not exist" failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CatalogError::AggregationNotFound(_)
                | CatalogError::EntityNotFound(_)
                | CatalogError::ItemNotFound { .. }
        )
    }
}

/// Failures of the embedding provider. Never escapes the similarity scorer.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding model unavailable: {0}")]
    Unavailable(String),

    #[error("failed to load embedding model from {path}: {reason}")]
    ModelLoadFailed { path: String, reason: String },

    #[error("embedding inference failed: {reason}")]
    InferenceFailed { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(CatalogError::AggregationNotFound(1).is_not_found());
        assert!(CatalogError::ItemNotFound { aggregation_id: 1, item_id: 2 }.is_not_found());
        assert!(!CatalogError::InvalidRating(7.0).is_not_found());
        assert!(!CatalogError::InvalidOptions("min > max".to_string()).is_not_found());
        assert!(!CatalogError::AlreadyMember { aggregation_id: 1, entity_id: 2 }.is_not_found());
    }

    #[test]
    fn test_error_survives_anyhow_downcast() {
        let err: anyhow::Error = CatalogError::EntityNotFound(42).into();
        let err = err.context("adding member");

        assert_eq!(
            err.downcast_ref::<CatalogError>(),
            Some(&CatalogError::EntityNotFound(42))
        );
    }
}
