// Catalog Grouping - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod editing;
pub mod embedding;
pub mod entities;
pub mod error;
pub mod grouping;
pub mod grouping_key;
pub mod logging;
pub mod materializer;
pub mod merger;
pub mod repository;
pub mod search;
pub mod significance;
pub mod similarity;

// Re-export commonly used types
pub use config::{check_grouping_bounds, AppConfig, DisplayLabels, EmbeddingConfig, GroupingConfig};
pub use db::{
    Event,
    setup_database, insert_entities, insert_entity, get_all_entities, get_entity,
    count_entities, insert_event, get_events_for_entity, search_entities, count_search_entities,
};
pub use editing::{
    AggregationQuery, RatingSummary,
    add_member, remove_member, reorder_member, save_aggregation, delete_aggregation,
    rate_aggregation, list_aggregations, get_aggregation, get_ratings,
};
pub use embedding::EmbeddingProvider;
pub use entities::{
    Aggregation, AggregationStatus, Category, Characteristics, Entity, Membership, NewAggregation,
    Rating,
    load_entities_csv, UNKNOWN_CATEGORY_ID,
};
pub use error::{CatalogError, EmbeddingError};
pub use grouping::{
    CategoryLocks, GroupFailure, GroupResult, GroupingEngine, GroupingOptions, GroupingRun,
};
pub use grouping_key::{extract_grouping_key, partition_by_key, Bucket, NO_CHARACTERISTICS_KEY};
pub use materializer::{Group, Materialized};
pub use merger::merge_similar_buckets;
pub use repository::{AggregationRepository, CategoryRepository, EntityRepository};
pub use search::{EntityPage, EntitySearch};
pub use significance::{SignificanceAnalyzer, SignificanceCache};
pub use similarity::{Similarity, SimilarityScorer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
