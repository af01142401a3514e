// Entity Models
//
// - Entity: normalized catalog item (read-only to the grouping core)
// - Category: category with its cached significant characteristics
// - Aggregation: persisted group with memberships and ratings

pub mod aggregation;
pub mod category;
pub mod entity;

pub use aggregation::{
    characteristics_signature, Aggregation, AggregationStatus, Characteristics, Membership,
    NewAggregation, Rating,
};
pub use category::{Category, UNKNOWN_CATEGORY_ID};
pub use entity::{load_entities_csv, parse_attributes, Entity, EntityRecord};
