// 🗄️ Repositories - Storage seams consumed by the grouping engine
//
// The engine only talks to these traits. The SQLite implementation below
// delegates to the free functions in `db`; tests can swap in anything else.

use crate::db::{self, Event};
use crate::entities::{Aggregation, Category, Entity, NewAggregation};
use anyhow::Result;
use rusqlite::Connection;

pub trait EntityRepository {
    fn all_entities(&self) -> Result<Vec<Entity>>;
    fn entities_by_category(&self, category_id: &str) -> Result<Vec<Entity>>;
    fn entities_by_ids(&self, ids: &[i64]) -> Result<Vec<Entity>>;
}

pub trait CategoryRepository {
    fn get_category(&self, category_id: &str) -> Result<Option<Category>>;
    fn upsert_category(&self, category: &Category) -> Result<()>;
}

pub trait AggregationRepository {
    /// Unsaved, still-automatic aggregation of a category with this signature
    fn find_unsaved_auto(&self, category_id: Option<&str>, signature: &str) -> Result<Option<Aggregation>>;

    /// Persist the aggregation and one membership per member, atomically
    fn create(&self, aggregation: &NewAggregation, member_ids: &[i64]) -> Result<Aggregation>;

    /// Append to the audit trail
    fn record_event(&self, event: &Event) -> Result<()>;
}

impl EntityRepository for Connection {
    fn all_entities(&self) -> Result<Vec<Entity>> {
        db::get_all_entities(self)
    }

    fn entities_by_category(&self, category_id: &str) -> Result<Vec<Entity>> {
        db::get_entities_by_category(self, category_id)
    }

    fn entities_by_ids(&self, ids: &[i64]) -> Result<Vec<Entity>> {
        db::get_entities_by_ids(self, ids)
    }
}

impl CategoryRepository for Connection {
    fn get_category(&self, category_id: &str) -> Result<Option<Category>> {
        db::get_category(self, category_id)
    }

    fn upsert_category(&self, category: &Category) -> Result<()> {
        db::upsert_category(self, category)
    }
}

impl AggregationRepository for Connection {
    fn find_unsaved_auto(&self, category_id: Option<&str>, signature: &str) -> Result<Option<Aggregation>> {
        db::find_unsaved_auto(self, category_id, signature)
    }

    fn create(&self, aggregation: &NewAggregation, member_ids: &[i64]) -> Result<Aggregation> {
        db::insert_aggregation(self, aggregation, member_ids)
    }

    fn record_event(&self, event: &Event) -> Result<()> {
        db::insert_event(self, event)
    }
}
