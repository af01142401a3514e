// 🔎 Entity Search - Look up catalog entities for curators
//
// Free-text search over name, manufacturer, model and category name, paged by
// id. This is how a curator finds the entity id to add to an aggregation.

use crate::db;
use crate::entities::Entity;
use crate::error::CatalogError;
use anyhow::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

const DEFAULT_SEARCH_LIMIT: i64 = 20;
const MAX_SEARCH_LIMIT: i64 = 100;

/// Query string of an entity search
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntitySearch {
    pub query: Option<String>,
    pub category_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityPage {
    pub items: Vec<Entity>,

    /// Matches across all pages
    pub total: i64,
}

/// One page of matching entities. Limit is clamped to 1..=100 (default 20).
pub fn search_entities(conn: &Connection, search: &EntitySearch) -> Result<EntityPage> {
    let limit = search.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);
    let offset = search.offset.unwrap_or(0).max(0);
    let query = search.query.as_deref();
    let category = search.category_id.as_deref().filter(|id| !id.is_empty());

    Ok(EntityPage {
        items: db::search_entities(conn, query, category, limit, offset)?,
        total: db::count_search_entities(conn, query, category)?,
    })
}

pub fn get_entity(conn: &Connection, entity_id: i64) -> Result<Entity> {
    db::get_entity(conn, entity_id)?.ok_or_else(|| CatalogError::EntityNotFound(entity_id).into())
}
