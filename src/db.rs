use crate::entities::{
    characteristics_signature, Aggregation, AggregationStatus, Category, Entity, Membership,
    NewAggregation, Rating,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Event for audit trail: every write to an aggregation leaves one behind
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery; in-memory databases report "memory" and that's fine
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Entities (normalized catalog items)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            image_url TEXT,
            model TEXT,
            country TEXT,
            manufacturer TEXT,
            category_id TEXT,
            category_name TEXT,
            attributes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Categories (significant characteristics cache)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category_id TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            significant_characteristics TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Aggregations + items + ratings
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS aggregations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            category_id TEXT,
            grouping_characteristics TEXT NOT NULL,
            signature TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'auto',
            rating REAL,
            is_saved INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS aggregation_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            aggregation_id INTEGER NOT NULL REFERENCES aggregations(id) ON DELETE CASCADE,
            entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            item_order INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            UNIQUE (aggregation_id, entity_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS aggregation_ratings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            aggregation_id INTEGER NOT NULL REFERENCES aggregations(id) ON DELETE CASCADE,
            rating REAL NOT NULL,
            comment TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entities_category ON entities(category_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_aggregations_signature ON aggregations(category_id, signature)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_items_aggregation ON aggregation_items(aggregation_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(1, &timestamp_str)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).unwrap_or(serde_json::Value::Null),
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// ENTITIES
// ============================================================================

const ENTITY_COLUMNS: &str = "id, external_id, name, category_id, category_name,
    manufacturer, model, country, image_url, attributes";

fn entity_from_row(row: &Row) -> rusqlite::Result<Entity> {
    let attributes_json: Option<String> = row.get(9)?;
    // Malformed attribute JSON reads as "no characteristics"
    let attributes: BTreeMap<String, String> = attributes_json
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default();

    Ok(Entity {
        id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        category_id: row.get(3)?,
        category_name: row.get(4)?,
        manufacturer: row.get(5)?,
        model: row.get(6)?,
        country: row.get(7)?,
        image_url: row.get(8)?,
        attributes,
    })
}

/// Insert or update one entity keyed by `external_id`; returns its storage id
pub fn insert_entity(conn: &Connection, entity: &Entity) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    let attributes_json = serde_json::to_string(&entity.attributes)?;

    conn.execute(
        "INSERT INTO entities (
            external_id, name, image_url, model, country, manufacturer,
            category_id, category_name, attributes, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
        ON CONFLICT(external_id) DO UPDATE SET
            name = excluded.name,
            image_url = excluded.image_url,
            model = excluded.model,
            country = excluded.country,
            manufacturer = excluded.manufacturer,
            category_id = excluded.category_id,
            category_name = excluded.category_name,
            attributes = excluded.attributes,
            updated_at = excluded.updated_at",
        params![
            entity.external_id,
            entity.name,
            entity.image_url,
            entity.model,
            entity.country,
            entity.manufacturer,
            entity.category_id,
            entity.category_name,
            attributes_json,
            now,
        ],
    )?;

    let id = conn.query_row(
        "SELECT id FROM entities WHERE external_id = ?1",
        [&entity.external_id],
        |row| row.get(0),
    )?;

    Ok(id)
}

/// Insert or update a batch of entities; re-importing the same file is idempotent
pub fn insert_entities(conn: &Connection, entities: &[Entity]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    for entity in entities {
        insert_entity(&tx, entity)
            .with_context(|| format!("Failed to store entity {}", entity.external_id))?;
    }
    tx.commit()?;

    debug!(count = entities.len(), "entities stored");
    Ok(entities.len())
}

pub fn get_entity(conn: &Connection, id: i64) -> Result<Option<Entity>> {
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1");
    let entity = conn.query_row(&sql, [id], entity_from_row).optional()?;
    Ok(entity)
}

pub fn get_all_entities(conn: &Connection) -> Result<Vec<Entity>> {
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let entities = stmt
        .query_map([], entity_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entities)
}

pub fn get_entities_by_category(conn: &Connection, category_id: &str) -> Result<Vec<Entity>> {
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE category_id = ?1 ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let entities = stmt
        .query_map([category_id], entity_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entities)
}

pub fn get_entities_by_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<Entity>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id IN ({placeholders}) ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let entities = stmt
        .query_map(params_from_iter(ids.iter()), entity_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entities)
}

/// Shared filter of `search_entities` and `count_search_entities`.
/// ?1 = category id, ?2 = LIKE pattern over name, manufacturer, model and category name.
const ENTITY_SEARCH_FILTER: &str = "(?1 IS NULL OR category_id = ?1)
    AND (?2 IS NULL
         OR name LIKE ?2
         OR manufacturer LIKE ?2
         OR model LIKE ?2
         OR category_name LIKE ?2)";

fn search_pattern(query: Option<&str>) -> Option<String> {
    query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", q))
}

/// One page of entities matching a free-text query, ordered by id
pub fn search_entities(
    conn: &Connection,
    query: Option<&str>,
    category_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Entity>> {
    let sql = format!(
        "SELECT {ENTITY_COLUMNS} FROM entities
         WHERE {ENTITY_SEARCH_FILTER}
         ORDER BY id
         LIMIT ?3 OFFSET ?4"
    );
    let mut stmt = conn.prepare(&sql)?;
    let entities = stmt
        .query_map(
            params![category_id, search_pattern(query), limit, offset],
            entity_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entities)
}

/// Number of entities `search_entities` would page through
pub fn count_search_entities(conn: &Connection, query: Option<&str>, category_id: Option<&str>) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM entities WHERE {ENTITY_SEARCH_FILTER}");
    let count: i64 = conn.query_row(&sql, params![category_id, search_pattern(query)], |row| row.get(0))?;
    Ok(count)
}

pub fn count_entities(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// CATEGORIES
// ============================================================================

pub fn get_category(conn: &Connection, category_id: &str) -> Result<Option<Category>> {
    let category = conn
        .query_row(
            "SELECT category_id, name, significant_characteristics, created_at, updated_at
             FROM categories WHERE category_id = ?1",
            [category_id],
            |row| {
                let significant_json: Option<String> = row.get(2)?;
                let created_at: String = row.get(3)?;
                let updated_at: String = row.get(4)?;

                Ok(Category {
                    category_id: row.get(0)?,
                    name: row.get(1)?,
                    significant_characteristics: significant_json
                        .and_then(|json| serde_json::from_str(&json).ok())
                        .unwrap_or_default(),
                    created_at: parse_timestamp(3, &created_at)?,
                    updated_at: parse_timestamp(4, &updated_at)?,
                })
            },
        )
        .optional()?;

    Ok(category)
}

pub fn upsert_category(conn: &Connection, category: &Category) -> Result<()> {
    let significant_json = serde_json::to_string(&category.significant_characteristics)?;

    conn.execute(
        "INSERT INTO categories (category_id, name, significant_characteristics, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(category_id) DO UPDATE SET
            name = excluded.name,
            significant_characteristics = excluded.significant_characteristics,
            updated_at = excluded.updated_at",
        params![
            category.category_id,
            category.name,
            significant_json,
            category.created_at.to_rfc3339(),
            category.updated_at.to_rfc3339(),
        ],
    )?;

    Ok(())
}

// ============================================================================
// AGGREGATIONS
// ============================================================================

/// Create an aggregation and all of its memberships in one transaction.
///
/// Member order is the position in `member_ids`, starting at 0.
pub fn insert_aggregation(
    conn: &Connection,
    aggregation: &NewAggregation,
    member_ids: &[i64],
) -> Result<Aggregation> {
    let now = Utc::now().to_rfc3339();
    let characteristics_json = serde_json::to_string(&aggregation.grouping_characteristics)?;
    let signature = characteristics_signature(&aggregation.grouping_characteristics);

    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO aggregations (
            name, category_id, grouping_characteristics, signature,
            status, rating, is_saved, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, 0, ?6, ?6)",
        params![
            aggregation.name,
            aggregation.category_id,
            characteristics_json,
            signature,
            AggregationStatus::Auto.as_str(),
            now,
        ],
    )?;
    let aggregation_id = tx.last_insert_rowid();

    for (order, entity_id) in member_ids.iter().enumerate() {
        tx.execute(
            "INSERT INTO aggregation_items (aggregation_id, entity_id, item_order, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![aggregation_id, entity_id, order as i64, now],
        )
        .with_context(|| format!("Failed to add entity {} to aggregation", entity_id))?;
    }

    let event = Event::new(
        "aggregation_created",
        "aggregation",
        &aggregation_id.to_string(),
        serde_json::json!({
            "category_id": aggregation.category_id,
            "signature": signature,
            "members": member_ids,
        }),
        "grouping_engine",
    );
    insert_event(&tx, &event)?;

    tx.commit()?;

    get_aggregation(conn, aggregation_id)?
        .with_context(|| format!("Aggregation {} missing right after insert", aggregation_id))
}

/// Oldest unsaved, still-automatic aggregation of a category with this signature
pub fn find_unsaved_auto(
    conn: &Connection,
    category_id: Option<&str>,
    signature: &str,
) -> Result<Option<Aggregation>> {
    let id: Option<i64> = conn
        .query_row(
            "SELECT id FROM aggregations
             WHERE category_id IS ?1 AND signature = ?2 AND is_saved = 0 AND status = ?3
             ORDER BY id
             LIMIT 1",
            params![category_id, signature, AggregationStatus::Auto.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    match id {
        Some(id) => get_aggregation(conn, id),
        None => Ok(None),
    }
}

fn aggregation_from_row(row: &Row) -> rusqlite::Result<Aggregation> {
    let characteristics_json: String = row.get(3)?;
    let status: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(Aggregation {
        id: row.get(0)?,
        name: row.get(1)?,
        category_id: row.get(2)?,
        grouping_characteristics: serde_json::from_str(&characteristics_json).unwrap_or_default(),
        status: AggregationStatus::from_db(&status),
        rating: row.get(5)?,
        is_saved: row.get(6)?,
        created_at: parse_timestamp(7, &created_at)?,
        updated_at: parse_timestamp(8, &updated_at)?,
        items: Vec::new(),
    })
}

const AGGREGATION_COLUMNS: &str = "id, name, category_id, grouping_characteristics, status,
    rating, is_saved, created_at, updated_at";

/// Load an aggregation with its members sorted by display order
pub fn get_aggregation(conn: &Connection, id: i64) -> Result<Option<Aggregation>> {
    let sql = format!("SELECT {AGGREGATION_COLUMNS} FROM aggregations WHERE id = ?1");
    let aggregation = conn.query_row(&sql, [id], aggregation_from_row).optional()?;

    match aggregation {
        Some(mut aggregation) => {
            aggregation.items = get_memberships(conn, id)?;
            Ok(Some(aggregation))
        }
        None => Ok(None),
    }
}

/// List aggregations, newest first
pub fn list_aggregations(
    conn: &Connection,
    category_id: Option<&str>,
    saved_only: bool,
    limit: i64,
    offset: i64,
) -> Result<Vec<Aggregation>> {
    let sql = format!(
        "SELECT {AGGREGATION_COLUMNS} FROM aggregations
         WHERE (?1 IS NULL OR category_id = ?1) AND (?2 = 0 OR is_saved = 1)
         ORDER BY created_at DESC, id DESC
         LIMIT ?3 OFFSET ?4"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut aggregations = stmt
        .query_map(params![category_id, saved_only, limit, offset], aggregation_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    for aggregation in &mut aggregations {
        aggregation.items = get_memberships(conn, aggregation.id)?;
    }

    Ok(aggregations)
}

pub fn set_aggregation_status(conn: &Connection, id: i64, status: AggregationStatus) -> Result<()> {
    conn.execute(
        "UPDATE aggregations SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), Utc::now().to_rfc3339(), id],
    )?;
    Ok(())
}

pub fn set_aggregation_saved(conn: &Connection, id: i64, saved: bool) -> Result<()> {
    conn.execute(
        "UPDATE aggregations SET is_saved = ?1, updated_at = ?2 WHERE id = ?3",
        params![saved, Utc::now().to_rfc3339(), id],
    )?;
    Ok(())
}

pub fn set_aggregation_rating(conn: &Connection, id: i64, rating: Option<f64>) -> Result<()> {
    conn.execute(
        "UPDATE aggregations SET rating = ?1, updated_at = ?2 WHERE id = ?3",
        params![rating, Utc::now().to_rfc3339(), id],
    )?;
    Ok(())
}

/// Delete an aggregation; memberships and ratings cascade. Returns false if absent
pub fn delete_aggregation(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM aggregations WHERE id = ?1", [id])?;
    Ok(deleted > 0)
}

// ============================================================================
// MEMBERSHIPS
// ============================================================================

fn membership_from_row(row: &Row) -> rusqlite::Result<Membership> {
    let created_at: String = row.get(4)?;
    Ok(Membership {
        id: row.get(0)?,
        aggregation_id: row.get(1)?,
        entity_id: row.get(2)?,
        order: row.get(3)?,
        created_at: parse_timestamp(4, &created_at)?,
    })
}

pub fn get_memberships(conn: &Connection, aggregation_id: i64) -> Result<Vec<Membership>> {
    let mut stmt = conn.prepare(
        "SELECT id, aggregation_id, entity_id, item_order, created_at
         FROM aggregation_items
         WHERE aggregation_id = ?1
         ORDER BY item_order, id",
    )?;
    let items = stmt
        .query_map([aggregation_id], membership_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub fn get_membership(conn: &Connection, aggregation_id: i64, item_id: i64) -> Result<Option<Membership>> {
    let item = conn
        .query_row(
            "SELECT id, aggregation_id, entity_id, item_order, created_at
             FROM aggregation_items
             WHERE aggregation_id = ?1 AND id = ?2",
            params![aggregation_id, item_id],
            membership_from_row,
        )
        .optional()?;
    Ok(item)
}

pub fn find_membership_by_entity(
    conn: &Connection,
    aggregation_id: i64,
    entity_id: i64,
) -> Result<Option<Membership>> {
    let item = conn
        .query_row(
            "SELECT id, aggregation_id, entity_id, item_order, created_at
             FROM aggregation_items
             WHERE aggregation_id = ?1 AND entity_id = ?2",
            params![aggregation_id, entity_id],
            membership_from_row,
        )
        .optional()?;
    Ok(item)
}

pub fn max_member_order(conn: &Connection, aggregation_id: i64) -> Result<Option<i64>> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(item_order) FROM aggregation_items WHERE aggregation_id = ?1",
        [aggregation_id],
        |row| row.get(0),
    )?;
    Ok(max)
}

pub fn insert_membership(
    conn: &Connection,
    aggregation_id: i64,
    entity_id: i64,
    order: i64,
) -> Result<Membership> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO aggregation_items (aggregation_id, entity_id, item_order, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![aggregation_id, entity_id, order, now.to_rfc3339()],
    )?;

    Ok(Membership {
        id: conn.last_insert_rowid(),
        aggregation_id,
        entity_id,
        order,
        created_at: now,
    })
}

pub fn delete_membership(conn: &Connection, item_id: i64) -> Result<()> {
    conn.execute("DELETE FROM aggregation_items WHERE id = ?1", [item_id])?;
    Ok(())
}

pub fn update_membership_order(conn: &Connection, item_id: i64, order: i64) -> Result<()> {
    conn.execute(
        "UPDATE aggregation_items SET item_order = ?1 WHERE id = ?2",
        params![order, item_id],
    )?;
    Ok(())
}

// ============================================================================
// RATINGS
// ============================================================================

pub fn insert_rating(
    conn: &Connection,
    aggregation_id: i64,
    value: f64,
    comment: Option<&str>,
) -> Result<Rating> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO aggregation_ratings (aggregation_id, rating, comment, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![aggregation_id, value, comment, now.to_rfc3339()],
    )?;

    Ok(Rating {
        id: conn.last_insert_rowid(),
        aggregation_id,
        value,
        comment: comment.map(str::to_string),
        created_at: now,
    })
}

pub fn average_rating(conn: &Connection, aggregation_id: i64) -> Result<Option<f64>> {
    let avg: Option<f64> = conn.query_row(
        "SELECT AVG(rating) FROM aggregation_ratings WHERE aggregation_id = ?1",
        [aggregation_id],
        |row| row.get(0),
    )?;
    Ok(avg)
}

/// Ratings for an aggregation, newest first
pub fn get_ratings(conn: &Connection, aggregation_id: i64) -> Result<Vec<Rating>> {
    let mut stmt = conn.prepare(
        "SELECT id, aggregation_id, rating, comment, created_at
         FROM aggregation_ratings
         WHERE aggregation_id = ?1
         ORDER BY created_at DESC, id DESC",
    )?;
    let ratings = stmt
        .query_map([aggregation_id], |row| {
            let created_at: String = row.get(4)?;
            Ok(Rating {
                id: row.get(0)?,
                aggregation_id: row.get(1)?,
                value: row.get(2)?,
                comment: row.get(3)?,
                created_at: parse_timestamp(4, &created_at)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ratings)
}
