// ✏️ Editing - Curator operations on persisted aggregations
//
// Every membership edit flips the aggregation to `manual`. There is no path
// back to `auto`, so an edited aggregation is never reused by regrouping.

use crate::db::{self, Event};
use crate::entities::{Aggregation, AggregationStatus, Membership, Rating};
use crate::error::CatalogError;
use anyhow::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_LIST_LIMIT: i64 = 100;
pub const MAX_LIST_LIMIT: i64 = 500;

const ACTOR: &str = "curator";

fn require_aggregation(conn: &Connection, aggregation_id: i64) -> Result<Aggregation> {
    db::get_aggregation(conn, aggregation_id)?
        .ok_or_else(|| CatalogError::AggregationNotFound(aggregation_id).into())
}

fn require_item(conn: &Connection, aggregation_id: i64, item_id: i64) -> Result<Membership> {
    db::get_membership(conn, aggregation_id, item_id)?.ok_or_else(|| {
        CatalogError::ItemNotFound {
            aggregation_id,
            item_id,
        }
        .into()
    })
}

fn record(conn: &Connection, event_type: &str, aggregation_id: i64, data: serde_json::Value) -> Result<()> {
    db::insert_event(
        conn,
        &Event::new(event_type, "aggregation", &aggregation_id.to_string(), data, ACTOR),
    )
}

// ============================================================================
// MEMBERSHIP EDITS
// ============================================================================

/// Add an entity to an aggregation. Without an explicit order it goes last.
pub fn add_member(
    conn: &Connection,
    aggregation_id: i64,
    entity_id: i64,
    order: Option<i64>,
) -> Result<Membership> {
    require_aggregation(conn, aggregation_id)?;

    if db::get_entity(conn, entity_id)?.is_none() {
        return Err(CatalogError::EntityNotFound(entity_id).into());
    }
    if db::find_membership_by_entity(conn, aggregation_id, entity_id)?.is_some() {
        return Err(CatalogError::AlreadyMember {
            aggregation_id,
            entity_id,
        }
        .into());
    }

    let order = match order {
        Some(order) => order,
        None => db::max_member_order(conn, aggregation_id)?.map_or(0, |max| max + 1),
    };

    let tx = conn.unchecked_transaction()?;
    let item = db::insert_membership(&tx, aggregation_id, entity_id, order)?;
    db::set_aggregation_status(&tx, aggregation_id, AggregationStatus::Manual)?;
    record(
        &tx,
        "member_added",
        aggregation_id,
        serde_json::json!({ "entity_id": entity_id, "item_id": item.id, "order": order }),
    )?;
    tx.commit()?;

    info!(aggregation_id, entity_id, order, "member added");
    Ok(item)
}

pub fn remove_member(conn: &Connection, aggregation_id: i64, item_id: i64) -> Result<()> {
    require_aggregation(conn, aggregation_id)?;
    let item = require_item(conn, aggregation_id, item_id)?;

    let tx = conn.unchecked_transaction()?;
    db::delete_membership(&tx, item_id)?;
    db::set_aggregation_status(&tx, aggregation_id, AggregationStatus::Manual)?;
    record(
        &tx,
        "member_removed",
        aggregation_id,
        serde_json::json!({ "entity_id": item.entity_id, "item_id": item_id }),
    )?;
    tx.commit()?;

    info!(aggregation_id, item_id, "member removed");
    Ok(())
}

pub fn reorder_member(conn: &Connection, aggregation_id: i64, item_id: i64, new_order: i64) -> Result<Membership> {
    require_aggregation(conn, aggregation_id)?;
    let item = require_item(conn, aggregation_id, item_id)?;

    let tx = conn.unchecked_transaction()?;
    db::update_membership_order(&tx, item_id, new_order)?;
    db::set_aggregation_status(&tx, aggregation_id, AggregationStatus::Manual)?;
    record(
        &tx,
        "member_reordered",
        aggregation_id,
        serde_json::json!({ "item_id": item_id, "from": item.order, "to": new_order }),
    )?;
    tx.commit()?;

    Ok(Membership {
        order: new_order,
        ..item
    })
}

// ============================================================================
// AGGREGATION LIFECYCLE
// ============================================================================

/// Mark an aggregation as saved. Saving is a curator edit, so it turns manual.
pub fn save_aggregation(conn: &Connection, aggregation_id: i64) -> Result<Aggregation> {
    require_aggregation(conn, aggregation_id)?;

    let tx = conn.unchecked_transaction()?;
    db::set_aggregation_saved(&tx, aggregation_id, true)?;
    db::set_aggregation_status(&tx, aggregation_id, AggregationStatus::Manual)?;
    record(&tx, "aggregation_saved", aggregation_id, serde_json::json!({}))?;
    tx.commit()?;

    info!(aggregation_id, "aggregation saved");
    require_aggregation(conn, aggregation_id)
}

/// Delete an aggregation with its memberships and ratings
pub fn delete_aggregation(conn: &Connection, aggregation_id: i64) -> Result<()> {
    if !db::delete_aggregation(conn, aggregation_id)? {
        return Err(CatalogError::AggregationNotFound(aggregation_id).into());
    }
    record(conn, "aggregation_deleted", aggregation_id, serde_json::json!({}))?;

    info!(aggregation_id, "aggregation deleted");
    Ok(())
}

pub fn get_aggregation(conn: &Connection, aggregation_id: i64) -> Result<Aggregation> {
    require_aggregation(conn, aggregation_id)
}

/// Filter and page for `list_aggregations`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AggregationQuery {
    pub category_id: Option<String>,
    #[serde(default)]
    pub saved_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Aggregations newest first. Limit is clamped to 1..=500, default 100.
pub fn list_aggregations(conn: &Connection, query: &AggregationQuery) -> Result<Vec<Aggregation>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    let category = query.category_id.as_deref().filter(|id| !id.is_empty());

    db::list_aggregations(conn, category, query.saved_only, limit, offset)
}

// ============================================================================
// RATINGS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RatingSummary {
    pub rating: Rating,

    /// Average over all ratings of the aggregation, 2 decimals
    pub average_rating: f64,
}

/// Append a rating and refresh the aggregation's average
pub fn rate_aggregation(
    conn: &Connection,
    aggregation_id: i64,
    value: f64,
    comment: Option<&str>,
) -> Result<RatingSummary> {
    if !value.is_finite() || !(1.0..=5.0).contains(&value) {
        return Err(CatalogError::InvalidRating(value).into());
    }
    require_aggregation(conn, aggregation_id)?;

    let tx = conn.unchecked_transaction()?;
    let rating = db::insert_rating(&tx, aggregation_id, value, comment)?;
    let average = db::average_rating(&tx, aggregation_id)?
        .map(round_rating)
        .unwrap_or(value);
    db::set_aggregation_rating(&tx, aggregation_id, Some(average))?;
    record(
        &tx,
        "aggregation_rated",
        aggregation_id,
        serde_json::json!({ "rating": value, "average": average }),
    )?;
    tx.commit()?;

    Ok(RatingSummary {
        rating,
        average_rating: average,
    })
}

/// Ratings of an aggregation, newest first
pub fn get_ratings(conn: &Connection, aggregation_id: i64) -> Result<Vec<Rating>> {
    require_aggregation(conn, aggregation_id)?;
    db::get_ratings(conn, aggregation_id)
}

fn round_rating(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
