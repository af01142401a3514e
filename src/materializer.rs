// 🧱 Materializer - Size filter, display labels, and idempotent persistence
//
// Turns merged buckets into Groups and Groups into Aggregations. An unsaved
// automatic aggregation with the same characteristics is reused instead of
// written twice, unless the caller forces regeneration.

use crate::config::DisplayLabels;
use crate::db::Event;
use crate::entities::{Aggregation, Characteristics, Entity, NewAggregation, UNKNOWN_CATEGORY_ID};
use crate::grouping_key::Bucket;
use crate::repository::AggregationRepository;
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

/// Pairs of the display map that make it into the name
const NAME_PAIRS: usize = 2;

// ============================================================================
// GROUP
// ============================================================================

/// A size-valid bucket ready to persist
#[derive(Debug, Clone, Serialize)]
pub struct Group {
    pub category_id: String,
    pub category_name: Option<String>,
    pub grouping_key: String,
    /// In significance order; the first pairs name the group
    pub characteristics: Characteristics,
    pub members: Vec<Entity>,
}

impl Group {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn member_ids(&self) -> Vec<i64> {
        self.members.iter().map(|entity| entity.id).collect()
    }

    /// Storage category; the pseudo category of uncategorized entities has none
    pub fn storage_category(&self) -> Option<&str> {
        if self.category_id == UNKNOWN_CATEGORY_ID {
            None
        } else {
            Some(self.category_id.as_str())
        }
    }

    pub fn display_name(&self) -> String {
        display_name(self.category_name.as_deref(), &self.characteristics, self.size())
    }
}

/// Keep buckets with min..=max members
pub fn filter_by_size(buckets: Vec<Bucket>, min_size: usize, max_size: usize) -> Vec<Bucket> {
    buckets
        .into_iter()
        .filter(|bucket| (min_size..=max_size).contains(&bucket.len()))
        .collect()
}

/// Characteristics shown for a group, read off its first member.
///
/// Significant characteristics present on the member win. A member without
/// any attributes is described by manufacturer, model and name prefix.
pub fn display_characteristics(
    first: &Entity,
    significant: &[String],
    labels: &DisplayLabels,
) -> Characteristics {
    let mut display = Characteristics::new();

    if first.has_attributes() {
        for name in significant {
            if let Some(value) = first.attributes.get(name) {
                display.insert(name.as_str(), value.as_str());
            }
        }
        return display;
    }

    if let Some(manufacturer) = first.manufacturer() {
        display.insert(labels.manufacturer.as_str(), manufacturer);
    }
    if let Some(model) = first.model() {
        display.insert(labels.model.as_str(), model);
    }
    if let Some(prefix) = first.name_prefix() {
        display.insert(labels.name_prefix.as_str(), prefix);
    }

    display
}

/// "Category | k: v, k: v", or "Group of N entities" when there is nothing to say
pub fn display_name(
    category_name: Option<&str>,
    characteristics: &Characteristics,
    size: usize,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(name) = category_name.filter(|n| !n.trim().is_empty()) {
        parts.push(name.to_string());
    }

    if !characteristics.is_empty() {
        let pairs: Vec<String> = characteristics
            .iter()
            .take(NAME_PAIRS)
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect();
        parts.push(pairs.join(", "));
    }

    if parts.is_empty() {
        format!("Group of {} entities", size)
    } else {
        parts.join(" | ")
    }
}

pub fn build_group(
    bucket: Bucket,
    category_id: &str,
    category_name: Option<&str>,
    significant: &[String],
    labels: &DisplayLabels,
) -> Group {
    let characteristics = bucket
        .members
        .first()
        .map(|first| display_characteristics(first, significant, labels))
        .unwrap_or_default();

    Group {
        category_id: category_id.to_string(),
        category_name: category_name.map(str::to_string),
        grouping_key: bucket.key,
        characteristics,
        members: bucket.members,
    }
}

// ============================================================================
// RECONCILIATION
// ============================================================================

#[derive(Debug, Clone)]
pub enum Materialized {
    Created(Aggregation),
    Reused(Aggregation),
}

impl Materialized {
    pub fn aggregation(&self) -> &Aggregation {
        match self {
            Materialized::Created(aggregation) | Materialized::Reused(aggregation) => aggregation,
        }
    }

    pub fn into_aggregation(self) -> Aggregation {
        match self {
            Materialized::Created(aggregation) | Materialized::Reused(aggregation) => aggregation,
        }
    }

    pub fn is_reused(&self) -> bool {
        matches!(self, Materialized::Reused(_))
    }
}

/// Persist a group, or reuse the matching unsaved automatic aggregation.
///
/// Callers serialize this per category; it is a read followed by a write.
pub fn materialize<R>(repo: &R, group: &Group, force_regenerate: bool) -> Result<Materialized>
where
    R: AggregationRepository + ?Sized,
{
    let new = NewAggregation {
        name: Some(group.display_name()),
        category_id: group.storage_category().map(str::to_string),
        grouping_characteristics: group.characteristics.clone(),
    };
    let signature = new.signature();

    if !force_regenerate {
        let existing = repo
            .find_unsaved_auto(new.category_id.as_deref(), &signature)
            .with_context(|| format!("Failed to look up aggregation for key {}", group.grouping_key))?;

        if let Some(aggregation) = existing {
            repo.record_event(&Event::new(
                "aggregation_reused",
                "aggregation",
                &aggregation.id.to_string(),
                serde_json::json!({ "grouping_key": group.grouping_key }),
                "grouping_engine",
            ))?;

            info!(
                aggregation_id = aggregation.id,
                category = %group.category_id,
                key = %group.grouping_key,
                "aggregation reused"
            );
            return Ok(Materialized::Reused(aggregation));
        }
    }

    let aggregation = repo
        .create(&new, &group.member_ids())
        .with_context(|| format!("Failed to create aggregation for key {}", group.grouping_key))?;

    info!(
        aggregation_id = aggregation.id,
        category = %group.category_id,
        key = %group.grouping_key,
        members = group.size(),
        "aggregation created"
    );

    Ok(Materialized::Created(aggregation))
}
