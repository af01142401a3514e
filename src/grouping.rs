// 🧩 Grouping Engine - entities → significant keys → buckets → merged groups → aggregations
//
// One call processes one batch to completion: load the scoped entities, split
// them by category, bucket each category on its significant characteristics,
// merge similar buckets, drop out-of-range sizes and persist what is left.
// Groups commit one by one; a failed group is reported and the rest go on.

use crate::config::{check_grouping_bounds, AppConfig, DisplayLabels, GroupingConfig};
use crate::entities::{Characteristics, Entity, UNKNOWN_CATEGORY_ID};
use crate::grouping_key::partition_by_key;
use crate::materializer::{build_group, filter_by_size, materialize, Group};
use crate::merger::merge_similar_buckets;
use crate::repository::{AggregationRepository, CategoryRepository, EntityRepository};
use crate::significance::{SignificanceAnalyzer, SignificanceCache};
use crate::similarity::{Similarity, SimilarityScorer};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

// ============================================================================
// OPTIONS & RESULTS
// ============================================================================

/// Scope and knobs of one grouping call
#[derive(Debug, Clone, PartialEq)]
pub struct GroupingOptions {
    /// Restrict to one category (None = all)
    pub category_id: Option<String>,

    /// Restrict to these entities (empty = no restriction)
    pub entity_ids: Vec<i64>,

    pub similarity_threshold: f64,
    pub min_group_size: usize,
    pub max_group_size: usize,

    /// Always create new aggregations instead of reusing unsaved ones
    pub force_regenerate: bool,
}

impl GroupingOptions {
    pub fn from_config(config: &GroupingConfig) -> Self {
        GroupingOptions {
            category_id: None,
            entity_ids: Vec::new(),
            similarity_threshold: config.similarity_threshold,
            min_group_size: config.min_group_size,
            max_group_size: config.max_group_size,
            force_regenerate: false,
        }
    }

    pub fn for_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into()).filter(|id: &String| !id.is_empty());
        self
    }

    pub fn for_entities(mut self, entity_ids: Vec<i64>) -> Self {
        self.entity_ids = entity_ids;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_size_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_group_size = min;
        self.max_group_size = max;
        self
    }

    pub fn force_regenerate(mut self, force: bool) -> Self {
        self.force_regenerate = force;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_grouping_bounds(self.similarity_threshold, self.min_group_size, self.max_group_size)?;
        Ok(())
    }
}

/// One persisted (or reused) group
#[derive(Debug, Clone, Serialize)]
pub struct GroupResult {
    pub category_id: String,
    pub category_name: Option<String>,
    pub grouping_key: String,
    pub characteristics: Characteristics,
    pub aggregation_id: i64,
    pub member_ids: Vec<i64>,
    pub reused: bool,
}

/// A group that could not be persisted
#[derive(Debug, Clone, Serialize)]
pub struct GroupFailure {
    pub category_id: String,
    pub grouping_key: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupingRun {
    pub groups: Vec<GroupResult>,
    pub failures: Vec<GroupFailure>,
}

impl GroupingRun {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

// ============================================================================
// PER-CATEGORY LOCKS
// ============================================================================

/// One mutex per category, handed out on demand
#[derive(Default)]
pub struct CategoryLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CategoryLocks {
    pub fn lock_for(&self, category_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(category_id.to_string()).or_default())
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct GroupingEngine {
    scorer: Arc<dyn Similarity + Send + Sync>,
    significance: SignificanceCache,
    labels: DisplayLabels,
    defaults: GroupingConfig,
    locks: CategoryLocks,
}

impl GroupingEngine {
    /// Engine with the scorer described by the embedding config
    pub fn new(config: &AppConfig) -> Self {
        let scorer = Arc::new(SimilarityScorer::from_config(&config.embedding));
        Self::with_scorer(config, scorer)
    }

    pub fn with_scorer(config: &AppConfig, scorer: Arc<dyn Similarity + Send + Sync>) -> Self {
        GroupingEngine {
            scorer,
            significance: SignificanceCache::new(SignificanceAnalyzer::new(config.grouping.min_frequency)),
            labels: config.labels.clone(),
            defaults: config.grouping.clone(),
            locks: CategoryLocks::default(),
        }
    }

    /// Options pre-filled with the configured defaults
    pub fn options(&self) -> GroupingOptions {
        GroupingOptions::from_config(&self.defaults)
    }

    pub fn significance(&self) -> &SignificanceCache {
        &self.significance
    }

    /// Build the groups for a scope without persisting anything
    pub fn plan<R>(&self, repo: &R, options: &GroupingOptions) -> Result<Vec<Group>>
    where
        R: EntityRepository + CategoryRepository + ?Sized,
    {
        options.validate()?;

        let entities = load_scope(repo, options)?;
        if entities.is_empty() {
            debug!("no entities in scope");
            return Ok(Vec::new());
        }

        let mut groups = Vec::new();
        for (category_id, category_name, members) in split_by_category(entities) {
            let significant = if category_id == UNKNOWN_CATEGORY_ID {
                Vec::new()
            } else {
                let name = category_name.as_deref().unwrap_or(&self.labels.unknown_category);
                self.significance.get_or_compute(repo, &category_id, name)?
            };

            let buckets = partition_by_key(&members, &significant);
            let bucket_count = buckets.len();
            let merged = merge_similar_buckets(buckets, options.similarity_threshold, &*self.scorer);
            let merged_count = merged.len();
            let kept = filter_by_size(merged, options.min_group_size, options.max_group_size);

            debug!(
                category = %category_id,
                entities = members.len(),
                buckets = bucket_count,
                merged = merged_count,
                kept = kept.len(),
                "category bucketed"
            );

            groups.extend(
                kept.into_iter()
                    .map(|bucket| build_group(bucket, &category_id, category_name.as_deref(), &significant, &self.labels)),
            );
        }

        Ok(groups)
    }

    /// Plan and persist. Storage failures of single groups land in `failures`.
    pub fn group<R>(&self, repo: &R, options: &GroupingOptions) -> Result<GroupingRun>
    where
        R: EntityRepository + CategoryRepository + AggregationRepository + ?Sized,
    {
        let groups = self.plan(repo, options)?;
        let mut run = GroupingRun::default();

        for group in groups {
            let lock = self.locks.lock_for(&group.category_id);
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

            match materialize(repo, &group, options.force_regenerate) {
                Ok(materialized) => {
                    let reused = materialized.is_reused();
                    let aggregation = materialized.into_aggregation();
                    run.groups.push(GroupResult {
                        category_id: group.category_id,
                        category_name: group.category_name,
                        grouping_key: group.grouping_key,
                        characteristics: group.characteristics,
                        aggregation_id: aggregation.id,
                        member_ids: aggregation.member_ids(),
                        reused,
                    });
                }
                Err(e) => {
                    warn!(
                        category = %group.category_id,
                        key = %group.grouping_key,
                        error = %format!("{:#}", e),
                        "failed to materialize group"
                    );
                    run.failures.push(GroupFailure {
                        category_id: group.category_id,
                        grouping_key: group.grouping_key,
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        info!(
            groups = run.groups.len(),
            reused = run.groups.iter().filter(|g| g.reused).count(),
            failures = run.failures.len(),
            "grouping finished"
        );

        Ok(run)
    }

    /// Drop the cached significant list of a category
    pub fn invalidate_significance<R>(&self, repo: &R, category_id: &str) -> Result<bool>
    where
        R: CategoryRepository + ?Sized,
    {
        self.significance.invalidate(repo, category_id)
    }
}

fn load_scope<R>(repo: &R, options: &GroupingOptions) -> Result<Vec<Entity>>
where
    R: EntityRepository + ?Sized,
{
    let category = options.category_id.as_deref().filter(|id| !id.is_empty());

    let entities = match (options.entity_ids.is_empty(), category) {
        (false, category) => {
            let entities = repo
                .entities_by_ids(&options.entity_ids)
                .context("Failed to load entities by id")?;
            match category {
                Some(id) => entities
                    .into_iter()
                    .filter(|e| e.category_id.as_deref() == Some(id))
                    .collect(),
                None => entities,
            }
        }
        (true, Some(id)) => repo
            .entities_by_category(id)
            .with_context(|| format!("Failed to load entities of category {}", id))?,
        (true, None) => repo.all_entities().context("Failed to load entities")?,
    };

    Ok(entities)
}

/// (category id, category name, members) in first-seen category order.
/// Entities without a category share the "unknown" pseudo category.
fn split_by_category(entities: Vec<Entity>) -> Vec<(String, Option<String>, Vec<Entity>)> {
    let mut categories: Vec<(String, Option<String>, Vec<Entity>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entity in entities {
        let category_id = entity
            .category_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_CATEGORY_ID.to_string());

        match index.get(&category_id) {
            Some(&slot) => categories[slot].2.push(entity),
            None => {
                index.insert(category_id.clone(), categories.len());
                let name = entity.category_name.clone();
                categories.push((category_id, name, vec![entity]));
            }
        }
    }

    categories
}
