// 📊 Significance - Which characteristics define groupings within a category
//
// A characteristic is significant when enough attributed entities of the
// category carry it. Near-duplicate names ("Width", "width, mm") are folded
// into one canonical name before the list is returned.

use crate::entities::{Category, Entity};
use crate::repository::{CategoryRepository, EntityRepository};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Below this share of attributed entities the frequency fraction is scaled down
const LOW_COVERAGE: f64 = 0.5;

/// Floor for the scaled-down frequency fraction
const MIN_SCALED_FREQUENCY: f64 = 0.1;

// ============================================================================
// NAME CANONICALIZATION
// ============================================================================

/// Lower-case, trim, collapse inner whitespace and strip trailing punctuation.
pub fn normalize_characteristic_name(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    collapsed
        .trim_end_matches(['.', ',', ';', ':', '!', '?'])
        .to_string()
}

/// Fold names whose normalized forms contain one another.
///
/// Returns (canonical normalized name, original variants) in first-seen
/// order. The shorter normalized form is the canonical one.
pub fn group_similar_characteristics(names: &[String]) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();

    for name in names {
        let normalized = normalize_characteristic_name(name);

        let existing = groups
            .iter_mut()
            .find(|(key, _)| key.contains(normalized.as_str()) || normalized.contains(key.as_str()));

        match existing {
            Some((key, variants)) => {
                if normalized.len() < key.len() {
                    *key = normalized;
                }
                variants.push(name.clone());
            }
            None => groups.push((normalized, vec![name.clone()])),
        }
    }

    groups
}

// ============================================================================
// ANALYZER
// ============================================================================

#[derive(Debug, Clone)]
pub struct SignificanceAnalyzer {
    /// Fraction of attributed entities a characteristic must appear on
    pub min_frequency: f64,
}

impl SignificanceAnalyzer {
    pub fn new(min_frequency: f64) -> Self {
        SignificanceAnalyzer { min_frequency }
    }

    /// Significant characteristic names for one category's entities, most
    /// frequent first. Ties keep alphabetical order.
    pub fn analyze(&self, entities: &[Entity]) -> Vec<String> {
        let attributed: Vec<&Entity> = entities.iter().filter(|e| e.has_attributes()).collect();
        if attributed.is_empty() {
            return Vec::new();
        }

        let n = attributed.len();
        let coverage = n as f64 / entities.len() as f64;

        let min_frequency = if coverage < LOW_COVERAGE {
            (self.min_frequency * coverage).max(MIN_SCALED_FREQUENCY)
        } else {
            self.min_frequency
        };

        let mut frequency: BTreeMap<&str, usize> = BTreeMap::new();
        for entity in &attributed {
            for key in entity.attributes.keys() {
                *frequency.entry(key.as_str()).or_insert(0) += 1;
            }
        }

        let threshold = ((min_frequency * n as f64).floor() as usize).max(1);

        // BTreeMap iteration is alphabetical; the stable sort keeps that for ties
        let mut significant: Vec<String> = frequency
            .iter()
            .filter(|(_, &count)| count >= threshold)
            .map(|(key, _)| key.to_string())
            .collect();
        significant.sort_by(|a, b| frequency[b.as_str()].cmp(&frequency[a.as_str()]));

        let mut representatives: Vec<String> = group_similar_characteristics(&significant)
            .into_iter()
            .filter_map(|(_, variants)| most_frequent(&variants, &frequency))
            .collect();
        representatives.sort_by(|a, b| frequency[b.as_str()].cmp(&frequency[a.as_str()]));

        debug!(
            entities = entities.len(),
            attributed = n,
            threshold,
            significant = representatives.len(),
            "characteristics analyzed"
        );

        representatives
    }
}

/// First variant with the highest frequency
fn most_frequent(variants: &[String], frequency: &BTreeMap<&str, usize>) -> Option<String> {
    let mut best: Option<(&String, usize)> = None;
    for variant in variants {
        let count = frequency.get(variant.as_str()).copied().unwrap_or(0);
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((variant, count));
        }
    }
    best.map(|(variant, _)| variant.clone())
}

// ============================================================================
// CACHE
// ============================================================================

/// Per-category significant lists, in memory over the persisted Category.
///
/// Lookup: memory, then a non-empty persisted list, then a fresh analysis
/// that is persisted. An empty list means "not computed" and is re-analyzed.
#[derive(Clone)]
pub struct SignificanceCache {
    analyzer: SignificanceAnalyzer,
    memory: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl SignificanceCache {
    pub fn new(analyzer: SignificanceAnalyzer) -> Self {
        SignificanceCache {
            analyzer,
            memory: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// In-memory entry only
    pub fn cached(&self, category_id: &str) -> Option<Vec<String>> {
        self.memory
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(category_id)
            .cloned()
    }

    pub fn get_or_compute<R>(&self, repo: &R, category_id: &str, category_name: &str) -> Result<Vec<String>>
    where
        R: EntityRepository + CategoryRepository + ?Sized,
    {
        if let Some(significant) = self.cached(category_id) {
            return Ok(significant);
        }

        let existing = repo
            .get_category(category_id)
            .with_context(|| format!("Failed to load category {}", category_id))?;

        if let Some(category) = existing.as_ref().filter(|c| c.is_analyzed()) {
            self.remember(category_id, &category.significant_characteristics);
            return Ok(category.significant_characteristics.clone());
        }

        let entities = repo
            .entities_by_category(category_id)
            .with_context(|| format!("Failed to load entities of category {}", category_id))?;
        let significant = self.analyzer.analyze(&entities);

        let mut category = existing.unwrap_or_else(|| Category::new(category_id, category_name));
        category.set_significant(significant.clone());
        repo.upsert_category(&category)
            .with_context(|| format!("Failed to store category {}", category_id))?;

        if !significant.is_empty() {
            self.remember(category_id, &significant);
        }

        info!(
            category = category_id,
            significant = ?significant,
            "significant characteristics computed"
        );

        Ok(significant)
    }

    /// Forget the significant list of a category, in memory and in storage.
    ///
    /// Returns true if a persisted category existed.
    // TODO: recompute automatically when a category's entities drift instead of
    // relying on this manual call.
    pub fn invalidate<R>(&self, repo: &R, category_id: &str) -> Result<bool>
    where
        R: CategoryRepository + ?Sized,
    {
        self.memory
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(category_id);

        let Some(mut category) = repo.get_category(category_id)? else {
            return Ok(false);
        };

        category.set_significant(Vec::new());
        repo.upsert_category(&category)
            .with_context(|| format!("Failed to clear category {}", category_id))?;

        info!(category = category_id, "significant characteristics invalidated");
        Ok(true)
    }

    fn remember(&self, category_id: &str, significant: &[String]) {
        self.memory
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(category_id.to_string(), significant.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rusqlite::Connection;

    fn create_test_entity(id: i64, attrs: &[(&str, &str)]) -> Entity {
        let mut entity = Entity::new(id, format!("E-{id}"), format!("Entity {id}")).with_category("tools", "Tools");
        for (key, value) in attrs {
            entity = entity.with_attribute(*key, *value);
        }
        entity
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_characteristic_name("  Width   Profile.  "), "width profile");
        assert_eq!(normalize_characteristic_name("Color:"), "color");
        assert_eq!(normalize_characteristic_name("Size?!"), "size");
    }

    #[test]
    fn test_group_similar_keeps_shorter_key() {
        let names = vec!["Width profile".to_string(), "width".to_string(), "Color".to_string()];
        let groups = group_similar_characteristics(&names);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "width");
        assert_eq!(groups[0].1, vec!["Width profile".to_string(), "width".to_string()]);
        assert_eq!(groups[1].0, "color");
    }

    #[test]
    fn test_no_attributes_means_no_significance() {
        let analyzer = SignificanceAnalyzer::new(0.3);
        let entities = vec![create_test_entity(1, &[]), create_test_entity(2, &[])];
        assert!(analyzer.analyze(&entities).is_empty());
        assert!(analyzer.analyze(&[]).is_empty());
    }

    #[test]
    fn test_threshold_boundary() {
        // 10 attributed entities, min_frequency 0.3 → threshold 3
        let analyzer = SignificanceAnalyzer::new(0.3);
        let entities: Vec<Entity> = (0..10)
            .map(|i| {
                let mut attrs = vec![("color", "red")];
                if i < 3 {
                    attrs.push(("voltage", "18V"));
                }
                if i < 2 {
                    attrs.push(("weight", "1kg"));
                }
                create_test_entity(i, &attrs)
            })
            .collect();

        let significant = analyzer.analyze(&entities);

        assert_eq!(significant, vec!["color".to_string(), "voltage".to_string()]);
    }

    #[test]
    fn test_low_coverage_lowers_threshold() {
        // 2 of 10 entities attributed: fraction 0.3 * 0.2 → floored at 0.1,
        // threshold max(1, floor(0.1 * 2)) = 1
        let analyzer = SignificanceAnalyzer::new(0.3);
        let mut entities: Vec<Entity> = (0..8).map(|i| create_test_entity(i, &[])).collect();
        entities.push(create_test_entity(8, &[("color", "red")]));
        entities.push(create_test_entity(9, &[("material", "steel")]));

        let significant = analyzer.analyze(&entities);

        assert_eq!(significant, vec!["color".to_string(), "material".to_string()]);
    }

    #[test]
    fn test_near_duplicates_collapse_to_most_frequent_variant() {
        let analyzer = SignificanceAnalyzer::new(0.3);
        let entities = vec![
            create_test_entity(1, &[("Width", "10")]),
            create_test_entity(2, &[("Width", "12")]),
            create_test_entity(3, &[("Width profile", "10")]),
            create_test_entity(4, &[("Color", "red"), ("Width", "10")]),
        ];

        let significant = analyzer.analyze(&entities);

        assert_eq!(significant, vec!["Width".to_string(), "Color".to_string()]);
    }

    #[test]
    fn test_ties_are_alphabetical() {
        let analyzer = SignificanceAnalyzer::new(0.3);
        let entities = vec![
            create_test_entity(1, &[("size", "L"), ("color", "red")]),
            create_test_entity(2, &[("size", "M"), ("color", "blue")]),
        ];

        assert_eq!(analyzer.analyze(&entities), vec!["color".to_string(), "size".to_string()]);
    }

    fn test_db_with(entities: &[Entity]) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        db::insert_entities(&conn, entities).unwrap();
        conn
    }

    #[test]
    fn test_cache_persists_and_reuses() {
        let conn = test_db_with(&[
            create_test_entity(1, &[("color", "red")]),
            create_test_entity(2, &[("color", "blue")]),
        ]);
        let cache = SignificanceCache::new(SignificanceAnalyzer::new(0.3));

        let first = cache.get_or_compute(&conn, "tools", "Tools").unwrap();
        assert_eq!(first, vec!["color".to_string()]);
        assert_eq!(cache.cached("tools"), Some(first.clone()));

        let stored = db::get_category(&conn, "tools").unwrap().unwrap();
        assert_eq!(stored.significant_characteristics, first);
        assert_eq!(stored.name, "Tools");

        // A fresh cache reads the persisted list instead of re-analyzing
        let fresh = SignificanceCache::new(SignificanceAnalyzer::new(0.3));
        db::insert_entity(&conn, &create_test_entity(7, &[("size", "XL")])).unwrap();
        assert_eq!(fresh.get_or_compute(&conn, "tools", "Tools").unwrap(), first);
    }

    #[test]
    fn test_empty_result_is_not_cached() {
        let conn = test_db_with(&[create_test_entity(0, &[])]);
        let cache = SignificanceCache::new(SignificanceAnalyzer::new(0.3));

        assert!(cache.get_or_compute(&conn, "tools", "Tools").unwrap().is_empty());
        assert_eq!(cache.cached("tools"), None);

        db::insert_entity(&conn, &create_test_entity(5, &[("color", "red")])).unwrap();
        assert_eq!(
            cache.get_or_compute(&conn, "tools", "Tools").unwrap(),
            vec!["color".to_string()]
        );
    }

    #[test]
    fn test_invalidate_clears_memory_and_storage() {
        let conn = test_db_with(&[create_test_entity(0, &[("color", "red")])]);
        let cache = SignificanceCache::new(SignificanceAnalyzer::new(0.3));
        cache.get_or_compute(&conn, "tools", "Tools").unwrap();

        assert!(cache.invalidate(&conn, "tools").unwrap());
        assert_eq!(cache.cached("tools"), None);
        assert!(!db::get_category(&conn, "tools").unwrap().unwrap().is_analyzed());

        assert!(!cache.invalidate(&conn, "missing").unwrap());
    }
}
