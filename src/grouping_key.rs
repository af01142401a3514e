// 🔑 Grouping Key - Stable bucket identity per entity
//
// Key = sorted "name=value" parts from the significant characteristics, topped
// up with manufacturer / model / name prefix while fewer than two parts exist.

use crate::entities::Entity;
use std::collections::HashMap;

/// Key of entities with nothing to group on
pub const NO_CHARACTERISTICS_KEY: &str = "no_characteristics";

/// Fewer parts than this triggers the fallback signals
const MIN_KEY_PARTS: usize = 2;

pub fn extract_grouping_key(entity: &Entity, significant: &[String]) -> String {
    let mut parts: Vec<String> = significant
        .iter()
        .filter_map(|name| entity.attribute(name).map(|value| format!("{}={}", name, value)))
        .collect();

    if parts.len() < MIN_KEY_PARTS {
        if let Some(manufacturer) = entity.manufacturer() {
            parts.push(format!("manufacturer={}", manufacturer));
        }
    }
    if parts.len() < MIN_KEY_PARTS {
        if let Some(model) = entity.model() {
            parts.push(format!("model={}", model));
        }
    }
    if parts.len() < MIN_KEY_PARTS {
        if let Some(prefix) = entity.name_prefix() {
            parts.push(format!("name_prefix={}", prefix));
        }
    }

    if parts.is_empty() {
        return NO_CHARACTERISTICS_KEY.to_string();
    }

    parts.sort();
    parts.join(";")
}

// ============================================================================
// EXACT-MATCH PARTITION
// ============================================================================

/// Entities sharing one grouping key
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub key: String,
    pub members: Vec<Entity>,
}

impl Bucket {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Bucket entities by exact key. Buckets come out in first-seen order and
/// keep their members in input order.
pub fn partition_by_key(entities: &[Entity], significant: &[String]) -> Vec<Bucket> {
    let mut buckets: Vec<Bucket> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entity in entities {
        let key = extract_grouping_key(entity, significant);
        match index.get(&key) {
            Some(&slot) => buckets[slot].members.push(entity.clone()),
            None => {
                index.insert(key.clone(), buckets.len());
                buckets.push(Bucket {
                    key,
                    members: vec![entity.clone()],
                });
            }
        }
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn significant(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fallback_key_is_sorted() {
        let entity = Entity::new(1, "e1", "Widget").with_manufacturer("Acme").with_model("X1");
        assert_eq!(extract_grouping_key(&entity, &[]), "manufacturer=Acme;model=X1");
    }

    #[test]
    fn test_attribute_order_does_not_matter() {
        let entity = Entity::new(1, "e1", "Pen")
            .with_attribute("size", "M")
            .with_attribute("color", "red");

        let a = extract_grouping_key(&entity, &significant(&["size", "color"]));
        let b = extract_grouping_key(&entity, &significant(&["color", "size"]));

        assert_eq!(a, "color=red;size=M");
        assert_eq!(a, b);
    }

    #[test]
    fn test_one_attribute_is_topped_up() {
        let entity = Entity::new(1, "e1", "Red ballpoint pen blue cap")
            .with_attribute("color", "red")
            .with_model("BP-2");

        // One attribute part, manufacturer missing, model fills the second slot
        assert_eq!(
            extract_grouping_key(&entity, &significant(&["color"])),
            "color=red;model=BP-2"
        );
    }

    #[test]
    fn test_name_prefix_only_when_still_short() {
        let entity = Entity::new(1, "e1", "Cordless drill 18V kit").with_manufacturer("Acme");
        assert_eq!(
            extract_grouping_key(&entity, &[]),
            "manufacturer=Acme;name_prefix=Cordless drill 18V"
        );
    }

    #[test]
    fn test_empty_values_are_skipped() {
        let entity = Entity::new(1, "e1", "")
            .with_attribute("color", "  ")
            .with_manufacturer("");
        assert_eq!(extract_grouping_key(&entity, &significant(&["color"])), NO_CHARACTERISTICS_KEY);
    }

    #[test]
    fn test_partition_first_seen_order() {
        let red_a = Entity::new(1, "a", "A").with_attribute("color", "red").with_attribute("size", "M");
        let blue = Entity::new(2, "c", "C").with_attribute("color", "blue").with_attribute("size", "M");
        let red_b = Entity::new(3, "b", "B").with_attribute("color", "red").with_attribute("size", "M");

        let buckets = partition_by_key(&[red_a, blue, red_b], &significant(&["color", "size"]));

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].key, "color=red;size=M");
        assert_eq!(buckets[0].members.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(buckets[1].key, "color=blue;size=M");
        assert_eq!(buckets[1].len(), 1);
    }

    #[test]
    fn test_partition_is_deterministic() {
        let entities: Vec<Entity> = (0..6)
            .map(|i| Entity::new(i, format!("e{i}"), format!("Item {}", i % 2)))
            .collect();

        let first = partition_by_key(&entities, &[]);
        let second = partition_by_key(&entities, &[]);

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
