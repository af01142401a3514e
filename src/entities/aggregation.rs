// 🧺 Aggregation - Persisted group of entities plus its membership and ratings
//
// Status only moves one way: an aggregation is created `auto` and becomes
// `manual` on its first edit. Nothing ever sets it back to `auto`.

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationStatus {
    /// Produced by the grouping engine, untouched by a curator
    Auto,

    /// Edited by a curator at least once
    Manual,
}

impl AggregationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationStatus::Auto => "auto",
            AggregationStatus::Manual => "manual",
        }
    }

    /// Parse the stored representation. Unknown values read as `Manual` so a
    /// corrupted row is never picked up for automatic reuse.
    pub fn from_db(value: &str) -> Self {
        match value {
            "auto" => AggregationStatus::Auto,
            _ => AggregationStatus::Manual,
        }
    }
}

// ============================================================================
// CHARACTERISTICS
// ============================================================================

/// Characteristic → value pairs in significance order.
///
/// Serializes as a JSON object that keeps insertion order. Equality and the
/// signature ignore order.
#[derive(Debug, Clone, Default)]
pub struct Characteristics {
    pairs: Vec<(String, String)>,
}

impl Characteristics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair; an existing key keeps its position and takes the new value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Key-sorted copy
    pub fn sorted(&self) -> BTreeMap<String, String> {
        self.pairs.iter().cloned().collect()
    }
}

impl PartialEq for Characteristics {
    fn eq(&self, other: &Self) -> bool {
        self.sorted() == other.sorted()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Characteristics {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut characteristics = Characteristics::new();
        for (key, value) in iter {
            characteristics.insert(key, value);
        }
        characteristics
    }
}

impl Serialize for Characteristics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.pairs.len()))?;
        for (key, value) in &self.pairs {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct CharacteristicsVisitor;

impl<'de> Visitor<'de> for CharacteristicsVisitor {
    type Value = Characteristics;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of characteristic names to values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut characteristics = Characteristics::new();
        while let Some((key, value)) = access.next_entry::<String, String>()? {
            characteristics.insert(key, value);
        }
        Ok(characteristics)
    }
}

impl<'de> Deserialize<'de> for Characteristics {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(CharacteristicsVisitor)
    }
}

// ============================================================================
// AGGREGATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregation {
    pub id: i64,
    pub name: Option<String>,

    /// None for the pseudo category of uncategorized entities
    pub category_id: Option<String>,

    /// Characteristic → value pairs the group was built on
    pub grouping_characteristics: Characteristics,

    pub status: AggregationStatus,

    /// Average of all ratings, rounded to 2 decimals
    pub rating: Option<f64>,

    pub is_saved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Members sorted by display order
    pub items: Vec<Membership>,
}

impl Aggregation {
    /// Member entity ids in display order
    pub fn member_ids(&self) -> Vec<i64> {
        self.items.iter().map(|item| item.entity_id).collect()
    }

    pub fn is_auto(&self) -> bool {
        self.status == AggregationStatus::Auto
    }

    /// Signature of the stored grouping characteristics
    pub fn signature(&self) -> String {
        characteristics_signature(&self.grouping_characteristics)
    }
}

/// Values needed to create a new aggregation row.
#[derive(Debug, Clone)]
pub struct NewAggregation {
    pub name: Option<String>,
    pub category_id: Option<String>,
    pub grouping_characteristics: Characteristics,
}

impl NewAggregation {
    pub fn signature(&self) -> String {
        characteristics_signature(&self.grouping_characteristics)
    }
}

/// SHA-256 over the key-sorted JSON of a characteristics map, so two maps get
/// the same signature exactly when they are structurally equal.
pub fn characteristics_signature(characteristics: &Characteristics) -> String {
    let canonical = serde_json::to_string(&characteristics.sorted()).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// MEMBERSHIP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub id: i64,
    pub aggregation_id: i64,
    pub entity_id: i64,

    /// Display order, not required to be contiguous
    pub order: i64,

    pub created_at: DateTime<Utc>,
}

// ============================================================================
// RATING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub id: i64,
    pub aggregation_id: i64,

    /// 1.0 ..= 5.0
    pub value: f64,

    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> Characteristics {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_signature_ignores_insertion_order() {
        let a = map(&[("color", "red"), ("size", "XL")]);
        let b = map(&[("size", "XL"), ("color", "red")]);

        assert_eq!(characteristics_signature(&a), characteristics_signature(&b));
        assert_eq!(characteristics_signature(&a).len(), 64);
    }

    #[test]
    fn test_signature_differs_on_value() {
        let a = map(&[("color", "red")]);
        let b = map(&[("color", "blue")]);
        assert_ne!(characteristics_signature(&a), characteristics_signature(&b));
    }

    #[test]
    fn test_empty_map_has_stable_signature() {
        let empty = Characteristics::new();
        assert_eq!(characteristics_signature(&empty), characteristics_signature(&Characteristics::new()));
    }

    #[test]
    fn test_characteristics_keep_insertion_order() {
        let characteristics = map(&[("zeta", "1"), ("alpha", "2"), ("mid", "3")]);

        let json = serde_json::to_string(&characteristics).unwrap();
        assert_eq!(json, r#"{"zeta":"1","alpha":"2","mid":"3"}"#);

        let restored: Characteristics = serde_json::from_str(&json).unwrap();
        let keys: Vec<&str> = restored.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(restored, map(&[("mid", "3"), ("alpha", "2"), ("zeta", "1")]));
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!(AggregationStatus::from_db(AggregationStatus::Auto.as_str()), AggregationStatus::Auto);
        assert_eq!(AggregationStatus::from_db("manual"), AggregationStatus::Manual);
        assert_eq!(AggregationStatus::from_db("garbage"), AggregationStatus::Manual);
    }
}
