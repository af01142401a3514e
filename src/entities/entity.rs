// 📦 Entity - Normalized catalog item consumed by the grouping core
//
// Entities arrive already normalized (id, category, free-text fields and a flat
// attribute map). The grouping core only ever reads them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Maximum number of leading name words used as a fallback descriptor.
pub const NAME_PREFIX_WORDS: usize = 3;

// ============================================================================
// ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Storage identity
    pub id: i64,

    /// Identifier from the source catalog (unique)
    pub external_id: String,

    /// Display name
    pub name: String,

    pub category_id: Option<String>,
    pub category_name: Option<String>,

    pub manufacturer: Option<String>,
    pub model: Option<String>,

    /// Country of origin
    pub country: Option<String>,

    pub image_url: Option<String>,

    /// Flat characteristic map (name → value)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Entity {
    pub fn new(id: i64, external_id: impl Into<String>, name: impl Into<String>) -> Self {
        Entity {
            id,
            external_id: external_id.into(),
            name: name.into(),
            category_id: None,
            category_name: None,
            manufacturer: None,
            model: None,
            country: None,
            image_url: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder: set category id and display name
    pub fn with_category(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.category_id = Some(id.into());
        self.category_name = Some(name.into());
        self
    }

    /// Builder: set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Builder: set model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Builder: add one characteristic
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// True when the entity carries at least one characteristic
    pub fn has_attributes(&self) -> bool {
        !self.attributes.is_empty()
    }

    /// Characteristic value, only when present and non-blank
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Manufacturer, only when non-blank
    pub fn manufacturer(&self) -> Option<&str> {
        non_blank(self.manufacturer.as_deref())
    }

    /// Model, only when non-blank
    pub fn model(&self) -> Option<&str> {
        non_blank(self.model.as_deref())
    }

    /// First (up to 3) whitespace-separated words of the display name
    pub fn name_prefix(&self) -> Option<String> {
        let words: Vec<&str> = self.name.split_whitespace().take(NAME_PREFIX_WORDS).collect();
        if words.is_empty() {
            None
        } else {
            Some(words.join(" "))
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// One row of a normalized entity CSV.
///
/// Headers: external_id, name, category_id, category_name, manufacturer,
/// model, country, image_url, attributes (JSON object).
#[derive(Debug, Deserialize)]
pub struct EntityRecord {
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub attributes: Option<String>,
}

impl From<EntityRecord> for Entity {
    fn from(record: EntityRecord) -> Self {
        let attributes = record
            .attributes
            .as_deref()
            .map(parse_attributes)
            .unwrap_or_default();

        Entity {
            id: 0,
            external_id: record.external_id,
            name: record.name,
            category_id: record.category_id.filter(|s| !s.is_empty()),
            category_name: record.category_name.filter(|s| !s.is_empty()),
            manufacturer: record.manufacturer,
            model: record.model,
            country: record.country,
            image_url: record.image_url,
            attributes,
        }
    }
}

/// Parse a JSON attribute object into a flat string map.
///
/// Scalars are stringified, nulls and nested values are dropped. Anything
/// that is not a JSON object yields an empty map: malformed attribute data
/// means "no characteristics", never an error.
pub fn parse_attributes(raw: &str) -> BTreeMap<String, String> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return BTreeMap::new(),
    };

    let serde_json::Value::Object(object) = value else {
        return BTreeMap::new();
    };

    object
        .into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key, text))
        })
        .collect()
}

/// Load entities from a normalized CSV file. Ids are assigned on insert.
pub fn load_entities_csv(csv_path: &Path) -> Result<Vec<Entity>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

    let mut entities = Vec::new();
    for result in rdr.deserialize() {
        let record: EntityRecord = result.context("Failed to deserialize entity")?;
        entities.push(record.into());
    }

    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_name_prefix_takes_three_words() {
        let entity = Entity::new(1, "e1", "  Drill  cordless 18V brushless kit ");
        assert_eq!(entity.name_prefix().as_deref(), Some("Drill cordless 18V"));

        let short = Entity::new(2, "e2", "Hammer");
        assert_eq!(short.name_prefix().as_deref(), Some("Hammer"));

        let blank = Entity::new(3, "e3", "   ");
        assert_eq!(blank.name_prefix(), None);
    }

    #[test]
    fn test_blank_values_are_absent() {
        let entity = Entity::new(1, "e1", "Widget")
            .with_manufacturer(" ")
            .with_attribute("color", "")
            .with_attribute("size", "XL");

        assert_eq!(entity.manufacturer(), None);
        assert_eq!(entity.attribute("color"), None);
        assert_eq!(entity.attribute("size"), Some("XL"));
        assert!(entity.has_attributes());
    }

    #[test]
    fn test_parse_attributes_stringifies_scalars() {
        let attrs = parse_attributes(r#"{"color": "red", "weight": 1.5, "foldable": true, "extra": null, "dims": [1, 2]}"#);

        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs["color"], "red");
        assert_eq!(attrs["weight"], "1.5");
        assert_eq!(attrs["foldable"], "true");
    }

    #[test]
    fn test_parse_attributes_malformed_is_empty() {
        assert!(parse_attributes("not json").is_empty());
        assert!(parse_attributes("[1, 2, 3]").is_empty());
        assert!(parse_attributes("").is_empty());
    }

    #[test]
    fn test_load_entities_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "external_id,name,category_id,category_name,manufacturer,model,country,image_url,attributes"
        )
        .unwrap();
        writeln!(
            file,
            "A-1,Red pen,pens,Pens,Acme,X1,DE,,\"{{\"\"color\"\": \"\"red\"\"}}\""
        )
        .unwrap();
        writeln!(file, "A-2,Loose item,,,,,,,").unwrap();

        let entities = load_entities_csv(file.path()).unwrap();

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].category_id.as_deref(), Some("pens"));
        assert_eq!(entities[0].attributes["color"], "red");
        assert_eq!(entities[1].category_id, None);
        assert!(entities[1].attributes.is_empty());
    }
}
