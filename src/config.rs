// ⚙️ Configuration - TOML file with defaults for every field
//
// Every section carries #[serde(default)], so a config file only needs the
// keys it wants to override. An absent file means "all defaults".

use crate::error::CatalogError;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming the TOML config file.
pub const CONFIG_ENV_VAR: &str = "CATALOG_GROUPING_CONFIG";

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Listen address for the HTTP server
    pub server_addr: String,

    pub grouping: GroupingConfig,
    pub embedding: EmbeddingConfig,
    pub labels: DisplayLabels,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from("catalog_grouping.db"),
            server_addr: "0.0.0.0:3000".to_string(),
            grouping: GroupingConfig::default(),
            embedding: EmbeddingConfig::default(),
            labels: DisplayLabels::default(),
        }
    }
}

impl AppConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Load from the file named by `CATALOG_GROUPING_CONFIG`, or defaults.
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.grouping.validate()?;
        if self.embedding.dimensions == 0 {
            bail!("embedding.dimensions must be positive");
        }
        Ok(())
    }
}

// ============================================================================
// GROUPING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Buckets whose representative names score at or above this are merged
    pub similarity_threshold: f64,

    /// Smallest group that gets materialized (inclusive)
    pub min_group_size: usize,

    /// Largest group that gets materialized (inclusive)
    pub max_group_size: usize,

    /// Fraction of attributed entities a characteristic must appear on
    pub min_frequency: f64,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        GroupingConfig {
            similarity_threshold: 0.7,
            min_group_size: 2,
            max_group_size: 50,
            min_frequency: 0.3,
        }
    }
}

/// Threshold and size-bound checks shared by the config file and per-call options.
///
/// 1.01 is accepted: an unreachable threshold disables merging.
pub fn check_grouping_bounds(
    similarity_threshold: f64,
    min_group_size: usize,
    max_group_size: usize,
) -> std::result::Result<(), CatalogError> {
    if !(0.0..=1.01).contains(&similarity_threshold) {
        return Err(CatalogError::InvalidOptions(format!(
            "similarity threshold must be within [0, 1.01], got {}",
            similarity_threshold
        )));
    }
    if min_group_size > max_group_size {
        return Err(CatalogError::InvalidOptions(format!(
            "min group size ({}) exceeds max group size ({})",
            min_group_size, max_group_size
        )));
    }
    Ok(())
}

impl GroupingConfig {
    pub fn validate(&self) -> Result<()> {
        check_grouping_bounds(self.similarity_threshold, self.min_group_size, self.max_group_size)
            .context("Invalid [grouping] section")?;
        if !(self.min_frequency > 0.0 && self.min_frequency <= 1.0) {
            bail!(
                "grouping.min_frequency must be within (0, 1], got {}",
                self.min_frequency
            );
        }
        Ok(())
    }
}

// ============================================================================
// EMBEDDING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// ONNX model file; without it (or without the `onnx` feature) similarity is lexical
    pub model_path: Option<PathBuf>,

    /// Output vector size of the model
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            model_path: None,
            dimensions: 384,
        }
    }
}

// ============================================================================
// DISPLAY LABELS
// ============================================================================

/// Human-facing labels used when a group has to be described by fallback
/// descriptors instead of characteristics. Deployments localize these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayLabels {
    pub manufacturer: String,
    pub model: String,
    pub name_prefix: String,
    pub unknown_category: String,
}

impl Default for DisplayLabels {
    fn default() -> Self {
        DisplayLabels {
            manufacturer: "Manufacturer".to_string(),
            model: "Model".to_string(),
            name_prefix: "Name prefix".to_string(),
            unknown_category: "Unknown category".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.grouping.similarity_threshold, 0.7);
        assert_eq!(config.grouping.min_group_size, 2);
        assert_eq!(config.grouping.max_group_size, 50);
        assert_eq!(config.grouping.min_frequency, 0.3);
        assert!(config.embedding.model_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            database_path = "/tmp/catalog.db"

            [grouping]
            min_group_size = 3

            [labels]
            manufacturer = "производитель"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/catalog.db"));
        assert_eq!(config.grouping.min_group_size, 3);
        assert_eq!(config.grouping.max_group_size, 50);
        assert_eq!(config.labels.manufacturer, "производитель");
        assert_eq!(config.labels.model, "Model");
    }

    #[test]
    fn test_rejects_inverted_size_bounds() {
        let result = AppConfig::from_toml(
            r#"
            [grouping]
            min_group_size = 10
            max_group_size = 5
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unreachable_threshold_is_valid() {
        let config = GroupingConfig {
            similarity_threshold: 1.01,
            ..GroupingConfig::default()
        };
        assert!(config.validate().is_ok());

        let config = GroupingConfig {
            similarity_threshold: 1.5,
            ..GroupingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bounds_report_invalid_options() {
        assert!(check_grouping_bounds(0.0, 1, 1).is_ok());
        assert!(matches!(
            check_grouping_bounds(f64::NAN, 2, 50),
            Err(CatalogError::InvalidOptions(_))
        ));
        assert!(matches!(
            check_grouping_bounds(0.7, 3, 2),
            Err(CatalogError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server_addr = \"127.0.0.1:8080\"").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server_addr, "127.0.0.1:8080");
    }
}
