//! Configuration management for docqa
//!
//! Configuration is a TOML file with one section per subsystem. Values can be
//! overridden per named profile and through `DOCQA_SECTION__KEY` environment
//! variables; the result is validated before use.

use crate::error::{DocqaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

const ENV_PREFIX: &str = "DOCQA_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Embedding provider selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "fastembed" or "hashing"
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    /// Model download directory; fastembed's default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "fastembed".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            batch_size: 32,
            cache_dir: None,
        }
    }
}

/// Vector index parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
    /// Corpora up to this size are scanned exactly instead of through HNSW
    pub exact_search_threshold: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 64,
            exact_search_threshold: 1000,
        }
    }
}

/// Hybrid retrieval parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub semantic_weight: f32,
    pub keyword_weight: f32,
    pub default_k: usize,
    /// Each signal is asked for `overfetch_factor * k` candidates
    pub overfetch_factor: usize,
    pub history_window: usize,
    /// Recent turns folded into a contextual query
    pub expansion_context: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.7,
            keyword_weight: 0.3,
            default_k: 5,
            overfetch_factor: 2,
            history_window: 10,
            expansion_context: 3,
        }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_weight: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_weight: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_k: Option<usize>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DocqaError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| DocqaError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DocqaError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| DocqaError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| DocqaError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(provider) = overrides.embedding_provider {
            self.embedding.provider = provider;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(weight) = overrides.semantic_weight {
            self.retrieval.semantic_weight = weight;
        }
        if let Some(weight) = overrides.keyword_weight {
            self.retrieval.keyword_weight = weight;
        }
        if let Some(k) = overrides.default_k {
            self.retrieval.default_k = k;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: DOCQA_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    fn apply_overrides(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "EMBEDDING__PROVIDER" => self.embedding.provider = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__DIMENSION" => self.embedding.dimension = parse_value(path, value)?,
            "EMBEDDING__BATCH_SIZE" => self.embedding.batch_size = parse_value(path, value)?,
            "EMBEDDING__CACHE_DIR" => self.embedding.cache_dir = Some(PathBuf::from(value)),
            "RETRIEVAL__SEMANTIC_WEIGHT" => {
                self.retrieval.semantic_weight = parse_value(path, value)?
            }
            "RETRIEVAL__KEYWORD_WEIGHT" => {
                self.retrieval.keyword_weight = parse_value(path, value)?
            }
            "RETRIEVAL__DEFAULT_K" => self.retrieval.default_k = parse_value(path, value)?,
            "RETRIEVAL__HISTORY_WINDOW" => {
                self.retrieval.history_window = parse_value(path, value)?
            }
            "RETRIEVAL__EXPANSION_CONTEXT" => {
                self.retrieval.expansion_context = parse_value(path, value)?
            }
            "RETRIEVAL__OVERFETCH_FACTOR" => {
                self.retrieval.overfetch_factor = parse_value(path, value)?
            }
            "INDEXING__HNSW_M" => self.indexing.hnsw_m = parse_value(path, value)?,
            "INDEXING__HNSW_EF_CONSTRUCTION" => {
                self.indexing.hnsw_ef_construction = parse_value(path, value)?
            }
            "INDEXING__HNSW_EF_SEARCH" => {
                self.indexing.hnsw_ef_search = parse_value(path, value)?
            }
            "INDEXING__EXACT_SEARCH_THRESHOLD" => {
                self.indexing.exact_search_threshold = parse_value(path, value)?
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| DocqaError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("docqa").join("config.toml"))
    }
}

fn parse_value<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| DocqaError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            embedding: EmbeddingConfig::default(),
            indexing: IndexingConfig::default(),
            retrieval: RetrievalConfig::default(),
            profiles: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.retrieval.semantic_weight, 0.7);
        assert_eq!(config.retrieval.keyword_weight, 0.3);
        assert_eq!(config.retrieval.default_k, 5);
        assert_eq!(config.retrieval.history_window, 10);
        assert_eq!(config.embedding.dimension, 384);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.retrieval.default_k = 8;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.retrieval.default_k, 8);
        assert_eq!(loaded.embedding.model, config.embedding.model);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[_meta]\nschema_version = \"1.0.0\"\n\n[retrieval]\nkeyword_weight = 0.5\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.retrieval.keyword_weight, 0.5);
        assert_eq!(config.retrieval.semantic_weight, 0.7);
        assert_eq!(config.indexing.hnsw_m, 16);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/docqa/config.toml"));
        assert!(matches!(result, Err(DocqaError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[_meta]\nschema_version = \"1.0.0\"\n\n[retrieval]\ndefault_k = 0\n",
        )
        .unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(DocqaError::ConfigValidation { .. })));
    }

    #[test]
    fn test_apply_profile() {
        let mut config = Config::default();
        config.profiles.insert(
            "lexical-heavy".to_string(),
            ProfileOverrides {
                semantic_weight: Some(0.2),
                keyword_weight: Some(0.8),
                embedding_provider: Some("hashing".to_string()),
                ..Default::default()
            },
        );

        config.apply_profile("lexical-heavy").unwrap();
        assert_eq!(config.retrieval.semantic_weight, 0.2);
        assert_eq!(config.retrieval.keyword_weight, 0.8);
        assert_eq!(config.embedding.provider, "hashing");
        assert_eq!(config.retrieval.default_k, 5);

        assert!(config.apply_profile("missing").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(vec![
            ("DOCQA_RETRIEVAL__DEFAULT_K".to_string(), "9".to_string()),
            ("DOCQA_EMBEDDING__PROVIDER".to_string(), "hashing".to_string()),
            ("DOCQA_RETRIEVAL__SEMANTIC_WEIGHT".to_string(), "not-a-number".to_string()),
            ("OTHER_RETRIEVAL__DEFAULT_K".to_string(), "1".to_string()),
        ]);

        assert_eq!(config.retrieval.default_k, 9);
        assert_eq!(config.embedding.provider, "hashing");
        assert_eq!(config.retrieval.semantic_weight, 0.7);
    }

    #[test]
    fn test_env_overrides_cover_every_tunable() {
        let mut config = Config::default();
        config.apply_overrides(vec![
            ("DOCQA_RETRIEVAL__EXPANSION_CONTEXT".to_string(), "5".to_string()),
            ("DOCQA_RETRIEVAL__OVERFETCH_FACTOR".to_string(), "4".to_string()),
            ("DOCQA_INDEXING__HNSW_M".to_string(), "32".to_string()),
            ("DOCQA_INDEXING__HNSW_EF_CONSTRUCTION".to_string(), "400".to_string()),
            ("DOCQA_INDEXING__HNSW_EF_SEARCH".to_string(), "128".to_string()),
            ("DOCQA_INDEXING__EXACT_SEARCH_THRESHOLD".to_string(), "50".to_string()),
        ]);

        assert_eq!(config.retrieval.expansion_context, 5);
        assert_eq!(config.retrieval.overfetch_factor, 4);
        assert_eq!(config.indexing.hnsw_m, 32);
        assert_eq!(config.indexing.hnsw_ef_construction, 400);
        assert_eq!(config.indexing.hnsw_ef_search, 128);
        assert_eq!(config.indexing.exact_search_threshold, 50);
    }
}
