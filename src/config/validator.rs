use crate::config::{Config, SCHEMA_VERSION};
use crate::error::{DocqaError, Result, ValidationError};

const KNOWN_PROVIDERS: [&str; 2] = ["fastembed", "hashing"];

/// Configuration validator
///
/// Collects every problem instead of stopping at the first one.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DocqaError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let provider = &config.embedding.provider;
        if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    KNOWN_PROVIDERS, provider
                ),
            ));
        }

        if config.embedding.model.trim().is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Dimension must be greater than 0",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        let indexing = &config.indexing;

        if indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if indexing.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        for (path, weight) in [
            ("retrieval.semantic_weight", retrieval.semantic_weight),
            ("retrieval.keyword_weight", retrieval.keyword_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                errors.push(ValidationError::new(
                    path,
                    format!("Weight must be between 0.0 and 1.0, got {}", weight),
                ));
            }
        }

        if retrieval.semantic_weight == 0.0 && retrieval.keyword_weight == 0.0 {
            errors.push(ValidationError::new(
                "retrieval",
                "semantic_weight and keyword_weight cannot both be 0",
            ));
        }

        if retrieval.default_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.default_k",
                "Default k must be at least 1",
            ));
        }

        if retrieval.overfetch_factor == 0 {
            errors.push(ValidationError::new(
                "retrieval.overfetch_factor",
                "Over-fetch factor must be at least 1",
            ));
        }

        if retrieval.history_window == 0 {
            errors.push(ValidationError::new(
                "retrieval.history_window",
                "History window must be at least 1",
            ));
        }
    }
}
