/// Batched embedding generation for index builds
use super::{EmbeddingError, EmbeddingProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of batch processing
///
/// `embeddings` is aligned with the input texts; `None` marks a text whose
/// batch failed.
#[derive(Debug)]
pub struct BatchResult {
    pub embeddings: Vec<Option<Vec<f32>>>,
    pub processed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub last_error: Option<String>,
}

/// Batch embedder
///
/// Splits the corpus into fixed-size batches; a failing batch is logged and
/// skipped instead of aborting the whole build.
pub struct BatchEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl BatchEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn embed_all(&self, texts: &[String]) -> BatchResult {
        let start = Instant::now();
        let total = texts.len();

        info!(
            "Embedding {} texts with {} (batch size {})",
            total,
            self.provider.model_name(),
            self.batch_size
        );

        let mut embeddings = Vec::with_capacity(total);
        let mut processed = 0;
        let mut failed = 0;
        let mut last_error = None;

        for batch in texts.chunks(self.batch_size) {
            match self.embed_batch(batch) {
                Ok(vectors) => {
                    processed += vectors.len();
                    debug!("Embedded batch of {} texts", vectors.len());
                    embeddings.extend(vectors.into_iter().map(Some));
                }
                Err(e) => {
                    warn!("Failed to embed batch of {} texts: {}", batch.len(), e);
                    failed += batch.len();
                    last_error = Some(e.to_string());
                    embeddings.extend(std::iter::repeat_with(|| None).take(batch.len()));
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Batch embedding complete: {} processed, {} failed, {}ms",
            processed, failed, duration_ms
        );

        BatchResult {
            embeddings,
            processed,
            failed,
            duration_ms,
            last_error,
        }
    }

    fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let vectors = self.provider.embed_batch(batch)?;

        if vectors.len() != batch.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                batch.len(),
                vectors.len()
            )));
        }

        let expected = self.provider.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingProvider;

    /// Fails every batch containing the word "poison"
    struct PoisonProvider(HashingProvider);

    impl EmbeddingProvider for PoisonProvider {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.0.embed(text)
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if texts.iter().any(|t| t.contains("poison")) {
                return Err(EmbeddingError::GenerationError("poisoned".to_string()));
            }
            self.0.embed_batch(texts)
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }

        fn model_name(&self) -> &str {
            "poison"
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_all_batches_succeed() {
        let embedder = BatchEmbedder::new(Arc::new(HashingProvider::new(16).unwrap()), 2);
        let result = embedder.embed_all(&texts(&["a b", "c d", "e f"]));

        assert_eq!(result.processed, 3);
        assert_eq!(result.failed, 0);
        assert!(result.embeddings.iter().all(Option::is_some));
        assert!(result.last_error.is_none());
    }

    #[test]
    fn test_failed_batch_is_skipped_and_alignment_kept() {
        let provider = PoisonProvider(HashingProvider::new(16).unwrap());
        let embedder = BatchEmbedder::new(Arc::new(provider), 2);
        let result = embedder.embed_all(&texts(&["one", "two", "poison", "four", "five"]));

        assert_eq!(result.embeddings.len(), 5);
        assert_eq!(result.processed, 3);
        assert_eq!(result.failed, 2);
        assert!(result.embeddings[0].is_some());
        assert!(result.embeddings[2].is_none());
        assert!(result.embeddings[3].is_none());
        assert!(result.embeddings[4].is_some());
        assert_eq!(result.last_error.as_deref(), Some("Embedding generation failed: poisoned"));
    }

    #[test]
    fn test_empty_input() {
        let embedder = BatchEmbedder::new(Arc::new(HashingProvider::new(16).unwrap()), 4);
        let result = embedder.embed_all(&[]);
        assert_eq!(result.processed, 0);
        assert!(result.embeddings.is_empty());
    }
}
