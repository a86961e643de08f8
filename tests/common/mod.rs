//! Shared fixtures for integration tests
#![allow(dead_code)]

use docqa::config::Config;
use docqa::corpus::{Chunk, ChunkStore};
use docqa::embedding::{EmbeddingError, EmbeddingProvider, HashingProvider};
use docqa::index::{IndexHit, IndexQueryError, SearchIndex, SnapshotInfo};
use docqa::retrieval::HybridRetriever;
use std::sync::Arc;

pub const REFUND_POLICY: &str = "refund policy explained in section 3";
pub const SHIPPING_TIMES: &str = "shipping times vary by region";
pub const REFUND_PROCESSING: &str = "refunds are processed within 5 business days";

/// Corpus with chunk ids c0..cN in the given order
pub fn corpus(texts: &[&str]) -> ChunkStore {
    let chunks = texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            Chunk::new(format!("c{}", i), *text, format!("doc{}.pdf", i)).with_page(i as u32 + 1)
        })
        .collect();
    ChunkStore::new(chunks).unwrap()
}

/// C1, C2, C3 of the refund corpus
pub fn refund_corpus() -> ChunkStore {
    corpus(&[REFUND_POLICY, SHIPPING_TIMES, REFUND_PROCESSING])
}

pub fn hashing() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashingProvider::new(384).unwrap())
}

pub fn retriever() -> HybridRetriever {
    HybridRetriever::new(&Config::default()).unwrap()
}

/// Embeds documents in bulk but fails every single-text query embedding
pub struct QueryFailingProvider {
    inner: HashingProvider,
}

impl QueryFailingProvider {
    pub fn new() -> Self {
        Self {
            inner: HashingProvider::new(384).unwrap(),
        }
    }
}

impl EmbeddingProvider for QueryFailingProvider {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::GenerationError(
            "embedding service unreachable".to_string(),
        ))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.inner.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        "query-failing"
    }
}

/// Fails every call
pub struct FailingProvider;

impl EmbeddingProvider for FailingProvider {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::GenerationError("offline".to_string()))
    }

    fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::GenerationError("offline".to_string()))
    }

    fn dimension(&self) -> usize {
        384
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Three-axis embedder: counts of "alpha", counts of "beta", constant bias
pub struct AxisProvider;

impl EmbeddingProvider for AxisProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let count = |word: &str| text.split_whitespace().filter(|w| *w == word).count() as f32;
        Ok(vec![count("alpha"), count("beta"), 0.1])
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        3
    }

    fn model_name(&self) -> &str {
        "axis"
    }
}

/// Index returning a fixed hit list regardless of the query
pub struct FixedIndex {
    hits: Vec<IndexHit>,
    snapshot: SnapshotInfo,
}

impl FixedIndex {
    pub fn new(store: &ChunkStore, scores: &[(usize, f32)]) -> Arc<dyn SearchIndex> {
        let hits = scores
            .iter()
            .map(|&(ordinal, score)| IndexHit {
                chunk: Arc::clone(store.get(ordinal).unwrap()),
                ordinal,
                score,
            })
            .collect();
        Arc::new(Self {
            hits,
            snapshot: SnapshotInfo::capture(store),
        })
    }
}

impl SearchIndex for FixedIndex {
    fn query(&self, _text: &str, k: usize) -> Result<Vec<IndexHit>, IndexQueryError> {
        Ok(self.hits.iter().take(k).cloned().collect())
    }

    fn snapshot(&self) -> &SnapshotInfo {
        &self.snapshot
    }
}

/// Ordered chunk ids of an outcome
pub fn ids(results: &[docqa::retrieval::RankedResult]) -> Vec<String> {
    results.iter().map(|r| r.chunk.id.to_string()).collect()
}
