//! Search indexes over a corpus snapshot
//!
//! Both indexes are built once from a [`ChunkStore`] and are read-only
//! afterwards. A rebuild produces a new index; nothing is mutated in place.

mod lexical;
mod vector;

pub use lexical::LexicalIndex;
pub use vector::VectorIndex;

use crate::corpus::{Chunk, ChunkStore};
use crate::embedding::EmbeddingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexBuildError {
    #[error("Cannot build an index over an empty corpus")]
    EmptyCorpus,

    #[error("Embedding failed for every chunk: {0}")]
    Embedding(String),

    #[error("Index backend failed: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum IndexQueryError {
    #[error("Query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Query vector has dimension {actual}, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index backend failed: {0}")]
    Backend(String),
}

/// Identity of the corpus snapshot an index was built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Corpus fingerprint (BLAKE3 hex)
    pub snapshot_id: String,
    /// Number of chunks in the corpus
    pub corpus_size: usize,
    /// When the index was built
    pub built_at: DateTime<Utc>,
}

impl SnapshotInfo {
    pub fn capture(store: &ChunkStore) -> Self {
        Self {
            snapshot_id: store.fingerprint(),
            corpus_size: store.len(),
            built_at: Utc::now(),
        }
    }

    /// Whether `store` is a different corpus than the one this snapshot describes
    pub fn is_stale_for(&self, store: &ChunkStore) -> bool {
        self.corpus_size != store.len() || self.snapshot_id != store.fingerprint()
    }

    /// Short form of the snapshot id for logs
    pub fn short_id(&self) -> &str {
        &self.snapshot_id[..self.snapshot_id.len().min(12)]
    }
}

/// One scored chunk returned by a single index
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub chunk: Arc<Chunk>,
    /// Position of the chunk in the corpus snapshot
    pub ordinal: usize,
    pub score: f32,
}

/// Common surface of the vector and lexical indexes
pub trait SearchIndex: Send + Sync {
    /// Top-`k` hits by descending score, ties by ascending ordinal
    fn query(&self, text: &str, k: usize) -> Result<Vec<IndexHit>, IndexQueryError>;

    fn snapshot(&self) -> &SnapshotInfo;

    fn is_stale_for(&self, store: &ChunkStore) -> bool {
        self.snapshot().is_stale_for(store)
    }
}

/// Order hits by descending score, then ascending ordinal
pub(crate) fn sort_hits(hits: &mut [IndexHit]) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.ordinal.cmp(&b.ordinal))
    });
}
