/// Embedding-space nearest-neighbour index
use super::{sort_hits, IndexBuildError, IndexHit, IndexQueryError, SearchIndex, SnapshotInfo};
use crate::config::IndexingConfig;
use crate::corpus::{Chunk, ChunkStore};
use crate::embedding::{BatchEmbedder, EmbeddingProvider};
use hnsw_rs::prelude::*;
use std::fmt;
use std::sync::Arc;

/// hnsw_rs caps the number of layers at 16
const HNSW_MAX_LAYER: usize = 16;

/// HNSW candidates fetched per requested result before exact re-scoring
const CANDIDATE_FACTOR: usize = 4;

struct VectorEntry {
    ordinal: usize,
    chunk: Arc<Chunk>,
    /// Unit-normalised embedding
    vector: Vec<f32>,
}

/// Vector index over one corpus snapshot
///
/// Small corpora are scanned exactly. Above `exact_search_threshold` an HNSW
/// graph proposes candidates which are then re-scored with exact cosine
/// similarity, so scores and tie order never depend on graph traversal.
pub struct VectorIndex {
    entries: Vec<VectorEntry>,
    graph: Option<Hnsw<'static, f32, DistCosine>>,
    provider: Arc<dyn EmbeddingProvider>,
    ef_search: usize,
    snapshot: SnapshotInfo,
}

impl VectorIndex {
    /// Embed every chunk and build the index
    ///
    /// Chunks whose embedding batch fails are left out; the build only fails
    /// when the corpus is empty or no chunk could be embedded.
    pub fn build(
        store: &ChunkStore,
        provider: Arc<dyn EmbeddingProvider>,
        config: &IndexingConfig,
        batch_size: usize,
    ) -> Result<Self, IndexBuildError> {
        if store.is_empty() {
            return Err(IndexBuildError::EmptyCorpus);
        }

        let snapshot = SnapshotInfo::capture(store);
        tracing::info!(
            "Building vector index: {} chunks, snapshot {}",
            store.len(),
            snapshot.short_id()
        );

        let texts: Vec<String> = store.iter().map(|c| c.text.clone()).collect();
        let batch = BatchEmbedder::new(Arc::clone(&provider), batch_size).embed_all(&texts);

        if batch.processed == 0 {
            return Err(IndexBuildError::Embedding(
                batch
                    .last_error
                    .unwrap_or_else(|| "no embeddings produced".to_string()),
            ));
        }

        let entries: Vec<VectorEntry> = store
            .iter()
            .zip(batch.embeddings)
            .enumerate()
            .filter_map(|(ordinal, (chunk, embedding))| {
                embedding.map(|vector| VectorEntry {
                    ordinal,
                    chunk: Arc::clone(chunk),
                    vector: normalize(vector),
                })
            })
            .collect();

        if batch.failed > 0 {
            tracing::warn!(
                "Vector index built without {} of {} chunks",
                batch.failed,
                store.len()
            );
        }

        let graph = if entries.len() > config.exact_search_threshold {
            Some(build_graph(&entries, config))
        } else {
            None
        };

        Ok(Self {
            entries,
            graph,
            provider,
            ef_search: config.hnsw_ef_search,
            snapshot,
        })
    }

    /// Number of embedded chunks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    /// Whether queries go through the HNSW graph
    pub fn is_approximate(&self) -> bool {
        self.graph.is_some()
    }

    fn exact_scan(&self, query: &[f32], k: usize) -> Vec<IndexHit> {
        let mut hits: Vec<IndexHit> = self
            .entries
            .iter()
            .map(|entry| self.hit(entry, query))
            .collect();
        sort_hits(&mut hits);
        hits.truncate(k);
        hits
    }

    fn graph_scan(
        &self,
        graph: &Hnsw<'static, f32, DistCosine>,
        query: &[f32],
        k: usize,
    ) -> Vec<IndexHit> {
        let candidates = k.saturating_mul(CANDIDATE_FACTOR).min(self.entries.len());
        let ef = self.ef_search.max(candidates);

        let mut hits: Vec<IndexHit> = graph
            .search(query, candidates, ef)
            .into_iter()
            .filter_map(|neighbour| self.entries.get(neighbour.d_id))
            .map(|entry| self.hit(entry, query))
            .collect();
        sort_hits(&mut hits);
        hits.dedup_by_key(|h| h.ordinal);
        hits.truncate(k);
        hits
    }

    fn hit(&self, entry: &VectorEntry, query: &[f32]) -> IndexHit {
        IndexHit {
            chunk: Arc::clone(&entry.chunk),
            ordinal: entry.ordinal,
            score: dot(&entry.vector, query),
        }
    }
}

impl SearchIndex for VectorIndex {
    fn query(&self, text: &str, k: usize) -> Result<Vec<IndexHit>, IndexQueryError> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.provider.embed(text)?;
        if embedding.len() != self.dimension() {
            return Err(IndexQueryError::DimensionMismatch {
                expected: self.dimension(),
                actual: embedding.len(),
            });
        }
        let query = normalize(embedding);

        let hits = match &self.graph {
            Some(graph) => self.graph_scan(graph, &query, k),
            None => self.exact_scan(&query, k),
        };

        tracing::debug!("Vector query returned {} hits", hits.len());
        Ok(hits)
    }

    fn snapshot(&self) -> &SnapshotInfo {
        &self.snapshot
    }
}

impl fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorIndex")
            .field("entries", &self.entries.len())
            .field("approximate", &self.graph.is_some())
            .field("model", &self.provider.model_name())
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

fn build_graph(entries: &[VectorEntry], config: &IndexingConfig) -> Hnsw<'static, f32, DistCosine> {
    tracing::debug!(
        "Building HNSW graph over {} vectors (M={}, ef_construction={})",
        entries.len(),
        config.hnsw_m,
        config.hnsw_ef_construction
    );

    let graph = Hnsw::<f32, DistCosine>::new(
        config.hnsw_m,
        entries.len(),
        HNSW_MAX_LAYER,
        config.hnsw_ef_construction,
        DistCosine,
    );

    // Graph ids are positions in `entries`
    for (id, entry) in entries.iter().enumerate() {
        graph.insert((&entry.vector, id));
    }

    graph
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
