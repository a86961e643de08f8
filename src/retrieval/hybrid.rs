//! Hybrid search combining semantic and keyword search

use super::fusion::{fuse, FusionWeights};
use super::provenance::{RetrievalMode, RetrievalOutcome};
use super::telemetry::{RetrievalEvent, RetrievalTelemetry, TracingTelemetry};
use super::{validate_query, RetrievalError, SignalFailure};
use crate::config::{Config, IndexingConfig};
use crate::corpus::ChunkStore;
use crate::embedding::EmbeddingProvider;
use crate::index::{
    IndexBuildError, IndexHit, LexicalIndex, SearchIndex, SnapshotInfo, VectorIndex,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

/// Both signal indexes for one corpus snapshot
#[derive(Default)]
struct IndexSet {
    vector: Option<Arc<dyn SearchIndex>>,
    lexical: Option<Arc<dyn SearchIndex>>,
    snapshot: Option<SnapshotInfo>,
}

/// Result of [`HybridRetriever::rebuild`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// New indexes were swapped in; a `false` flag marks a signal that failed to build
    Rebuilt { vector: bool, lexical: bool },
    /// The corpus matches the current snapshot
    Unchanged,
}

/// Retriever state summary
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalStats {
    pub snapshot: Option<SnapshotInfo>,
    pub has_vector: bool,
    pub has_lexical: bool,
    pub default_k: usize,
    pub overfetch_factor: usize,
    pub weights: FusionWeights,
}

/// Hybrid retriever over a swappable pair of indexes
///
/// Calls clone the current `Arc<IndexSet>` and never hold the lock while
/// searching, so a rebuild swaps in new indexes without disturbing in-flight
/// calls.
pub struct HybridRetriever {
    indexes: RwLock<Arc<IndexSet>>,
    /// Serializes rebuilds so an older corpus never lands after a newer one
    rebuilding: Mutex<()>,
    weights: FusionWeights,
    default_k: usize,
    overfetch_factor: usize,
    indexing: IndexingConfig,
    batch_size: usize,
    telemetry: Arc<dyn RetrievalTelemetry>,
}

impl HybridRetriever {
    /// Create a retriever with no indexes installed
    pub fn new(config: &Config) -> Result<Self, RetrievalError> {
        let weights = FusionWeights::new(
            config.retrieval.semantic_weight,
            config.retrieval.keyword_weight,
        )?;

        Ok(Self {
            indexes: RwLock::new(Arc::new(IndexSet::default())),
            rebuilding: Mutex::new(()),
            weights,
            default_k: config.retrieval.default_k.max(1),
            overfetch_factor: config.retrieval.overfetch_factor.max(1),
            indexing: config.indexing.clone(),
            batch_size: config.embedding.batch_size,
            telemetry: Arc::new(TracingTelemetry),
        })
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn RetrievalTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn weights(&self) -> FusionWeights {
        self.weights
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    /// Swap in prebuilt indexes
    ///
    /// Both indexes must describe the same corpus snapshot.
    pub async fn install(
        &self,
        vector: Option<Arc<dyn SearchIndex>>,
        lexical: Option<Arc<dyn SearchIndex>>,
    ) -> Result<(), RetrievalError> {
        let snapshot = match (&vector, &lexical) {
            (Some(v), Some(l)) => {
                if v.snapshot().snapshot_id != l.snapshot().snapshot_id {
                    return Err(RetrievalError::InvalidArgument(format!(
                        "vector index snapshot {} does not match lexical index snapshot {}",
                        v.snapshot().short_id(),
                        l.snapshot().short_id()
                    )));
                }
                Some(l.snapshot().clone())
            }
            (Some(index), None) | (None, Some(index)) => Some(index.snapshot().clone()),
            (None, None) => None,
        };

        self.swap(IndexSet {
            vector,
            lexical,
            snapshot,
        })
        .await;
        Ok(())
    }

    /// Build both indexes for `store` and swap them in
    ///
    /// A store whose fingerprint matches the current snapshot is left alone.
    /// A signal that fails to build is left out; both failing leaves the
    /// current indexes in place. Concurrent rebuilds run one at a time in
    /// the order they acquire the rebuild lock.
    pub async fn rebuild(
        &self,
        store: &ChunkStore,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<RebuildOutcome, RetrievalError> {
        let _rebuilding = self.rebuilding.lock().await;

        if let Some(current) = self.snapshot().await {
            if !current.is_stale_for(store) {
                tracing::info!(
                    "Corpus unchanged (snapshot {}), skipping rebuild",
                    current.short_id()
                );
                return Ok(RebuildOutcome::Unchanged);
            }
        }

        let start = Instant::now();

        let vector_store = store.clone();
        let indexing = self.indexing.clone();
        let batch_size = self.batch_size;
        let vector_task = tokio::task::spawn_blocking(move || {
            VectorIndex::build(&vector_store, provider, &indexing, batch_size)
        });

        let lexical_store = store.clone();
        let lexical_task =
            tokio::task::spawn_blocking(move || LexicalIndex::build(&lexical_store));

        let (vector, lexical) = tokio::join!(vector_task, lexical_task);
        let vector = vector.unwrap_or_else(|e| Err(IndexBuildError::Backend(e.to_string())));
        let lexical = lexical.unwrap_or_else(|e| Err(IndexBuildError::Backend(e.to_string())));

        let (vector, lexical) = match (vector, lexical) {
            (Err(vector), Err(lexical)) => {
                tracing::error!("Both indexes failed to build: {}; {}", vector, lexical);
                return Err(RetrievalError::Build { vector, lexical });
            }
            (vector, lexical) => (vector, lexical),
        };

        let vector: Option<Arc<dyn SearchIndex>> = match vector {
            Ok(index) => Some(Arc::new(index) as Arc<dyn SearchIndex>),
            Err(e) => {
                tracing::warn!("Vector index unavailable, serving lexical only: {}", e);
                None
            }
        };
        let lexical: Option<Arc<dyn SearchIndex>> = match lexical {
            Ok(index) => Some(Arc::new(index) as Arc<dyn SearchIndex>),
            Err(e) => {
                tracing::warn!("Lexical index unavailable, serving vector only: {}", e);
                None
            }
        };

        let outcome = RebuildOutcome::Rebuilt {
            vector: vector.is_some(),
            lexical: lexical.is_some(),
        };

        let snapshot = SnapshotInfo::capture(store);
        tracing::info!(
            "Rebuilt indexes for snapshot {} ({} chunks) in {}ms",
            snapshot.short_id(),
            snapshot.corpus_size,
            start.elapsed().as_millis()
        );

        self.swap(IndexSet {
            vector,
            lexical,
            snapshot: Some(snapshot),
        })
        .await;

        Ok(outcome)
    }

    /// Fused top-`k` results from both signals
    ///
    /// Falls back to whichever signal survives; fails only when neither does.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        weights: Option<FusionWeights>,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        validate_query(query, k)?;
        let weights = match weights {
            Some(w) => FusionWeights::new(w.semantic, w.keyword)?,
            None => self.weights,
        };

        let start = Instant::now();
        let indexes = self.current().await;
        let mut candidates = k.max(self.overfetch_factor.saturating_mul(k));
        if let Some(snapshot) = &indexes.snapshot {
            candidates = candidates.min(snapshot.corpus_size.max(1));
        }

        let (vector, lexical) = tokio::join!(
            search_signal(indexes.vector.clone(), query, candidates),
            search_signal(indexes.lexical.clone(), query, candidates),
        );

        let (mode, results, vector_error, lexical_error, vector_count, lexical_count) =
            match (vector, lexical) {
                (Ok(v), Ok(l)) => (
                    RetrievalMode::Hybrid,
                    fuse(&v, &l, weights, k),
                    None,
                    None,
                    v.len(),
                    l.len(),
                ),
                (Ok(v), Err(e)) => {
                    tracing::warn!("Lexical signal failed, falling back to vector only: {}", e);
                    (
                        RetrievalMode::VectorOnly,
                        fuse(&v, &[], FusionWeights::semantic_only(), k),
                        None,
                        Some(e.to_string()),
                        v.len(),
                        0,
                    )
                }
                (Err(e), Ok(l)) => {
                    tracing::warn!("Vector signal failed, falling back to lexical only: {}", e);
                    (
                        RetrievalMode::LexicalOnly,
                        fuse(&[], &l, FusionWeights::keyword_only(), k),
                        Some(e.to_string()),
                        None,
                        0,
                        l.len(),
                    )
                }
                (Err(vector), Err(lexical)) => {
                    tracing::error!("No retriever available: {}; {}", vector, lexical);
                    self.telemetry.record(&RetrievalEvent {
                        elapsed: start.elapsed(),
                        mode: None,
                        result_count: 0,
                        vector_candidates: 0,
                        lexical_candidates: 0,
                        vector_error: Some(vector.to_string()),
                        lexical_error: Some(lexical.to_string()),
                    });
                    return Err(RetrievalError::Unavailable { vector, lexical });
                }
            };

        self.telemetry.record(&RetrievalEvent {
            elapsed: start.elapsed(),
            mode: Some(mode),
            result_count: results.len(),
            vector_candidates: vector_count,
            lexical_candidates: lexical_count,
            vector_error,
            lexical_error,
        });

        Ok(RetrievalOutcome { results, mode })
    }

    /// Top-`k` results from the vector signal alone
    pub async fn retrieve_vector_only(
        &self,
        query: &str,
        k: usize,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        self.retrieve_single(query, k, RetrievalMode::VectorOnly)
            .await
    }

    /// Top-`k` results from the lexical signal alone
    pub async fn retrieve_lexical_only(
        &self,
        query: &str,
        k: usize,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        self.retrieve_single(query, k, RetrievalMode::LexicalOnly)
            .await
    }

    async fn retrieve_single(
        &self,
        query: &str,
        k: usize,
        mode: RetrievalMode,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        validate_query(query, k)?;

        let start = Instant::now();
        let indexes = self.current().await;
        let index = match mode {
            RetrievalMode::VectorOnly => indexes.vector.clone(),
            RetrievalMode::LexicalOnly => indexes.lexical.clone(),
            RetrievalMode::Hybrid => {
                return Err(RetrievalError::InvalidArgument(
                    "hybrid is not a single-signal mode".to_string(),
                ))
            }
        };

        let hits = match search_signal(index, query, k).await {
            Ok(hits) => hits,
            Err(cause) => {
                let message = Some(cause.to_string());
                let (vector_error, lexical_error) = match mode {
                    RetrievalMode::VectorOnly => (message, None),
                    _ => (None, message),
                };
                self.telemetry.record(&RetrievalEvent {
                    elapsed: start.elapsed(),
                    mode: None,
                    result_count: 0,
                    vector_candidates: 0,
                    lexical_candidates: 0,
                    vector_error,
                    lexical_error,
                });
                return Err(RetrievalError::SignalUnavailable { mode, cause });
            }
        };

        let (results, vector_candidates, lexical_candidates) = match mode {
            RetrievalMode::VectorOnly => (
                fuse(&hits, &[], FusionWeights::semantic_only(), k),
                hits.len(),
                0,
            ),
            _ => (
                fuse(&[], &hits, FusionWeights::keyword_only(), k),
                0,
                hits.len(),
            ),
        };

        self.telemetry.record(&RetrievalEvent {
            elapsed: start.elapsed(),
            mode: Some(mode),
            result_count: results.len(),
            vector_candidates,
            lexical_candidates,
            vector_error: None,
            lexical_error: None,
        });

        Ok(RetrievalOutcome { results, mode })
    }

    /// Snapshot the current indexes were built from
    pub async fn snapshot(&self) -> Option<SnapshotInfo> {
        self.current().await.snapshot.clone()
    }

    /// Whether `store` differs from the indexed snapshot (true when nothing is indexed)
    pub async fn is_stale_for(&self, store: &ChunkStore) -> bool {
        match self.snapshot().await {
            Some(snapshot) => snapshot.is_stale_for(store),
            None => true,
        }
    }

    pub async fn stats(&self) -> RetrievalStats {
        let indexes = self.current().await;
        RetrievalStats {
            snapshot: indexes.snapshot.clone(),
            has_vector: indexes.vector.is_some(),
            has_lexical: indexes.lexical.is_some(),
            default_k: self.default_k,
            overfetch_factor: self.overfetch_factor,
            weights: self.weights,
        }
    }

    async fn current(&self) -> Arc<IndexSet> {
        Arc::clone(&*self.indexes.read().await)
    }

    async fn swap(&self, set: IndexSet) {
        *self.indexes.write().await = Arc::new(set);
    }
}

/// Query one signal on the blocking pool
async fn search_signal(
    index: Option<Arc<dyn SearchIndex>>,
    query: &str,
    k: usize,
) -> Result<Vec<IndexHit>, SignalFailure> {
    let index = index.ok_or(SignalFailure::NotBuilt)?;
    let query = query.to_string();

    let hits = tokio::task::spawn_blocking(move || index.query(&query, k))
        .await
        .map_err(|e| SignalFailure::Worker(e.to_string()))??;

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Chunk;
    use crate::embedding::HashingProvider;
    use crate::retrieval::{InMemoryTelemetry, Provenance};

    fn store(texts: &[&str]) -> ChunkStore {
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk::new(format!("c{}", i), *t, "doc.txt"))
            .collect();
        ChunkStore::new(chunks).unwrap()
    }

    fn retriever() -> HybridRetriever {
        HybridRetriever::new(&Config::default()).unwrap()
    }

    fn provider() -> Arc<dyn EmbeddingProvider> {
        Arc::new(HashingProvider::new(128).unwrap())
    }

    #[tokio::test]
    async fn test_unbuilt_retriever_is_unavailable() {
        let retriever = retriever();
        let result = retriever.retrieve("refund", 3, None).await;
        assert!(matches!(result, Err(RetrievalError::Unavailable { .. })));

        let result = retriever.retrieve_lexical_only("refund", 3).await;
        assert!(matches!(
            result,
            Err(RetrievalError::SignalUnavailable {
                mode: RetrievalMode::LexicalOnly,
                cause: SignalFailure::NotBuilt
            })
        ));
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let retriever = retriever();
        assert!(matches!(
            retriever.retrieve("refund", 0, None).await,
            Err(RetrievalError::InvalidArgument(_))
        ));
        assert!(matches!(
            retriever.retrieve("  ", 2, None).await,
            Err(RetrievalError::InvalidArgument(_))
        ));
        assert!(matches!(
            retriever
                .retrieve("refund", 2, Some(FusionWeights { semantic: 2.0, keyword: 0.1 }))
                .await,
            Err(RetrievalError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_rebuild_then_retrieve() {
        let telemetry = Arc::new(InMemoryTelemetry::new());
        let retriever = retriever().with_telemetry(telemetry.clone());
        let corpus = store(&[
            "refund policy explained in section 3",
            "shipping times vary by region",
            "refunds are processed within 5 business days",
        ]);

        let outcome = retriever.rebuild(&corpus, provider()).await.unwrap();
        assert_eq!(
            outcome,
            RebuildOutcome::Rebuilt {
                vector: true,
                lexical: true
            }
        );

        let outcome = retriever.retrieve("refund timeline", 3, None).await.unwrap();
        assert_eq!(outcome.mode, RetrievalMode::Hybrid);
        assert_eq!(outcome.len(), 3);

        let event = telemetry.last().unwrap();
        assert_eq!(event.mode, Some(RetrievalMode::Hybrid));
        assert_eq!(event.result_count, 3);
        assert_eq!(event.vector_candidates, 3);
        assert_eq!(event.lexical_candidates, 2);
    }

    #[tokio::test]
    async fn test_rebuild_unchanged_corpus_is_noop() {
        let retriever = retriever();
        let corpus = store(&["alpha", "beta"]);

        retriever.rebuild(&corpus, provider()).await.unwrap();
        let before = retriever.snapshot().await.unwrap();

        let outcome = retriever.rebuild(&corpus.clone(), provider()).await.unwrap();
        assert_eq!(outcome, RebuildOutcome::Unchanged);
        assert_eq!(retriever.snapshot().await.unwrap().built_at, before.built_at);
    }

    #[tokio::test]
    async fn test_concurrent_rebuilds_are_serialized() {
        let retriever = retriever();
        let corpus = store(&["alpha", "beta", "gamma"]);

        let (first, second) = tokio::join!(
            retriever.rebuild(&corpus, provider()),
            retriever.rebuild(&corpus, provider()),
        );
        let mut outcomes = vec![first.unwrap(), second.unwrap()];
        outcomes.retain(|o| *o == RebuildOutcome::Unchanged);
        assert_eq!(outcomes.len(), 1);
        assert!(!retriever.is_stale_for(&corpus).await);
    }

    #[tokio::test]
    async fn test_rebuild_empty_corpus_fails() {
        let retriever = retriever();
        let result = retriever.rebuild(&ChunkStore::default(), provider()).await;
        assert!(matches!(
            result,
            Err(RetrievalError::Build {
                vector: IndexBuildError::EmptyCorpus,
                lexical: IndexBuildError::EmptyCorpus
            })
        ));
        assert!(retriever.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_lexical_only_install() {
        let retriever = retriever();
        let corpus = store(&["alpha beta", "gamma"]);
        let lexical: Arc<dyn SearchIndex> = Arc::new(LexicalIndex::build(&corpus).unwrap());
        retriever.install(None, Some(lexical)).await.unwrap();

        let outcome = retriever.retrieve("alpha", 5, None).await.unwrap();
        assert_eq!(outcome.mode, RetrievalMode::LexicalOnly);
        assert_eq!(outcome.len(), 1);
        assert_eq!(outcome.results[0].provenance, Provenance::LexicalOnly);
        assert!((outcome.results[0].score - 1.0).abs() < 1e-6);

        let stats = retriever.stats().await;
        assert!(!stats.has_vector);
        assert!(stats.has_lexical);
        assert_eq!(stats.default_k, 5);
    }

    #[tokio::test]
    async fn test_install_rejects_mismatched_snapshots() {
        let retriever = retriever();
        let vector = VectorIndex::build(
            &store(&["alpha"]),
            provider(),
            &IndexingConfig::default(),
            8,
        )
        .unwrap();
        let lexical = LexicalIndex::build(&store(&["beta"])).unwrap();
        let vector: Arc<dyn SearchIndex> = Arc::new(vector);
        let lexical: Arc<dyn SearchIndex> = Arc::new(lexical);

        let result = retriever.install(Some(vector), Some(lexical)).await;
        assert!(matches!(result, Err(RetrievalError::InvalidArgument(_))));
    }
}
