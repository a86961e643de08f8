mod batch;
mod hashing;
/// Embedding generation
///
/// Architecture:
/// - EmbeddingProvider trait for abstraction over embedding backends
/// - FastEmbedProvider for local neural embeddings (all-MiniLM-L6-v2, 384-dim)
/// - HashingProvider for offline, download-free feature-hashing embeddings
/// - EmbedderRegistry as the explicit, process-scoped client cache
/// - BatchEmbedder for fault-tolerant batched generation during index builds
mod provider;
mod registry;

pub use batch::{BatchEmbedder, BatchResult};
pub use hashing::HashingProvider;
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use registry::{EmbedderKey, EmbedderRegistry};
