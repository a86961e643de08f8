//! Chunk corpus
//!
//! A [`ChunkStore`] is one corpus snapshot: the ordered set of chunks that both
//! indexes are built from. Chunk order is significant, a chunk's position is its
//! ordinal and serves as the final tie-breaker when ranking.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Chunk '{id}' has empty text")]
    EmptyText { id: String },

    #[error("Duplicate chunk id: {id}")]
    DuplicateId { id: String },

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("Invalid chunk record on line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
}

/// Unique chunk identifier within a corpus snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChunkId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ChunkId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Scalar metadata value attached to a chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A bounded span of text from a source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique id within the corpus snapshot
    pub id: ChunkId,

    /// Raw text content (never empty)
    pub text: String,

    /// Source document identifier, usually a path
    pub source: String,

    /// Page number in the source document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Character offsets (start, end) in the source document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offsets: Option<(usize, usize)>,

    /// Arbitrary scalar metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl Chunk {
    pub fn new(id: impl Into<ChunkId>, text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source: source.into(),
            page: None,
            offsets: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_offsets(mut self, start: usize, end: usize) -> Self {
        self.offsets = Some((start, end));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Get a short preview of the text (first N characters)
    pub fn snippet(&self, max_chars: usize) -> String {
        match self.text.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => format!("{}...", self.text[..byte_idx].trim_end()),
            None => self.text.clone(),
        }
    }
}

/// Ordered, validated corpus snapshot
#[derive(Debug, Clone, Default)]
pub struct ChunkStore {
    chunks: Vec<Arc<Chunk>>,
}

impl ChunkStore {
    /// Create a store, rejecting blank chunks and duplicate ids
    pub fn new(chunks: Vec<Chunk>) -> Result<Self, CorpusError> {
        let mut seen: HashSet<ChunkId> = HashSet::with_capacity(chunks.len());

        for chunk in &chunks {
            if chunk.text.trim().is_empty() {
                return Err(CorpusError::EmptyText {
                    id: chunk.id.to_string(),
                });
            }
            if !seen.insert(chunk.id.clone()) {
                return Err(CorpusError::DuplicateId {
                    id: chunk.id.to_string(),
                });
            }
        }

        Ok(Self {
            chunks: chunks.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunk at the given ordinal
    pub fn get(&self, ordinal: usize) -> Option<&Arc<Chunk>> {
        self.chunks.get(ordinal)
    }

    /// Ordinal of the chunk with the given id
    pub fn position(&self, id: &ChunkId) -> Option<usize> {
        self.chunks.iter().position(|c| &c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Chunk>> {
        self.chunks.iter()
    }

    /// Content fingerprint identifying this snapshot
    ///
    /// BLAKE3 over every field of every chunk in order. Variable-length fields
    /// are length-prefixed so that no two distinct corpora hash the same input.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();

        for chunk in &self.chunks {
            for field in [chunk.id.as_str(), &chunk.text, &chunk.source] {
                hash_str(&mut hasher, field);
            }
            match chunk.page {
                Some(page) => {
                    hasher.update(&[1]);
                    hasher.update(&page.to_le_bytes());
                }
                None => {
                    hasher.update(&[0]);
                }
            }
            match chunk.offsets {
                Some((start, end)) => {
                    hasher.update(&[1]);
                    hasher.update(&(start as u64).to_le_bytes());
                    hasher.update(&(end as u64).to_le_bytes());
                }
                None => {
                    hasher.update(&[0]);
                }
            }

            hasher.update(&(chunk.metadata.len() as u64).to_le_bytes());
            for (key, value) in &chunk.metadata {
                hash_str(&mut hasher, key);
                match value {
                    MetadataValue::Bool(b) => {
                        hasher.update(&[0, *b as u8]);
                    }
                    MetadataValue::Int(i) => {
                        hasher.update(&[1]);
                        hasher.update(&i.to_le_bytes());
                    }
                    MetadataValue::Float(f) => {
                        hasher.update(&[2]);
                        hasher.update(&f.to_bits().to_le_bytes());
                    }
                    MetadataValue::Text(t) => {
                        hasher.update(&[3]);
                        hash_str(&mut hasher, t);
                    }
                }
            }
        }

        hasher.finalize().to_hex().to_string()
    }

    /// Load chunks from a JSON Lines file (one chunk per line)
    pub fn load_jsonl(path: &Path) -> Result<Self, CorpusError> {
        let file = std::fs::File::open(path).map_err(|e| CorpusError::Io {
            source: e,
            context: format!("Failed to open corpus file: {:?}", path),
        })?;

        let mut chunks = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| CorpusError::Io {
                source: e,
                context: format!("Failed to read corpus file: {:?}", path),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let chunk: Chunk = serde_json::from_str(&line).map_err(|e| CorpusError::Parse {
                line: idx + 1,
                source: e,
            })?;
            chunks.push(chunk);
        }

        tracing::debug!("Loaded {} chunks from {:?}", chunks.len(), path);

        Self::new(chunks)
    }

    /// Write chunks to a JSON Lines file
    pub fn save_jsonl(&self, path: &Path) -> Result<(), CorpusError> {
        let io_err = |e: std::io::Error| CorpusError::Io {
            source: e,
            context: format!("Failed to write corpus file: {:?}", path),
        };

        let file = std::fs::File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);

        for (idx, chunk) in self.chunks.iter().enumerate() {
            let line = serde_json::to_string(chunk.as_ref()).map_err(|e| CorpusError::Parse {
                line: idx + 1,
                source: e,
            })?;
            writeln!(writer, "{}", line).map_err(io_err)?;
        }

        writer.flush().map_err(io_err)
    }
}

fn hash_str(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}
