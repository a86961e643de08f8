//! Ranked results and the signals that produced them

use super::citation::SourceCitation;
use crate::corpus::Chunk;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which signal(s) returned a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    VectorOnly,
    LexicalOnly,
    Both,
}

impl Provenance {
    pub(crate) fn from_signals(semantic: bool, lexical: bool) -> Option<Self> {
        match (semantic, lexical) {
            (true, true) => Some(Self::Both),
            (true, false) => Some(Self::VectorOnly),
            (false, true) => Some(Self::LexicalOnly),
            (false, false) => None,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::VectorOnly => "vector-only",
            Self::LexicalOnly => "lexical-only",
            Self::Both => "both",
        };
        f.write_str(label)
    }
}

/// Signals a retrieval call actually used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetrievalMode {
    Hybrid,
    VectorOnly,
    LexicalOnly,
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Hybrid => "hybrid",
            Self::VectorOnly => "vector-only",
            Self::LexicalOnly => "lexical-only",
        };
        f.write_str(label)
    }
}

/// A chunk with its fused score and rank for one retrieval call
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub chunk: Arc<Chunk>,

    /// Position of the chunk in the corpus snapshot
    pub ordinal: usize,

    /// Fused relevance score in [0, 1]
    pub score: f32,

    /// Normalized vector similarity, `None` when the vector signal missed the chunk
    pub semantic_score: Option<f32>,

    /// Normalized BM25 score, `None` when the lexical signal missed the chunk
    pub lexical_score: Option<f32>,

    /// 1-based position in the result list
    pub rank: usize,

    pub provenance: Provenance,
}

impl RankedResult {
    pub fn citation(&self) -> SourceCitation {
        SourceCitation::from_result(self)
    }
}

/// Ranked results together with the mode that produced them
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalOutcome {
    pub results: Vec<RankedResult>,
    pub mode: RetrievalMode,
}

impl RetrievalOutcome {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn citations(&self) -> Vec<SourceCitation> {
        self.results.iter().map(RankedResult::citation).collect()
    }
}
