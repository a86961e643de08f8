//! Hybrid retrieval
//!
//! Combines vector similarity and BM25 keyword relevance into one ranked list
//! with weighted min-max fusion. Either signal may be missing or failing; the
//! other one keeps answering until both are gone.

mod citation;
mod contextual;
mod fusion;
mod hybrid;
mod provenance;
mod telemetry;

pub use citation::{format_superscript, replace_bracket_citations, SourceCitation};
pub use contextual::{rewrite_query, ContextualRetriever, QueryHistory};
pub use fusion::{fuse, FusionError, FusionWeights};
pub use hybrid::{HybridRetriever, RebuildOutcome, RetrievalStats};
pub use provenance::{Provenance, RankedResult, RetrievalMode, RetrievalOutcome};
pub use telemetry::{InMemoryTelemetry, RetrievalEvent, RetrievalTelemetry, TracingTelemetry};

use crate::index::{IndexBuildError, IndexQueryError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

pub const DEFAULT_HISTORY_WINDOW: usize = 10;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No retriever available (vector: {vector}; lexical: {lexical})")]
    Unavailable {
        vector: SignalFailure,
        lexical: SignalFailure,
    },

    #[error("{mode} retrieval unavailable: {cause}")]
    SignalUnavailable {
        mode: RetrievalMode,
        cause: SignalFailure,
    },

    #[error("Index build failed (vector: {vector}; lexical: {lexical})")]
    Build {
        vector: IndexBuildError,
        lexical: IndexBuildError,
    },
}

impl From<FusionError> for RetrievalError {
    fn from(e: FusionError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

/// Why a single signal produced no candidates
#[derive(Error, Debug)]
pub enum SignalFailure {
    #[error("index not built")]
    NotBuilt,

    #[error(transparent)]
    Query(#[from] IndexQueryError),

    #[error("worker task failed: {0}")]
    Worker(String),
}

/// A retrieval call with optional conversation context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    pub k: usize,
    /// Previous turns, most recent last; empty means "use the session history"
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default)]
    pub weights: Option<FusionWeights>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, k: usize) -> Self {
        Self {
            query: query.into(),
            k,
            history: Vec::new(),
            weights: None,
        }
    }

    /// Attach history, keeping only the most recent `DEFAULT_HISTORY_WINDOW` turns
    pub fn with_history<I, S>(mut self, history: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut window: VecDeque<String> = VecDeque::with_capacity(DEFAULT_HISTORY_WINDOW);
        for turn in history {
            if window.len() == DEFAULT_HISTORY_WINDOW {
                window.pop_front();
            }
            window.push_back(turn.into());
        }
        self.history = window.into();
        self
    }

    pub fn with_weights(mut self, weights: FusionWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn validate(&self) -> Result<(), RetrievalError> {
        validate_query(&self.query, self.k)?;
        if self.history.len() > DEFAULT_HISTORY_WINDOW {
            return Err(RetrievalError::InvalidArgument(format!(
                "history holds {} turns, at most {} allowed",
                self.history.len(),
                DEFAULT_HISTORY_WINDOW
            )));
        }
        if let Some(weights) = self.weights {
            FusionWeights::new(weights.semantic, weights.keyword)?;
        }
        Ok(())
    }
}

pub(crate) fn validate_query(query: &str, k: usize) -> Result<(), RetrievalError> {
    if k == 0 {
        return Err(RetrievalError::InvalidArgument(
            "k must be at least 1".to_string(),
        ));
    }
    if query.trim().is_empty() {
        return Err(RetrievalError::InvalidArgument(
            "query cannot be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_query() {
        assert!(validate_query("refund", 1).is_ok());
        assert!(matches!(
            validate_query("refund", 0),
            Err(RetrievalError::InvalidArgument(_))
        ));
        assert!(matches!(
            validate_query("   ", 3),
            Err(RetrievalError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_request_history_is_capped() {
        let turns: Vec<String> = (0..12).map(|i| format!("turn {}", i)).collect();
        let request = RetrievalRequest::new("refund", 3).with_history(turns);

        assert_eq!(request.history.len(), DEFAULT_HISTORY_WINDOW);
        assert_eq!(request.history[0], "turn 2");
        assert_eq!(request.history[9], "turn 11");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_request_validation() {
        let request = RetrievalRequest::new("refund", 2).with_weights(FusionWeights {
            semantic: 0.0,
            keyword: 0.0,
        });
        assert!(matches!(
            request.validate(),
            Err(RetrievalError::InvalidArgument(_))
        ));

        let mut request = RetrievalRequest::new("refund", 2);
        request.history = vec!["x".to_string(); 11];
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_error_messages() {
        let error = RetrievalError::Unavailable {
            vector: SignalFailure::NotBuilt,
            lexical: SignalFailure::Worker("panicked".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "No retriever available (vector: index not built; lexical: worker task failed: panicked)"
        );
    }
}
