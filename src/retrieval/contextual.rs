//! Conversation-aware retrieval
//!
//! Recent turns are folded into the query by repetition: the current query is
//! repeated once more than the number of turns used, and the i-th oldest of
//! those turns is repeated i times. Repetition raises term frequency in the
//! BM25 query and pulls the query embedding toward the repeated text, so newer
//! turns always weigh at least as much as older ones.

use super::provenance::RetrievalOutcome;
use super::{validate_query, FusionWeights, HybridRetriever, RetrievalError, RetrievalRequest};
use crate::config::RetrievalConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

static INTERROGATIVE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:what\s+(?:is|are)|who\s+(?:is|are)|when\s+(?:did|is)|where\s+(?:is|are)|how\s+(?:does|do)|why\s+(?:did|does|is))\b\s*",
    )
    .expect("Invalid interrogative prefix pattern")
});

/// Bounded FIFO of raw queries, oldest first
#[derive(Debug, Clone)]
pub struct QueryHistory {
    turns: VecDeque<String>,
    capacity: usize,
}

impl QueryHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a query, returning the evicted oldest entry when full
    pub fn push(&mut self, query: impl Into<String>) -> Option<String> {
        let evicted = if self.turns.len() == self.capacity {
            self.turns.pop_front()
        } else {
            None
        };
        self.turns.push_back(query.into());
        evicted
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> + '_ {
        self.turns.iter().map(String::as_str)
    }

    pub fn contains(&self, query: &str) -> bool {
        self.turns.iter().any(|t| t == query)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Retriever for one conversation session
///
/// Owns the session's query history; every turn takes `&mut self`.
pub struct ContextualRetriever {
    retriever: Arc<HybridRetriever>,
    history: QueryHistory,
    expansion_context: usize,
    session_id: Uuid,
}

impl ContextualRetriever {
    pub fn new(retriever: Arc<HybridRetriever>, config: &RetrievalConfig) -> Self {
        Self {
            retriever,
            history: QueryHistory::new(config.history_window),
            expansion_context: config.expansion_context,
            session_id: Uuid::new_v4(),
        }
    }

    /// Retrieve for `query` in the context of earlier turns
    ///
    /// `history` replaces the session's own buffer for this call when given.
    /// The raw query is recorded in the session buffer either way.
    pub async fn retrieve_with_context(
        &mut self,
        query: &str,
        history: Option<&[String]>,
        k: usize,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        self.run(query, history, k, None).await
    }

    /// Retrieve for a full request; an empty request history means the session buffer
    pub async fn retrieve(
        &mut self,
        request: &RetrievalRequest,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        request.validate()?;
        let history = if request.history.is_empty() {
            None
        } else {
            Some(request.history.as_slice())
        };
        self.run(&request.query, history, request.k, request.weights)
            .await
    }

    async fn run(
        &mut self,
        query: &str,
        history: Option<&[String]>,
        k: usize,
        weights: Option<FusionWeights>,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        validate_query(query, k)?;

        let expanded = self.expand_query(query, history);
        tracing::debug!(
            session = %self.session_id,
            original = query,
            expanded = %expanded,
            "Expanded contextual query"
        );

        self.history.push(query.trim());

        self.retriever.retrieve(&expanded, k, weights).await
    }

    /// Rewrite `query` and fold in recent turns
    pub fn expand_query(&self, query: &str, history: Option<&[String]>) -> String {
        let rewritten = rewrite_query(query);

        let turns: Vec<String> = match history {
            Some(turns) => recent_turns(turns.iter().map(String::as_str), self.expansion_context),
            None => recent_turns(self.history.iter(), self.expansion_context),
        };

        let mut parts: Vec<&str> = Vec::new();
        parts.extend(std::iter::repeat(rewritten.as_str()).take(turns.len() + 1));
        for (i, turn) in turns.iter().enumerate() {
            parts.extend(std::iter::repeat(turn.as_str()).take(i + 1));
        }

        parts.join(" ")
    }

    pub fn history(&self) -> &QueryHistory {
        &self.history
    }

    /// Start a new conversation
    pub fn reset(&mut self) {
        self.history.clear();
        self.session_id = Uuid::new_v4();
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn retriever(&self) -> &Arc<HybridRetriever> {
        &self.retriever
    }
}

/// Strip a leading interrogative phrase such as "what is" or "how does"
///
/// The trimmed query is returned unchanged when nothing would remain.
pub fn rewrite_query(query: &str) -> String {
    let trimmed = query.trim();
    let stripped = INTERROGATIVE_PREFIX.replace(trimmed, "");
    let stripped = stripped.trim();

    if stripped.is_empty() {
        trimmed.to_string()
    } else {
        stripped.to_string()
    }
}

/// Last `count` non-blank turns, rewritten, oldest first
fn recent_turns<'a>(turns: impl DoubleEndedIterator<Item = &'a str>, count: usize) -> Vec<String> {
    let mut recent: Vec<String> = turns
        .rev()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .take(count)
        .map(rewrite_query)
        .collect();
    recent.reverse();
    recent
}
