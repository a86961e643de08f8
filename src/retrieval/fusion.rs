//! Weighted score fusion of the vector and lexical signals

use super::provenance::{Provenance, RankedResult};
use crate::corpus::Chunk;
use crate::index::IndexHit;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;

/// Score spans at or below this are treated as all-equal
const SCORE_EPSILON: f32 = 1e-6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    #[error("{name} weight must be within [0, 1], got {value}")]
    OutOfRange { name: &'static str, value: f32 },

    #[error("semantic and keyword weights cannot both be 0")]
    AllZero,
}

/// Relative weight of each signal in the fused score
///
/// Weights need not sum to 1; fusion divides by their sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub semantic: f32,
    pub keyword: f32,
}

impl FusionWeights {
    pub fn new(semantic: f32, keyword: f32) -> Result<Self, FusionError> {
        for (name, value) in [("semantic", semantic), ("keyword", keyword)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FusionError::OutOfRange { name, value });
            }
        }
        if semantic == 0.0 && keyword == 0.0 {
            return Err(FusionError::AllZero);
        }
        Ok(Self { semantic, keyword })
    }

    /// Only the vector signal counts
    pub const fn semantic_only() -> Self {
        Self {
            semantic: 1.0,
            keyword: 0.0,
        }
    }

    /// Only the lexical signal counts
    pub const fn keyword_only() -> Self {
        Self {
            semantic: 0.0,
            keyword: 1.0,
        }
    }

    /// Weights scaled to sum to 1
    pub fn normalized(&self) -> (f32, f32) {
        let total = self.semantic + self.keyword;
        if total > 0.0 {
            (self.semantic / total, self.keyword / total)
        } else {
            (0.0, 0.0)
        }
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            semantic: 0.7,
            keyword: 0.3,
        }
    }
}

struct Candidate {
    chunk: Arc<Chunk>,
    semantic: Option<f32>,
    lexical: Option<f32>,
}

/// Fuse two hit lists into at most `k` ranked results
///
/// Each signal's scores are rescaled to [0, 1] within the returned set, then
/// combined as `w_s * semantic + w_k * lexical` with a missing component
/// counting as 0. A chunk returned by either signal stays eligible.
///
/// Ordering: fused score descending, then chunks found by both signals, then
/// corpus ordinal ascending.
pub fn fuse(
    vector_hits: &[IndexHit],
    lexical_hits: &[IndexHit],
    weights: FusionWeights,
    k: usize,
) -> Vec<RankedResult> {
    let (w_semantic, w_keyword) = weights.normalized();
    let mut candidates: AHashMap<usize, Candidate> =
        AHashMap::with_capacity(vector_hits.len() + lexical_hits.len());

    for (hit, score) in vector_hits.iter().zip(normalize_scores(vector_hits)) {
        candidates
            .entry(hit.ordinal)
            .or_insert_with(|| Candidate::new(&hit.chunk))
            .semantic = Some(score);
    }

    for (hit, score) in lexical_hits.iter().zip(normalize_scores(lexical_hits)) {
        candidates
            .entry(hit.ordinal)
            .or_insert_with(|| Candidate::new(&hit.chunk))
            .lexical = Some(score);
    }

    let mut results: Vec<RankedResult> = candidates
        .into_iter()
        .filter_map(|(ordinal, c)| {
            let provenance = Provenance::from_signals(c.semantic.is_some(), c.lexical.is_some())?;
            let score = w_semantic * c.semantic.unwrap_or(0.0) + w_keyword * c.lexical.unwrap_or(0.0);
            Some(RankedResult {
                chunk: c.chunk,
                ordinal,
                score,
                semantic_score: c.semantic,
                lexical_score: c.lexical,
                rank: 0,
                provenance,
            })
        })
        .collect();

    results.sort_by(compare_results);
    results.truncate(k);
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i + 1;
    }

    results
}

impl Candidate {
    fn new(chunk: &Arc<Chunk>) -> Self {
        Self {
            chunk: Arc::clone(chunk),
            semantic: None,
            lexical: None,
        }
    }
}

fn compare_results(a: &RankedResult, b: &RankedResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| {
            let a_both = a.provenance == Provenance::Both;
            let b_both = b.provenance == Provenance::Both;
            b_both.cmp(&a_both)
        })
        .then_with(|| a.ordinal.cmp(&b.ordinal))
}

/// Min-max normalization with the lower bound anchored at zero
///
/// Dividing by the best score keeps the weakest returned hit above an absent
/// one; negative cosine scores extend the range below zero. A set whose scores
/// are all equal normalizes to 1.0.
fn normalize_scores(hits: &[IndexHit]) -> Vec<f32> {
    let (min, max) = hits
        .iter()
        .map(|h| h.score)
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(s), hi.max(s))
        });

    let floor = min.min(0.0);
    let span = max - floor;

    hits.iter()
        .map(|h| {
            if span <= SCORE_EPSILON || !span.is_finite() {
                1.0
            } else {
                ((h.score - floor) / span).clamp(0.0, 1.0)
            }
        })
        .collect()
}
