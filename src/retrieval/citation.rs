//! Citation labels for the answer generation layer

use super::provenance::RankedResult;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::fmt;

const SNIPPET_CHARS: usize = 320;

static BRACKET_CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("Invalid bracket citation pattern"));

static CARET_CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\^\{?(\d+)\}?").expect("Invalid caret citation pattern"));

/// Render a number with unicode superscript digits
pub fn format_superscript(number: usize) -> String {
    number
        .to_string()
        .chars()
        .map(|c| match c {
            '0' => '⁰',
            '1' => '¹',
            '2' => '²',
            '3' => '³',
            '4' => '⁴',
            '5' => '⁵',
            '6' => '⁶',
            '7' => '⁷',
            '8' => '⁸',
            '9' => '⁹',
            other => other,
        })
        .collect()
}

/// Replace `[n]` and `^n` / `^{n}` markers with superscript numbers
pub fn replace_bracket_citations(text: &str) -> String {
    let superscript = |caps: &Captures| -> String {
        caps[1]
            .parse::<usize>()
            .map(format_superscript)
            .unwrap_or_else(|_| caps[0].to_string())
    };

    let replaced = BRACKET_CITATION.replace_all(text, superscript);
    CARET_CITATION.replace_all(&replaced, superscript).into_owned()
}

/// Source payload handed to the generation layer for one result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCitation {
    pub label: String,
    pub rank: usize,
    pub source: String,
    pub page: Option<u32>,
    pub snippet: String,
    pub score: f32,
}

impl SourceCitation {
    pub fn from_result(result: &RankedResult) -> Self {
        Self {
            label: format_superscript(result.rank),
            rank: result.rank,
            source: result.chunk.source.clone(),
            page: result.chunk.page,
            snippet: result.chunk.snippet(SNIPPET_CHARS),
            score: result.score,
        }
    }
}

impl fmt::Display for SourceCitation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.label, self.source)?;
        if let Some(page) = self.page {
            write!(f, " (p. {})", page)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Chunk;
    use crate::retrieval::Provenance;
    use std::sync::Arc;

    #[test]
    fn test_format_superscript() {
        assert_eq!(format_superscript(1), "¹");
        assert_eq!(format_superscript(123), "¹²³");
        assert_eq!(format_superscript(40), "⁴⁰");
    }

    #[test]
    fn test_replace_bracket_citations() {
        assert_eq!(
            replace_bracket_citations("Refunds take 5 days [1] unless noted ^{2} or ^3."),
            "Refunds take 5 days ¹ unless noted ² or ³."
        );
        assert_eq!(replace_bracket_citations("no markers [a]"), "no markers [a]");
    }

    #[test]
    fn test_citation_from_result() {
        let chunk = Chunk::new("c1", "refunds are processed within 5 business days", "policy.pdf")
            .with_page(3);
        let result = RankedResult {
            chunk: Arc::new(chunk),
            ordinal: 0,
            score: 0.9,
            semantic_score: Some(0.8),
            lexical_score: Some(1.0),
            rank: 2,
            provenance: Provenance::Both,
        };

        let citation = result.citation();
        assert_eq!(citation.label, "²");
        assert_eq!(citation.page, Some(3));
        assert_eq!(citation.to_string(), "² policy.pdf (p. 3)");
        assert_eq!(citation.snippet, "refunds are processed within 5 business days");
    }
}
