//! docqa - hybrid retrieval core for document question answering
//!
//! Chunks of ingested documents are indexed twice, once by embedding
//! similarity and once by BM25 keyword relevance. Queries run against both
//! indexes and the two ranked lists are fused into one, with conversation
//! history folded into the query and graceful fallback when a signal fails.

pub mod cli;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod index;
pub mod retrieval;

pub use error::{DocqaError, Result};
