//! Integration tests: conversation-aware retrieval, corpus files and citations

mod common;

use common::*;
use docqa::config::{Config, RetrievalConfig};
use docqa::corpus::{Chunk, ChunkStore};
use docqa::embedding::{EmbedderKey, EmbedderRegistry, EmbeddingProvider};
use docqa::retrieval::{
    format_superscript, ContextualRetriever, FusionWeights, HybridRetriever, Provenance,
    RetrievalMode, RetrievalRequest,
};
use std::sync::Arc;
use tempfile::TempDir;

async fn session(window: usize) -> ContextualRetriever {
    let retriever = Arc::new(retriever());
    retriever.rebuild(&refund_corpus(), hashing()).await.unwrap();

    let config = RetrievalConfig {
        history_window: window,
        ..RetrievalConfig::default()
    };
    ContextualRetriever::new(retriever, &config)
}

#[tokio::test]
async fn test_session_history_is_bounded() {
    let mut session = session(10).await;

    for i in 0..11 {
        session
            .retrieve_with_context(&format!("refund question {}", i), None, 2)
            .await
            .unwrap();
    }

    let history = session.history();
    assert_eq!(history.len(), 10);
    assert!(!history.contains("refund question 0"));
    assert_eq!(history.iter().next(), Some("refund question 1"));
    assert_eq!(history.iter().last(), Some("refund question 10"));
}

#[tokio::test]
async fn test_history_steers_follow_up_question() {
    let mut session = session(10).await;

    // "how long does it take" alone matches nothing lexically
    let alone = session
        .retriever()
        .retrieve_lexical_only("how long does it take", 3)
        .await
        .unwrap();
    assert!(alone.is_empty());

    let history = vec!["What is the refund policy?".to_string()];
    let outcome = session
        .retrieve_with_context("how long does it take", Some(&history), 2)
        .await
        .unwrap();

    assert_eq!(outcome.mode, RetrievalMode::Hybrid);
    assert_eq!(outcome.results[0].chunk.id.as_str(), "c0");
    assert_eq!(outcome.results[0].provenance, Provenance::Both);
}

#[tokio::test]
async fn test_explicit_history_does_not_replace_session_buffer() {
    let mut session = session(10).await;
    session
        .retrieve_with_context("shipping times", None, 1)
        .await
        .unwrap();

    let history = vec!["refund policy".to_string()];
    session
        .retrieve_with_context("processing", Some(&history), 1)
        .await
        .unwrap();

    assert_eq!(
        session.history().to_vec(),
        vec!["shipping times".to_string(), "processing".to_string()]
    );
}

#[tokio::test]
async fn test_request_with_weights_and_history() {
    let mut session = session(10).await;
    let request = RetrievalRequest::new("refunds", 3)
        .with_history(["shipping times"])
        .with_weights(FusionWeights::new(0.0, 1.0).unwrap());

    let outcome = session.retrieve(&request).await.unwrap();

    // Keyword-only weighting ranks by BM25 alone; all three chunks match a term
    assert_eq!(outcome.len(), 3);
    assert!(outcome.results.iter().all(|r| r.lexical_score.is_some()));
    assert_eq!(session.history().to_vec(), vec!["refunds".to_string()]);
}

#[tokio::test]
async fn test_reset_clears_session() {
    let mut session = session(10).await;
    session
        .retrieve_with_context("refund policy", None, 1)
        .await
        .unwrap();
    let before = session.session_id();

    session.reset();

    assert!(session.history().is_empty());
    assert_ne!(session.session_id(), before);
    assert_eq!(session.expand_query("refund", None), "refund");
}

#[tokio::test]
async fn test_corpus_file_round_trip_through_registry() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("chunks.jsonl");

    let original = ChunkStore::new(vec![
        Chunk::new("policy-1", REFUND_POLICY, "policy.pdf")
            .with_page(3)
            .with_offsets(0, 36),
        Chunk::new("ship-1", SHIPPING_TIMES, "shipping.pdf").with_metadata("section", "logistics"),
        Chunk::new("policy-2", REFUND_PROCESSING, "policy.pdf").with_page(4),
    ])
    .unwrap();
    original.save_jsonl(&path).unwrap();

    let loaded = ChunkStore::load_jsonl(&path).unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded.fingerprint(), original.fingerprint());

    let mut config = Config::default();
    config.embedding.provider = "hashing".to_string();
    config.embedding.dimension = 128;

    let registry = EmbedderRegistry::with_defaults();
    let provider = registry
        .get_or_create(&EmbedderKey::from_config(&config.embedding))
        .unwrap();
    assert_eq!(provider.dimension(), 128);

    let retriever = HybridRetriever::new(&config).unwrap();
    retriever.rebuild(&loaded, provider).await.unwrap();

    let outcome = retriever.retrieve("refund policy", 2, None).await.unwrap();
    let top = &outcome.results[0];
    assert_eq!(top.chunk.id.as_str(), "policy-1");

    let citation = top.citation();
    assert_eq!(citation.label, format_superscript(1));
    assert_eq!(citation.source, "policy.pdf");
    assert_eq!(citation.page, Some(3));
    assert_eq!(citation.to_string(), "¹ policy.pdf (p. 3)");

    let citations = outcome.citations();
    assert_eq!(citations.len(), 2);
    assert_eq!(citations[1].label, "²");
}
