/// Tantivy BM25 keyword index
use super::{sort_hits, IndexBuildError, IndexHit, IndexQueryError, SearchIndex, SnapshotInfo};
use crate::corpus::{Chunk, ChunkStore};
use std::fmt;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, STORED,
};
use tantivy::tokenizer::TokenStream;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

/// Lowercasing English stemmer registered by tantivy by default
const TOKENIZER: &str = "en_stem";

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// In-memory BM25 index over one corpus snapshot
///
/// Scoring is tantivy's BM25 with k1 = 1.2 and b = 0.75. Queries are tokenized
/// with the same analyzer as the indexed text. Documents are written by a
/// single writer thread, so document ids follow corpus order.
pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    ordinal_field: Field,
    text_field: Field,
    chunks: Vec<Arc<Chunk>>,
    snapshot: SnapshotInfo,
}

impl LexicalIndex {
    pub fn build(store: &ChunkStore) -> Result<Self, IndexBuildError> {
        if store.is_empty() {
            return Err(IndexBuildError::EmptyCorpus);
        }

        let snapshot = SnapshotInfo::capture(store);
        tracing::info!(
            "Building lexical index: {} chunks, snapshot {}",
            store.len(),
            snapshot.short_id()
        );

        let mut schema_builder = Schema::builder();
        let ordinal_field = schema_builder.add_u64_field("ordinal", STORED);
        let text_options = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );
        let text_field = schema_builder.add_text_field("text", text_options);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);

        let mut writer: IndexWriter = index
            .writer_with_num_threads(1, WRITER_HEAP_BYTES)
            .map_err(|e| IndexBuildError::Backend(e.to_string()))?;

        for (ordinal, chunk) in store.iter().enumerate() {
            writer
                .add_document(doc!(
                    ordinal_field => ordinal as u64,
                    text_field => chunk.text.as_str(),
                ))
                .map_err(|e| IndexBuildError::Backend(e.to_string()))?;
        }

        writer
            .commit()
            .map_err(|e| IndexBuildError::Backend(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| IndexBuildError::Backend(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            ordinal_field,
            text_field,
            chunks: store.iter().cloned().collect(),
            snapshot,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Analyze `text` into index terms
    pub fn terms(&self, text: &str) -> Result<Vec<Term>, IndexQueryError> {
        let mut analyzer = self
            .index
            .tokenizer_for_field(self.text_field)
            .map_err(|e| IndexQueryError::Backend(e.to_string()))?;

        let mut stream = analyzer.token_stream(text);
        let mut terms = Vec::new();
        while stream.advance() {
            terms.push(Term::from_field_text(self.text_field, &stream.token().text));
        }
        Ok(terms)
    }
}

impl SearchIndex for LexicalIndex {
    fn query(&self, text: &str, k: usize) -> Result<Vec<IndexHit>, IndexQueryError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        // TopDocs preallocates for the limit
        let k = k.min(self.chunks.len());

        let terms = self.terms(text)?;
        if terms.is_empty() {
            tracing::debug!("Lexical query has no indexable terms");
            return Ok(Vec::new());
        }

        // Repeated terms stay as separate clauses so they weigh more
        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .into_iter()
            .map(|term| {
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, query)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(k))
            .map_err(|e| IndexQueryError::Backend(e.to_string()))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let document: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| IndexQueryError::Backend(e.to_string()))?;

            let ordinal = document
                .get_first(self.ordinal_field)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| {
                    IndexQueryError::Backend("Missing or invalid ordinal field".to_string())
                })? as usize;

            let chunk = self.chunks.get(ordinal).ok_or_else(|| {
                IndexQueryError::Backend(format!("Ordinal {} outside corpus", ordinal))
            })?;

            hits.push(IndexHit {
                chunk: Arc::clone(chunk),
                ordinal,
                score,
            });
        }

        sort_hits(&mut hits);
        tracing::debug!("Lexical query returned {} hits", hits.len());
        Ok(hits)
    }

    fn snapshot(&self) -> &SnapshotInfo {
        &self.snapshot
    }
}

impl fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexicalIndex")
            .field("documents", &self.chunks.len())
            .field("snapshot", &self.snapshot)
            .finish()
    }
}
