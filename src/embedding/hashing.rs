/// Feature-hashing embedder for offline use
///
/// Projects stemmed word unigrams and character trigrams into a fixed number
/// of buckets with BLAKE3, then L2-normalises. Words come from the same
/// analyzer chain as the lexical index (tantivy's English stemmer). No model
/// download, fully deterministic across processes, and texts sharing word
/// stems or sub-word fragments land close together. Quality is far below a neural
/// model; it exists for air-gapped setups and tests.
use super::{EmbeddingError, EmbeddingProvider};
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer, TokenStream,
};

const UNIGRAM_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

pub struct HashingProvider {
    dimension: usize,
    model_name: String,
    analyzer: TextAnalyzer,
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::InitializationError(
                "Hashing dimension must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            dimension,
            model_name: format!("hashing-{}", dimension),
            analyzer: english_analyzer(),
        })
    }

    fn bucket(&self, feature: &str) -> usize {
        let hash = blake3::hash(feature.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        (u64::from_le_bytes(bytes) % self.dimension as u64) as usize
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let mut analyzer = self.analyzer.clone();
        let mut stream = analyzer.token_stream(text);
        let mut words = Vec::new();
        while stream.advance() {
            words.push(stream.token().text.clone());
        }

        for word in words {
            vector[self.bucket(&word)] += UNIGRAM_WEIGHT;

            let padded: Vec<char> = format!("<{}>", word).chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                vector[self.bucket(&format!("#{}", trigram))] += TRIGRAM_WEIGHT;
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

/// Mirrors tantivy's `en_stem` pipeline
fn english_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(Stemmer::new(Language::English))
        .build()
}

impl EmbeddingProvider for HashingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }
        Ok(self.vectorize(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_deterministic_and_normalized() {
        let provider = HashingProvider::new(128).unwrap();
        let a = provider.embed("Refund policy").unwrap();
        let b = provider.embed("Refund policy").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_stems_are_closer() {
        let provider = HashingProvider::new(384).unwrap();
        let query = provider.embed("refund timeline").unwrap();
        let refunds = provider
            .embed("refunds are processed within 5 business days")
            .unwrap();
        let shipping = provider.embed("shipping times vary by region").unwrap();

        assert!(cosine(&query, &refunds) > cosine(&query, &shipping));
    }

    #[test]
    fn test_words_match_lexical_stems() {
        let provider = HashingProvider::new(384).unwrap();
        let shipping = provider.embed("Shipping").unwrap();
        let ship = provider.embed("ship").unwrap();
        let refunds = provider.embed("REFUNDS").unwrap();
        let refund = provider.embed("refund").unwrap();

        assert!((cosine(&shipping, &ship) - 1.0).abs() < 1e-5);
        assert!((cosine(&refunds, &refund) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_rejects_blank_and_zero_dimension() {
        let provider = HashingProvider::new(16).unwrap();
        assert!(provider.embed("  ").is_err());
        assert!(HashingProvider::new(0).is_err());
    }
}
