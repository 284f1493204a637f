//! Embedding backends.

use sha2::{Digest, Sha256};

use temper_contracts::error::{TemperError, TemperResult};

use crate::index::tokenize;

/// Turns text into a dense vector. Implementations must be callable from
/// the retriever's worker thread.
pub trait EmbeddingBackend: Send + Sync {
    /// Backend name, used in logs and fallback reasons.
    fn name(&self) -> &'static str;

    fn dimension(&self) -> usize;

    /// Whether the backend can serve requests right now. An unavailable
    /// backend sends every search down the keyword path.
    fn available(&self) -> bool {
        true
    }

    fn embed(&self, text: &str) -> TemperResult<Vec<f32>>;
}

/// Signed feature hashing of unigrams and bigrams, L2-normalized.
///
/// Deterministic across processes, so persisted vectors stay comparable.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimension: usize,
}

const BIGRAM_WEIGHT: f32 = 0.5;

impl HashingEmbedder {
    pub fn new(dimension: usize) -> TemperResult<Self> {
        if dimension == 0 {
            return Err(TemperError::Config {
                reason: "embedding dimension must be at least 1".to_string(),
            });
        }
        Ok(Self { dimension })
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimension: 256 }
    }
}

impl EmbeddingBackend for HashingEmbedder {
    fn name(&self) -> &'static str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> TemperResult<Vec<f32>> {
        let tokens = tokenize(text);
        let mut vector = vec![0.0f32; self.dimension];
        for token in &tokens {
            self.add_feature(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }
        normalize(&mut vector);
        Ok(vector)
    }
}

/// Scale `vector` to unit length. The zero vector is left as is.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Cosine similarity; 0 when either vector is zero or the lengths differ.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::{cosine, EmbeddingBackend, HashingEmbedder};

    #[test]
    fn test_embedding_is_normalized_and_deterministic() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("retry failed payments with backoff").unwrap();
        let b = embedder.embed("retry failed payments with backoff").unwrap();

        assert_eq!(a.len(), 256);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_related_text_scores_higher() {
        let embedder = HashingEmbedder::new(512).unwrap();
        let query = embedder.embed("payment retry backoff").unwrap();
        let related = embedder.embed("payment retry uses exponential backoff").unwrap();
        let unrelated = embedder.embed("render the avatar in the profile header").unwrap();

        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_and_zero_dimension() {
        let embedder = HashingEmbedder::default();
        assert!(embedder.embed("").unwrap().iter().all(|x| *x == 0.0));
        assert!(HashingEmbedder::new(0).is_err());
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
