use async_trait::async_trait;
use mnemo_core::{DocumentType, Embedder, EmbeddingError, EmbeddingModel};

const FNV_OFFSET: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;

fn fnv1a(bytes: &[u8], seed: u64) -> u64 {
    let mut hash = FNV_OFFSET ^ seed;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Deterministic feature-hashing embedder for tests and offline use.
///
/// Each lowercase word lands in one bucket with a hashed sign, and the result
/// is L2-normalised, so texts sharing words score closer together.
#[derive(Clone, Debug)]
pub struct HashEmbedder {
    message_dimensions: usize,
    summary_dimensions: usize,
    document_dimensions: usize,
}

impl HashEmbedder {
    /// Same width for every document type.
    pub fn new(dimensions: usize) -> Self {
        Self {
            message_dimensions: dimensions,
            summary_dimensions: dimensions,
            document_dimensions: dimensions,
        }
    }

    pub fn with_dimensions(mut self, kind: DocumentType, dimensions: usize) -> Self {
        match kind {
            DocumentType::Message => self.message_dimensions = dimensions,
            DocumentType::Summary => self.summary_dimensions = dimensions,
            DocumentType::Document => self.document_dimensions = dimensions,
        }
        self
    }

    pub fn dimensions(&self, kind: DocumentType) -> usize {
        match kind {
            DocumentType::Message => self.message_dimensions,
            DocumentType::Summary => self.summary_dimensions,
            DocumentType::Document => self.document_dimensions,
        }
    }

    pub fn hash_to_vec(&self, kind: DocumentType, text: &str) -> Vec<f32> {
        let dimensions = self.dimensions(kind);
        let mut vector = vec![0.0_f32; dimensions];
        if dimensions == 0 {
            return vector;
        }
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            let bucket = (fnv1a(word.as_bytes(), 0) % dimensions as u64) as usize;
            let sign = if fnv1a(word.as_bytes(), 1) & 1 == 0 {
                1.0
            } else {
                -1.0
            };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(
        &self,
        kind: DocumentType,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| self.hash_to_vec(kind, text))
            .collect())
    }

    fn model(&self, kind: DocumentType) -> EmbeddingModel {
        EmbeddingModel {
            name: format!("hash-{}", kind.as_str()),
            dimensions: self.dimensions(kind),
        }
    }
}
