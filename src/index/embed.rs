//! The embedding capability consumed by C3 (index writer) and C6 (hybrid
//! ranker's query embedding). Deterministic w.r.t. text; may batch; an
//! implementation that fails should surface `EmbeddingError` so the caller
//! can skip vector indexing rather than fail the whole write.

use std::fmt;

#[derive(Debug)]
pub enum EmbeddingError {
    EmptyResult,
    ModelError(String),
}

impl fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingError::EmptyResult => write!(f, "embedding model returned no vectors"),
            EmbeddingError::ModelError(msg) => write!(f, "embedding model error: {msg}"),
        }
    }
}

impl std::error::Error for EmbeddingError {}

/// `embed(texts) -> vectors` of fixed dimensionality `D`. How it is
/// implemented is opaque to the core.
pub trait Embedder: Send + Sync {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
    fn dimensions(&self) -> usize;
}

/// Deterministic, dependency-free embedder for tests and `embeddings`-feature-off
/// builds: hashes each text into a fixed-size vector so equal texts embed equally
/// and distinct texts embed distinctly, without pulling in an ONNX runtime.
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Embedder for MockEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        Ok(texts.iter().map(|t| hash_embed(t, self.dimensions)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn hash_embed(text: &str, dimensions: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut out = Vec::with_capacity(dimensions);
    for i in 0..dimensions {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        i.hash(&mut hasher);
        let bucket = (hasher.finish() % 1000) as f32 / 1000.0;
        out.push(bucket - 0.5);
    }
    out
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(feature = "embeddings")]
mod fastembed_impl {
    use super::{Embedder, EmbeddingError};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// Wraps `fastembed`'s `TextEmbedding`, which needs `&mut self` to embed,
    /// behind a mutex so the trait can stay `&self`.
    pub struct FastEmbedEmbedder {
        model: Mutex<TextEmbedding>,
        dimensions: usize,
    }

    impl FastEmbedEmbedder {
        pub fn new(model: EmbeddingModel, dimensions: usize) -> Result<Self, EmbeddingError> {
            let embedding = TextEmbedding::try_new(InitOptions::new(model))
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
            Ok(Self { model: Mutex::new(embedding), dimensions })
        }

        pub fn default_model(dimensions: usize) -> Result<Self, EmbeddingError> {
            Self::new(EmbeddingModel::NomicEmbedTextV15, dimensions)
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
            let mut model = self.model.lock().expect("fastembed model mutex poisoned");
            let vectors = model
                .embed(owned, None)
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
            if vectors.is_empty() {
                return Err(EmbeddingError::EmptyResult);
            }
            Ok(vectors)
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::new(8);
        let a = embedder.embed_batch(&["invoice"]).unwrap();
        let b = embedder.embed_batch(&["invoice"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn mock_embedder_distinguishes_texts() {
        let embedder = MockEmbedder::new(8);
        let vecs = embedder.embed_batch(&["invoice", "receipt"]).unwrap();
        assert_ne!(vecs[0], vecs[1]);
    }

    #[test]
    fn empty_batch_returns_empty() {
        let embedder = MockEmbedder::new(8);
        assert_eq!(embedder.embed_batch(&[]).unwrap(), Vec::<Vec<f32>>::new());
    }
}
