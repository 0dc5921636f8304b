//! The index writer (C3) and the external capabilities it depends on.

pub mod embed;
pub mod render;
pub mod tokenizer;
pub mod writer;

pub use embed::{cosine_similarity, Embedder, EmbeddingError, MockEmbedder};
#[cfg(feature = "embeddings")]
pub use embed::FastEmbedEmbedder;
pub use tokenizer::{Tokenizer, WhitespaceTokenizer};
#[cfg(feature = "cjk-tokenizer")]
pub use tokenizer::JiebaTokenizer;
