//! The hybrid ranker (C6), sitting above `storage::{EntityStore, SearchProvider}`
//! so it works against either backend without knowing which one it got.

mod hybrid;

pub use hybrid::{hybrid_search, HybridSearchResult, FTS_WEIGHT, RRF_K, VECTOR_WEIGHT};
