//! Memoria: hybrid lexical + vector indexing engine for screen-capture
//! memory archives.
//!
//! A local "memory" index over personal screen-capture artifacts: image
//! files annotated with OCR text, tags, and application-provenance
//! metadata. The core ingests these artifacts, keeps two parallel secondary
//! indexes in sync with the primary store (a tokenized FTS table and a
//! vector-partitioned similarity table), and answers hybrid ranked queries
//! scoped by library, time range, and originating application.
//!
//! # Core Concepts
//!
//! - **Entity**: one indexed artifact (typically a screenshot) and its
//!   owned tags/metadata.
//! - **Library**: a namespace of folders, entities, and plugin bindings.
//! - **Index writer**: derives the FTS document and embedding input from an
//!   entity snapshot and keeps both secondary indexes coherent with it.
//! - **Hybrid ranker**: fuses lexical and vector rankings via reciprocal
//!   rank fusion before hydrating full entities.
//!
//! # Example
//!
//! ```
//! use memoria::{Config, EntityStore, SearchProvider, hybrid_search};
//!
//! let backend = Config::new("sqlite::memory:").open_backend().unwrap();
//! let library = backend.create_library("default").unwrap();
//! // `backend` is ready for ingestion and search.
//! let _ = library;
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod search;
pub mod storage;

pub use config::{Config, PoolConfig};
pub use error::{CoreError, CoreResult};
pub use index::{cosine_similarity, Embedder, EmbeddingError, MockEmbedder, Tokenizer, WhitespaceTokenizer};
#[cfg(feature = "embeddings")]
pub use index::FastEmbedEmbedder;
#[cfg(feature = "cjk-tokenizer")]
pub use index::JiebaTokenizer;
pub use model::{
    DataType, Entity, EntityFilter, EntityId, EntityPluginStatus, EntityTag, EntityUpdate, Folder,
    FolderId, Library, LibraryId, LibraryPlugin, MetadataEntry, NewEntity, NewMetadataEntry,
    Plugin, PluginId, Tag, TagId, TagSource, ACTIVE_APP_KEY, OCR_RESULT_KEY, SEQUENCE_KEY,
};
pub use search::{hybrid_search, HybridSearchResult, FTS_WEIGHT, RRF_K, VECTOR_WEIGHT};
pub use storage::{
    Backend, BatchIndexReport, DateRange, EntityStore, OpenStore, SearchProvider, SearchStats,
    SqliteStore,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
