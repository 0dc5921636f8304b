//! Process-wide configuration (§6): a plain value type, not a file loader.
//! Loading it from a file/env and wiring it up is an external collaborator's
//! job (the HTTP/CLI surface); the core just consumes the resulting struct,
//! mirroring how the teacher's `AnalysisConfig` is constructed and passed in
//! rather than read from disk by `analysis` itself.

use crate::error::{CoreError, CoreResult};
use crate::index::{Embedder, MockEmbedder, Tokenizer, WhitespaceTokenizer};
#[cfg(feature = "cjk-tokenizer")]
use crate::index::JiebaTokenizer;
use crate::storage::{Backend, SqliteStore};
use std::path::PathBuf;
use std::sync::Arc;

/// Connection pool sizing knobs (§5). `rusqlite::Connection` isn't
/// `Clone`/poolable the way the single `Mutex<Connection>` in `SqliteStore`
/// is, so the core does not implement pooling itself — these fields are
/// carried through for whatever caller-side pool manager wraps the backend,
/// consistent with "process supervision" staying an out-of-scope collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub base_connections: u32,
    pub overflow_connections: u32,
    pub checkout_timeout_secs: u64,
    pub recycle_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_connections: 10,
            overflow_connections: 20,
            checkout_timeout_secs: 60,
            recycle_secs: 3600,
        }
    }
}

/// The recognized configuration surface (§6): `database_url` selects the
/// backend, `embedding_num_dim` is `D` and is immutable for the life of the
/// database, `default_library` names the library seeded on first init, and
/// `tokenizer_asset_path` points at whatever asset a real CJK tokenizer
/// needs (e.g. a jieba dictionary) — unused by the default whitespace one.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub embedding_num_dim: usize,
    pub default_library: String,
    pub tokenizer_asset_path: Option<PathBuf>,
    pub pool: PoolConfig,
}

impl Config {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            embedding_num_dim: 768,
            default_library: "default".to_string(),
            tokenizer_asset_path: None,
            pool: PoolConfig::default(),
        }
    }

    pub fn with_embedding_num_dim(mut self, dim: usize) -> Self {
        self.embedding_num_dim = dim;
        self
    }

    pub fn with_default_library(mut self, name: impl Into<String>) -> Self {
        self.default_library = name.into();
        self
    }

    pub fn with_tokenizer_asset_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tokenizer_asset_path = Some(path.into());
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    fn tokenizer(&self) -> Arc<dyn Tokenizer> {
        #[cfg(feature = "cjk-tokenizer")]
        {
            Arc::new(JiebaTokenizer::default())
        }
        #[cfg(not(feature = "cjk-tokenizer"))]
        {
            Arc::new(WhitespaceTokenizer)
        }
    }

    fn embedder(&self) -> CoreResult<Arc<dyn Embedder>> {
        #[cfg(feature = "embeddings")]
        {
            use crate::index::FastEmbedEmbedder;
            return Ok(Arc::new(
                FastEmbedEmbedder::default_model(self.embedding_num_dim)
                    .map_err(|e| CoreError::EmbeddingUnavailable(e.to_string()))?,
            ));
        }
        #[cfg(not(feature = "embeddings"))]
        {
            Ok(Arc::new(MockEmbedder::new(self.embedding_num_dim)))
        }
    }

    /// Opens the backend selected by `database_url` — the one place the
    /// backend choice lives (§9 design note). `sqlite::memory:` opens an
    /// in-memory database; `sqlite://<path>` or a bare filesystem path opens
    /// a file-backed one. A `postgres://`/`postgresql://` URL is a
    /// documented placeholder that fails fast rather than silently
    /// constructing a non-functioning store.
    pub fn open_backend(&self) -> CoreResult<Arc<dyn Backend>> {
        let embedder = self.embedder()?;
        let tokenizer = self.tokenizer();

        if self.database_url == "sqlite::memory:" {
            return Ok(Arc::new(SqliteStore::open_in_memory_with(embedder, tokenizer)?));
        }
        if self.database_url.starts_with("postgres://") || self.database_url.starts_with("postgresql://") {
            return Err(CoreError::Unsupported(
                "PostgreSQL backend is not implemented; only the embedded SQLite provider is available".to_string(),
            ));
        }
        let path = self.database_url.strip_prefix("sqlite://").unwrap_or(&self.database_url);
        Ok(Arc::new(SqliteStore::open_with(path, embedder, tokenizer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::EntityStore;

    #[test]
    fn in_memory_url_opens_sqlite_backend() {
        let config = Config::new("sqlite::memory:");
        let backend = config.open_backend().expect("backend should open");
        let library = backend.create_library("default").expect("library should be created");
        assert_eq!(library.name, "default");
    }

    #[test]
    fn postgres_url_is_a_fast_failing_placeholder() {
        let config = Config::new("postgres://localhost/memoria");
        let err = config.open_backend().unwrap_err();
        assert!(matches!(err, CoreError::Unsupported(_)));
    }

    #[test]
    fn builder_methods_override_defaults() {
        let config = Config::new("sqlite::memory:")
            .with_embedding_num_dim(256)
            .with_default_library("mine");
        assert_eq!(config.embedding_num_dim, 256);
        assert_eq!(config.default_library, "mine");
        assert_eq!(config.pool, PoolConfig::default());
    }
}
