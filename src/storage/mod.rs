//! Storage backends: schema/migrations (C1) and the SQLite implementation of
//! `EntityStore` + `SearchProvider`.

mod schema;
mod sqlite;
mod traits;
mod vector_row;

pub use sqlite::SqliteStore;
pub use traits::{Backend, BatchIndexReport, DateRange, EntityStore, OpenStore, SearchProvider, SearchStats};
pub use vector_row::{l2_distance_to_cosine_similarity, l2_normalize, VectorRow};
