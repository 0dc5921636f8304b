//! Backend-facing trait definitions.
//!
//! `EntityStore` is the transactional CRUD surface (C2 plus the library/
//! plugin supporting operations it depends on). `SearchProvider` is the
//! capability set the design notes call out explicitly — `full_text_search`,
//! `vector_search`, `update_entity_index`, `batch_update_entity_indices`,
//! `get_search_stats` — so that a second backend (e.g. a server-based store)
//! can be swapped in from `database_url` without the choice leaking anywhere
//! else.

use crate::error::CoreResult;
use crate::model::{
    Entity, EntityFilter, EntityId, EntityUpdate, Folder, FolderId, Library, LibraryId,
    NewEntity, NewMetadataEntry, Plugin, PluginId,
};
use chrono::{DateTime, Utc};

/// Transactional CRUD over libraries, folders, entities, tags, metadata, and
/// plugin bindings (C2, plus the library/plugin lookups it depends on and
/// the plugin-status tracker C8).
pub trait EntityStore: Send + Sync {
    fn create_library(&self, name: &str) -> CoreResult<Library>;
    fn get_library_by_id(&self, id: LibraryId) -> CoreResult<Option<Library>>;
    fn get_library_by_name(&self, name: &str) -> CoreResult<Option<Library>>;
    fn add_folder(&self, library_id: LibraryId, path: &str, folder_type: &str) -> CoreResult<Folder>;

    fn create_plugin(&self, name: &str, description: Option<&str>, webhook_url: Option<&str>) -> CoreResult<Plugin>;
    fn get_plugin_by_name(&self, name: &str) -> CoreResult<Option<Plugin>>;
    fn add_plugin_to_library(&self, library_id: LibraryId, plugin_id: PluginId) -> CoreResult<()>;
    fn remove_plugin_from_library(&self, library_id: LibraryId, plugin_id: PluginId) -> CoreResult<()>;

    fn create_entity(&self, library_id: LibraryId, payload: NewEntity) -> CoreResult<Entity>;
    fn get_entity(&self, id: EntityId) -> CoreResult<Option<Entity>>;
    fn get_entity_by_filepath(&self, filepath: &str) -> CoreResult<Option<Entity>>;
    fn list_entities(&self, filter: &EntityFilter) -> CoreResult<Vec<Entity>>;
    fn get_entities_of_folder(&self, folder_id: FolderId, limit: Option<usize>) -> CoreResult<Vec<Entity>>;
    fn update_entity(&self, id: EntityId, update: EntityUpdate) -> CoreResult<Entity>;
    fn touch_entity(&self, id: EntityId) -> CoreResult<()>;
    fn remove_entity(&self, id: EntityId) -> CoreResult<()>;

    /// Replace-set semantics: the entity's tag set becomes exactly `tags`.
    fn update_tags(&self, id: EntityId, tags: &[String]) -> CoreResult<()>;
    /// Set-union semantics: `tags` are added alongside whatever is already attached.
    fn add_tags(&self, id: EntityId, tags: &[String]) -> CoreResult<()>;
    /// Merge-by-key semantics: upsert each entry by `(entity_id, key)`,
    /// preserving the prior `source`/`source_type` when the incoming `source` is `None`.
    fn update_metadata_entries(&self, id: EntityId, entries: &[NewMetadataEntry]) -> CoreResult<()>;

    fn get_entity_context(
        &self,
        library_id: LibraryId,
        id: EntityId,
        prev: usize,
        next: usize,
    ) -> CoreResult<(Vec<Entity>, Vec<Entity>)>;

    fn record_plugin_processed(&self, entity_id: EntityId, plugin_id: PluginId) -> CoreResult<()>;
    fn get_pending_plugins(&self, entity_id: EntityId, library_id: LibraryId) -> CoreResult<Vec<Plugin>>;
}

/// Date span over a result set; both ends are `None` when the set is empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DateRange {
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

/// Facet block returned by `get_search_stats` (C7).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchStats {
    pub date_range: DateRange,
    /// `(app_name, count)` pairs sorted by count descending.
    pub app_name_counts: Vec<(String, i64)>,
}

/// Outcome of a batched reindex (C3), used by skip-if-fresh tests and callers
/// who want to know how much embedding work actually happened.
#[derive(Debug, Clone, Default)]
pub struct BatchIndexReport {
    pub reindexed: Vec<EntityId>,
    pub skipped: Vec<EntityId>,
}

/// The polymorphic search/index capability set (§9 design note).
pub trait SearchProvider: Send + Sync {
    fn update_entity_index(&self, entity_id: EntityId) -> CoreResult<()>;
    fn batch_update_entity_indices(&self, entity_ids: &[EntityId]) -> CoreResult<BatchIndexReport>;
    fn full_text_search(&self, query: &str, limit: usize, filters: &EntityFilter) -> CoreResult<Vec<EntityId>>;
    fn vector_search(&self, embedding: &[f32], limit: usize, filters: &EntityFilter) -> CoreResult<Vec<EntityId>>;
    fn get_search_stats(&self, query: &str, filters: &EntityFilter) -> CoreResult<SearchStats>;
    /// Embeds a single query string with whatever `Embedder` the backend was
    /// opened with; `None` on failure, mirroring `embed()`'s documented
    /// "empty vectors on failure" contract so C6 can treat it as skip-vector.
    fn embed_query(&self, query: &str) -> Option<Vec<f32>>;
}

/// Extension trait for opening stores from a `database_url` (mirrors the
/// teacher's `OpenStore`), so the backend choice lives in exactly one place.
pub trait OpenStore: Sized {
    fn open(path: impl AsRef<std::path::Path>) -> CoreResult<Self>;
    fn open_in_memory() -> CoreResult<Self>;
}

/// Marker supertrait for a fully-capable backend (C2 + C3-C5/C7/C8 combined),
/// so `Config::open_backend` can hand callers a single trait object instead
/// of two. Blanket-implemented for anything that already implements both.
pub trait Backend: EntityStore + SearchProvider {}
impl<T: EntityStore + SearchProvider + ?Sized> Backend for T {}
