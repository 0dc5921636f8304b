//! The indexed artifact itself (C2), and the inputs/filters that operate on it.
//!
//! An `Entity` owns its tags and metadata entries as plain child collections
//! rather than modeling them as a graph with back-pointers — the relationship
//! is tree-shaped in practice (entity -> tags, entity -> metadata).

use super::ids::{EntityId, FolderId, LibraryId};
use super::metadata::{DataType, MetadataEntry};
use super::tag::Tag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One indexed artifact (typically a screenshot image) and its derived attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub library_id: LibraryId,
    pub folder_id: Option<FolderId>,
    pub filepath: String,
    pub file_type_group: String,
    pub file_created_at: DateTime<Utc>,
    pub last_scan_at: DateTime<Utc>,
    pub tags: Vec<Tag>,
    pub metadata_entries: Vec<MetadataEntry>,
}

/// A metadata entry as supplied by a caller, before a `(entity_id, key)` is assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMetadataEntry {
    pub key: String,
    pub value: String,
    pub source: Option<String>,
    pub data_type: DataType,
}

/// Payload for `create_entity`. Tag names are resolved against the existing
/// `Tag` set (reused if present, created otherwise) and linked with
/// `source = plugin_generated`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEntity {
    pub folder_id: Option<FolderId>,
    pub filepath: String,
    pub file_type_group: String,
    pub file_created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub metadata: Vec<NewMetadataEntry>,
}

/// Scalar-and-collection update for an existing entity. `None` means
/// "leave unchanged"; `Some` on `tags`/`metadata_entries` means *replace wholesale*.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub folder_id: Option<Option<FolderId>>,
    pub filepath: Option<String>,
    pub file_type_group: Option<String>,
    pub file_created_at: Option<DateTime<Utc>>,
    pub tags: Option<Vec<String>>,
    pub metadata_entries: Option<Vec<NewMetadataEntry>>,
}

/// Structured filters shared by listing and search (C3 supplement, C4, C5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityFilter {
    pub library_ids: Option<Vec<LibraryId>>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub app_names: Option<Vec<String>>,
    pub limit: Option<usize>,
}

impl EntityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library_ids(mut self, ids: Vec<LibraryId>) -> Self {
        self.library_ids = Some(ids);
        self
    }

    pub fn with_time_range(mut self, start: i64, end: i64) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn with_app_names(mut self, names: Vec<String>) -> Self {
        self.app_names = Some(names);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
