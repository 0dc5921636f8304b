//! The data model: libraries, folders, entities, tags, metadata, and plugins.

mod entity;
mod ids;
mod library;
mod metadata;
mod plugin;
mod tag;

pub use entity::{Entity, EntityFilter, EntityUpdate, NewEntity, NewMetadataEntry};
pub use ids::{EntityId, FolderId, LibraryId, PluginId, TagId};
pub use library::{Folder, Library};
pub use metadata::{DataType, MetadataEntry, ACTIVE_APP_KEY, OCR_RESULT_KEY, SEQUENCE_KEY};
pub use plugin::{EntityPluginStatus, LibraryPlugin, Plugin};
pub use tag::{EntityTag, Tag, TagSource};
