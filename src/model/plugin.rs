//! Plugins and their per-library/per-entity processing status (C8).

use super::ids::{EntityId, LibraryId, PluginId};
use serde::{Deserialize, Serialize};

/// An external worker that annotates entities (OCR, VLM captions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    pub id: PluginId,
    pub name: String,
    pub description: Option<String>,
    pub webhook_url: Option<String>,
}

/// Binds a plugin to a library, authorizing it to process that library's entities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LibraryPlugin {
    pub library_id: LibraryId,
    pub plugin_id: PluginId,
}

/// Set-semantics marker: this plugin has processed this entity at least once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityPluginStatus {
    pub entity_id: EntityId,
    pub plugin_id: PluginId,
}
