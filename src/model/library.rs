//! Library and folder types (C1/C2).

use super::ids::{FolderId, LibraryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A top-level namespace owning folders, entities, and plugin bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
}

/// A filesystem root scanned within a library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub library_id: LibraryId,
    pub path: String,
    pub last_modified_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub folder_type: String,
}
