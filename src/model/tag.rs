//! Tags and the entity-tag join (C2, C3 rendering input).

use super::ids::{EntityId, TagId};
use serde::{Deserialize, Serialize};

/// A free-form label. Deduplicated by exact name (invariant 4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

/// Where a tag attachment originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagSource {
    User,
    PluginGenerated,
    System,
}

impl TagSource {
    pub fn as_str(self) -> &'static str {
        match self {
            TagSource::User => "user",
            TagSource::PluginGenerated => "plugin_generated",
            TagSource::System => "system",
        }
    }
}

impl std::str::FromStr for TagSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(TagSource::User),
            "plugin_generated" => Ok(TagSource::PluginGenerated),
            "system" => Ok(TagSource::System),
            other => Err(format!("unknown tag source: {other}")),
        }
    }
}

/// Many-to-many join row between entities and tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTag {
    pub entity_id: EntityId,
    pub tag_id: TagId,
    pub source: TagSource,
}
