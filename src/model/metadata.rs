//! Typed key/value metadata attached to an entity.

use super::ids::EntityId;
use serde::{Deserialize, Serialize};

/// The shape of a metadata value, mirroring the source system's `data_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    Number,
    Json,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::Number => "number",
            DataType::Json => "json",
        }
    }
}

impl std::str::FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(DataType::Text),
            "number" => Ok(DataType::Number),
            "json" => Ok(DataType::Json),
            other => Err(format!("unknown data type: {other}")),
        }
    }
}

/// A single typed attribute attached to an entity. `key` is unique per entity
/// (invariant 2). The well-known key `"active_app"` carries application
/// provenance; `"ocr_result"` carries OCR output as a JSON array of
/// `{dt_boxes, rec_txt, score}` objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub entity_id: EntityId,
    pub key: String,
    pub value: String,
    pub source: Option<String>,
    pub source_type: Option<String>,
    pub data_type: DataType,
}

pub const ACTIVE_APP_KEY: &str = "active_app";
pub const OCR_RESULT_KEY: &str = "ocr_result";
pub const SEQUENCE_KEY: &str = "sequence";
