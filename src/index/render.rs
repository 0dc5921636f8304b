//! Pure rendering functions from an entity snapshot to the two secondary
//! index inputs (C3). No I/O; easy to unit test in isolation.

use crate::model::{MetadataEntry, Tag, OCR_RESULT_KEY, SEQUENCE_KEY};
use serde_json::Value;

/// Structural detection of the canonical OCR shape: an array of objects each
/// carrying `dt_boxes`, `rec_txt`, `score`. Unknown shapes return `None` so
/// callers fall through to pretty-printing instead of guessing.
fn canonical_ocr_texts(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    let mut texts = Vec::with_capacity(items.len());
    for item in items {
        let obj = item.as_object()?;
        if !(obj.contains_key("dt_boxes") && obj.contains_key("rec_txt") && obj.contains_key("score")) {
            return None;
        }
        texts.push(obj.get("rec_txt")?.as_str()?.to_string());
    }
    Some(texts)
}

/// Renders an `ocr_result` value: whitespace-joined `rec_txt` of the first
/// `max_boxes` entries when the value is the canonical shape; the raw string
/// if it fails to parse as JSON at all; pretty-printed JSON otherwise.
pub fn render_ocr_result(value: &str, max_boxes: usize) -> String {
    match serde_json::from_str::<Value>(value) {
        Err(_) => value.to_string(),
        Ok(parsed) => match canonical_ocr_texts(&parsed) {
            Some(texts) => texts.into_iter().take(max_boxes).collect::<Vec<_>>().join(" "),
            None => serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| value.to_string()),
        },
    }
}

/// Identity for every key except `ocr_result`.
fn render_metadata_value(key: &str, value: &str) -> String {
    if key == OCR_RESULT_KEY {
        render_ocr_result(value, 4096)
    } else {
        value.to_string()
    }
}

/// FTS `tags` column: distinct tag names, comma+space joined, in attachment order.
pub fn render_fts_tags(tags: &[Tag]) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut ordered = Vec::with_capacity(tags.len());
    for tag in tags {
        if seen.insert(tag.name.clone()) {
            ordered.push(tag.name.as_str());
        }
    }
    ordered.join(", ")
}

/// FTS `metadata` column: newline-joined `key: value` over all entries in
/// insertion order, with `ocr_result` specially decoded.
pub fn render_fts_metadata(entries: &[MetadataEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}: {}", e.key, render_metadata_value(&e.key, &e.value)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Vector embedding input text: newline-joined `key: value` for all metadata
/// except `ocr_result` and `sequence`, with a final `ocr_result` line
/// (truncated to 128 boxes) appended if present.
pub fn render_vector_text(entries: &[MetadataEntry]) -> String {
    let mut lines: Vec<String> = entries
        .iter()
        .filter(|e| e.key != OCR_RESULT_KEY && e.key != SEQUENCE_KEY)
        .map(|e| format!("{}: {}", e.key, e.value))
        .collect();
    if let Some(ocr) = entries.iter().find(|e| e.key == OCR_RESULT_KEY) {
        lines.push(format!("{}: {}", OCR_RESULT_KEY, render_ocr_result(&ocr.value, 128)));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, EntityId, TagId};

    fn tag(id: i64, name: &str) -> Tag {
        Tag { id: TagId(id), name: name.to_string() }
    }

    fn entry(entity: i64, key: &str, value: &str) -> MetadataEntry {
        MetadataEntry {
            entity_id: EntityId(entity),
            key: key.to_string(),
            value: value.to_string(),
            source: None,
            source_type: None,
            data_type: DataType::Text,
        }
    }

    #[test]
    fn tags_dedup_and_preserve_order() {
        let tags = vec![tag(1, "screenshot"), tag(2, "work"), tag(3, "screenshot")];
        assert_eq!(render_fts_tags(&tags), "screenshot, work");
    }

    #[test]
    fn ocr_canonical_shape_concatenates_rec_txt() {
        let value = r#"[{"dt_boxes":[],"rec_txt":"hello","score":1.0},{"dt_boxes":[],"rec_txt":"world","score":0.9}]"#;
        assert_eq!(render_ocr_result(value, 4096), "hello world");
    }

    #[test]
    fn ocr_malformed_json_falls_back_to_raw_string() {
        let value = "not json at all {";
        assert_eq!(render_ocr_result(value, 4096), "not json at all {");
    }

    #[test]
    fn ocr_valid_json_non_canonical_shape_pretty_prints() {
        let value = r#"{"unexpected": true}"#;
        let rendered = render_ocr_result(value, 4096);
        assert!(rendered.contains("unexpected"));
        assert!(rendered.contains('\n'));
    }

    #[test]
    fn fts_metadata_renders_ocr_substring() {
        let entries = vec![entry(1, "ocr_result", r#"[{"dt_boxes":[],"rec_txt":"hello","score":1.0},{"dt_boxes":[],"rec_txt":"world","score":1.0}]"#)];
        let rendered = render_fts_metadata(&entries);
        assert!(rendered.contains("ocr_result: hello world"));
    }

    #[test]
    fn vector_text_excludes_ocr_and_sequence_from_body_and_appends_ocr_last() {
        let entries = vec![
            entry(1, "active_app", "Safari"),
            entry(1, "sequence", "42"),
            entry(1, "ocr_result", r#"[{"dt_boxes":[],"rec_txt":"invoice","score":1.0}]"#),
        ];
        let rendered = render_vector_text(&entries);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines, vec!["active_app: Safari", "ocr_result: invoice"]);
    }
}
