//! Pure orchestration helpers for C3 (index writer). The actual SQL lives in
//! `storage::sqlite`, which needs a single connection/transaction to keep FTS
//! and vector writes atomic with each other; this module holds the
//! backend-independent decisions so they can be unit tested without a database.

use crate::model::{Entity, ACTIVE_APP_KEY};
use crate::storage::VectorRow;
use chrono::{DateTime, Utc};

/// Skip-if-fresh: an entity needs reindexing when it has no vector row yet,
/// or when it has been rescanned since the vector row was written.
pub fn needs_reindex(last_scan_at: DateTime<Utc>, existing_created_at: Option<i64>) -> bool {
    match existing_created_at {
        None => true,
        Some(created_at) => last_scan_at.timestamp() > created_at,
    }
}

/// Builds the vector row for an entity from a freshly computed embedding.
pub fn build_vector_row(entity: &Entity, embedding: Vec<f32>, now: DateTime<Utc>) -> VectorRow {
    let app_name = entity
        .metadata_entries
        .iter()
        .find(|m| m.key == ACTIVE_APP_KEY)
        .map(|m| m.value.clone())
        .unwrap_or_else(|| "unknown".to_string());
    let file_type_group = if entity.file_type_group.is_empty() {
        "unknown".to_string()
    } else {
        entity.file_type_group.clone()
    };
    VectorRow {
        embedding,
        file_type_group,
        created_at_timestamp: now.timestamp(),
        file_created_at_timestamp: entity.file_created_at.timestamp(),
        file_created_at_date: entity.file_created_at.format("%Y-%m-%d").to_string(),
        app_name,
        library_id: entity.library_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_vector_row_always_needs_reindex() {
        assert!(needs_reindex(Utc::now(), None));
    }

    #[test]
    fn stale_vector_row_needs_reindex() {
        let now = Utc::now();
        let earlier = now.timestamp() - 10;
        assert!(needs_reindex(now, Some(earlier)));
    }

    #[test]
    fn fresh_vector_row_does_not_need_reindex() {
        let now = Utc::now();
        let later = now.timestamp() + 10;
        assert!(!needs_reindex(now, Some(later)));
    }
}
