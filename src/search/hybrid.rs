//! Reciprocal rank fusion over C4 (lexical) and C5 (vector) result lists,
//! followed by C2 hydration and an optional C7 facet block (C6).
//!
//! Fixed constants rather than configuration, per spec's own open-question
//! guidance: the RRF weights and `k` are named here, not threaded through
//! `Config`.

use crate::error::CoreResult;
use crate::model::{Entity, EntityFilter, EntityId};
use crate::storage::{Backend, EntityStore, SearchProvider, SearchStats};
use std::collections::HashMap;

/// RRF smoothing constant.
pub const RRF_K: f64 = 60.0;
/// Weight given to the lexical (FTS) ranking in the fused score.
pub const FTS_WEIGHT: f64 = 0.7;
/// Weight given to the vector (ANN) ranking in the fused score.
pub const VECTOR_WEIGHT: f64 = 0.3;

/// Result of a hybrid search: fused, hydrated entities plus whatever facet
/// block was requested, and whether the vector branch degraded (spec §7:
/// "a failure in the vector branch should not fail a hybrid search as long
/// as the lexical branch returns; however the degradation must be reported
/// alongside the results").
#[derive(Debug, Clone, Default)]
pub struct HybridSearchResult {
    pub entities: Vec<Entity>,
    pub facets: Option<SearchStats>,
    pub vector_degraded: bool,
}

fn rrf_add(scores: &mut HashMap<EntityId, f64>, ids: &[EntityId], weight: f64) {
    for (rank, id) in ids.iter().enumerate() {
        *scores.entry(*id).or_insert(0.0) += weight / (RRF_K + rank as f64 + 1.0);
    }
}

/// `hybrid_search(query, limit, filters, want_facets)` (C6).
///
/// Takes a `&dyn Backend` rather than a generic parameter so it works
/// unmodified against whichever concrete store `Config::open_backend` chose
/// (today only `SqliteStore`; the polymorphic-backend design note in
/// spec.md §9 expects more to show up behind the same trait object).
pub fn hybrid_search(
    store: &dyn Backend,
    query: &str,
    limit: usize,
    filters: &EntityFilter,
    want_facets: bool,
) -> CoreResult<HybridSearchResult> {
    let lexical = store.full_text_search(query, limit, filters)?;

    let (vector, vector_degraded) = match store.embed_query(query) {
        None => (Vec::new(), false),
        Some(embedding) => match store.vector_search(&embedding, limit * 2, filters) {
            Ok(ids) => (ids, false),
            Err(_) => (Vec::new(), true),
        },
    };

    let mut scores: HashMap<EntityId, f64> = HashMap::new();
    rrf_add(&mut scores, &lexical, FTS_WEIGHT);
    rrf_add(&mut scores, &vector, VECTOR_WEIGHT);

    let mut ranked: Vec<(EntityId, f64)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.truncate(limit);

    let mut entities = Vec::with_capacity(ranked.len());
    for (id, _) in ranked {
        if let Some(entity) = store.get_entity(id)? {
            entities.push(entity);
        }
    }

    let facets = if want_facets {
        Some(store.get_search_stats(query, filters)?)
    } else {
        None
    };

    Ok(HybridSearchResult { entities, facets, vector_degraded })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{MockEmbedder, WhitespaceTokenizer};
    use crate::model::{DataType, LibraryId, NewEntity, NewMetadataEntry};
    use crate::storage::{OpenStore, SqliteStore};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory_with(
            Arc::new(MockEmbedder::new(32)),
            Arc::new(WhitespaceTokenizer),
        )
        .unwrap()
    }

    fn seed_entity(store: &SqliteStore, library_id: LibraryId, filepath: &str, app: &str, day: u32) -> EntityId {
        let entity = store
            .create_entity(
                library_id,
                NewEntity {
                    folder_id: None,
                    filepath: filepath.to_string(),
                    file_type_group: "image".to_string(),
                    file_created_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
                    tags: vec!["screenshot".to_string()],
                    metadata: vec![
                        NewMetadataEntry {
                            key: "active_app".to_string(),
                            value: app.to_string(),
                            source: None,
                            data_type: DataType::Text,
                        },
                        NewMetadataEntry {
                            key: "ocr_result".to_string(),
                            value: r#"[{"dt_boxes":[],"rec_txt":"invoice","score":1.0}]"#.to_string(),
                            source: None,
                            data_type: DataType::Json,
                        },
                    ],
                },
            )
            .unwrap();
        store.update_entity_index(entity.id).unwrap();
        entity.id
    }

    #[test]
    fn hybrid_search_returns_permutation_of_union_sorted_by_score() {
        let store = store();
        let library = store.create_library("default").unwrap();
        let e1 = seed_entity(&store, library.id, "/a.png", "Safari", 1);
        let e2 = seed_entity(&store, library.id, "/b.png", "Mail", 2);

        let result = hybrid_search(&store, "invoice", 10, &EntityFilter::new(), false).unwrap();
        let ids: Vec<EntityId> = result.entities.iter().map(|e| e.id).collect();
        assert!(ids.contains(&e1));
        assert!(ids.contains(&e2));
        assert!(!result.vector_degraded);
    }

    #[test]
    fn hybrid_search_requests_facets_when_asked() {
        let store = store();
        let library = store.create_library("default").unwrap();
        seed_entity(&store, library.id, "/a.png", "Safari", 1);

        let result = hybrid_search(&store, "invoice", 10, &EntityFilter::new(), true).unwrap();
        let facets = result.facets.expect("facets requested");
        assert_eq!(facets.app_name_counts, vec![("Safari".to_string(), 1)]);
    }

    #[test]
    fn hybrid_search_truncates_to_limit() {
        let store = store();
        let library = store.create_library("default").unwrap();
        for i in 0..5 {
            seed_entity(&store, library.id, &format!("/e{i}.png"), "Safari", i + 1);
        }
        let result = hybrid_search(&store, "invoice", 3, &EntityFilter::new(), false).unwrap();
        assert_eq!(result.entities.len(), 3);
    }

    #[test]
    fn rrf_add_weights_earlier_ranks_higher() {
        let mut scores = HashMap::new();
        let ids = vec![EntityId(1), EntityId(2)];
        rrf_add(&mut scores, &ids, FTS_WEIGHT);
        assert!(scores[&EntityId(1)] > scores[&EntityId(2)]);
    }
}
