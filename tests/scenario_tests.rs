//! Scenario-level integration tests, one per numbered scenario in spec §8.

use chrono::{TimeZone, Utc};
use memoria::{
    hybrid_search, Config, DataType, EntityFilter, EntityId, EntityStore, LibraryId, NewEntity,
    NewMetadataEntry, SearchProvider,
};

fn backend() -> std::sync::Arc<dyn memoria::Backend> {
    Config::new("sqlite::memory:").open_backend().expect("backend should open")
}

fn ocr(text: &str) -> String {
    format!(r#"[{{"dt_boxes":[],"rec_txt":"{text}","score":1.0}}]"#)
}

fn seed(
    backend: &dyn memoria::Backend,
    library_id: LibraryId,
    filepath: &str,
    app: &str,
    day: u32,
) -> EntityId {
    let entity = backend
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
                        value: ocr("invoice"),
                        source: None,
                        data_type: DataType::Json,
                    },
                ],
            },
        )
        .unwrap();
    entity.id
}

#[test]
fn scenario_1_hybrid_search_finds_seeded_entity_with_facets() {
    let backend = backend();
    let library = backend.create_library("default").unwrap();
    let e1 = seed(backend.as_ref(), library.id, "/a.png", "Safari", 1);
    backend.update_entity_index(e1).unwrap();

    let result = hybrid_search(backend.as_ref(), "invoice", 10, &EntityFilter::new(), true).unwrap();
    assert_eq!(result.entities.len(), 1);
    assert_eq!(result.entities[0].id, e1);

    let facets = result.facets.unwrap();
    assert_eq!(facets.app_name_counts, vec![("Safari".to_string(), 1)]);
}

#[test]
fn scenario_2_full_text_search_respects_time_window() {
    let backend = backend();
    let library = backend.create_library("default").unwrap();
    let mut ids = Vec::new();
    for day in 2..=5 {
        let id = seed(backend.as_ref(), library.id, &format!("/e{day}.png"), "Safari", day);
        backend.update_entity_index(id).unwrap();
        ids.push(id);
    }

    let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap().timestamp();
    let end = Utc.with_ymd_and_hms(2024, 1, 3, 23, 59, 59).unwrap().timestamp();
    let filter = EntityFilter::new().with_time_range(start, end);
    let mut found = backend.full_text_search("invoice", 10, &filter).unwrap();
    found.sort();

    let mut expected = vec![ids[0], ids[1]];
    expected.sort();
    assert_eq!(found, expected);
}

#[test]
fn scenario_3_vector_search_filters_by_app_name() {
    let backend = backend();
    let library = backend.create_library("default").unwrap();
    let e6 = seed(backend.as_ref(), library.id, "/e6.png", "Safari", 1);
    let e7 = seed(backend.as_ref(), library.id, "/e7.png", "Mail", 2);
    backend.update_entity_index(e6).unwrap();
    backend.update_entity_index(e7).unwrap();

    let embedding = backend.embed_query("invoice").expect("mock embedder always succeeds");
    let filter = EntityFilter::new().with_app_names(vec!["Mail".to_string()]);
    let found = backend.vector_search(&embedding, 10, &filter).unwrap();
    assert_eq!(found, vec![e7]);
}

#[test]
fn scenario_4_skip_if_fresh_avoids_reembedding_unchanged_entities() {
    let backend = backend();
    let library = backend.create_library("default").unwrap();
    let e8 = seed(backend.as_ref(), library.id, "/e8.png", "Safari", 1);

    let first = backend.batch_update_entity_indices(&[e8]).unwrap();
    assert_eq!(first.reindexed, vec![e8]);
    assert!(first.skipped.is_empty());

    // last_scan_at is unchanged; the vector row just written is now fresh.
    let second = backend.batch_update_entity_indices(&[e8]).unwrap();
    assert!(second.reindexed.is_empty());
    assert_eq!(second.skipped, vec![e8]);

    // FTS is always rewritten regardless of freshness.
    let found = backend.full_text_search("invoice", 10, &EntityFilter::new()).unwrap();
    assert_eq!(found, vec![e8]);
}

#[test]
fn scenario_5_remove_entity_purges_it_from_both_indexes() {
    let backend = backend();
    let library = backend.create_library("default").unwrap();
    let e1 = seed(backend.as_ref(), library.id, "/a.png", "Safari", 1);
    backend.update_entity_index(e1).unwrap();

    backend.remove_entity(e1).unwrap();

    let result = hybrid_search(backend.as_ref(), "invoice", 10, &EntityFilter::new(), false).unwrap();
    assert!(result.entities.is_empty());
    assert!(backend.get_entity(e1).unwrap().is_none());
}

#[test]
fn scenario_6_get_entity_context_returns_chronological_neighbors() {
    let backend = backend();
    let library = backend.create_library("default").unwrap();
    let mut ids = Vec::new();
    for day in 1..=5 {
        ids.push(seed(backend.as_ref(), library.id, &format!("/e{day}.png"), "Safari", day));
    }

    let (before, after) = backend.get_entity_context(library.id, ids[2], 2, 2).unwrap();
    let before_ids: Vec<EntityId> = before.iter().map(|e| e.id).collect();
    let after_ids: Vec<EntityId> = after.iter().map(|e| e.id).collect();

    assert_eq!(before_ids, vec![ids[0], ids[1]]);
    assert_eq!(after_ids, vec![ids[3], ids[4]]);
}

#[test]
fn round_trip_create_then_get_by_filepath() {
    let backend = backend();
    let library = backend.create_library("default").unwrap();
    let e1 = seed(backend.as_ref(), library.id, "/roundtrip.png", "Safari", 1);

    let fetched = backend.get_entity_by_filepath("/roundtrip.png").unwrap().unwrap();
    assert_eq!(fetched.id, e1);
    assert_eq!(fetched.filepath, "/roundtrip.png");
    assert_eq!(fetched.tags.len(), 1);
    assert_eq!(fetched.tags[0].name, "screenshot");
}

#[test]
fn replace_semantics_update_tags_sets_exact_tag_set() {
    let backend = backend();
    let library = backend.create_library("default").unwrap();
    let e1 = seed(backend.as_ref(), library.id, "/tags.png", "Safari", 1);

    backend.update_tags(e1, &["work".to_string(), "finance".to_string()]).unwrap();
    let entity = backend.get_entity(e1).unwrap().unwrap();
    let mut names: Vec<&str> = entity.tags.iter().map(|t| t.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["finance", "work"]);
}

#[test]
fn merge_semantics_update_metadata_entries_preserves_untouched_keys() {
    let backend = backend();
    let library = backend.create_library("default").unwrap();
    let e1 = seed(backend.as_ref(), library.id, "/meta.png", "Safari", 1);

    backend
        .update_metadata_entries(
            e1,
            &[NewMetadataEntry {
                key: "active_app".to_string(),
                value: "Mail".to_string(),
                source: None,
                data_type: DataType::Text,
            }],
        )
        .unwrap();

    let entity = backend.get_entity(e1).unwrap().unwrap();
    let active_app = entity.metadata_entries.iter().find(|m| m.key == "active_app").unwrap();
    assert_eq!(active_app.value, "Mail");
    // ocr_result was not touched by the merge and must remain.
    assert!(entity.metadata_entries.iter().any(|m| m.key == "ocr_result"));
}

#[test]
fn plugin_status_tracks_pending_plugins_per_entity() {
    let backend = backend();
    let library = backend.create_library("default").unwrap();
    let e1 = seed(backend.as_ref(), library.id, "/plugin.png", "Safari", 1);
    let ocr_plugin = backend.create_plugin("ocr", None, None).unwrap();
    let caption_plugin = backend.create_plugin("caption", None, None).unwrap();
    backend.add_plugin_to_library(library.id, ocr_plugin.id).unwrap();
    backend.add_plugin_to_library(library.id, caption_plugin.id).unwrap();

    backend.record_plugin_processed(e1, ocr_plugin.id).unwrap();

    let pending = backend.get_pending_plugins(e1, library.id).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, caption_plugin.id);
}
