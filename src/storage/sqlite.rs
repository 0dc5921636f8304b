//! SQLite-backed `EntityStore` + `SearchProvider` (C1-C5, C7, C8).
//!
//! A single `Mutex<Connection>` hosts the relational tables, the FTS5 virtual
//! table, and (with the `embeddings` feature) the `vec0` virtual table. This
//! departs from keeping secondary indexes on separate connections: the core's
//! ordering guarantee ("within a single ingestion transaction, FTS and vector
//! writes become visible atomically with the metadata that produced them")
//! requires one transaction to span all three, which only works if they share
//! a connection.

use super::schema;
use super::traits::{BatchIndexReport, DateRange, EntityStore, OpenStore, SearchProvider, SearchStats};
use super::vector_row::VectorRow;
use crate::error::{CoreError, CoreResult};
use crate::index::render::{render_fts_metadata, render_fts_tags, render_vector_text};
use crate::index::writer::{build_vector_row, needs_reindex};
use crate::index::{Embedder, Tokenizer};
use crate::model::*;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use std::path::Path;
use std::sync::{Arc, Mutex};

const MAX_SAMPLE: usize = 4096;
const MIN_SAMPLE: usize = 2048;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    embedder: Arc<dyn Embedder>,
    tokenizer: Arc<dyn Tokenizer>,
    #[cfg(not(feature = "embeddings"))]
    vector_mem: Mutex<std::collections::HashMap<i64, VectorRow>>,
}

impl SqliteStore {
    pub fn new(conn: Connection, embedder: Arc<dyn Embedder>, tokenizer: Arc<dyn Tokenizer>) -> CoreResult<Self> {
        schema::init_schema(&conn)?;
        #[cfg(feature = "embeddings")]
        {
            schema::create_vector_table(&conn, embedder.dimensions())?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
            tokenizer,
            #[cfg(not(feature = "embeddings"))]
            vector_mem: Mutex::new(std::collections::HashMap::new()),
        })
    }

    pub fn open_with(
        path: impl AsRef<Path>,
        embedder: Arc<dyn Embedder>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> CoreResult<Self> {
        Self::new(Connection::open(path)?, embedder, tokenizer)
    }

    pub fn open_in_memory_with(embedder: Arc<dyn Embedder>, tokenizer: Arc<dyn Tokenizer>) -> CoreResult<Self> {
        Self::new(Connection::open_in_memory()?, embedder, tokenizer)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("sqlite connection mutex poisoned")
    }

    fn prepare_fts_text(&self, text: &str) -> String {
        self.tokenizer.tokenize(text).join(" ")
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        Self::open_with(path, Arc::new(crate::index::MockEmbedder::new(768)), Arc::new(crate::index::WhitespaceTokenizer))
    }

    fn open_in_memory() -> CoreResult<Self> {
        Self::open_in_memory_with(Arc::new(crate::index::MockEmbedder::new(768)), Arc::new(crate::index::WhitespaceTokenizer))
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn parse_ts(s: &str) -> CoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::InvalidArgument(format!("invalid timestamp '{s}': {e}")))
}

fn row_to_library(row: &rusqlite::Row<'_>) -> rusqlite::Result<Library> {
    Ok(Library { id: LibraryId(row.get(0)?), name: row.get(1)? })
}

fn row_to_folder(row: &rusqlite::Row<'_>) -> rusqlite::Result<(FolderId, LibraryId, String, String, String)> {
    Ok((FolderId(row.get(0)?), LibraryId(row.get(1)?), row.get(2)?, row.get(3)?, row.get(4)?))
}

fn row_to_plugin(row: &rusqlite::Row<'_>) -> rusqlite::Result<Plugin> {
    Ok(Plugin {
        id: PluginId(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        webhook_url: row.get(3)?,
    })
}

struct EntityRow {
    id: EntityId,
    library_id: LibraryId,
    folder_id: Option<FolderId>,
    filepath: String,
    file_type_group: String,
    file_created_at: String,
    last_scan_at: String,
}

fn row_to_entity_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntityRow> {
    Ok(EntityRow {
        id: EntityId(row.get(0)?),
        library_id: LibraryId(row.get(1)?),
        folder_id: row.get::<_, Option<i64>>(2)?.map(FolderId),
        filepath: row.get(3)?,
        file_type_group: row.get(4)?,
        file_created_at: row.get(5)?,
        last_scan_at: row.get(6)?,
    })
}

const ENTITY_COLUMNS: &str = "id, library_id, folder_id, filepath, file_type_group, file_created_at, last_scan_at";

impl SqliteStore {
    fn hydrate(&self, conn: &Connection, row: EntityRow) -> CoreResult<Entity> {
        let mut tag_stmt = conn.prepare(
            "SELECT t.id, t.name FROM tags t JOIN entity_tags et ON et.tag_id = t.id \
             WHERE et.entity_id = ?1 ORDER BY et.attached_at ASC",
        )?;
        let tags = tag_stmt
            .query_map(params![row.id.0], |r| Ok(Tag { id: TagId(r.get(0)?), name: r.get(1)? }))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut meta_stmt = conn.prepare(
            "SELECT entity_id, key, value, source, source_type, data_type FROM metadata_entries \
             WHERE entity_id = ?1 ORDER BY attached_at ASC",
        )?;
        let metadata_entries = meta_stmt
            .query_map(params![row.id.0], |r| {
                let data_type: String = r.get(5)?;
                Ok(MetadataEntry {
                    entity_id: EntityId(r.get(0)?),
                    key: r.get(1)?,
                    value: r.get(2)?,
                    source: r.get(3)?,
                    source_type: r.get(4)?,
                    data_type: data_type.parse().unwrap_or(DataType::Text),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Entity {
            id: row.id,
            library_id: row.library_id,
            folder_id: row.folder_id,
            filepath: row.filepath,
            file_type_group: row.file_type_group,
            file_created_at: parse_ts(&row.file_created_at)?,
            last_scan_at: parse_ts(&row.last_scan_at)?,
            tags,
            metadata_entries,
        })
    }

    fn resolve_or_create_tag(&self, conn: &Connection, name: &str) -> CoreResult<TagId> {
        if let Some(id) = conn
            .query_row("SELECT id FROM tags WHERE name = ?1", params![name], |r| r.get::<_, i64>(0))
            .optional()?
        {
            return Ok(TagId(id));
        }
        conn.execute("INSERT INTO tags (name) VALUES (?1)", params![name])?;
        Ok(TagId(conn.last_insert_rowid()))
    }

    fn insert_metadata(&self, conn: &Connection, entity_id: EntityId, entries: &[NewMetadataEntry], offset: i64) -> CoreResult<()> {
        for (i, entry) in entries.iter().enumerate() {
            let source_type = entry.source.as_ref().map(|_| "plugin_generated");
            conn.execute(
                "INSERT INTO metadata_entries (entity_id, key, value, source, source_type, data_type, attached_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![entity_id.0, entry.key, entry.value, entry.source, source_type, entry.data_type.as_str(), offset + i as i64],
            )?;
        }
        Ok(())
    }

    fn touch_last_scan(&self, conn: &Connection, entity_id: EntityId) -> CoreResult<()> {
        conn.execute(
            "UPDATE entities SET last_scan_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), entity_id.0],
        )?;
        Ok(())
    }

    fn apply_entity_filter(
        &self,
        clauses: &mut Vec<String>,
        args: &mut Vec<Box<dyn ToSql>>,
        filter: &EntityFilter,
        entity_alias: &str,
    ) {
        if let Some(lib_ids) = &filter.library_ids {
            let placeholders: Vec<String> = lib_ids.iter().map(|_| "?".to_string()).collect();
            clauses.push(format!("{entity_alias}.library_id IN ({})", placeholders.join(", ")));
            for id in lib_ids {
                args.push(Box::new(id.0));
            }
        }
        if let (Some(start), Some(end)) = (filter.start, filter.end) {
            clauses.push(format!(
                "strftime('%s', {entity_alias}.file_created_at) >= ? AND strftime('%s', {entity_alias}.file_created_at) <= ?"
            ));
            args.push(Box::new(start));
            args.push(Box::new(end));
        }
        if let Some(app_names) = &filter.app_names {
            let placeholders: Vec<String> = app_names.iter().map(|_| "?".to_string()).collect();
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM metadata_entries me WHERE me.entity_id = {entity_alias}.id \
                 AND me.key = 'active_app' AND me.value IN ({}))",
                placeholders.join(", ")
            ));
            for name in app_names {
                args.push(Box::new(name.clone()));
            }
        }
    }
}

impl EntityStore for SqliteStore {
    fn create_library(&self, name: &str) -> CoreResult<Library> {
        let conn = self.conn();
        conn.execute("INSERT INTO libraries (name) VALUES (?1)", params![name]).map_err(|e| {
            if is_unique_violation(&e) {
                CoreError::Conflict(format!("library name already exists: {name}"))
            } else {
                CoreError::from(e)
            }
        })?;
        Ok(Library { id: LibraryId(conn.last_insert_rowid()), name: name.to_string() })
    }

    fn get_library_by_id(&self, id: LibraryId) -> CoreResult<Option<Library>> {
        let conn = self.conn();
        Ok(conn
            .query_row("SELECT id, name FROM libraries WHERE id = ?1", params![id.0], row_to_library)
            .optional()?)
    }

    fn get_library_by_name(&self, name: &str) -> CoreResult<Option<Library>> {
        let conn = self.conn();
        Ok(conn
            .query_row(
                "SELECT id, name FROM libraries WHERE name = ?1 COLLATE NOCASE",
                params![name],
                row_to_library,
            )
            .optional()?)
    }

    fn add_folder(&self, library_id: LibraryId, path: &str, folder_type: &str) -> CoreResult<Folder> {
        let conn = self.conn();
        if self.get_library_by_id(library_id)?.is_none() {
            return Err(CoreError::NotFound(format!("library {library_id} not found")));
        }
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO folders (library_id, path, last_modified_at, type) VALUES (?1, ?2, ?3, ?4)",
            params![library_id.0, path, now, folder_type],
        )?;
        let id = FolderId(conn.last_insert_rowid());
        Ok(Folder { id, library_id, path: path.to_string(), last_modified_at: parse_ts(&now)?, folder_type: folder_type.to_string() })
    }

    fn create_plugin(&self, name: &str, description: Option<&str>, webhook_url: Option<&str>) -> CoreResult<Plugin> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO plugins (name, description, webhook_url) VALUES (?1, ?2, ?3)",
            params![name, description, webhook_url],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                CoreError::Conflict(format!("plugin name already exists: {name}"))
            } else {
                CoreError::from(e)
            }
        })?;
        Ok(Plugin {
            id: PluginId(conn.last_insert_rowid()),
            name: name.to_string(),
            description: description.map(str::to_string),
            webhook_url: webhook_url.map(str::to_string),
        })
    }

    fn get_plugin_by_name(&self, name: &str) -> CoreResult<Option<Plugin>> {
        let conn = self.conn();
        Ok(conn
            .query_row(
                "SELECT id, name, description, webhook_url FROM plugins WHERE name = ?1 COLLATE NOCASE",
                params![name],
                row_to_plugin,
            )
            .optional()?)
    }

    fn add_plugin_to_library(&self, library_id: LibraryId, plugin_id: PluginId) -> CoreResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO library_plugins (library_id, plugin_id) VALUES (?1, ?2)",
            params![library_id.0, plugin_id.0],
        )?;
        Ok(())
    }

    fn remove_plugin_from_library(&self, library_id: LibraryId, plugin_id: PluginId) -> CoreResult<()> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM library_plugins WHERE library_id = ?1 AND plugin_id = ?2",
            params![library_id.0, plugin_id.0],
        )?;
        Ok(())
    }

    fn create_entity(&self, library_id: LibraryId, payload: NewEntity) -> CoreResult<Entity> {
        let mut conn = self.conn();
        if self.get_library_by_id(library_id)?.is_none() {
            return Err(CoreError::NotFound(format!("library {library_id} not found")));
        }
        let tx = conn.transaction()?;
        let now = Utc::now();
        tx.execute(
            "INSERT INTO entities (library_id, folder_id, filepath, file_type_group, file_created_at, last_scan_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                library_id.0,
                payload.folder_id.map(|f| f.0),
                payload.filepath,
                payload.file_type_group,
                payload.file_created_at.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                CoreError::Conflict(format!("entity filepath already exists: {}", payload.filepath))
            } else {
                CoreError::from(e)
            }
        })?;
        let entity_id = EntityId(tx.last_insert_rowid());

        for (i, name) in payload.tags.iter().enumerate() {
            let tag_id = self.resolve_or_create_tag(&tx, name)?;
            tx.execute(
                "INSERT OR IGNORE INTO entity_tags (entity_id, tag_id, source, attached_at) VALUES (?1, ?2, ?3, ?4)",
                params![entity_id.0, tag_id.0, TagSource::PluginGenerated.as_str(), i as i64],
            )?;
        }
        self.insert_metadata(&tx, entity_id, &payload.metadata, 0)?;
        tx.commit()?;
        drop(conn);

        let conn = self.conn();
        let row = conn.query_row(
            &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1"),
            params![entity_id.0],
            row_to_entity_row,
        )?;
        self.hydrate(&conn, row)
    }

    fn get_entity(&self, id: EntityId) -> CoreResult<Option<Entity>> {
        let conn = self.conn();
        let row = conn
            .query_row(&format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1"), params![id.0], row_to_entity_row)
            .optional()?;
        row.map(|r| self.hydrate(&conn, r)).transpose()
    }

    fn get_entity_by_filepath(&self, filepath: &str) -> CoreResult<Option<Entity>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE filepath = ?1"),
                params![filepath],
                row_to_entity_row,
            )
            .optional()?;
        row.map(|r| self.hydrate(&conn, r)).transpose()
    }

    fn list_entities(&self, filter: &EntityFilter) -> CoreResult<Vec<Entity>> {
        let conn = self.conn();
        let mut clauses = vec!["file_type_group = 'image'".to_string()];
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();
        self.apply_entity_filter(&mut clauses, &mut args, filter, "entities");
        let limit = filter.limit.unwrap_or(1000);
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE {} ORDER BY file_created_at ASC LIMIT {}",
            clauses.join(" AND "),
            limit
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter().map(|b| b.as_ref())), row_to_entity_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(|r| self.hydrate(&conn, r)).collect()
    }

    fn get_entities_of_folder(&self, folder_id: FolderId, limit: Option<usize>) -> CoreResult<Vec<Entity>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE folder_id = ?1 ORDER BY id ASC LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![folder_id.0, limit.unwrap_or(1000) as i64], row_to_entity_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(|r| self.hydrate(&conn, r)).collect()
    }

    fn update_entity(&self, id: EntityId, update: EntityUpdate) -> CoreResult<Entity> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let existing = tx
            .query_row(&format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1"), params![id.0], row_to_entity_row)
            .optional()?
            .ok_or_else(|| CoreError::NotFound(format!("entity {id} not found")))?;

        let new_folder_id = update.folder_id.unwrap_or(existing.folder_id);
        let new_filepath = update.filepath.clone().unwrap_or(existing.filepath.clone());
        let new_file_type_group = update.file_type_group.clone().unwrap_or(existing.file_type_group.clone());
        let new_file_created_at = update.file_created_at.map(|d| d.to_rfc3339()).unwrap_or(existing.file_created_at.clone());

        tx.execute(
            "UPDATE entities SET folder_id = ?1, filepath = ?2, file_type_group = ?3, file_created_at = ?4 WHERE id = ?5",
            params![new_folder_id.map(|f| f.0), new_filepath, new_file_type_group, new_file_created_at, id.0],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                CoreError::Conflict(format!("entity filepath already exists: {new_filepath}"))
            } else {
                CoreError::from(e)
            }
        })?;

        let mutated_children = update.tags.is_some() || update.metadata_entries.is_some();

        if let Some(tags) = &update.tags {
            tx.execute("DELETE FROM entity_tags WHERE entity_id = ?1", params![id.0])?;
            for (i, name) in tags.iter().enumerate() {
                let tag_id = self.resolve_or_create_tag(&tx, name)?;
                tx.execute(
                    "INSERT OR IGNORE INTO entity_tags (entity_id, tag_id, source, attached_at) VALUES (?1, ?2, ?3, ?4)",
                    params![id.0, tag_id.0, TagSource::User.as_str(), i as i64],
                )?;
            }
        }
        if let Some(entries) = &update.metadata_entries {
            tx.execute("DELETE FROM metadata_entries WHERE entity_id = ?1", params![id.0])?;
            self.insert_metadata(&tx, id, entries, 0)?;
        }
        if mutated_children {
            tx.execute("UPDATE entities SET last_scan_at = ?1 WHERE id = ?2", params![Utc::now().to_rfc3339(), id.0])?;
        }
        tx.commit()?;
        drop(conn);

        let conn = self.conn();
        let row = conn.query_row(&format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1"), params![id.0], row_to_entity_row)?;
        self.hydrate(&conn, row)
    }

    fn touch_entity(&self, id: EntityId) -> CoreResult<()> {
        let conn = self.conn();
        let affected = conn.execute(
            "UPDATE entities SET last_scan_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id.0],
        )?;
        if affected == 0 {
            return Err(CoreError::NotFound(format!("entity {id} not found")));
        }
        Ok(())
    }

    fn remove_entity(&self, id: EntityId) -> CoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let exists: bool = tx.query_row("SELECT 1 FROM entities WHERE id = ?1", params![id.0], |_| Ok(true)).optional()?.unwrap_or(false);
        if !exists {
            return Err(CoreError::NotFound(format!("entity {id} not found")));
        }
        tx.execute("DELETE FROM entities_fts WHERE rowid = ?1", params![id.0])?;
        #[cfg(feature = "embeddings")]
        tx.execute("DELETE FROM entities_vec_v2 WHERE rowid = ?1", params![id.0])?;
        tx.execute("DELETE FROM entities WHERE id = ?1", params![id.0])?;
        tx.commit()?;
        #[cfg(not(feature = "embeddings"))]
        self.vector_mem.lock().expect("vector_mem mutex poisoned").remove(&id.0);
        Ok(())
    }

    fn update_tags(&self, id: EntityId, tags: &[String]) -> CoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let exists: bool = tx.query_row("SELECT 1 FROM entities WHERE id = ?1", params![id.0], |_| Ok(true)).optional()?.unwrap_or(false);
        if !exists {
            return Err(CoreError::NotFound(format!("entity {id} not found")));
        }
        tx.execute("DELETE FROM entity_tags WHERE entity_id = ?1", params![id.0])?;
        for (i, name) in tags.iter().enumerate() {
            let tag_id = self.resolve_or_create_tag(&tx, name)?;
            tx.execute(
                "INSERT OR IGNORE INTO entity_tags (entity_id, tag_id, source, attached_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.0, tag_id.0, TagSource::User.as_str(), i as i64],
            )?;
        }
        tx.execute("UPDATE entities SET last_scan_at = ?1 WHERE id = ?2", params![Utc::now().to_rfc3339(), id.0])?;
        tx.commit()?;
        Ok(())
    }

    fn add_tags(&self, id: EntityId, tags: &[String]) -> CoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let exists: bool = tx.query_row("SELECT 1 FROM entities WHERE id = ?1", params![id.0], |_| Ok(true)).optional()?.unwrap_or(false);
        if !exists {
            return Err(CoreError::NotFound(format!("entity {id} not found")));
        }
        let offset: i64 = tx
            .query_row("SELECT COUNT(*) FROM entity_tags WHERE entity_id = ?1", params![id.0], |r| r.get(0))
            .unwrap_or(0);
        for (i, name) in tags.iter().enumerate() {
            let tag_id = self.resolve_or_create_tag(&tx, name)?;
            tx.execute(
                "INSERT OR IGNORE INTO entity_tags (entity_id, tag_id, source, attached_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.0, tag_id.0, TagSource::User.as_str(), offset + i as i64],
            )?;
        }
        tx.execute("UPDATE entities SET last_scan_at = ?1 WHERE id = ?2", params![Utc::now().to_rfc3339(), id.0])?;
        tx.commit()?;
        Ok(())
    }

    fn update_metadata_entries(&self, id: EntityId, entries: &[NewMetadataEntry]) -> CoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let exists: bool = tx.query_row("SELECT 1 FROM entities WHERE id = ?1", params![id.0], |_| Ok(true)).optional()?.unwrap_or(false);
        if !exists {
            return Err(CoreError::NotFound(format!("entity {id} not found")));
        }
        let next_offset: i64 = tx
            .query_row("SELECT COALESCE(MAX(attached_at), -1) + 1 FROM metadata_entries WHERE entity_id = ?1", params![id.0], |r| r.get(0))
            .unwrap_or(0);
        for (i, entry) in entries.iter().enumerate() {
            let existing: Option<(Option<String>, Option<String>, i64)> = tx
                .query_row(
                    "SELECT source, source_type, attached_at FROM metadata_entries WHERE entity_id = ?1 AND key = ?2",
                    params![id.0, entry.key],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )
                .optional()?;
            match existing {
                Some((prior_source, prior_source_type, attached_at)) => {
                    let source = entry.source.clone().or(prior_source);
                    let source_type = if entry.source.is_some() { Some("plugin_generated".to_string()) } else { prior_source_type };
                    tx.execute(
                        "UPDATE metadata_entries SET value = ?1, source = ?2, source_type = ?3, data_type = ?4 \
                         WHERE entity_id = ?5 AND key = ?6",
                        params![entry.value, source, source_type, entry.data_type.as_str(), id.0, entry.key],
                    )?;
                    let _ = attached_at;
                }
                None => {
                    let source_type = entry.source.as_ref().map(|_| "plugin_generated");
                    tx.execute(
                        "INSERT INTO metadata_entries (entity_id, key, value, source, source_type, data_type, attached_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![id.0, entry.key, entry.value, entry.source, source_type, entry.data_type.as_str(), next_offset + i as i64],
                    )?;
                }
            }
        }
        tx.execute("UPDATE entities SET last_scan_at = ?1 WHERE id = ?2", params![Utc::now().to_rfc3339(), id.0])?;
        tx.commit()?;
        Ok(())
    }

    fn get_entity_context(&self, library_id: LibraryId, id: EntityId, prev: usize, next: usize) -> CoreResult<(Vec<Entity>, Vec<Entity>)> {
        let conn = self.conn();
        let target = conn
            .query_row(&format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1"), params![id.0], row_to_entity_row)
            .optional()?
            .ok_or_else(|| CoreError::NotFound(format!("entity {id} not found")))?;

        let mut before_stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE library_id = ?1 AND \
             (file_created_at < ?2 OR (file_created_at = ?2 AND id < ?3)) \
             ORDER BY file_created_at DESC, id DESC LIMIT ?4"
        ))?;
        let mut before_rows = before_stmt
            .query_map(params![library_id.0, target.file_created_at, id.0, prev as i64], row_to_entity_row)?
            .collect::<Result<Vec<_>, _>>()?;
        before_rows.reverse();

        let mut after_stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE library_id = ?1 AND \
             (file_created_at > ?2 OR (file_created_at = ?2 AND id > ?3)) \
             ORDER BY file_created_at ASC, id ASC LIMIT ?4"
        ))?;
        let after_rows = after_stmt
            .query_map(params![library_id.0, target.file_created_at, id.0, next as i64], row_to_entity_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let before = before_rows.into_iter().map(|r| self.hydrate(&conn, r)).collect::<CoreResult<Vec<_>>>()?;
        let after = after_rows.into_iter().map(|r| self.hydrate(&conn, r)).collect::<CoreResult<Vec<_>>>()?;
        Ok((before, after))
    }

    fn record_plugin_processed(&self, entity_id: EntityId, plugin_id: PluginId) -> CoreResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO entity_plugin_status (entity_id, plugin_id) VALUES (?1, ?2)",
            params![entity_id.0, plugin_id.0],
        )?;
        Ok(())
    }

    fn get_pending_plugins(&self, entity_id: EntityId, library_id: LibraryId) -> CoreResult<Vec<Plugin>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT p.id, p.name, p.description, p.webhook_url FROM plugins p \
             JOIN library_plugins lp ON lp.plugin_id = p.id \
             WHERE lp.library_id = ?1 AND p.id NOT IN \
             (SELECT plugin_id FROM entity_plugin_status WHERE entity_id = ?2)",
        )?;
        let rows = stmt.query_map(params![library_id.0, entity_id.0], row_to_plugin)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ===== C3 / C4 / C5 / C7: SearchProvider =====

impl SqliteStore {
    fn upsert_fts_row(&self, conn: &Connection, entity: &Entity) -> CoreResult<()> {
        let tags_text = self.prepare_fts_text(&render_fts_tags(&entity.tags));
        let metadata_text = self.prepare_fts_text(&render_fts_metadata(&entity.metadata_entries));
        let filepath_text = self.prepare_fts_text(&entity.filepath);
        conn.execute("DELETE FROM entities_fts WHERE rowid = ?1", params![entity.id.0])?;
        conn.execute(
            "INSERT INTO entities_fts (rowid, filepath, tags, metadata) VALUES (?1, ?2, ?3, ?4)",
            params![entity.id.0, filepath_text, tags_text, metadata_text],
        )?;
        Ok(())
    }

    fn embed_one(&self, text: &str) -> Option<Vec<f32>> {
        match self.embedder.embed_batch(&[text]) {
            Ok(mut vecs) if !vecs.is_empty() => Some(vecs.remove(0)),
            _ => None,
        }
    }
}

#[cfg(feature = "embeddings")]
impl SqliteStore {
    fn existing_vector_created_at(&self, conn: &Connection, entity_id: EntityId) -> CoreResult<Option<i64>> {
        Ok(conn
            .query_row(
                "SELECT created_at_timestamp FROM entities_vec_v2 WHERE rowid = ?1",
                params![entity_id.0],
                |r| r.get(0),
            )
            .optional()?)
    }

    fn delete_vector_row(&self, conn: &Connection, entity_id: EntityId) -> CoreResult<()> {
        conn.execute("DELETE FROM entities_vec_v2 WHERE rowid = ?1", params![entity_id.0])?;
        Ok(())
    }

    fn insert_vector_row(&self, conn: &Connection, entity_id: EntityId, mut row: VectorRow) -> CoreResult<()> {
        super::vector_row::l2_normalize(&mut row.embedding);
        let bytes = f32_slice_as_bytes(&row.embedding);
        conn.execute(
            "INSERT INTO entities_vec_v2 (rowid, embedding, file_type_group, created_at_timestamp, \
             file_created_at_timestamp, file_created_at_date, app_name, library_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entity_id.0,
                bytes,
                row.file_type_group,
                row.created_at_timestamp,
                row.file_created_at_timestamp,
                row.file_created_at_date,
                row.app_name,
                row.library_id.0,
            ],
        )?;
        Ok(())
    }

    fn run_vector_search(&self, embedding: &[f32], limit: usize, filters: &EntityFilter) -> CoreResult<Vec<EntityId>> {
        let conn = self.conn();
        let mut normalized = embedding.to_vec();
        super::vector_row::l2_normalize(&mut normalized);
        let bytes = f32_slice_as_bytes(&normalized);

        let mut clauses = vec!["file_type_group = 'image'".to_string()];
        let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(bytes), Box::new(limit as i64)];
        if let (Some(start), Some(end)) = (filters.start, filters.end) {
            let start_date = Utc.timestamp_opt(start, 0).single().map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
            let end_date = Utc.timestamp_opt(end, 0).single().map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
            clauses.push("file_created_at_date BETWEEN ? AND ?".to_string());
            args.push(Box::new(start_date));
            args.push(Box::new(end_date));
            clauses.push("file_created_at_timestamp >= ? AND file_created_at_timestamp <= ?".to_string());
            args.push(Box::new(start));
            args.push(Box::new(end));
        }
        if let Some(lib_ids) = &filters.library_ids {
            let placeholders: Vec<String> = lib_ids.iter().map(|_| "?".to_string()).collect();
            clauses.push(format!("library_id IN ({})", placeholders.join(", ")));
            for id in lib_ids {
                args.push(Box::new(id.0));
            }
        }
        if let Some(app_names) = &filters.app_names {
            let placeholders: Vec<String> = app_names.iter().map(|_| "?".to_string()).collect();
            clauses.push(format!("app_name IN ({})", placeholders.join(", ")));
            for name in app_names {
                args.push(Box::new(name.clone()));
            }
        }

        let sql = format!(
            "SELECT rowid FROM entities_vec_v2 WHERE embedding MATCH ?1 AND k = ?2 AND {} ORDER BY distance ASC",
            clauses.join(" AND ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(args.iter().map(|b| b.as_ref())), |r| r.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().map(EntityId).collect())
    }
}

#[cfg(not(feature = "embeddings"))]
impl SqliteStore {
    fn existing_vector_created_at(&self, _conn: &Connection, entity_id: EntityId) -> CoreResult<Option<i64>> {
        Ok(self.vector_mem.lock().expect("vector_mem mutex poisoned").get(&entity_id.0).map(|r| r.created_at_timestamp))
    }

    fn delete_vector_row(&self, _conn: &Connection, entity_id: EntityId) -> CoreResult<()> {
        self.vector_mem.lock().expect("vector_mem mutex poisoned").remove(&entity_id.0);
        Ok(())
    }

    fn insert_vector_row(&self, _conn: &Connection, entity_id: EntityId, mut row: VectorRow) -> CoreResult<()> {
        super::vector_row::l2_normalize(&mut row.embedding);
        self.vector_mem.lock().expect("vector_mem mutex poisoned").insert(entity_id.0, row);
        Ok(())
    }

    fn run_vector_search(&self, embedding: &[f32], limit: usize, filters: &EntityFilter) -> CoreResult<Vec<EntityId>> {
        let mut normalized = embedding.to_vec();
        super::vector_row::l2_normalize(&mut normalized);
        let store = self.vector_mem.lock().expect("vector_mem mutex poisoned");
        let mut scored: Vec<(i64, f32)> = store
            .iter()
            .filter(|(_, row)| row.file_type_group == "image")
            .filter(|(_, row)| {
                if let (Some(start), Some(end)) = (filters.start, filters.end) {
                    row.file_created_at_timestamp >= start && row.file_created_at_timestamp <= end
                } else {
                    true
                }
            })
            .filter(|(_, row)| {
                filters.library_ids.as_ref().map(|ids| ids.iter().any(|id| id.0 == row.library_id.0)).unwrap_or(true)
            })
            .filter(|(_, row)| {
                filters.app_names.as_ref().map(|names| names.contains(&row.app_name)).unwrap_or(true)
            })
            .map(|(id, row)| (*id, crate::index::cosine_similarity(&normalized, &row.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(id, _)| EntityId(id)).collect())
    }
}

fn f32_slice_as_bytes(v: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(v.len() * 4);
    for x in v {
        bytes.extend_from_slice(&x.to_le_bytes());
    }
    bytes
}

impl SearchProvider for SqliteStore {
    fn update_entity_index(&self, entity_id: EntityId) -> CoreResult<()> {
        let entity = EntityStore::get_entity(self, entity_id)?
            .ok_or_else(|| CoreError::NotFound(format!("entity {entity_id} not found")))?;
        let conn = self.conn();
        self.upsert_fts_row(&conn, &entity)?;

        let vector_text = render_vector_text(&entity.metadata_entries);
        if let Some(embedding) = self.embed_one(&vector_text) {
            self.delete_vector_row(&conn, entity_id)?;
            let row = build_vector_row(&entity, embedding, Utc::now());
            self.insert_vector_row(&conn, entity_id, row)?;
        }
        Ok(())
    }

    fn batch_update_entity_indices(&self, entity_ids: &[EntityId]) -> CoreResult<BatchIndexReport> {
        let mut entities = Vec::with_capacity(entity_ids.len());
        let mut missing = Vec::new();
        for &id in entity_ids {
            match EntityStore::get_entity(self, id)? {
                Some(e) => entities.push(e),
                None => missing.push(id),
            }
        }
        if !missing.is_empty() {
            return Err(CoreError::MissingEntities(missing));
        }

        let conn = self.conn();
        for entity in &entities {
            self.upsert_fts_row(&conn, entity)?;
        }

        let mut to_reindex = Vec::new();
        let mut skipped = Vec::new();
        for entity in &entities {
            let existing = self.existing_vector_created_at(&conn, entity.id)?;
            if needs_reindex(entity.last_scan_at, existing) {
                to_reindex.push(entity);
            } else {
                skipped.push(entity.id);
            }
        }

        if !to_reindex.is_empty() {
            let texts: Vec<String> = to_reindex.iter().map(|e| render_vector_text(&e.metadata_entries)).collect();
            let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            match self.embedder.embed_batch(&text_refs) {
                Ok(vectors) if vectors.len() == to_reindex.len() => {
                    for (entity, embedding) in to_reindex.iter().zip(vectors) {
                        self.delete_vector_row(&conn, entity.id)?;
                        let row = build_vector_row(entity, embedding, Utc::now());
                        self.insert_vector_row(&conn, entity.id, row)?;
                    }
                }
                _ => {
                    // embed() unavailable: FTS already rewritten above; leave
                    // these entities' vectors stale rather than failing the batch.
                    skipped.extend(to_reindex.iter().map(|e| e.id));
                    return Ok(BatchIndexReport { reindexed: Vec::new(), skipped });
                }
            }
        }

        Ok(BatchIndexReport { reindexed: to_reindex.iter().map(|e| e.id).collect(), skipped })
    }

    fn full_text_search(&self, query: &str, limit: usize, filters: &EntityFilter) -> CoreResult<Vec<EntityId>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let expr = self.tokenizer.query_expand(query);
        if expr.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        let mut clauses = vec!["e.file_type_group = 'image'".to_string()];
        let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(expr)];
        self.apply_entity_filter(&mut clauses, &mut args, filters, "e");
        args.push(Box::new(limit as i64));
        let sql = format!(
            "SELECT f.rowid FROM entities_fts f JOIN entities e ON e.id = f.rowid \
             WHERE entities_fts MATCH ?1 AND {} ORDER BY rank ASC LIMIT ?{}",
            clauses.join(" AND "),
            args.len()
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(args.iter().map(|b| b.as_ref())), |r| r.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().map(EntityId).collect())
    }

    fn vector_search(&self, embedding: &[f32], limit: usize, filters: &EntityFilter) -> CoreResult<Vec<EntityId>> {
        self.run_vector_search(embedding, limit, filters)
    }

    fn get_search_stats(&self, query: &str, filters: &EntityFilter) -> CoreResult<SearchStats> {
        if query.trim().is_empty() {
            return Err(CoreError::InvalidArgument("facets require a non-empty query".to_string()));
        }
        let f_prime = self.full_text_search(query, MAX_SAMPLE, filters)?;
        let vec_limit = (f_prime.len() * 2).min(MAX_SAMPLE).max(MIN_SAMPLE);
        let v_prime = match self.embed_one(query) {
            Some(embedding) => self.run_vector_search(&embedding, vec_limit, filters)?,
            None => Vec::new(),
        };

        let mut seen = std::collections::HashSet::new();
        let mut sample = Vec::new();
        for id in f_prime.into_iter().chain(v_prime) {
            if seen.insert(id) {
                sample.push(id);
            }
        }
        if sample.is_empty() {
            return Ok(SearchStats::default());
        }

        let conn = self.conn();
        let placeholders: Vec<String> = sample.iter().map(|_| "?".to_string()).collect();
        let args: Vec<Box<dyn ToSql>> = sample.iter().map(|id| Box::new(id.0) as Box<dyn ToSql>).collect();

        let (earliest, latest): (Option<String>, Option<String>) = conn.query_row(
            &format!(
                "SELECT MIN(file_created_at), MAX(file_created_at) FROM entities WHERE id IN ({})",
                placeholders.join(", ")
            ),
            params_from_iter(args.iter().map(|b| b.as_ref())),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let date_range = DateRange {
            earliest: earliest.map(|s| parse_ts(&s)).transpose()?,
            latest: latest.map(|s| parse_ts(&s)).transpose()?,
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT value, COUNT(*) FROM metadata_entries WHERE key = 'active_app' AND entity_id IN ({}) \
             GROUP BY value",
            placeholders.join(", ")
        ))?;
        let mut counts = stmt
            .query_map(params_from_iter(args.iter().map(|b| b.as_ref())), |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(SearchStats { date_range, app_name_counts: counts })
    }

    fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        self.embed_one(query)
    }
}
