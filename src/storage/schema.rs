//! Relational schema, FTS virtual table, and migrations (C1).
//!
//! Assembled the way a hand-rolled SQLite schema migrator works: idempotent
//! `CREATE TABLE IF NOT EXISTS` for the base shape, `PRAGMA`s for engine
//! behavior, and additive `ALTER TABLE` steps guarded by `pragma_table_info`
//! for anything added after the base schema shipped.

use crate::error::CoreResult;
use rusqlite::Connection;

const BASE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS libraries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE
);

CREATE TABLE IF NOT EXISTS folders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    library_id INTEGER NOT NULL REFERENCES libraries(id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    last_modified_at TEXT NOT NULL,
    type TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    library_id INTEGER NOT NULL REFERENCES libraries(id) ON DELETE CASCADE,
    folder_id INTEGER REFERENCES folders(id) ON DELETE SET NULL,
    filepath TEXT NOT NULL UNIQUE,
    file_type_group TEXT NOT NULL,
    file_created_at TEXT NOT NULL,
    last_scan_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS entity_tags (
    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    source TEXT NOT NULL,
    attached_at INTEGER NOT NULL,
    PRIMARY KEY (entity_id, tag_id)
);

CREATE TABLE IF NOT EXISTS metadata_entries (
    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    source TEXT,
    source_type TEXT,
    data_type TEXT NOT NULL,
    attached_at INTEGER NOT NULL,
    PRIMARY KEY (entity_id, key)
);

CREATE TABLE IF NOT EXISTS plugins (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    description TEXT,
    webhook_url TEXT
);

CREATE TABLE IF NOT EXISTS library_plugins (
    library_id INTEGER NOT NULL REFERENCES libraries(id) ON DELETE CASCADE,
    plugin_id INTEGER NOT NULL REFERENCES plugins(id) ON DELETE CASCADE,
    PRIMARY KEY (library_id, plugin_id)
);

CREATE TABLE IF NOT EXISTS entity_plugin_status (
    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    plugin_id INTEGER NOT NULL REFERENCES plugins(id) ON DELETE CASCADE,
    PRIMARY KEY (entity_id, plugin_id)
);

CREATE VIRTUAL TABLE IF NOT EXISTS entities_fts USING fts5(
    filepath,
    tags,
    metadata,
    prefix='2 3 4'
);
";

// entity_tags.attached_at and metadata_entries.attached_at record insertion
// order so FTS rendering can join tags/metadata in attachment order (C3).
// They were added after the base schema in the source system; kept here as
// an additive migration for parity with how real deployments evolve a
// SQLite schema without a destructive rewrite.
fn migrate_add_attached_at(conn: &Connection) -> CoreResult<()> {
    for (table, column) in [("entity_tags", "attached_at"), ("metadata_entries", "attached_at")] {
        let has_column: bool = conn
            .prepare(&format!("SELECT 1 FROM pragma_table_info('{table}') WHERE name = ?1"))?
            .exists([column])?;
        if !has_column {
            conn.execute_batch(&format!(
                "ALTER TABLE {table} ADD COLUMN {column} INTEGER NOT NULL DEFAULT 0;"
            ))?;
        }
    }
    Ok(())
}

// Grounded on `04acdaf75664_add_indices_to_entitytags_and_metadata.py`: exact
// index names carried over unchanged.
fn create_secondary_indexes(conn: &Connection) -> CoreResult<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_entity_tag_entity_id ON entity_tags(entity_id);
        CREATE INDEX IF NOT EXISTS idx_entity_tag_tag_id ON entity_tags(tag_id);
        CREATE INDEX IF NOT EXISTS idx_metadata_entity_id ON metadata_entries(entity_id);
        CREATE INDEX IF NOT EXISTS idx_metadata_key ON metadata_entries(key);
        CREATE INDEX IF NOT EXISTS idx_entities_library_id ON entities(library_id);
        CREATE INDEX IF NOT EXISTS idx_entities_file_created_at ON entities(file_created_at);
        ",
    )?;
    Ok(())
}

#[cfg(feature = "embeddings")]
pub fn create_vector_table(conn: &Connection, num_dim: usize) -> CoreResult<()> {
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS entities_vec_v2 USING vec0(
            embedding float[{num_dim}] distance_metric=cosine,
            file_type_group text,
            created_at_timestamp integer,
            file_created_at_timestamp integer,
            file_created_at_date text PARTITION KEY,
            app_name text,
            library_id integer
        );"
    ))?;
    Ok(())
}

/// Initializes or migrates the schema on a freshly opened connection.
pub fn init_schema(conn: &Connection) -> CoreResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch(BASE_SCHEMA)?;
    migrate_add_attached_at(conn)?;
    create_secondary_indexes(conn)?;
    Ok(())
}
