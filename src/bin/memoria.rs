//! Memoria CLI — local indexing and hybrid search over a memoria database.
//!
//! Usage:
//!   memoria init --db <path> [--library <name>]
//!   memoria add --db <path> --library <name> --filepath <path> [--tag t]... [--app name]
//!   memoria index <entity-id> --db <path>
//!   memoria search <query> --db <path> [--limit N] [--library <id>] [--app name]... [--facets]

use clap::{Parser, Subcommand};
use memoria::{Config, Entity, EntityFilter, EntityStore, LibraryId, NewEntity, NewMetadataEntry, SearchProvider};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "memoria", version, about = "Hybrid lexical + vector memory index")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a database and seed a library
    Init {
        #[arg(long)]
        db: PathBuf,
        #[arg(long, default_value = "default")]
        library: String,
    },
    /// Ingest one artifact as a new entity
    Add {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        library: String,
        #[arg(long)]
        filepath: String,
        #[arg(long, default_value = "image")]
        file_type_group: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        app: Option<String>,
    },
    /// Refresh the FTS and vector indexes for one entity
    Index {
        entity_id: i64,
        #[arg(long)]
        db: PathBuf,
    },
    /// Hybrid lexical + vector search
    Search {
        query: String,
        #[arg(long)]
        db: PathBuf,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        library: Option<i64>,
        #[arg(long = "app")]
        apps: Vec<String>,
        #[arg(long)]
        facets: bool,
    },
}

fn database_url(path: &PathBuf) -> String {
    format!("sqlite://{}", path.display())
}

fn print_entity(entity: &Entity) {
    println!(
        "#{} {} [{}] tags=[{}]",
        entity.id,
        entity.filepath,
        entity.file_type_group,
        entity.tags.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ")
    );
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { db, library } => {
            let backend = Config::new(database_url(&db)).open_backend();
            backend.and_then(|b| match b.get_library_by_name(&library) {
                Ok(Some(existing)) => {
                    println!("library '{}' already exists (id {})", existing.name, existing.id);
                    Ok(())
                }
                Ok(None) => b.create_library(&library).map(|lib| {
                    println!("created library '{}' (id {})", lib.name, lib.id);
                }),
                Err(e) => Err(e),
            })
        }
        Commands::Add { db, library, filepath, file_type_group, tags, app } => {
            Config::new(database_url(&db)).open_backend().and_then(|backend| {
                let lib = backend
                    .get_library_by_name(&library)?
                    .ok_or_else(|| memoria::CoreError::NotFound(format!("library '{library}' not found")))?;
                let metadata = app
                    .map(|value| {
                        vec![NewMetadataEntry {
                            key: memoria::ACTIVE_APP_KEY.to_string(),
                            value,
                            source: None,
                            data_type: memoria::DataType::Text,
                        }]
                    })
                    .unwrap_or_default();
                let entity = backend.create_entity(
                    lib.id,
                    NewEntity {
                        folder_id: None,
                        filepath,
                        file_type_group,
                        file_created_at: chrono::Utc::now(),
                        tags,
                        metadata,
                    },
                )?;
                print_entity(&entity);
                Ok(())
            })
        }
        Commands::Index { entity_id, db } => Config::new(database_url(&db)).open_backend().and_then(|backend| {
            backend.update_entity_index(memoria::EntityId(entity_id))?;
            println!("reindexed entity #{entity_id}");
            Ok(())
        }),
        Commands::Search { query, db, limit, library, apps, facets } => {
            Config::new(database_url(&db)).open_backend().and_then(|backend| {
                let mut filter = EntityFilter::new();
                if let Some(id) = library {
                    filter = filter.with_library_ids(vec![LibraryId(id)]);
                }
                if !apps.is_empty() {
                    filter = filter.with_app_names(apps);
                }
                let result = memoria::hybrid_search(backend.as_ref(), &query, limit, &filter, facets)?;
                if result.vector_degraded {
                    eprintln!("warning: vector search degraded, results are lexical-only");
                }
                for entity in &result.entities {
                    print_entity(entity);
                }
                if let Some(stats) = result.facets {
                    println!("date range: {:?} .. {:?}", stats.date_range.earliest, stats.date_range.latest);
                    for (app, count) in stats.app_name_counts {
                        println!("  {app}: {count}");
                    }
                }
                Ok(())
            })
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
