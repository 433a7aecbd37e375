use crate::cli::{Cli, Command, CollectionCommand};
use crate::embed::{embed, EMBED_DIM};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use vecstream_core::{CollectionManager, Error as CoreError, MetadataFilter};

/// Distinguishes user-caused failures (exit 1) from internal ones (exit 2),
/// mirroring the core's own recoverable-vs-fatal error taxonomy.
#[derive(Debug)]
pub enum CliError {
    User(String),
    Internal(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::User(m) | CliError::Internal(m) => write!(f, "{m}"),
        }
    }
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::User(_) => 1,
            CliError::Internal(_) => 2,
        }
    }
}

impl From<CoreError> for CliError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::DuplicateId(_)
            | CoreError::NotFound(_)
            | CoreError::DimensionMismatch { .. }
            | CoreError::EmptyVector
            | CoreError::InvalidParameter(_)
            | CoreError::CollectionExists(_)
            | CoreError::NoSuchCollection(_)
            | CoreError::InvalidName(_) => CliError::User(e.to_string()),
            CoreError::CorruptStore(_) | CoreError::Io(_) | CoreError::Json(_) | CoreError::IndexInconsistency(_) => {
                CliError::Internal(e.to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct SearchHit {
    id: String,
    similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
}

fn db_root(cli: &Cli) -> PathBuf {
    cli.db_path.clone().unwrap_or_else(vecstream_core::default_db_path)
}

pub fn run(cli: Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Add { text, id, model: _ } => cmd_add(&cli, text, id),
        Command::Search { text, k, threshold, filter } => cmd_search(&cli, text, *k, *threshold, filter.as_deref()),
        Command::Get { id } => cmd_get(&cli, id),
        Command::Remove { id } => cmd_remove(&cli, id),
        Command::Info => cmd_info(&cli),
        Command::Clear => cmd_clear(&cli),
        Command::Collection { action } => cmd_collection(&cli, action),
    }
}

fn open_or_create_collection(
    manager: &CollectionManager,
    name: &str,
) -> Result<std::sync::Arc<vecstream_core::Collection>, CliError> {
    match manager.get_collection(name) {
        Ok(c) => Ok(c),
        Err(CoreError::NoSuchCollection(_)) => Ok(manager.create_collection(name, None)?),
        Err(e) => Err(e.into()),
    }
}

fn cmd_add(cli: &Cli, text: &str, id: &str) -> Result<(), CliError> {
    let manager = CollectionManager::new(db_root(cli))?;
    let collection = open_or_create_collection(&manager, &cli.collection)?;
    let vector = embed(text, EMBED_DIM);
    collection.add_vector(id, vector, None)?;
    collection.save()?;
    if cli.json {
        println!("{}", serde_json::json!({"id": id, "status": "added"}));
    } else {
        println!("added {id}");
    }
    Ok(())
}

fn cmd_search(cli: &Cli, text: &str, k: usize, threshold: Option<f32>, filter: Option<&str>) -> Result<(), CliError> {
    let manager = CollectionManager::new(db_root(cli))?;
    let collection = manager.get_collection(&cli.collection)?;

    let parsed_filter = match filter {
        Some(raw) => {
            let obj: std::collections::BTreeMap<String, Value> =
                serde_json::from_str(raw).map_err(|e| CliError::User(format!("invalid --filter JSON: {e}")))?;
            Some(MetadataFilter::from_map(obj))
        }
        None => None,
    };

    let query = embed(text, EMBED_DIM);
    let hits = collection.search_similar(&query, k, None, parsed_filter.as_ref(), threshold)?;

    if cli.json {
        let out: Vec<SearchHit> = hits
            .into_iter()
            .map(|(id, similarity)| {
                let metadata = collection.get_vector_with_metadata(&id).ok().map(|(_, m)| m);
                SearchHit { id, similarity, metadata }
            })
            .collect();
        println!("{}", serde_json::to_string(&out).map_err(CoreError::from)?);
    } else {
        for (id, similarity) in hits {
            println!("{id}\t{similarity:.6}");
        }
    }
    Ok(())
}

fn cmd_get(cli: &Cli, id: &str) -> Result<(), CliError> {
    let manager = CollectionManager::new(db_root(cli))?;
    let collection = manager.get_collection(&cli.collection)?;
    let (vector, metadata) = collection.get_vector_with_metadata(id)?;
    if cli.json {
        println!("{}", serde_json::json!({"id": id, "vector": vector, "metadata": metadata}));
    } else {
        println!("id: {id}");
        println!("vector: {vector:?}");
        println!("metadata: {metadata}");
    }
    Ok(())
}

fn cmd_remove(cli: &Cli, id: &str) -> Result<(), CliError> {
    let manager = CollectionManager::new(db_root(cli))?;
    let collection = manager.get_collection(&cli.collection)?;
    collection.remove_vector(id)?;
    collection.save()?;
    if cli.json {
        println!("{}", serde_json::json!({"id": id, "status": "removed"}));
    } else {
        println!("removed {id}");
    }
    Ok(())
}

fn cmd_info(cli: &Cli) -> Result<(), CliError> {
    let manager = CollectionManager::new(db_root(cli))?;
    let collection = manager.get_collection(&cli.collection)?;
    let stats = collection.stats();
    if cli.json {
        println!("{}", serde_json::to_string(&stats).map_err(CoreError::from)?);
    } else {
        println!("collection: {}", stats.name);
        println!("count: {}", stats.count);
        println!("dimension: {:?}", stats.dimension);
        println!("dirty: {}", stats.dirty);
        println!("deleted_fraction: {:.4}", stats.deleted_fraction);
    }
    Ok(())
}

fn cmd_clear(cli: &Cli) -> Result<(), CliError> {
    let manager = CollectionManager::new(db_root(cli))?;
    let collection = manager.get_collection(&cli.collection)?;
    for id in collection.ids() {
        collection.remove_vector(&id)?;
    }
    collection.save()?;
    if cli.json {
        println!("{}", serde_json::json!({"status": "cleared"}));
    } else {
        println!("cleared {}", cli.collection);
    }
    Ok(())
}

fn cmd_collection(cli: &Cli, action: &CollectionCommand) -> Result<(), CliError> {
    let manager = CollectionManager::new(db_root(cli))?;
    match action {
        CollectionCommand::Create { name } => {
            manager.create_collection(name, None)?;
            if cli.json {
                println!("{}", serde_json::json!({"name": name, "status": "created"}));
            } else {
                println!("created {name}");
            }
        }
        CollectionCommand::List => {
            let names = manager.list_collections();
            if cli.json {
                println!("{}", serde_json::to_string(&names).map_err(CoreError::from)?);
            } else {
                for name in names {
                    println!("{name}");
                }
            }
        }
        CollectionCommand::Delete { name } => {
            manager.delete_collection(name)?;
            if cli.json {
                println!("{}", serde_json::json!({"name": name, "status": "deleted"}));
            } else {
                println!("deleted {name}");
            }
        }
    }
    Ok(())
}
