use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vecstream", version, about = "Embeddable vector database command line")]
pub struct Cli {
    /// Collection to operate on.
    #[arg(long, global = true, default_value = "default")]
    pub collection: String,

    /// Store root directory. Defaults to `$VECSTREAM_DB_PATH` or the OS default.
    #[arg(long = "db-path", global = true)]
    pub db_path: Option<PathBuf>,

    /// Emit machine-readable JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Embed `text` and store it under `id`.
    Add {
        text: String,
        id: String,
        /// Name of the embedding model (accepted for interface stability; unused).
        #[arg(long)]
        model: Option<String>,
    },
    /// Embed `text` and return the k most similar stored vectors.
    Search {
        text: String,
        #[arg(long, default_value_t = 10)]
        k: usize,
        #[arg(long)]
        threshold: Option<f32>,
        /// JSON object of dot-path equality predicates, ANDed together.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Print a stored vector and its metadata.
    Get { id: String },
    /// Remove a stored vector.
    Remove { id: String },
    /// Print collection statistics.
    Info,
    /// Remove every vector from the collection.
    Clear,
    /// Manage collections within the store.
    Collection {
        #[command(subcommand)]
        action: CollectionCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum CollectionCommand {
    Create { name: String },
    List,
    Delete { name: String },
}
