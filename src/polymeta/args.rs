use clap::{Parser, Subcommand};
use polymeta::filter::FilterOp;
use polymeta::logging::LogFormat;
use polymeta::model::TypeTag;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "polymeta")]
#[command(about = "Inspect and edit typed metadata stored in a polymeta database", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// SQLite database, overrides the configured one
    #[arg(long, global = true, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Locale for reads and string writes (defaults to the configured default)
    #[arg(short, long, global = true)]
    pub locale: Option<String>,

    /// Log output format: human or json
    #[arg(long, global = true, default_value = "human")]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Set a meta value. VALUE is read as JSON when possible, else as a string
    Set {
        owner_type: String,
        owner_id: String,
        key: String,
        value: String,

        /// Store as this type instead of detecting it (boolean, number, string, json, date)
        #[arg(long = "as", value_name = "TAG")]
        as_type: Option<TypeTag>,
    },

    /// Read a meta value
    Get {
        owner_type: String,
        owner_id: String,
        key: String,

        /// Printed when the key is absent
        #[arg(short, long)]
        default: Option<String>,
    },

    /// Delete a meta value
    #[command(alias = "rm")]
    Forget {
        owner_type: String,
        owner_id: String,
        key: String,
    },

    /// Show every meta value of an owner
    #[command(alias = "ls")]
    List {
        owner_type: String,
        owner_id: String,
    },

    /// Show the meta keys of an owner
    Keys {
        owner_type: String,
        owner_id: String,
    },

    /// Find owners whose KEY compares to VALUE
    Find {
        owner_type: String,
        key: String,

        /// Comparison operator (=, !=, <, <=, >, >=)
        #[arg(long, default_value = "=", allow_hyphen_values = true)]
        op: FilterOp,

        value: String,
    },

    /// Find owners whose KEY equals any of VALUES
    FindIn {
        owner_type: String,
        key: String,
        values: Vec<String>,
    },

    /// Find owners whose KEY text matches a LIKE pattern (% and _)
    FindLike {
        owner_type: String,
        key: String,
        pattern: String,
    },

    /// Delete every meta value of an owner
    Purge {
        owner_type: String,
        owner_id: String,
    },
}
