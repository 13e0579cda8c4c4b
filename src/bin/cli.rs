//! CaskKV CLI
//!
//! Command-line interface operating directly on a CaskKV data directory.

use clap::{Parser, Subcommand};
use caskkv::{CaskError, Config, Engine, IteratorOptions};
use tracing_subscriber::{fmt, EnvFilter};

/// CaskKV CLI
#[derive(Parser, Debug)]
#[command(name = "caskkv-cli")]
#[command(about = "CLI for the CaskKV storage engine")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./caskkv_data")]
    dir: String,

    /// Data file size in MB before rotation
    #[arg(short = 'f', long, default_value = "256")]
    file_size_mb: u64,

    /// fsync after every write
    #[arg(short, long)]
    sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Delete {
        /// The key to delete
        key: String,
    },

    /// List keys, optionally restricted to a prefix
    List {
        /// Only keys starting with this prefix
        #[arg(short, long, default_value = "")]
        prefix: String,

        /// Descending order
        #[arg(short, long)]
        reverse: bool,
    },

    /// Compact sealed data files
    Merge,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,caskkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::debug!("CaskKV CLI v{}", caskkv::VERSION);

    let data_file_size = match data_file_size(args.file_size_mb) {
        Ok(size) => size,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let config = Config::builder()
        .dir_path(&args.dir)
        .data_file_size(data_file_size)
        .sync_writes(args.sync)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&engine, args.command).and_then(|_| engine.close()) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

/// Convert `--file-size-mb` to bytes
fn data_file_size(mb: u64) -> caskkv::Result<u64> {
    mb.checked_mul(1024 * 1024)
        .ok_or_else(|| CaskError::Config(format!("file size of {} MB is too large", mb)))
}

fn run(engine: &Engine, command: Commands) -> caskkv::Result<()> {
    match command {
        Commands::Get { key } => match engine.get(key.as_bytes()) {
            Ok(value) => println!("{}", String::from_utf8_lossy(&value)),
            Err(CaskError::KeyNotFound) => println!("(nil)"),
            Err(e) => return Err(e),
        },
        Commands::Put { key, value } => {
            engine.put(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Delete { key } => {
            engine.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::List { prefix, reverse } => {
            let mut iter = engine.iter(IteratorOptions {
                prefix: prefix.into_bytes(),
                reverse,
            });
            while let Some(key) = iter.key() {
                println!("{}", String::from_utf8_lossy(key));
                iter.next();
            }
            iter.close();
        }
        Commands::Merge => {
            engine.merge()?;
            println!("OK");
        }
    }
    Ok(())
}
