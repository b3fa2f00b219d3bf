//! StrataKV CLI
//!
//! Command-line interface over an engine directory.

use std::process;

use clap::{Parser, Subcommand};
use stratakv::{Config, StorageEngine};
use tracing_subscriber::{fmt, EnvFilter};

/// StrataKV CLI
#[derive(Parser, Debug)]
#[command(name = "stratakv")]
#[command(about = "Embedded LSM key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./stratakv_data")]
    data_dir: String,

    /// Live MemTable entries before a flush
    #[arg(short, long, default_value = "1000")]
    flush_threshold: usize,

    /// Target false-positive rate of SSTable filters
    #[arg(long, default_value = "0.01")]
    false_positive_rate: f64,

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

    /// Print every live pair with a key in [lo, hi]
    Scan {
        /// Inclusive lower bound
        lo: String,

        /// Inclusive upper bound
        hi: String,
    },

    /// Flush the MemTable to a new SSTable
    Flush,

    /// Merge all SSTables into one
    Compact,

    /// Show engine statistics
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stratakv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .flush_threshold(args.flush_threshold)
        .filter_false_positive_rate(args.false_positive_rate)
        .build();

    let engine = match StorageEngine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = execute(&engine, args.command) {
        tracing::error!("Command failed: {}", e);
        process::exit(1);
    }

    if let Err(e) = engine.close() {
        tracing::error!("Failed to close engine: {}", e);
        process::exit(1);
    }
}

fn execute(engine: &StorageEngine, command: Commands) -> stratakv::Result<()> {
    match command {
        Commands::Get { key } => match engine.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Put { key, value } => {
            engine.put(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Delete { key } => {
            engine.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::Scan { lo, hi } => {
            for (key, value) in engine.read_key_range(lo.as_bytes(), hi.as_bytes())? {
                println!(
                    "{}\t{}",
                    String::from_utf8_lossy(&key),
                    String::from_utf8_lossy(&value)
                );
            }
        }
        Commands::Flush => {
            let flushed = engine.flush()?;
            println!("{}", if flushed { "flushed" } else { "nothing to flush" });
        }
        Commands::Compact => {
            let count = engine.compact_ss_tables()?;
            println!("sstables after compaction: {}", count);
        }
        Commands::Stats => {
            println!("version:     {}", stratakv::VERSION);
            println!("data dir:    {}", engine.data_dir().display());
            println!("sstables:    {}", engine.sstable_count());
            println!("memtable:    {}", engine.memtable_len());
            println!("tombstones:  {}", engine.tombstone_count());
            println!("active wal:  {}", engine.wal_path().display());
        }
    }
    Ok(())
}
