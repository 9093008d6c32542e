//! disktable CLI
//!
//! Inspect, dump, and ingest disk tables from the command line.

use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use disktable::dispatch::ReadOnlyDispatcher;
use disktable::storage::BlockCatalog;
use disktable::{DiskTable, LoopbackDispatcher, Result, TableConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// disktable
#[derive(Parser, Debug)]
#[command(name = "disktable")]
#[command(about = "Inspect and stream block-partitioned disk tables")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./tmp")]
    data_dir: PathBuf,

    /// Table file name prefix
    #[arg(short, long, default_value = "table")]
    prefix: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the blocks of a table
    Catalog,

    /// Print every record as key<TAB>value
    Dump {
        /// Prefetch buffer capacity (batches)
        #[arg(short, long, default_value = "5")]
        buffer: usize,
    },

    /// Write key<TAB>value lines from stdin into the table
    Ingest {
        /// Number of simulated table servers
        #[arg(long, default_value = "1")]
        peers: usize,

        /// Records per batch
        #[arg(long, default_value = "128")]
        flush_threshold: usize,

        /// Records per block
        #[arg(long, default_value = "100000")]
        block_capacity: usize,

        /// Table identifier
        #[arg(long, default_value = "0")]
        table_id: u32,
    },
}

fn main() {
    // Initialize tracing/logging (stderr, so dump output stays clean)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,disktable=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    tracing::debug!("disktable v{}", disktable::VERSION);
    tracing::debug!("Data directory: {}", args.data_dir.display());

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Commands::Catalog => {
            let catalog = BlockCatalog::discover(&args.data_dir, &args.prefix)?;
            let mut out = io::stdout().lock();
            for block in &catalog {
                writeln!(out, "{}\t{}\t{}", block.block_number, block.size, block.path.display())?;
            }
            writeln!(out, "{} blocks, {} bytes", catalog.len(), catalog.total_bytes())?;
            Ok(())
        }
        Commands::Dump { buffer } => {
            let config = TableConfig::builder()
                .data_dir(&args.data_dir)
                .name_prefix(&args.prefix)
                .buffer_capacity(buffer)
                .build();
            let mut table = DiskTable::new(config, Arc::new(ReadOnlyDispatcher))?;
            table.load()?;

            let mut out = BufWriter::new(io::stdout().lock());
            let mut count = 0u64;
            for record in table.records() {
                let record = record?;
                out.write_all(&record.key)?;
                out.write_all(b"\t")?;
                out.write_all(&record.value)?;
                out.write_all(b"\n")?;
                count += 1;
            }
            out.flush()?;
            tracing::info!("Dumped {} records", count);
            Ok(())
        }
        Commands::Ingest {
            peers,
            flush_threshold,
            block_capacity,
            table_id,
        } => {
            let config = TableConfig::builder()
                .data_dir(&args.data_dir)
                .name_prefix(&args.prefix)
                .table_id(table_id)
                .flush_threshold(flush_threshold)
                .block_capacity(block_capacity)
                .build();

            let dispatcher = Arc::new(LoopbackDispatcher::new(peers, &args.data_dir)?);
            dispatcher.register_table(table_id, &args.prefix);
            let mut table = DiskTable::new(config, dispatcher)?;
            table.begin_put()?;

            for line in io::stdin().lock().lines() {
                let line = line?;
                let (key, value) = line.split_once('\t').unwrap_or((line.as_str(), ""));
                table.put(key.as_bytes(), value.as_bytes())?;
            }

            let summary = table.finish_put()?;
            tracing::info!(
                "Ingested {} records in {} batches over {} blocks",
                summary.records,
                summary.batches,
                summary.blocks
            );
            Ok(())
        }
    }
}
