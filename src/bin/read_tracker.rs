//! Read Tracker CLI
//!
//! Inspect and update a sled-backed read tracker from the command line.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use futures::TryStreamExt;
use read_tracker::config::TrackerConfig;
use read_tracker::utils::format_timestamp_millis;
use read_tracker::{ReadRecord, ReadTracker, SimulatedHost, SledEngine, TrackerConfigPatch};

#[derive(Parser)]
#[command(name = "read-tracker")]
#[command(about = "Read Tracker Command Line Interface")]
#[command(version)]
struct Cli {
    /// Directory holding the containers
    #[arg(short, long, env = "READ_TRACKER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Container name
    #[arg(long)]
    container: Option<String>,

    /// Container version
    #[arg(long = "container-version")]
    container_version: Option<u32>,

    /// Collection name
    #[arg(long)]
    collection: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Mark a path as read now
    Mark {
        /// Path to mark
        path: String,
    },

    /// Show when a path was last read
    Check {
        /// Path to look up
        path: String,
    },

    /// List read paths
    List {
        /// Only paths starting with this prefix
        #[arg(short, long)]
        prefix: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = dotenvy::dotenv() {
        if cli.verbose {
            eprintln!("No .env file loaded: {}", e);
        }
    }
    read_tracker::init_tracing(log_filter(cli.verbose));

    match run_command(cli).await {
        Ok(_) => process::exit(0),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

/// Default log filter when RUST_LOG is unset
fn log_filter(verbose: bool) -> &'static str {
    if verbose {
        "read_tracker=debug"
    } else {
        "read_tracker=warn"
    }
}

async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let base = match &cli.config {
        Some(path) => TrackerConfig::load(path)?,
        None => read_tracker::config::apply_env_overrides(TrackerConfig::default()),
    };
    let mut patch = TrackerConfigPatch::from(base);
    if cli.container.is_some() {
        patch.container_name = cli.container.clone();
    }
    if cli.container_version.is_some() {
        patch.container_version = cli.container_version;
    }
    if cli.collection.is_some() {
        patch.collection_name = cli.collection.clone();
    }

    let engine = match &cli.data_dir {
        Some(dir) => SledEngine::open_at(dir),
        None => SledEngine::new()?,
    };
    tracing::debug!("Using data directory {:?}", engine.root());

    // No page to observe from the command line, so paths are always explicit
    let tracker = ReadTracker::new(Arc::new(engine), Arc::new(SimulatedHost::new("/")), patch);

    match cli.command {
        Commands::Mark { path } => {
            tracker.mark_as_read(Some(&path)).await?;
            let timestamp = tracker.is_read(Some(&path)).await?;
            print_lookup(&path, timestamp, cli.format)?;
        }
        Commands::Check { path } => {
            let timestamp = tracker.is_read(Some(&path)).await?;
            print_lookup(&path, timestamp, cli.format)?;
        }
        Commands::List { prefix } => {
            let stream = match prefix.as_deref() {
                Some(prefix) => tracker.get_all_by_path(prefix),
                None => tracker.get_all(),
            };
            let records: Vec<ReadRecord> = stream.try_collect().await?;
            print_records(&records, cli.format)?;
        }
    }

    Ok(())
}

fn print_lookup(path: &str, timestamp: Option<u64>, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({ "path": path, "timestamp": timestamp });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => match timestamp {
            Some(ts) => println!("{}  read at {}", path, format_timestamp_millis(ts)),
            None => println!("{}  not read", path),
        },
    }
    Ok(())
}

fn print_records(records: &[ReadRecord], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(records)?),
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No read paths.");
                return Ok(());
            }
            println!("{:<26} Path", "Read at");
            println!("{}", "-".repeat(60));
            for record in records {
                println!("{:<26} {}", format_timestamp_millis(record.timestamp), record.path);
            }
        }
    }
    Ok(())
}
