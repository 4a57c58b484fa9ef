//! ShadowKV CLI
//!
//! Command-line interface for inspecting and editing a store file.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use shadowkv::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// ShadowKV CLI
#[derive(Parser, Debug)]
#[command(name = "shadowkv-cli")]
#[command(about = "CLI for ShadowKV store files")]
#[command(version)]
struct Args {
    /// Store file
    #[arg(short, long, default_value = "./shadowkv.store")]
    file: PathBuf,

    /// Open without write access
    #[arg(short, long)]
    readonly: bool,

    /// Application format tag for newly created files
    #[arg(short, long, default_value = "0")]
    app_format: u32,

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
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List all keys
    Keys,

    /// Verify every committed entry
    Check,

    /// Write a compacted copy of the store
    Compact {
        /// Destination file
        dest: PathBuf,
    },

    /// Print header statistics
    Stats,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,shadowkv=info"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> shadowkv::Result<ExitCode> {
    let config = Config::builder()
        .path(&args.file)
        .readonly(args.readonly)
        .app_format_version(args.app_format)
        .build();

    let engine = Engine::open(config)?;

    let code = match args.command {
        Commands::Get { key } => match engine.get(&key)? {
            Some(bytes) => {
                println!("{}", String::from_utf8_lossy(&bytes));
                ExitCode::SUCCESS
            }
            None => {
                eprintln!("(nil)");
                ExitCode::FAILURE
            }
        },
        Commands::Set { key, value } => {
            engine.set_string(&key, Some(&value))?;
            println!("OK");
            ExitCode::SUCCESS
        }
        Commands::Del { key } => {
            engine.delete(&key)?;
            println!("OK");
            ExitCode::SUCCESS
        }
        Commands::Keys => {
            for key in engine.keys() {
                println!("{}", key);
            }
            ExitCode::SUCCESS
        }
        Commands::Check => {
            let report = engine.integrity_report()?;
            for failure in &report.failures {
                println!("FAIL {} @ {}: {}", failure.key, failure.offset, failure.error);
            }
            println!(
                "generation {}: {} entries, {} failed",
                report.generation,
                report.entries_checked,
                report.failures.len()
            );
            if report.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Commands::Compact { dest } => {
            let stats = engine.compact_to(&dest)?;
            println!(
                "{} entries copied, {} skipped, {} bytes reclaimed",
                stats.entries_copied, stats.entries_skipped, stats.bytes_reclaimed
            );
            ExitCode::SUCCESS
        }
        Commands::Stats => {
            println!("file:           {}", engine.path().display());
            println!("generation:     {}", engine.generation());
            println!("app format:     0x{:08x}", engine.app_format_version());
            println!("entries:        {}", engine.len());
            println!("file size:      {}", engine.file_size()?);
            println!("deleted length: {}", engine.deleted_length());
            ExitCode::SUCCESS
        }
    };

    // Auto-commits set/del and removes the backup
    engine.close()?;
    Ok(code)
}
