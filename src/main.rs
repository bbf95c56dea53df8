use clap::Parser;
use std::path::PathBuf;
use std::process;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pgn2dcg::{DatabaseWriter, ErrorPolicy, ImportOptions, OpenMode};

/// PGN to DCG importer
///
/// Reads every game of a PGN file and appends it to a DCG database made of
/// `DESTINATION.dcg`, `.dci`, `.dcn` and `.dcs`.
///
/// ## Usage Examples:
/// ```bash
/// # Import into a new or existing database
/// pgn2dcg games.pgn club
///
/// # Start the database from scratch, leaving out games that fail to parse
/// pgn2dcg --overwrite --skip-invalid games.pgn club
///
/// # Only the first 100 games, with per-game logging
/// pgn2dcg --max-games 100 --verbose games.pgn club
/// ```
#[derive(Parser)]
#[command(name = "pgn2dcg")]
#[command(about = "Import PGN files into DCG databases")]
#[command(version = "0.1.0")]
struct Args {
    /// PGN file to import
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// Database base path (without extension - .dcg, .dci, .dcn and .dcs are added)
    #[arg(value_name = "DESTINATION")]
    destination: PathBuf,

    /// Remove an existing database instead of appending to it
    #[arg(long)]
    overwrite: bool,

    /// Skip games that fail to parse instead of aborting the import
    #[arg(long)]
    skip_invalid: bool,

    /// Maximum number of games to import (0 = all games)
    #[arg(long, default_value = "0")]
    max_games: usize,

    /// Log per-game progress and dictionary updates
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .init();

    if !args.source.exists() {
        error!("Source file '{}' does not exist", args.source.display());
        process::exit(1);
    }

    let mut options = ImportOptions::new();
    if args.overwrite {
        options = options.with_mode(OpenMode::Overwrite);
    }
    if args.skip_invalid {
        options = options.with_error_policy(ErrorPolicy::Skip);
    }
    if args.max_games > 0 {
        options = options.with_max_games(args.max_games);
    }

    let mut writer = match DatabaseWriter::open(&args.destination, options) {
        Ok(writer) => writer,
        Err(e) => {
            error!("Error opening database '{}': {}", args.destination.display(), e);
            process::exit(1);
        }
    };

    match writer.import_pgn(&args.source) {
        Ok(summary) => {
            info!(
                "Imported {} games into '{}' ({} skipped, {} new names, {} new sites)",
                summary.games_written,
                args.destination.display(),
                summary.games_skipped,
                summary.names_added,
                summary.sites_added
            );
        }
        Err(e) => {
            error!("Error importing '{}': {}", args.source.display(), e);
            process::exit(1);
        }
    }
}
