//! `fpctl`: command-line front end for the fingerprint matcher, built
//! directly on [`sonicmatch::AppContext`] (§10).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sonicmatch::config::Config;
use sonicmatch::track::Fingerprint;
use sonicmatch::{AppContext, Result};

#[derive(Parser)]
#[command(name = "fpctl", about = "Audio fingerprint ingest and query tool")]
struct Cli {
    /// Path to a TOML config file; falls back to built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest one fingerprint.
    Ingest {
        #[arg(long)]
        track_id: Option<String>,
        /// Canonical or compressed code string, or a path to a file containing one.
        #[arg(long)]
        fp: String,
        #[arg(long)]
        length: u32,
        #[arg(long)]
        codever: String,
        #[arg(long)]
        artist: Option<String>,
        #[arg(long)]
        release: Option<String>,
        #[arg(long = "title")]
        track: Option<String>,
        /// Store the code string as a single segment instead of splitting it.
        #[arg(long)]
        no_split: bool,
    },
    /// Query a code string against the index.
    Query {
        /// Canonical or compressed code string, or a path to a file containing one.
        #[arg(long)]
        fp: String,
        #[arg(long)]
        elbow: Option<usize>,
        /// Emit the response as JSON instead of a human-readable summary.
        #[arg(long)]
        json: bool,
    },
    /// Delete one or more tracks by ID.
    Delete { track_ids: Vec<String> },
    /// Dump every stored segment to replication CSV files.
    ReplicateDump {
        #[arg(long = "out-dir")]
        out_dir: PathBuf,
    },
    /// Load one or more replication CSV files.
    ReplicateLoad { files: Vec<PathBuf> },
}

/// Reads `arg` as a literal code string, or as the contents of a file if
/// `arg` names an existing path.
fn resolve_code_arg(arg: &str) -> Result<String> {
    let path = std::path::Path::new(arg);
    if path.is_file() {
        Ok(std::fs::read_to_string(path)?.trim().to_string())
    } else {
        Ok(arg.to_string())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Command::Query { elbow: Some(elbow), .. } = &cli.command {
        config.elbow = *elbow;
    }
    let ctx = AppContext::durable(config)?;

    match cli.command {
        Command::Ingest {
            track_id,
            fp,
            length,
            codever,
            artist,
            release,
            track,
            no_split,
        } => {
            let code = resolve_code_arg(&fp)?;
            let fingerprint = Fingerprint {
                track_id,
                fp: code,
                length,
                codever,
                artist,
                release,
                track,
                source: None,
                import_date: None,
            };
            let ids = ctx.ingest(vec![fingerprint], !no_split)?;
            for id in ids {
                println!("{id}");
            }
        }
        Command::Query { fp, json, .. } => {
            let code = resolve_code_arg(&fp)?;
            let response = ctx.query(&code)?;
            if json {
                println!("{}", serde_json::to_string(&response).map_err(|e| {
                    sonicmatch::Error::Replication(e.to_string())
                })?);
            } else {
                print_human_readable(&response);
            }
        }
        Command::Delete { track_ids } => {
            ctx.delete(&track_ids)?;
            log::info!("deleted {} track(s)", track_ids.len());
        }
        Command::ReplicateDump { out_dir } => {
            let files = ctx.replicate_dump(&out_dir)?;
            for file in files {
                println!("{}", file.display());
            }
        }
        Command::ReplicateLoad { files } => {
            let mut total = 0;
            for file in files {
                total += ctx.replicate_load(&file)?;
            }
            log::info!("loaded {total} row(s)");
        }
    }

    Ok(())
}

fn print_human_readable(response: &sonicmatch::decision::Response) {
    println!("classification: {:?}", response.classification);
    if let Some(track_id) = &response.track_id {
        println!("track_id: {track_id}");
    }
    if let Some(score) = response.score {
        println!("score: {score}");
    }
    if let Some(metadata) = &response.metadata {
        if let Some(artist) = &metadata.artist {
            println!("artist: {artist}");
        }
        if let Some(track) = &metadata.track {
            println!("track: {track}");
        }
    }
    println!("qtime_ms: {}", response.qtime_ms);
    println!("total_time_ms: {}", response.total_time_ms);
}
