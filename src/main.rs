//! # filehound CLI (`fh`)
//!
//! The `fh` binary is the composition root: it loads configuration, builds
//! the embedding provider, opens the index and dispatches one command.
//!
//! ## Usage
//!
//! ```bash
//! fh --config ./config/filehound.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fh init` | Create the SQLite database and run schema migrations |
//! | `fh index <path>` | Index (or re-index) a directory tree |
//! | `fh search "<query>"` | Search the index |
//! | `fh get <path>` | Show the stored record for one file |
//! | `fh stats` | Summarize the index |
//! | `fh prune <path>` | Drop records of deleted files under a directory |
//! | `fh history` | Show recent queries |
//! | `fh clear` | Delete every indexed file, vector and query log entry |
//!
//! ## Exit codes
//!
//! `0` success, `2` configuration error, `3` not found, `4` embedding
//! provider error, `5` storage error, `1` anything else.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, warn};

use filehound::config::{self, Config};
use filehound::embedding::{ProviderCache, ProviderFactory};
use filehound::engine::{SearchEngine, SearchRequest, SearchSettings};
use filehound::error::Error;
use filehound::indexer::CancelToken;
use filehound::logging;
use filehound::models::{FileRecord, IndexReport, SearchMode, SearchResponse};
use filehound::stats;

const DEFAULT_CONFIG: &str = "./config/filehound.toml";

/// filehound: local hybrid (semantic + fuzzy) file search.
#[derive(Parser)]
#[command(
    name = "fh",
    about = "filehound: index a file tree and search it semantically and fuzzily",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/filehound.toml`; when that file does not exist
    /// the built-in defaults are used.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the database path from config.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Index a directory tree.
    ///
    /// Unchanged files (same content hash, already embedded with the active
    /// model) are skipped unless `--force`.
    Index {
        path: PathBuf,

        /// Only index these extensions, comma separated (e.g. `.py,.rs`).
        #[arg(long, value_delimiter = ',')]
        ext: Vec<String>,

        /// Include hidden files and directories.
        #[arg(long)]
        include_hidden: bool,

        /// Re-index files even when their content is unchanged.
        #[arg(long)]
        force: bool,

        /// Remove records of files that no longer exist under `path`.
        #[arg(long)]
        prune: bool,
    },

    /// Search the index.
    Search {
        query: String,

        /// Restrict results to a file or directory.
        #[arg(long)]
        path: Option<PathBuf>,

        /// `semantic`, `fuzzy`, or `combined`.
        #[arg(long, default_value = "combined")]
        mode: String,

        /// Maximum number of results (defaults to `search.default_top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Only match these extensions, comma separated.
        #[arg(long, value_delimiter = ',')]
        ext: Vec<String>,
    },

    /// Show the stored metadata for one file.
    Get { path: PathBuf },

    /// Summarize the index.
    Stats,

    /// Delete records of files that no longer exist under a directory.
    Prune { path: PathBuf },

    /// Show recent queries, newest first.
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Empty the query log instead of listing it.
        #[arg(long)]
        clear: bool,
    },

    /// Delete every indexed file, vector and query log entry.
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .chain()
                .find_map(|cause| cause.downcast_ref::<Error>())
                .map(Error::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

fn load(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => {
            config::load_config(Path::new(DEFAULT_CONFIG))?
        }
        None => {
            debug!("no config file, using defaults");
            let cfg = Config::default();
            cfg.validate()?;
            cfg
        }
    };
    if let Some(db) = &cli.db {
        cfg.db.path = db.clone();
    }
    Ok(cfg)
}

fn search_settings(cfg: &Config) -> SearchSettings {
    SearchSettings {
        weights: cfg.fusion_weights(),
        fuzzy: cfg.fuzzy_params(),
        semantic_min_score: cfg.search.semantic_min_score,
        preview_chars: cfg.search.preview_chars,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = load(&cli)?;

    let providers = ProviderCache::new();
    let provider = providers.get_or_create(&ProviderFactory::with_defaults(), &cfg.embedding)?;
    debug!(
        provider = %cfg.embedding.provider,
        model = provider.model_name(),
        dims = provider.dims(),
        "embedding provider ready"
    );

    let engine = SearchEngine::open(&cfg.db.path, provider, search_settings(&cfg))
        .await
        .with_context(|| format!("opening index {}", cfg.db.path.display()))?;

    let outcome = dispatch(&cli, &cfg, &engine).await;
    engine.close().await;
    outcome
}

async fn dispatch(cli: &Cli, cfg: &Config, engine: &SearchEngine) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Init => {
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Index {
            path,
            ext,
            include_hidden,
            force,
            prune,
        } => {
            let mut options = cfg.index_options();
            options.extensions = (!ext.is_empty()).then(|| ext.clone());
            options.ignore_hidden = options.ignore_hidden && !include_hidden;
            options.force = *force;
            options.prune = *prune;

            let cancel = CancelToken::new();
            let watcher = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("interrupt received, finishing in-flight files");
                        cancel.cancel();
                    }
                })
            };
            let report = engine.index_directory(path, &options, &cancel).await;
            watcher.abort();
            let report = report?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(path, &report);
            }
            if report.cancelled {
                return Err(Error::Cancelled.into());
            }
        }
        Commands::Search {
            query,
            path,
            mode,
            top_k,
            ext,
        } => {
            let mode: SearchMode = mode.parse()?;
            let mut request =
                SearchRequest::new(query.clone(), mode, top_k.unwrap_or(cfg.search.default_top_k));
            request.path = path.clone();
            request.extensions = (!ext.is_empty()).then(|| ext.clone());

            let response = engine.search(&request).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_results(&response);
            }
        }
        Commands::Get { path } => {
            let record = engine.get(path).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_record(&record);
            }
        }
        Commands::Stats => {
            let stats = engine.stats().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print!("{}", stats::render(&stats, &cfg.db.path.display().to_string()));
            }
        }
        Commands::Prune { path } => {
            let pruned = engine.prune(path).await?;
            if cli.json {
                println!("{}", serde_json::json!({ "pruned": pruned }));
            } else {
                println!("pruned {} record(s) under {}", pruned, path.display());
            }
        }
        Commands::History { limit, clear } => {
            if *clear {
                let removed = engine.clear_history().await?;
                println!("cleared {} history entr{}", removed, plural_y(removed));
                return Ok(());
            }
            let entries = engine.history(*limit).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No searches recorded.");
            } else {
                for e in &entries {
                    let when = chrono::DateTime::from_timestamp(e.searched_at, 0)
                        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default();
                    println!(
                        "{}  [{:<8}] {:>3} result(s) {:>5}ms  {}",
                        when, e.mode, e.result_count, e.duration_ms, e.query
                    );
                }
            }
        }
        Commands::Clear => {
            let removed = engine.clear().await?;
            if cli.json {
                println!("{}", serde_json::json!({ "removed": removed }));
            } else {
                println!("removed {} file(s) from the index", removed);
            }
        }
    }
    Ok(())
}

fn plural_y(n: u64) -> &'static str {
    if n == 1 {
        "y"
    } else {
        "ies"
    }
}

fn print_report(root: &Path, report: &IndexReport) {
    println!("index {}", root.display());
    println!("  indexed: {}", report.indexed);
    println!("  skipped (unchanged): {}", report.skipped);
    println!("  binary: {}", report.binary);
    println!("  chunks embedded: {}", report.chunks);
    if report.pruned > 0 {
        println!("  pruned: {}", report.pruned);
    }
    println!("  errors: {}", report.errors);
    for (path, message) in report.error_details.iter().take(10) {
        eprintln!("    {}: {}", path, message);
    }
    if report.error_details.len() > 10 {
        eprintln!("    ... and {} more", report.error_details.len() - 10);
    }
    println!("{}", if report.cancelled { "cancelled" } else { "ok" });
}

fn print_results(response: &SearchResponse) {
    if response.results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, result) in response.results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} ({})",
            i + 1,
            result.score,
            result.file_path,
            result.match_type
        );
        if let Some(s) = result.semantic_score {
            println!("    semantic: {:.3}", s);
        }
        if let Some(f) = result.fuzzy_score {
            println!("    fuzzy: {:.3}", f);
        }
        let preview = result.preview.replace('\n', " ");
        if !preview.trim().is_empty() {
            println!("    preview: \"{}\"", preview.trim());
        }
        println!();
    }
    println!(
        "{} result(s) in {}ms",
        response.results.len(),
        response.duration_ms
    );
}

fn print_record(record: &FileRecord) {
    println!("--- File ---");
    println!("path:         {}", record.path);
    println!("filename:     {}", record.filename);
    println!("extension:    {}", record.extension);
    println!(
        "language:     {}",
        record.language.as_deref().unwrap_or("(unknown)")
    );
    println!("size:         {} bytes", record.size_bytes);
    if let Some(lines) = record.line_count {
        println!("lines:        {}", lines);
    }
    println!("hash:         {}", record.content_hash);
    println!("modified_at:  {}", record.modified_at);
    println!("indexed_at:   {}", record.indexed_at);
    println!("hidden:       {}", record.is_hidden);
    println!("binary:       {}", record.is_binary);
    if !record.is_binary {
        println!();
        println!("--- Preview ---");
        println!("{}", record.preview);
    }
}
