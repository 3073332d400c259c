//! # til CLI
//!
//! Builds and queries the notes database for a TIL repository.
//!
//! ## Usage
//!
//! ```bash
//! til --root ~/til <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `til build` | Render changed notes and refresh the database |
//! | `til search "<query>"` | Keyword search over title and body |
//! | `til get <key>` | Print one stored note |
//! | `til serve` | Start the JSON HTTP API |
//! | `til snapshot <dir>` | Write a static HTML export |
//! | `til config show\|get\|set` | Inspect or edit `til.toml` |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `info`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use til_index::config::{self, Config, CONFIG_FILE_NAME};
use til_index::fts::SearchIndex;
use til_index::pipeline;
use til_index::render::create_renderer;
use til_index::server::run_server;
use til_index::snapshot::write_snapshot;
use til_index::store::{RecordStore, SqliteRecordStore};

/// Incremental Markdown to HTML builder for a TIL notes repository.
#[derive(Parser)]
#[command(name = "til", version, about)]
struct Cli {
    /// Root of the notes repository (a git checkout).
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Path to the configuration file. Defaults to `<root>/til.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the notes database.
    ///
    /// Requires a clean working tree. Only notes whose body changed since
    /// the last build are sent to the renderer.
    Build,

    /// Search notes by keyword.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },

    /// Print a stored note by key (e.g. `rust_lifetimes.md`).
    Get { key: String },

    /// Start the JSON HTTP API on `[server].bind`.
    Serve,

    /// Write a static HTML snapshot of every note.
    Snapshot {
        /// Output directory.
        out_dir: PathBuf,
    },

    /// Inspect or edit the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Print one value by dotted key (e.g. `render.strategy`).
    Get { key: String },
    /// Set one value by dotted key and save the file.
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.root.join(CONFIG_FILE_NAME));

    // Config editing works on the file as written, without resolved paths.
    if let Commands::Config { action } = &cli.command {
        return run_config(&config_path, action);
    }

    let cfg = config::load_or_default(&config_path)?.resolve_paths(&cli.root);

    match cli.command {
        Commands::Build => run_build(&cli.root, &cfg).await?,
        Commands::Search { query, limit } => run_search(&cfg, &query, limit).await?,
        Commands::Get { key } => run_get(&cfg, &key).await?,
        Commands::Serve => run_server(&cfg).await?,
        Commands::Snapshot { out_dir } => {
            let store = SqliteRecordStore::open(&cfg).await?;
            let pages = write_snapshot(&store, &out_dir).await?;
            println!("Wrote {} notes to {}", pages, out_dir.display());
        }
        Commands::Config { .. } => unreachable!(),
    }

    Ok(())
}

async fn run_build(root: &Path, cfg: &Config) -> Result<()> {
    let renderer = create_renderer(&cfg.render)?;
    let report = pipeline::run_build(root, cfg, renderer.as_ref()).await?;

    println!("discovered: {}", report.discovered);
    println!("rendered: {}", report.rendered);
    println!("cached: {}", report.cached);
    println!("upserted: {}", report.upserted);
    println!("ok");
    Ok(())
}

async fn run_search(cfg: &Config, query: &str, limit: i64) -> Result<()> {
    let store = SqliteRecordStore::open(cfg).await?;
    let index = SearchIndex::new(store.pool().clone(), store.table());
    let hits = index.search(query, limit).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, hit.score, hit.title);
        println!("    key: {}", hit.key);
        if !hit.url.is_empty() {
            println!("    url: {}", hit.url);
        }
        println!("    excerpt: \"{}\"", hit.snippet.replace('\n', " ").trim());
        println!();
    }
    Ok(())
}

async fn run_get(cfg: &Config, key: &str) -> Result<()> {
    let store = SqliteRecordStore::open(cfg).await?;
    let Some(note) = store.get(key).await? else {
        anyhow::bail!("No note with key: {}", key);
    };

    println!("--- Note ---");
    println!("key:         {}", note.key);
    println!("title:       {}", note.title);
    println!("topic:       {}", note.topic);
    println!("url:         {}", note.url);
    println!("created_utc: {}", note.created_utc.as_deref().unwrap_or("-"));
    println!("updated_utc: {}", note.updated_utc.as_deref().unwrap_or("-"));
    for (field, value) in &note.extra {
        println!("{}: {}", field, value);
    }
    println!();
    println!("--- Summary ---");
    println!("{}", note.summary.as_deref().unwrap_or(""));
    println!();
    println!("--- Body ---");
    println!("{}", note.body);
    Ok(())
}

fn run_config(path: &Path, action: &ConfigAction) -> Result<()> {
    let cfg = config::load_or_default(path)?;
    match action {
        ConfigAction::Show => print!("{}", toml::to_string_pretty(&cfg)?),
        ConfigAction::Get { key } => match config::get_value(&cfg, key)? {
            toml::Value::String(s) => println!("{}", s),
            other => println!("{}", other),
        },
        ConfigAction::Set { key, value } => {
            let updated = config::set_value(&cfg, key, value)?;
            config::save_config(path, &updated)?;
            println!("{} = {}", key, config::get_value(&updated, key)?);
        }
    }
    Ok(())
}
