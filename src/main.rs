//! # Docent CLI (`docent`)
//!
//! ## Usage
//!
//! ```bash
//! docent --config ./config/docent.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docent init` | Create the index file and schema |
//! | `docent serve` | Start the HTTP server |
//! | `docent ingest pdf <PATH>` | Ingest a PDF into the documents collection |
//! | `docent ingest url <URL>` | Ingest a web page into the knowledge collection |
//! | `docent ingest text <PATH>` | Ingest a text file into the knowledge collection |
//! | `docent ask "<question>"` | Answer from documents or general knowledge |
//! | `docent stats` | Show chunk counts per collection |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `docent=info,tower_http=info`).

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use docent::config::{self, Config};
use docent::server::{self, AppState};
use docent::{migrate, stats};

/// Retrieval-augmented question answering over your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docent.example.toml` for a full example. When the file
/// does not exist, built-in defaults are used.
#[derive(Parser)]
#[command(name = "docent", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index.
    ///
    /// Creates the SQLite file and its schema. Running it again is safe.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Ingest a source into the index.
    Ingest {
        #[command(subcommand)]
        source: IngestSource,
    },

    /// Answer a question from ingested PDFs, falling back to the model's
    /// general knowledge when nothing relevant is indexed.
    Ask {
        question: String,
    },

    /// Show index statistics.
    Stats,
}

#[derive(Subcommand)]
enum IngestSource {
    /// A PDF file, one document per page.
    Pdf { path: PathBuf },
    /// A web page (http or https).
    Url { url: String },
    /// A UTF-8 text file.
    Text { path: PathBuf },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("docent=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::warn!(
            "Config file {} not found, using defaults",
            path.display()
        );
        let cfg = Config::minimal();
        config::validate(&cfg)?;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = docent::db::connect(&cfg.index.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Index initialized at {}", cfg.index.path.display());
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest { source } => {
            let state = AppState::from_config(&cfg).await?;
            let report = match source {
                IngestSource::Pdf { path } => {
                    let bytes = tokio::fs::read(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| path.display().to_string());
                    state.ingestor.ingest_pdf(&name, bytes).await?
                }
                IngestSource::Url { url } => state.ingestor.ingest_url(&url).await?,
                IngestSource::Text { path } => state.ingestor.ingest_text_file(&path).await?,
            };
            println!("ingested");
            println!("  documents: {}", report.documents);
            println!("  chunks:    {}", report.chunks);
        }
        Commands::Ask { question } => {
            let state = AppState::from_config(&cfg).await?;
            let answer = state.answers.answer(&question).await?;
            println!("{}", answer.text);
            println!();
            println!("source: {}", answer.provenance.as_str());
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
