//! # Consumer Sense CLI (`csense`)
//!
//! The `csense` binary analyzes customer feedback, validates and maps the
//! resulting documents, persists them to sinks, and serves the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! csense --config ./config/csense.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `csense analyze text "<text>"` | Analyze typed feedback |
//! | `csense analyze image <paths>...` | Analyze one or more screenshots together |
//! | `csense analyze url <url>` | Scrape a review page and analyze it |
//! | `csense normalize <result.json>` | Turn an analysis result into a review document |
//! | `csense validate <doc.json>` | Check a review document against the schema |
//! | `csense map <doc.json>` | Map a review document to an analytics row |
//! | `csense persist <doc.json>` | Validate, map, and persist a stored document |
//! | `csense batch <dir>` | Analyze every matching file in a directory |
//! | `csense schema` | Print the review document JSON Schema |
//! | `csense sinks` | List the available sinks |
//! | `csense serve` | Start the HTTP API |
//!
//! ## Exit codes
//!
//! `0` on success, `1` on an error, `2` when a document fails validation.
//!
//! ## Examples
//!
//! ```bash
//! # Analyze and keep a local copy
//! csense analyze text "Checkout keeps failing on Android" --save file
//!
//! # Analyze screenshots and push to the real backends
//! csense analyze image a.png b.png --save document_store,warehouse --remote
//!
//! # Re-validate a stored document
//! csense validate ./data/out/review-1a2b3c4d.json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use consumer_sense::batch;
use consumer_sense::config;
use consumer_sense::offline;
use consumer_sense::pipeline::{print_outcome, AnalysisInput, PersistRequest, Pipeline};
use consumer_sense::progress::ProgressMode;
use consumer_sense::server;
use consumer_sense::sinks;
use consumer_sense_core::sink::PersistMode;
use consumer_sense_core::SourceType;

/// Exit code for a document that failed schema validation.
const EXIT_INVALID: i32 = 2;

/// Consumer Sense CLI: customer feedback in, validated review documents out.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/csense.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "csense",
    about = "Consumer Sense: analyze customer feedback into validated review documents",
    version,
    long_about = "Consumer Sense analyzes typed feedback, app-store screenshots, and scraped review \
    pages with a language model, normalizes the result into a review document, validates it \
    against a fixed schema, maps it to an analytics row, and persists it to local files, a \
    document store, or a warehouse."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/csense.toml`. A missing file falls back to the
    /// built-in defaults (mock model, local sinks).
    #[arg(long, global = true, default_value = "./config/csense.toml")]
    config: PathBuf,

    /// Log filter (e.g. `debug`, `consumer_sense=trace`). Overrides `RUST_LOG`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze feedback with the configured model.
    ///
    /// The result is normalized, validated, and mapped. With `--save`, the
    /// document (or row) is persisted to each named sink in order.
    Analyze {
        #[command(subcommand)]
        input: AnalyzeInput,

        /// Comma-separated sink names (`file`, `document_store`, `warehouse`).
        #[arg(long, value_delimiter = ',', global = true)]
        save: Vec<String>,

        /// Write to the real backends instead of local mock files.
        #[arg(long, global = true)]
        remote: bool,

        /// Print the full outcome as JSON.
        #[arg(long, global = true)]
        json: bool,
    },

    /// Normalize a stored analysis result into a review document.
    Normalize {
        /// Path to an analysis result JSON file.
        path: PathBuf,

        /// Source type: `manual_text`, `mobile_app_screenshot`, or `web_scrape`.
        #[arg(long, default_value = "manual_text")]
        source: SourceType,
    },

    /// Validate a review document against the schema.
    ///
    /// Exits with code 2 when the document is invalid.
    Validate {
        /// Path to a review document JSON file.
        path: PathBuf,
    },

    /// Map a review document to an analytics row.
    Map {
        /// Path to a review document JSON file.
        path: PathBuf,
    },

    /// Validate, map, and persist a stored review document.
    Persist {
        /// Path to a review document JSON file.
        path: PathBuf,

        /// Sink to write to. Repeat or comma-separate for several.
        #[arg(long, value_delimiter = ',', default_value = "file")]
        sink: Vec<String>,

        /// Write to the real backends instead of local mock files.
        #[arg(long)]
        remote: bool,

        /// Print the full outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Analyze every matching file in a directory.
    ///
    /// Include and exclude globs come from `[batch]`. Failures are counted
    /// and the run continues.
    Batch {
        /// Directory to scan.
        dir: PathBuf,

        /// Comma-separated sink names. Defaults to `[batch].sinks`.
        #[arg(long, value_delimiter = ',')]
        save: Option<Vec<String>>,

        /// Write to the real backends instead of local mock files.
        #[arg(long)]
        remote: bool,

        /// Progress output on stderr. Defaults to `human` on a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Print the review document JSON Schema.
    Schema,

    /// List available sinks and where they write.
    Sinks,

    /// Start the HTTP API server.
    Serve,
}

#[derive(Subcommand)]
enum AnalyzeInput {
    /// Analyze typed feedback.
    Text {
        /// The feedback text.
        text: String,
    },
    /// Analyze one or more screenshots as a single input.
    Image {
        /// Image files (PNG, JPEG, WebP, ...).
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Optional text to send alongside the images.
        #[arg(long)]
        text: Option<String>,
    },
    /// Scrape a review page and analyze its text.
    Url {
        /// Page URL.
        url: String,
    },
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "consumer_sense=warn,consumer_sense_core=warn".into()),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    // Commands that don't need config
    match &cli.command {
        Commands::Schema => return offline::run_schema(),
        Commands::Validate { path } => {
            if !offline::run_validate(path)? {
                std::process::exit(EXIT_INVALID);
            }
            return Ok(());
        }
        Commands::Map { path } => return offline::run_map(path),
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Analyze {
            input,
            save,
            remote,
            json,
        } => {
            let input = match input {
                AnalyzeInput::Text { text } => AnalysisInput::Text(text),
                AnalyzeInput::Image { paths, text } => {
                    AnalysisInput::images_from_paths(&paths, text)?
                }
                AnalyzeInput::Url { url } => AnalysisInput::Url(url),
            };
            let pipeline = Pipeline::from_config(&cfg)?;
            let request = PersistRequest::new(save, PersistMode::from_remote_flag(remote));
            let outcome = pipeline.run(&input, "cli", &request).await?;
            print_outcome(&outcome, json)?;
            if !outcome.is_accepted() {
                std::process::exit(EXIT_INVALID);
            }
        }
        Commands::Normalize { path, source } => {
            offline::run_normalize(&cfg, &path, source)?;
        }
        Commands::Persist {
            path,
            sink,
            remote,
            json,
        } => {
            let accepted = offline::run_persist(
                &cfg,
                &path,
                &sink,
                PersistMode::from_remote_flag(remote),
                json,
            )
            .await?;
            if !accepted {
                std::process::exit(EXIT_INVALID);
            }
        }
        Commands::Batch {
            dir,
            save,
            remote,
            progress,
        } => {
            let pipeline = Pipeline::from_config(&cfg)?;
            let sinks = save.unwrap_or_else(|| cfg.batch.sinks.clone());
            let request = PersistRequest::new(sinks, PersistMode::from_remote_flag(remote));
            let reporter = progress.unwrap_or_else(ProgressMode::default_for_tty).reporter();
            let summary =
                batch::run_batch(&pipeline, &dir, &cfg.batch, &request, reporter.as_ref()).await?;
            batch::print_summary(&dir, &summary);
        }
        Commands::Sinks => {
            sinks::list_sinks(&cfg)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Schema | Commands::Validate { .. } | Commands::Map { .. } => {}
    }

    Ok(())
}
