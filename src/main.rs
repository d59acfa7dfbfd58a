//! # ragviz CLI
//!
//! The `ragviz` binary chunks documents, ranks chunks against queries, counts
//! tokens, and serves the HTTP visualization API.
//!
//! ## Usage
//!
//! ```bash
//! ragviz --config ./config/ragviz.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragviz chunk <file>` | Split a document into overlapping word windows |
//! | `ragviz query <file> "<query>"` | Index a document and rank its chunks |
//! | `ragviz tokens <file>` | Count tokens (provider or estimate) |
//! | `ragviz serve` | Start the HTTP visualization server |
//! | `ragviz completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Chunk a file with 40-word windows sharing 8 words
//! ragviz chunk notes.md --chunk-size 40 --overlap 8
//!
//! # Rank chunks, reading the document from stdin
//! cat notes.md | ragviz query - "where do cats live?" --limit 3
//!
//! # Full visualization payload for a plotting front-end
//! ragviz query notes.md "paris" --seed 0.5 --json
//! ```

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragviz::{chunk_cmd, config, query_cmd, server, tokens_cmd};

/// ragviz: see how retrieval-augmented generation picks its context.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means defaults: mock embeddings, 50-word chunks
/// with 10 words of overlap.
#[derive(Parser)]
#[command(
    name = "ragviz",
    about = "ragviz: chunk, embed, rank, and plot documents the way a RAG retriever does",
    version,
    long_about = "ragviz splits a document into overlapping word windows, embeds them with a \
    configurable provider (Gemini, OpenAI, Ollama, local, or mock), ranks them against a query \
    by cosine similarity, and projects everything to 2D for plotting."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragviz.toml")]
    config: PathBuf,

    /// Log progress to stderr (`RUST_LOG` overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Split a document into overlapping word windows.
    ///
    /// Chunk size is clamped to at least 10 words and overlap to at most
    /// one less than the chunk size. No embedding is performed.
    Chunk {
        /// Document to chunk, or `-` for stdin.
        file: PathBuf,

        /// Words per chunk (defaults to `[chunking].chunk_size`).
        #[arg(long, allow_negative_numbers = true)]
        chunk_size: Option<i64>,

        /// Words shared by consecutive chunks (defaults to `[chunking].overlap`).
        #[arg(long, allow_negative_numbers = true)]
        overlap: Option<i64>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Index a document and rank its chunks against a query.
    ///
    /// Embeds every chunk and the query with the configured provider, ranks
    /// chunks by cosine similarity, and projects all vectors to 2D using
    /// one seed.
    Query {
        /// Document to index, or `-` for stdin.
        file: PathBuf,

        /// The query text.
        query: String,

        #[arg(long, allow_negative_numbers = true)]
        chunk_size: Option<i64>,

        #[arg(long, allow_negative_numbers = true)]
        overlap: Option<i64>,

        /// Projection seed (defaults to `[visualization].seed`).
        #[arg(long, allow_negative_numbers = true)]
        seed: Option<f64>,

        /// Hits to print (defaults to `[visualization].top_k`). Ignored with `--json`.
        #[arg(long)]
        limit: Option<usize>,

        /// Print the full visualization payload as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Count tokens in a document.
    ///
    /// Uses the provider's token counter when it has one, otherwise the
    /// `ceil(chars / 4)` estimate.
    Tokens {
        /// Document to count, or `-` for stdin.
        file: PathBuf,
    },

    /// Start the HTTP visualization server.
    ///
    /// Binds to `[server].bind` and serves the chunk, index, query, and
    /// token endpoints.
    Serve,

    /// Print a shell completion script.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "ragviz", &mut std::io::stdout());
        return Ok(());
    }

    init_logging(cli.verbose);
    let cfg = config::load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Chunk {
            file,
            chunk_size,
            overlap,
            json,
        } => {
            chunk_cmd::run_chunk(&cfg, &file, chunk_size, overlap, json)?;
        }
        Commands::Query {
            file,
            query,
            chunk_size,
            overlap,
            seed,
            limit,
            json,
        } => {
            query_cmd::run_query(&cfg, &file, &query, chunk_size, overlap, seed, limit, json)
                .await?;
        }
        Commands::Tokens { file } => {
            tokens_cmd::run_tokens(&cfg, &file).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
