//! # PageLens CLI (`pagelens`)
//!
//! ## Usage
//!
//! ```bash
//! pagelens [--config ./pagelens.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pagelens serve` | Start the JSON HTTP API |
//! | `pagelens ask --file <pdf>... "<question>"` | Index PDFs and answer one question |
//! | `pagelens completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Serve with the config in the working directory
//! pagelens serve
//!
//! # One-shot question over two reports, saving the page the answer came from
//! pagelens ask --file q2.pdf --file q3.pdf "What was Q3 revenue?" --save-page top.png
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use pagelens::config::{self, Config};
use pagelens::server;
use pagelens::session::Session;

const DEFAULT_CONFIG: &str = "./pagelens.toml";

/// PageLens: ask questions about PDF documents and get answers grounded in
/// the most relevant page.
#[derive(Parser)]
#[command(
    name = "pagelens",
    about = "PageLens: visual retrieval and answer synthesis over PDF pages",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./pagelens.toml`; when that file does not exist the
    /// built-in defaults are used.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API.
    Serve,

    /// Index one or more PDFs and answer a single question.
    Ask {
        /// PDF to index. Repeat for several documents.
        #[arg(long = "file", short = 'f', required = true)]
        files: Vec<PathBuf>,

        /// The question.
        query: String,

        /// Hits per document (overrides `[retrieval] top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Write the top-ranked page image to this path.
        #[arg(long)]
        save_page: Option<PathBuf>,
    },

    /// Print a shell completion script to stdout.
    Completions {
        shell: Shell,
    },
}

fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None if Path::new(DEFAULT_CONFIG).exists() => config::load_config(Path::new(DEFAULT_CONFIG)),
        None => Ok(Config::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "pagelens", &mut io::stdout());
        return Ok(());
    }

    let cfg = load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Ask {
            files,
            query,
            top_k,
            save_page,
        } => ask(&cfg, &files, &query, top_k, save_page.as_deref()).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}

async fn ask(
    cfg: &Config,
    files: &[PathBuf],
    query: &str,
    top_k: Option<usize>,
    save_page: Option<&Path>,
) -> anyhow::Result<()> {
    let session = Session::from_config(cfg)?;

    for file in files {
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let outcome = session.upload(&bytes, &name).await?;
        match outcome.indexed {
            Ok(()) => println!(
                "Indexed {} ({} pages)",
                outcome.document.original_name,
                outcome.document.page_count.unwrap_or(0)
            ),
            Err(e) => println!("Skipped {}: {}", outcome.document.original_name, e),
        }
    }

    let outcome = session.query(query, top_k).await?;
    if outcome.results.is_empty() {
        println!("No matching pages.");
        return Ok(());
    }

    println!();
    for (rank, result) in outcome.results.iter().enumerate() {
        println!(
            "{:>2}. {} p.{}  score {:.3}",
            rank + 1,
            result.document_name,
            result.page_number,
            result.score
        );
        if !result.snippet.is_empty() {
            println!("    {}", result.snippet.replace('\n', " "));
        }
    }
    for failure in &outcome.failures {
        println!("    (search failed for {}: {})", failure.document_id, failure.message);
    }

    if let (Some(path), Some(page)) = (save_page, &outcome.top_page) {
        tokio::fs::write(path, &page.bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("\nTop page saved to {}", path.display());
    }

    println!();
    match outcome.answer {
        Some(Ok(answer)) => println!("{}", answer),
        Some(Err(e)) => println!("No answer: {}", e),
        None => {}
    }
    Ok(())
}
