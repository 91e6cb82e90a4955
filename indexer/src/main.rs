use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docsearch_core::persist::{save_snapshot, IndexPaths};
use docsearch_core::{build_from, CorpusConfig, MarkdownCorpus, RebuildSummary};
use tracing_subscriber::{fmt, EnvFilter};

use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docsearch-indexer")]
#[command(about = "Build the documentation search index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index from a corpus of markdown documentation repos
    Build {
        /// Corpus root holding the cloned repos
        #[arg(long, default_value = "./repos")]
        corpus: PathBuf,
        /// Output index directory
        #[arg(long, default_value = "./data/index")]
        output: PathBuf,
        /// JSON file overriding the repo layout
        #[arg(long)]
        repos: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { corpus, output, repos } => {
            let report = build_index(corpus, output, repos)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn build_index(corpus: PathBuf, output: PathBuf, repos: Option<PathBuf>) -> Result<RebuildSummary> {
    let config = CorpusConfig::load_or_default(repos.as_ref()).context("reading repo layout")?;
    let source = MarkdownCorpus::new(&corpus, config);

    let (snapshot, report) = build_from(&source).with_context(|| format!("indexing {}", corpus.display()))?;

    let created_at = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "".into());
    save_snapshot(&IndexPaths::new(&output), &snapshot, &created_at)?;

    tracing::info!(output = %output.display(), indexed = report.included, skipped = report.skipped.len(), "index build complete");
    Ok(report.into())
}
