use anyhow::Result;
use axum::Router;
use clap::Parser;
use docsearch_core::CorpusConfig;
use server::{build_app, init_manager, ServerConfig, DEFAULT_MAX_LIMIT};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./data/index")]
    index: PathBuf,
    /// Corpus root, used for admin rebuilds and when no index is stored yet
    #[arg(long)]
    corpus: Option<PathBuf>,
    /// JSON file overriding the repo layout
    #[arg(long)]
    repos: Option<PathBuf>,
    /// Upper bound applied to the `limit` query parameter
    #[arg(long, default_value_t = DEFAULT_MAX_LIMIT)]
    max_limit: usize,
    /// Host to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();
    let args = Args::parse();

    let config = ServerConfig {
        index_dir: Some(args.index),
        corpus_root: args.corpus,
        corpus: CorpusConfig::load_or_default(args.repos.as_ref())?,
        max_limit: args.max_limit,
        admin_token: None,
        cors_allow_origin: None,
    }
    .with_env();

    let startup = config.clone();
    let manager = tokio::task::spawn_blocking(move || init_manager(&startup)).await??;
    let app: Router = build_app(Arc::new(manager), config);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
