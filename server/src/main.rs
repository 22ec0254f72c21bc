use anyhow::Result;
use axum::Router;
use clap::Parser;
use rank_core::corpus::SplitMode;
use rank_core::{Bm25Params, EngineConfig, Tokenizer};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};
use rank_server::{build_app, IndexSource};
use tokio::net::TcpListener;

#[derive(Parser)]
struct Args {
    /// Corpus file or directory to index at startup
    #[arg(long, required_unless_present = "snapshot", conflicts_with = "snapshot")]
    corpus: Option<PathBuf>,
    /// Snapshot directory written by `rank build`; it carries its own engine settings
    #[arg(long, conflicts_with_all = ["tokenizer", "k1", "b", "split"])]
    snapshot: Option<PathBuf>,
    /// Tokenization policy for --corpus: whitespace, word or analyzed
    #[arg(long, default_value_t = Tokenizer::Word)]
    tokenizer: Tokenizer,
    #[arg(long, default_value_t = 1.5)]
    k1: f64,
    #[arg(long, default_value_t = 0.75, allow_negative_numbers = true)]
    b: f64,
    /// How .txt files are split into documents
    #[arg(long, default_value_t = SplitMode::Paragraphs)]
    split: SplitMode,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let source = match (args.corpus, args.snapshot) {
        (_, Some(dir)) => IndexSource::Snapshot(dir),
        (Some(path), None) => {
            let config = EngineConfig {
                params: Bm25Params { k1: args.k1, b: args.b },
                tokenizer: args.tokenizer,
                ..EngineConfig::default()
            };
            IndexSource::Corpus { path, split: args.split, config }
        }
        (None, None) => anyhow::bail!("either --corpus or --snapshot is required"),
    };
    let app: Router = build_app(source)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
