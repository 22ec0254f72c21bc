use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rank_core::corpus::{load_documents, SplitMode};
use rank_core::persist::{load_snapshot, save_snapshot, SnapshotPaths};
use rank_core::{Bm25Engine, Bm25Params, EngineConfig, ResultFilter, ScoreExplanation, SearchHit, Tokenizer};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rank")]
#[command(about = "Rank transcript passages against queries with Okapi BM25", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct EngineArgs {
    /// Tokenization policy: whitespace, word or analyzed
    #[arg(long, default_value_t = Tokenizer::Word)]
    tokenizer: Tokenizer,
    /// Term-frequency saturation
    #[arg(long, default_value_t = 1.5)]
    k1: f64,
    /// Length normalization strength
    #[arg(long, default_value_t = 0.75, allow_negative_numbers = true)]
    b: f64,
    /// How .txt files are split into documents: paragraphs or lines
    #[arg(long, default_value_t = SplitMode::Paragraphs)]
    split: SplitMode,
}

#[derive(Args)]
struct SourceArgs {
    /// Corpus file or directory (.json, .jsonl, .txt)
    #[arg(long, required_unless_present = "snapshot", conflicts_with = "snapshot")]
    input: Option<PathBuf>,
    /// Snapshot directory written by `rank build`; it carries its own engine settings
    #[arg(long, conflicts_with_all = ["tokenizer", "k1", "b", "split"])]
    snapshot: Option<PathBuf>,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a corpus and write a snapshot directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Output snapshot directory
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Rank documents for a query
    Search {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, short)]
        query: String,
        /// Number of results to keep
        #[arg(long, default_value_t = 5)]
        top_n: usize,
        /// Keep documents that score 0
        #[arg(long, default_value_t = false)]
        all: bool,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Break a document's score down term by term
    Explain {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, short)]
        query: String,
        #[arg(long, allow_negative_numbers = true)]
        doc_id: i64,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print a document's raw text
    Show {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, allow_negative_numbers = true)]
        doc_id: i64,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, engine } => {
            let engine = build_engine(&input, &engine)?;
            let meta = save_snapshot(&SnapshotPaths::new(&output), &engine)?;
            tracing::info!(output = %output.display(), num_terms = meta.num_terms, "snapshot written");
            println!("indexed {} documents ({} terms) into {}", meta.num_docs, meta.num_terms, output.display());
            Ok(())
        }
        Commands::Search { source, query, top_n, all, json } => {
            let filter = if all { ResultFilter::All } else { ResultFilter::NonZero };
            let engine = open_engine(&source)?;
            let hits = engine.search_with(&query, top_n, filter);
            if json {
                print_json(&SearchOutput { query: &query, results: &hits })
            } else {
                print_search_results(&engine, &query, &hits)
            }
        }
        Commands::Explain { source, query, doc_id, json } => {
            let engine = open_engine(&source)?;
            let doc_id = engine.resolve_doc_id(doc_id)?;
            let explanation = engine.explain_score(&query, doc_id)?;
            if json {
                print_json(&explanation)
            } else {
                print_score_explanation(&explanation);
                Ok(())
            }
        }
        Commands::Show { source, doc_id } => {
            let engine = open_engine(&source)?;
            let doc_id = engine.resolve_doc_id(doc_id)?;
            println!("{}", engine.get_document(doc_id)?);
            Ok(())
        }
    }
}

fn engine_config(args: &EngineArgs) -> EngineConfig {
    EngineConfig {
        params: Bm25Params { k1: args.k1, b: args.b },
        tokenizer: args.tokenizer,
        ..EngineConfig::default()
    }
}

fn build_engine(input: &Path, args: &EngineArgs) -> Result<Bm25Engine> {
    let documents = load_documents(input, args.split)?;
    let engine = Bm25Engine::with_config(documents, engine_config(args))
        .with_context(|| format!("indexing {}", input.display()))?;
    tracing::info!(input = %input.display(), num_docs = engine.num_docs(), tokenizer = %args.tokenizer, "corpus indexed");
    Ok(engine)
}

fn open_engine(source: &SourceArgs) -> Result<Bm25Engine> {
    match (&source.input, &source.snapshot) {
        (_, Some(dir)) => {
            let (engine, meta) = load_snapshot(&SnapshotPaths::new(dir))?;
            tracing::info!(snapshot = %dir.display(), num_docs = meta.num_docs, created_at = %meta.created_at, "snapshot opened");
            Ok(engine)
        }
        (Some(input), None) => build_engine(input, &source.engine),
        (None, None) => anyhow::bail!("either --input or --snapshot is required"),
    }
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    results: &'a [SearchHit],
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_search_results(engine: &Bm25Engine, query: &str, hits: &[SearchHit]) -> Result<()> {
    println!("Results for query: '{query}'");
    if hits.is_empty() {
        println!("\nNo matching documents.");
    }
    for hit in hits {
        println!("\nScore: {:.4}", hit.score);
        println!("Document {}:\n{}", hit.doc_id, engine.get_document(hit.doc_id)?);
    }
    Ok(())
}

fn print_score_explanation(explanation: &ScoreExplanation) {
    println!("Score explanation for document {} with query '{}':", explanation.doc_id, explanation.query);
    for term in &explanation.terms {
        println!("Term: '{}'", term.term);
        println!("  - Term frequency: {}", term.term_frequency);
        println!("  - IDF: {:.4}", term.idf);
        println!("  - Document length factor: {:.4}", term.doc_length_factor);
        println!("  - Score contribution: {:.4}", term.score_contribution);
    }
    println!("Total score: {:.4}", explanation.total_score);
}
