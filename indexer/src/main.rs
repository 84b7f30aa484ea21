mod corpus;
mod html;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use diskdex_core::persist::load_meta;
use diskdex_core::tokenizer::tokenize;
use diskdex_core::{finalize, BuildConfig, EngineConfig, IndexBuilder, IndexPaths, QueryEngine};
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query a bounded-memory, disk-resident inverted index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a directory of JSON/JSONL pages
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long, default_value = "./index")]
        output: String,
        /// Fixed number of documents per partial segment
        #[arg(long)]
        max_docs_in_memory: Option<usize>,
        /// Corpus size at or below which the build runs as a single chunk
        #[arg(long, default_value_t = 300)]
        min_chunk: usize,
        /// Minimum number of partial segments for larger corpora
        #[arg(long, default_value_t = 4)]
        target_flushes: usize,
    },
    /// Run one query against a built index
    Query {
        #[arg(long, default_value = "./index")]
        index: String,
        /// Number of results
        #[arg(short, long, default_value_t = 10)]
        k: usize,
        /// Query text
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Print index statistics
    Stats {
        #[arg(long, default_value = "./index")]
        index: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, max_docs_in_memory, min_chunk, target_flushes } => {
            let config = BuildConfig { min_chunk, target_flush_count: target_flushes, max_docs_in_memory };
            build_index(Path::new(&input), Path::new(&output), &config)
        }
        Commands::Query { index, k, query } => run_query(&index, k, &query.join(" ")),
        Commands::Stats { index } => print_stats(&index),
    }
}

fn build_index(input: &Path, output: &Path, config: &BuildConfig) -> Result<()> {
    if !input.exists() {
        bail!("input path {} does not exist", input.display());
    }
    let paths = IndexPaths::new(output);
    if paths.segments_dir().exists() {
        tracing::warn!(dir = %paths.segments_dir().display(), "removing stale partial segments");
        fs::remove_dir_all(paths.segments_dir())?;
    }

    let files = corpus::collect_inputs(input);
    let total = corpus::count_pages(&files)?;
    let mut builder = IndexBuilder::new(paths.clone(), config, total)?;
    println!("Found {total} pages in {} files", files.len());
    println!("Using max_docs_in_memory: {}", builder.chunk_size());

    let started = Instant::now();
    let mut processed = 0usize;
    for file in &files {
        corpus::for_each_page(file, |page| {
            let text = html::extract(&page.content);
            let terms = tokenize(&text.normal)
                .into_iter()
                .map(|t| (t, false))
                .chain(tokenize(&text.important).into_iter().map(|t| (t, true)));
            builder.add_document(&page.url, terms)?;
            processed += 1;
            if processed % 1000 == 0 {
                tracing::info!(processed, total, segments = builder.flush_count(), "ingesting");
            }
            Ok(())
        })
        .with_context(|| format!("indexing {}", file.display()))?;
    }

    let out = builder.finish()?;
    let partials = out.stats.flushes.len();
    let (merged, meta) = finalize(out, &paths)?;
    let size_kb = paths.size_on_disk()? as f64 / 1024.0;

    println!();
    println!("INDEX STATISTICS");
    println!("Number of indexed documents: {}", meta.num_docs);
    println!("Number of unique tokens: {}", merged.terms);
    println!("Total size of index on disk: {size_kb:.2} KB");
    println!("Partial segments created (offloads): {partials}");
    if partials < 3 && total > config.min_chunk {
        tracing::warn!(partials, "fewer than 3 partial segments were written");
    }
    tracing::info!(output = %output.display(), elapsed_s = started.elapsed().as_secs_f64(), "index build complete");
    Ok(())
}

fn run_query(index: &str, k: usize, query: &str) -> Result<()> {
    let engine = QueryEngine::open(index, EngineConfig::default())
        .with_context(|| format!("opening index at {index}"))?;
    let start = Instant::now();
    let results = engine.execute(query, k)?;
    let elapsed = start.elapsed();

    println!("Found {} results (in {:.2} ms)", results.total_hits, elapsed.as_secs_f64() * 1000.0);
    if results.hits.is_empty() {
        println!("No results found.");
    }
    for (i, hit) in results.hits.iter().enumerate() {
        println!("{}. [{:.4}] {}", i + 1, hit.score, hit.url);
    }
    Ok(())
}

fn print_stats(index: &str) -> Result<()> {
    let paths = IndexPaths::new(index);
    let meta = load_meta(&paths)?;
    println!("{}", serde_json::to_string_pretty(&meta)?);
    println!("Total size of index on disk: {:.2} KB", paths.size_on_disk()? as f64 / 1024.0);
    Ok(())
}
