use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::info;

use spimi_index::{
    base::{BoxResult, IndexMode},
    config::{Config, IndexLayout},
    gauge::ResourceGauge,
    tokenizer::SimpleTokenizer,
};

#[derive(Parser)]
#[command(name = "spimi")]
#[command(about = "Disk-bounded inverted index construction and ranked retrieval", long_about = None)]
struct Args {
    /// Directory holding the segments, buckets and dictionary
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Memory usage fraction that triggers flushes (all stages)
    #[arg(long, global = true)]
    threshold: Option<f64>,

    /// Memory capacity in bytes the threshold refers to (default: total memory)
    #[arg(long, global = true)]
    capacity: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Builds the segments from a tokenized file (`<docId><TAB><tokens>` lines)
    Index {
        input: PathBuf,

        /// Merge the segments once indexing is over
        #[arg(long)]
        merge: bool,

        #[arg(long)]
        prefix_length: Option<usize>,

        /// Record positions instead of weights
        #[arg(long)]
        positional: bool,
    },

    /// Merges the segments into buckets and a dictionary
    Merge {
        #[arg(long)]
        prefix_length: Option<usize>,
    },

    /// Searches the merged index
    Search { query: String, k: usize },
}

fn merge(config: &Config, gauge: Arc<dyn ResourceGauge>) -> BoxResult<()> {
    let summary = config.layout.merger(&config.merger, gauge)?.merge()?;
    info!(
        "{} terms, {} bucket files, dictionary in {}",
        summary.terms,
        summary.bucket_files.len(),
        summary.dictionary.display()
    );
    Ok(())
}

fn main() -> BoxResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(root) = &args.root {
        config.layout = IndexLayout::under(root);
    }
    if let Some(threshold) = args.threshold {
        config.set_threshold(threshold);
    }
    if let Some(capacity) = args.capacity {
        config.capacity = Some(capacity);
    }
    config.indexer.show_progress = true;
    config.merger.show_progress = true;

    let gauge = config.gauge()?;

    match args.command {
        Command::Index {
            input,
            merge: and_merge,
            prefix_length,
            positional,
        } => {
            if positional {
                config.indexer.mode = IndexMode::Positional;
            }
            if let Some(prefix_length) = prefix_length {
                config.merger.prefix_length = prefix_length;
            }

            let mut indexer = config.layout.indexer(&config.indexer, gauge.clone())?;
            indexer.index_file(&input)?;
            let summary = indexer.build()?;
            info!(
                "{} documents indexed into {} segments",
                summary.documents,
                summary.segments.len()
            );

            if and_merge {
                merge(&config, gauge)?;
            }
        }
        Command::Merge { prefix_length } => {
            if let Some(prefix_length) = prefix_length {
                config.merger.prefix_length = prefix_length;
            }
            merge(&config, gauge)?;
        }
        Command::Search { query, k } => {
            let mut retrieval = config.layout.retrieval(
                &config.retrieval,
                gauge,
                Box::new(SimpleTokenizer::default()),
            )?;
            for (rank, document) in retrieval.query(&query, k)?.iter().enumerate() {
                println!("{}\t{}\t{:.4}", rank + 1, document.docid, document.score);
            }
        }
    }

    Ok(())
}
