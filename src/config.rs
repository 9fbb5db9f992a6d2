//! Directory layout and run configuration

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

use derivative::Derivative;
use serde::{Deserialize, Serialize};

use crate::{
    base::DOC_COUNT_FILE,
    builder::{BlockIndexer, IndexerOptions},
    error::{Error, Result},
    gauge::{ProcessMemoryGauge, ResourceGauge},
    merger::{MergerOptions, SegmentMerger},
    retrieval::{RankedRetrieval, RetrievalOptions},
    tokenizer::Tokenizer,
};

/// Where each stage reads and writes its files
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexLayout {
    pub segments: PathBuf,
    pub buckets: PathBuf,
    pub dictionary: PathBuf,
    pub doc_count: PathBuf,
}

impl IndexLayout {
    /// Default layout below a root directory
    pub fn under(root: &Path) -> Self {
        Self {
            segments: root.join("index"),
            buckets: root.join("inverted_index"),
            dictionary: root.join("dictionary"),
            doc_count: root.join(DOC_COUNT_FILE),
        }
    }

    pub fn indexer(
        &self,
        options: &IndexerOptions,
        gauge: Arc<dyn ResourceGauge>,
    ) -> Result<BlockIndexer> {
        BlockIndexer::new(&self.segments, &self.doc_count, options, gauge)
    }

    pub fn merger(
        &self,
        options: &MergerOptions,
        gauge: Arc<dyn ResourceGauge>,
    ) -> Result<SegmentMerger> {
        SegmentMerger::new(
            &self.segments,
            &self.doc_count,
            &self.buckets,
            &self.dictionary,
            options,
            gauge,
        )
    }

    pub fn retrieval(
        &self,
        options: &RetrievalOptions,
        gauge: Arc<dyn ResourceGauge>,
        tokenizer: Box<dyn Tokenizer>,
    ) -> Result<RankedRetrieval> {
        RankedRetrieval::open(&self.buckets, &self.dictionary, options, gauge, tokenizer)
    }
}

impl Default for IndexLayout {
    fn default() -> Self {
        Self::under(Path::new("."))
    }
}

/// Options of every stage
#[derive(Derivative, Clone, Debug, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(default)]
pub struct Config {
    pub layout: IndexLayout,

    /// Memory capacity in bytes the thresholds are relative to (default:
    /// the total memory of the machine)
    pub capacity: Option<u64>,

    pub indexer: IndexerOptions,
    pub merger: MergerOptions,
    pub retrieval: RetrievalOptions,
}

impl Config {
    /// Reads a JSON configuration; missing fields take their default value
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::Configuration(format!("cannot open configuration {}: {}", path.display(), e))
        })?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))
    }

    /// The process memory gauge shared by the stages
    pub fn gauge(&self) -> Result<Arc<dyn ResourceGauge>> {
        match self.capacity {
            Some(0) => Err(Error::Configuration(
                "memory capacity should be positive".to_string(),
            )),
            Some(capacity) => Ok(Arc::new(ProcessMemoryGauge::with_capacity(capacity))),
            None => Ok(Arc::new(ProcessMemoryGauge::new())),
        }
    }

    /// Sets the memory threshold of every stage
    pub fn set_threshold(&mut self, threshold: f64) {
        self.indexer.threshold = threshold;
        self.merger.threshold = threshold;
        self.retrieval.threshold = threshold;
    }
}
