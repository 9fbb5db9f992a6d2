//! Cosine ranking over the merged index
//!
//! The dictionary is loaded when the session is opened. Buckets are loaded
//! the first time one of their terms is queried and kept for the rest of
//! the session, unless the memory gauge estimates that loading them would
//! exceed the threshold: the term is then left out of the score.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use derivative::Derivative;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    base::{DocId, IndexMode, Weight},
    bucket::{
        bucket_path, bucket_prefix, infer_prefix_length, parse_bucket, Bucket,
        DEFAULT_PREFIX_LENGTH,
    },
    dictionary::{Dictionary, IndexInformation},
    error::{Error, Result},
    gauge::ResourceGauge,
    search::{ScoredDocument, TopScoredDocuments},
    tokenizer::Tokenizer,
    utils::buffer::open_buffer,
};

#[derive(Derivative, Clone, Debug, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(default)]
pub struct RetrievalOptions {
    /// A bucket is not loaded if the estimated usage would exceed this fraction
    #[derivative(Default(value = "0.7"))]
    pub threshold: f64,

    /// With several query terms, terms with a lower IDF are ignored
    pub minimum_idf: Weight,

    /// Read bucket files in memory (otherwise, use a memory map while parsing)
    #[derivative(Default(value = "true"))]
    pub in_memory: bool,
}

fn round3(value: Weight) -> Weight {
    (value * 1000.).round() / 1000.
}

/// A query term with its normalized weight
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTerm {
    pub term: String,
    pub weight: Weight,
}

/// A query session over a merged index
pub struct RankedRetrieval {
    options: RetrievalOptions,
    buckets_folder: PathBuf,
    prefix_length: usize,
    dictionary: Dictionary,
    gauge: Arc<dyn ResourceGauge>,
    tokenizer: Box<dyn Tokenizer>,
    buckets: HashMap<String, Bucket>,
}

impl RankedRetrieval {
    pub fn open(
        buckets_folder: &Path,
        dictionary_folder: &Path,
        options: &RetrievalOptions,
        gauge: Arc<dyn ResourceGauge>,
        tokenizer: Box<dyn Tokenizer>,
    ) -> Result<Self> {
        if !buckets_folder.is_dir() {
            return Err(Error::Configuration(format!(
                "bucket directory {} does not exist",
                buckets_folder.display()
            )));
        }

        let dictionary = Dictionary::load(dictionary_folder)?;
        let information = IndexInformation::load(dictionary_folder)?;
        if let Some(information) = &information {
            if information.mode == IndexMode::Positional {
                return Err(Error::Configuration(
                    "a positional index cannot be used for ranked retrieval".to_string(),
                ));
            }
        }

        let prefix_length = match infer_prefix_length(buckets_folder)? {
            Some(length) => length,
            None => information.map_or(DEFAULT_PREFIX_LENGTH, |i| i.prefix_length),
        };
        info!(
            "Opened index {} (prefix length {}, {} terms)",
            buckets_folder.display(),
            prefix_length,
            dictionary.len()
        );

        Ok(Self {
            options: options.clone(),
            buckets_folder: buckets_folder.to_path_buf(),
            prefix_length,
            dictionary,
            gauge,
            tokenizer,
            buckets: HashMap::new(),
        })
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn prefix_length(&self) -> usize {
        self.prefix_length
    }

    /// Number of buckets held in memory
    pub fn loaded_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Drops the buckets loaded so far
    pub fn clear_cache(&mut self) {
        self.buckets.clear();
    }

    /// Normalizes the query and computes the weight of each of its terms
    ///
    /// Terms are kept once per occurrence.
    pub fn query_terms(&self, text: &str) -> Vec<QueryTerm> {
        let mut terms: Vec<(String, Weight)> = self
            .tokenizer
            .tokenize(text)
            .into_iter()
            .filter_map(|term| self.dictionary.idf(&term).map(|idf| (term, idf)))
            .collect();

        if terms.len() > 1 {
            terms.retain(|(term, idf)| {
                let keep = *idf >= self.options.minimum_idf;
                if !keep {
                    debug!("Ignoring query term {} (idf {})", term, idf);
                }
                keep
            });
        }

        let norm = round3(terms.iter().map(|(_, idf)| idf * idf).sum::<Weight>().sqrt());
        let uniform = 1. / (terms.len() as Weight).sqrt();

        terms
            .into_iter()
            .map(|(term, idf)| QueryTerm {
                term,
                weight: if norm > 0. { idf / norm } else { uniform },
            })
            .collect()
    }

    /// Returns the bucket for a prefix, loading it if the budget allows
    fn load_bucket(&mut self, prefix: &str) -> Result<Option<&Bucket>> {
        if !self.buckets.contains_key(prefix) {
            let path = bucket_path(&self.buckets_folder, prefix);
            let size = match fs::metadata(&path) {
                Ok(metadata) => metadata.len(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("No bucket file {}", path.display());
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

            let estimate = self.gauge.usage_with(size);
            if estimate > self.options.threshold {
                debug!(
                    "Skipping bucket {} ({} bytes, estimated usage {:.2})",
                    path.display(),
                    size,
                    estimate
                );
                return Ok(None);
            }

            let buffer = open_buffer(&path, self.options.in_memory)?;
            let bucket = parse_bucket(buffer.data(), &path)?;
            debug!("Loaded bucket {} ({} terms)", path.display(), bucket.len());
            self.buckets.insert(prefix.to_string(), bucket);
        }
        Ok(self.buckets.get(prefix))
    }

    /// Returns the `k` documents with the highest cosine score, best first
    pub fn query(&mut self, text: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scores = HashMap::<DocId, Weight>::new();
        for QueryTerm { term, weight } in self.query_terms(text) {
            let prefix = bucket_prefix(&term, self.prefix_length).to_string();
            let Some(bucket) = self.load_bucket(&prefix)? else {
                continue;
            };
            if let Some(postings) = bucket.get(&term) {
                for posting in postings {
                    *scores.entry(posting.docid).or_insert(0.) += posting.weight * weight;
                }
            }
        }

        let mut top = TopScoredDocuments::new(k);
        for (docid, score) in scores {
            top.add(docid, score);
        }
        Ok(top.into_sorted_vec())
    }

    /// Same as `query`, but only returns the document IDs
    pub fn ranked_doc_ids(&mut self, text: &str, k: usize) -> Result<Vec<DocId>> {
        Ok(self
            .query(text, k)?
            .into_iter()
            .map(|document| document.docid)
            .collect())
    }
}
