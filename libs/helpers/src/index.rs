use log::info;
use ntest::assert_about_eq;
use std::{collections::HashMap, fs, sync::Arc};

use rand::{rngs::StdRng, SeedableRng};
use temp_dir::TempDir;

use crate::documents::create_document;
use spimi_index::{
    base::{DocId, Posting, Weight},
    builder::{BuildSummary, IndexerOptions},
    bucket::{bucket_path, bucket_prefix, parse_bucket},
    config::IndexLayout,
    gauge::ResourceGauge,
    merger::{MergeSummary, MergerOptions},
    retrieval::{RankedRetrieval, RetrievalOptions},
    tokenizer::SimpleTokenizer,
};

/// Expected normalized weights, computed independently from the indexer
pub fn expected_weights(terms: &[String]) -> HashMap<String, Weight> {
    let mut counts = HashMap::<&str, u32>::new();
    for term in terms {
        *counts.entry(term.as_str()).or_insert(0) += 1;
    }
    let weights: HashMap<&str, Weight> = counts
        .into_iter()
        .map(|(term, count)| (term, 1. + (count as Weight).log10()))
        .collect();
    let norm = weights.values().map(|w| w * w).sum::<Weight>().sqrt();
    weights
        .into_iter()
        .map(|(term, w)| (term.to_string(), w / norm))
        .collect()
}

/// A random corpus indexed in a temporary directory
pub struct TestIndex {
    pub dir: TempDir,
    pub layout: IndexLayout,
    /// term -> postings (doc ID ascending)
    pub all_terms: HashMap<String, Vec<Posting>>,
    pub build: BuildSummary,
}

impl TestIndex {
    pub fn new(
        vocabulary_size: usize,
        document_count: usize,
        lambda_words: f32,
        max_words: usize,
        seed: Option<u64>,
        gauge: Arc<dyn ResourceGauge>,
    ) -> Self {
        let dir = TempDir::new().expect("Could not create temporary directory");
        let layout = IndexLayout::under(dir.path());

        let mut rng = if let Some(seed) = seed {
            StdRng::seed_from_u64(seed)
        } else {
            StdRng::from_entropy()
        };

        let mut all_terms = HashMap::<String, Vec<Posting>>::new();
        let mut lines = Vec::<String>::new();

        for ix in 0..document_count {
            let document = create_document(
                ix as DocId,
                lambda_words,
                max_words,
                vocabulary_size,
                &mut rng,
            );
            for (term, weight) in expected_weights(&document.terms) {
                all_terms.entry(term).or_default().push(Posting {
                    docid: document.docid,
                    weight,
                });
            }
            lines.push(document.line());
        }

        let input = dir.path().join("tokens.tsv");
        fs::write(&input, lines.join("\n")).expect("Could not write the corpus");

        let mut indexer = layout
            .indexer(&IndexerOptions::default(), gauge)
            .expect("Could not create the indexer");
        indexer
            .index_file(&input)
            .expect("Error while indexing the corpus");
        let build = indexer.build().expect("Error while building the index");
        info!(
            "Test corpus: {} documents, {} segments, {} terms",
            build.documents,
            build.segments.len(),
            all_terms.len()
        );

        Self {
            dir,
            layout,
            all_terms,
            build,
        }
    }

    pub fn merge(&self, prefix_length: usize, gauge: Arc<dyn ResourceGauge>) -> MergeSummary {
        let options = MergerOptions {
            prefix_length,
            ..Default::default()
        };
        self.layout
            .merger(&options, gauge)
            .expect("Could not create the merger")
            .merge()
            .expect("Error while merging")
    }

    pub fn retrieval(&self, gauge: Arc<dyn ResourceGauge>) -> RankedRetrieval {
        self.layout
            .retrieval(
                &RetrievalOptions::default(),
                gauge,
                Box::new(SimpleTokenizer::default()),
            )
            .expect("Could not open the index")
    }

    /// Reads back the postings of a term from the merged buckets
    pub fn merged_postings(&self, term: &str, prefix_length: usize) -> Vec<Posting> {
        let path = bucket_path(&self.layout.buckets, bucket_prefix(term, prefix_length));
        let data = fs::read(&path).expect("Missing bucket");
        let mut bucket = parse_bucket(&data, &path).expect("Malformed bucket");
        bucket.remove(term).unwrap_or_default()
    }
}

/// Checks that two posting lists hold the same documents with close weights
pub fn check_same_postings(expected: &[Posting], observed: &[Posting], weight_eps: f64) {
    assert_eq!(
        expected.len(),
        observed.len(),
        "Size differ {} vs {}",
        expected.len(),
        observed.len()
    );
    for (a, b) in expected.iter().zip(observed.iter()) {
        assert!(
            a.docid == b.docid,
            "Expected doc ID {}, got {}",
            a.docid,
            b.docid
        );
        assert_about_eq!(a.weight, b.weight, weight_eps);
    }
}
