//! Streaming k-way merge of the segments into bucket files
//!
//! Each segment is read through a cursor positioned on its current term.
//! The smallest head term is taken from a min-heap keyed by
//! `(term, segment index)`, so that cursors sharing a term are consumed in
//! flush order and postings are concatenated without re-sorting.

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BinaryHeap},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use derivative::Derivative;
use indicatif::ProgressBar;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    base::IndexMode,
    bucket::{check_prefix_length, list_buckets, BucketWriter},
    codec::{append_postings, count_posting_groups, detect_mode},
    dictionary::{dictionary_path, idf, DictionaryWriter, IndexInformation},
    error::{Error, Result},
    gauge::ResourceGauge,
    segment::{list_segments, SegmentCursor},
    utils::progress::spinner,
};

#[derive(Derivative, Clone, Debug, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(default)]
pub struct MergerOptions {
    /// Finalizable terms are written when the gauge usage reaches this fraction
    #[derivative(Default(value = "0.7"))]
    pub threshold: f64,

    /// Number of leading characters of a term naming its bucket (1 to 3)
    #[derivative(Default(value = "3"))]
    pub prefix_length: usize,

    /// Remove the segment files once the merge succeeded
    pub delete_segments: bool,

    /// Display a spinner while merging
    pub show_progress: bool,
}

/// A term can be written out once no other cursor can still produce it,
/// i.e. when it is strictly smaller than all the other head terms
pub fn is_finalizable<'a, I>(term: &str, others: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    others.into_iter().all(|other| term < other)
}

/// Reads the document count written by the indexer
pub fn read_doc_count(path: &Path) -> Result<u64> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!(
            "cannot read the document count {}: {}",
            path.display(),
            e
        ))
    })?;
    let first = content.lines().next().unwrap_or("").trim();
    first.parse::<u64>().map_err(|_| {
        Error::parse(path, 1, format!("invalid document count '{}'", first))
    })
}

/// Removes a directory content (or creates it)
fn reset_directory(folder: &Path) -> Result<()> {
    if folder.exists() {
        fs::remove_dir_all(folder)?;
    }
    fs::create_dir_all(folder)?;
    Ok(())
}

/// Result of the merge
#[derive(Debug, Clone)]
pub struct MergeSummary {
    pub bucket_files: Vec<PathBuf>,
    pub dictionary: PathBuf,
    pub terms: usize,
    pub total_docs: u64,
    /// Number of times the merge buffer was written out
    pub flushes: usize,
    pub mode: IndexMode,
}

/// Writers for the final index
struct MergeOutput {
    buckets: BucketWriter,
    dictionary: DictionaryWriter,
    total_docs: u64,
    mode: Option<IndexMode>,
    progress: ProgressBar,
}

impl MergeOutput {
    fn write(&mut self, term: &str, postings: &str) -> Result<()> {
        if self.mode.is_none() {
            self.mode = Some(detect_mode(postings));
        }

        let document_frequency = count_posting_groups(postings);
        self.buckets.write(term, postings)?;
        self.dictionary
            .write(term, idf(self.total_docs, document_frequency))?;
        self.progress.inc(1);
        Ok(())
    }
}

pub struct SegmentMerger {
    options: MergerOptions,
    segments: Vec<PathBuf>,
    total_docs: u64,
    buckets_folder: PathBuf,
    dictionary_folder: PathBuf,
    gauge: Arc<dyn ResourceGauge>,
}

impl SegmentMerger {
    /// Prepares a merge of every segment of `segments_folder`
    ///
    /// The bucket and dictionary folders are emptied (or created).
    pub fn new(
        segments_folder: &Path,
        doc_count_path: &Path,
        buckets_folder: &Path,
        dictionary_folder: &Path,
        options: &MergerOptions,
        gauge: Arc<dyn ResourceGauge>,
    ) -> Result<SegmentMerger> {
        check_prefix_length(options.prefix_length)?;
        let segments = list_segments(segments_folder)?;
        let total_docs = read_doc_count(doc_count_path)?;

        reset_directory(buckets_folder)?;
        reset_directory(dictionary_folder)?;

        info!(
            "Merging {} segments ({} documents)",
            segments.len(),
            total_docs
        );

        Ok(SegmentMerger {
            options: options.clone(),
            segments,
            total_docs,
            buckets_folder: buckets_folder.to_path_buf(),
            dictionary_folder: dictionary_folder.to_path_buf(),
            gauge,
        })
    }

    pub fn segments(&self) -> &[PathBuf] {
        &self.segments
    }

    /// Writes the buffered terms that no cursor can produce anymore
    fn flush_finalizable(
        buffer: &mut BTreeMap<String, String>,
        heap: &BinaryHeap<Reverse<(String, usize)>>,
        output: &mut MergeOutput,
    ) -> Result<usize> {
        let heads: Vec<&str> = heap.iter().map(|Reverse((term, _))| term.as_str()).collect();

        // The buffer is sorted: stop at the first term that is not finalizable
        let ready: Vec<String> = buffer
            .keys()
            .take_while(|term| is_finalizable(term, heads.iter().copied()))
            .cloned()
            .collect();

        for term in ready.iter() {
            if let Some(postings) = buffer.remove(term) {
                output.write(term, &postings)?;
            }
        }
        Ok(ready.len())
    }

    pub fn merge(self) -> Result<MergeSummary> {
        let mut cursors = self
            .segments
            .iter()
            .map(|path| SegmentCursor::open(path))
            .collect::<Result<Vec<_>>>()?;

        let mut heap = BinaryHeap::new();
        for (ix, cursor) in cursors.iter().enumerate() {
            if let Some(term) = cursor.head() {
                heap.push(Reverse((term.to_string(), ix)));
            }
        }

        let mut output = MergeOutput {
            buckets: BucketWriter::new(&self.buckets_folder, self.options.prefix_length),
            dictionary: DictionaryWriter::create(&self.dictionary_folder)?,
            total_docs: self.total_docs,
            mode: None,
            progress: spinner(self.options.show_progress, "terms"),
        };

        let mut buffer = BTreeMap::<String, String>::new();
        let mut flushes = 0;

        while let Some(Reverse((term, ix))) = heap.pop() {
            // Gather the postings of every cursor positioned on this term
            let mut positioned = vec![ix];
            while let Some(Reverse((next, _))) = heap.peek() {
                if *next != term {
                    break;
                }
                if let Some(Reverse((_, other))) = heap.pop() {
                    positioned.push(other);
                }
            }
            positioned.sort_unstable();

            let merged = buffer.entry(term).or_default();
            for ix in positioned {
                let cursor = &mut cursors[ix];
                if let Some((_, postings)) = cursor.advance()? {
                    append_postings(merged, &postings);
                }
                match cursor.head() {
                    Some(next) => heap.push(Reverse((next.to_string(), ix))),
                    None => debug!("Segment {} exhausted", cursor.path().display()),
                }
            }

            if self.gauge.usage() >= self.options.threshold {
                let written = Self::flush_finalizable(&mut buffer, &heap, &mut output)?;
                if written > 0 {
                    debug!("Memory threshold reached, wrote {} terms", written);
                    flushes += 1;
                }
            }
        }

        // All cursors are exhausted: everything left can be written
        if !buffer.is_empty() {
            flushes += 1;
        }
        for (term, postings) in std::mem::take(&mut buffer) {
            output.write(&term, &postings)?;
        }

        let MergeOutput {
            buckets,
            dictionary,
            mode,
            progress,
            ..
        } = output;
        let bucket_count = buckets.finish()?;
        let terms = dictionary.finish()?;
        progress.finish_and_clear();

        let mode = mode.unwrap_or_default();
        IndexInformation {
            total_docs: self.total_docs,
            prefix_length: self.options.prefix_length,
            mode,
            terms,
            buckets: bucket_count,
        }
        .save(&self.dictionary_folder)?;

        if self.options.delete_segments {
            for path in self.segments.iter() {
                fs::remove_file(path)?;
            }
            debug!("Removed {} segments", self.segments.len());
        }

        info!(
            "Merged {} terms into {} buckets ({} flushes)",
            terms, bucket_count, flushes
        );

        Ok(MergeSummary {
            bucket_files: list_buckets(&self.buckets_folder)?,
            dictionary: dictionary_path(&self.dictionary_folder),
            terms,
            total_docs: self.total_docs,
            flushes,
            mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    /// Indices of the head terms that are finalizable with respect to the others
    fn finalizable_heads(heads: &[&str]) -> Vec<usize> {
        (0..heads.len())
            .filter(|&ix| {
                let others = heads
                    .iter()
                    .enumerate()
                    .filter(|(other_ix, _)| *other_ix != ix)
                    .map(|(_, term)| *term);
                is_finalizable(heads[ix], others)
            })
            .collect()
    }

    #[test]
    fn only_the_smallest_head_is_finalizable() {
        assert_eq!(finalizable_heads(&["b", "a", "c"]), vec![1]);
        assert!(finalizable_heads(&["a", "a", "c"]).is_empty());
        assert_eq!(finalizable_heads(&["z"]), vec![0]);
        assert!(is_finalizable("a", ["b", "c"]));
        assert!(!is_finalizable("b", ["b"]));
    }

    #[test]
    fn doc_count_sidecar() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("count.txt");
        assert!(matches!(
            read_doc_count(&path),
            Err(Error::Configuration(_))
        ));

        fs::write(&path, "42\n").unwrap();
        assert_eq!(read_doc_count(&path).unwrap(), 42);

        fs::write(&path, "many\n").unwrap();
        assert!(matches!(read_doc_count(&path), Err(Error::Parse { .. })));
    }
}
