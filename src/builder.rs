use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    sync::Arc,
};

use derivative::Derivative;
use indicatif::ProgressBar;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    base::{DocId, IndexMode, PositionalPosting, Posting, Weight},
    codec::{format_line, format_positional_line},
    error::{Error, Result},
    gauge::ResourceGauge,
    segment::{list_segments, segment_number, segment_path, SegmentWriter},
    utils::progress::spinner,
};

/*
* ---- Block data structure
*
*/

#[derive(Derivative, Clone, Debug, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(default)]
pub struct IndexerOptions {
    /// The block is flushed when the gauge usage reaches this fraction
    #[derivative(Default(value = "0.7"))]
    pub threshold: f64,

    /// Normalized weights or positions
    pub mode: IndexMode,

    /// Remove existing segments before indexing
    #[derivative(Default(value = "true"))]
    pub clear_directory: bool,

    /// If set, documents are numbered from this value in stream order
    /// and the ID found on each line is ignored
    pub doc_id_base: Option<DocId>,

    /// Display a spinner while indexing
    pub show_progress: bool,
}

/// Term frequency weight
fn log_tf(count: u32) -> Weight {
    1. + (count as Weight).log10()
}

/// Splits a token text on whitespace, keeping the character offset of each token
fn tokens_with_offsets(text: &str) -> Vec<(usize, &str)> {
    let mut tokens = Vec::new();
    // (byte offset, char offset) of the current token start
    let mut start: Option<(usize, usize)> = None;

    for (char_ix, (byte_ix, c)) in text.char_indices().enumerate() {
        if c.is_whitespace() {
            if let Some((begin, offset)) = start.take() {
                tokens.push((offset, &text[begin..byte_ix]));
            }
        } else if start.is_none() {
            start = Some((byte_ix, char_ix));
        }
    }
    if let Some((begin, offset)) = start {
        tokens.push((offset, &text[begin..]));
    }
    tokens
}

/// The in-memory inverted index of the current block
enum Block {
    Ranking(HashMap<String, HashMap<DocId, Weight>>),
    Positional(HashMap<String, HashMap<DocId, PositionalPosting>>),
}

impl Block {
    fn new(mode: IndexMode) -> Self {
        match mode {
            IndexMode::Ranking => Block::Ranking(HashMap::new()),
            IndexMode::Positional => Block::Positional(HashMap::new()),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Block::Ranking(terms) => terms.is_empty(),
            Block::Positional(terms) => terms.is_empty(),
        }
    }

    fn term_count(&self) -> usize {
        match self {
            Block::Ranking(terms) => terms.len(),
            Block::Positional(terms) => terms.len(),
        }
    }

    /// Adds a document, returns true if the document was already in the block
    fn add_document(&mut self, docid: DocId, text: &str) -> bool {
        let mut replaced = false;
        match self {
            Block::Ranking(terms) => {
                let mut counts = HashMap::<&str, u32>::new();
                for token in text.split_whitespace() {
                    *counts.entry(token).or_insert(0) += 1;
                }

                // Cosine normalization over the terms of this document
                let norm = counts
                    .values()
                    .map(|&count| log_tf(count).powi(2))
                    .sum::<Weight>()
                    .sqrt();

                for (token, count) in counts {
                    let postings = terms.entry(token.to_string()).or_default();
                    replaced |= postings.insert(docid, log_tf(count) / norm).is_some();
                }
            }
            Block::Positional(terms) => {
                let mut occurrences = HashMap::<&str, Vec<usize>>::new();
                for (offset, token) in tokens_with_offsets(text) {
                    occurrences.entry(token).or_default().push(offset);
                }

                for (token, positions) in occurrences {
                    let postings = terms.entry(token.to_string()).or_default();
                    let posting = PositionalPosting {
                        docid,
                        frequency: positions.len() as u32,
                        positions,
                    };
                    replaced |= postings.insert(docid, posting).is_some();
                }
            }
        }
        replaced
    }

    /// Writes the block (terms and postings sorted) and empties it
    fn drain_into(&mut self, writer: &mut SegmentWriter) -> Result<()> {
        match self {
            Block::Ranking(terms) => {
                let mut terms: Vec<_> = std::mem::take(terms).into_iter().collect();
                terms.sort_unstable_by(|a, b| a.0.cmp(&b.0));
                for (term, postings) in terms {
                    let mut postings: Vec<Posting> = postings
                        .into_iter()
                        .map(|(docid, weight)| Posting { docid, weight })
                        .collect();
                    postings.sort_unstable_by_key(|p| p.docid);
                    writer.write_line(&format_line(&term, postings.iter()))?;
                }
            }
            Block::Positional(terms) => {
                let mut terms: Vec<_> = std::mem::take(terms).into_iter().collect();
                terms.sort_unstable_by(|a, b| a.0.cmp(&b.0));
                for (term, postings) in terms {
                    let mut postings: Vec<PositionalPosting> = postings.into_values().collect();
                    postings.sort_unstable_by_key(|p| p.docid);
                    writer.write_line(&format_positional_line(&term, postings.iter()))?;
                }
            }
        }
        Ok(())
    }
}

/// Parses a `<docId><TAB><tokens>` line
pub fn parse_document_line<'a>(
    line: &'a str,
    source: &Path,
    line_no: usize,
) -> Result<(DocId, &'a str)> {
    let (docid, text) = line
        .split_once('\t')
        .ok_or_else(|| Error::parse(source, line_no, "missing tab after the document ID"))?;
    let docid = docid.trim().parse::<DocId>().map_err(|_| {
        Error::parse(source, line_no, format!("invalid document ID '{}'", docid))
    })?;
    Ok((docid, text))
}

/// Result of the indexing stage
#[derive(Debug, Clone)]
pub struct BuildSummary {
    /// Segments written by this run, in flush order
    pub segments: Vec<PathBuf>,

    /// Number of documents processed
    pub documents: u64,
}

/// The indexer consumes tokenized documents and writes one segment
/// each time the memory gauge crosses the threshold
pub struct BlockIndexer {
    options: IndexerOptions,
    folder: PathBuf,
    doc_count_path: PathBuf,
    gauge: Arc<dyn ResourceGauge>,
    block: Block,
    block_documents: usize,
    next_segment: usize,
    segments: Vec<PathBuf>,
    documents: u64,
    progress: ProgressBar,
}

impl BlockIndexer {
    /// Creates an indexer writing segments into `folder` and the document
    /// count into `doc_count_path`
    pub fn new(
        folder: &Path,
        doc_count_path: &Path,
        options: &IndexerOptions,
        gauge: Arc<dyn ResourceGauge>,
    ) -> Result<BlockIndexer> {
        if !(options.threshold > 0.) {
            return Err(Error::Configuration(format!(
                "indexer threshold should be positive (got {})",
                options.threshold
            )));
        }

        let mut next_segment = 0;
        if options.clear_directory && folder.exists() {
            debug!("Clearing segment directory {}", folder.display());
            fs::remove_dir_all(folder)?;
        }
        if folder.exists() {
            // Keep the existing segments and number the new ones after them
            next_segment = list_segments(folder)?
                .last()
                .and_then(|path| segment_number(path))
                .map_or(0, |number| number + 1);
        } else {
            fs::create_dir_all(folder)?;
        }

        Ok(BlockIndexer {
            options: options.clone(),
            folder: folder.to_path_buf(),
            doc_count_path: doc_count_path.to_path_buf(),
            gauge,
            block: Block::new(options.mode),
            block_documents: 0,
            next_segment,
            segments: Vec::new(),
            documents: 0,
            progress: spinner(options.show_progress, "documents"),
        })
    }

    /// Adds a document given as whitespace-separated tokens
    pub fn add(&mut self, docid: DocId, text: &str) -> Result<()> {
        let docid = match self.options.doc_id_base {
            Some(base) => base + self.documents,
            None => docid,
        };

        if self.block.add_document(docid, text) {
            warn!(
                "Document {} appears twice in the same block, its postings were overwritten",
                docid
            );
        }
        self.documents += 1;
        self.block_documents += 1;
        self.progress.inc(1);

        if self.gauge.usage() >= self.options.threshold {
            debug!("Memory threshold reached after document {}", docid);
            self.flush()?;
        }
        Ok(())
    }

    /// Indexes every line of a tokenized stream
    pub fn index_reader<R: BufRead>(&mut self, reader: R) -> Result<()> {
        self.index_lines(reader, Path::new("<input>"))
    }

    /// Indexes a tokenized file
    pub fn index_file(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|e| {
            Error::Configuration(format!("cannot open input {}: {}", path.display(), e))
        })?;
        info!("Indexing {}", path.display());
        self.index_lines(BufReader::new(file), path)
    }

    fn index_lines<R: BufRead>(&mut self, reader: R, source: &Path) -> Result<()> {
        for (ix, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let (docid, text) = parse_document_line(&line, source, ix + 1)?;
            self.add(docid, text)?;
        }
        Ok(())
    }

    /// Writes the current block into a new segment
    fn flush(&mut self) -> Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }

        let path = segment_path(&self.folder, self.next_segment);
        let term_count = self.block.term_count();
        let mut writer = SegmentWriter::create(path)?;
        self.block.drain_into(&mut writer)?;
        let (path, _) = writer.finish()?;

        info!(
            "Flushed block {} ({} terms, {} documents) into {}",
            self.next_segment,
            term_count,
            self.block_documents,
            path.display()
        );
        self.progress
            .set_message(&format!("documents, {} segments", self.next_segment + 1));

        self.segments.push(path);
        self.next_segment += 1;
        self.block_documents = 0;
        Ok(())
    }

    /// Number of documents processed so far
    pub fn documents(&self) -> u64 {
        self.documents
    }

    /// Flushes the last block and records the document count
    pub fn build(mut self) -> Result<BuildSummary> {
        self.flush()?;
        fs::write(&self.doc_count_path, format!("{}\n", self.documents))?;
        self.progress.finish_and_clear();

        info!(
            "Indexed {} documents into {} segments",
            self.documents,
            self.segments.len()
        );

        Ok(BuildSummary {
            segments: self.segments,
            documents: self.documents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gauge::FixedGauge;
    use std::io::Cursor;
    use temp_dir::TempDir;

    #[test]
    fn weights_are_normalized() {
        let mut block = Block::new(IndexMode::Ranking);
        block.add_document(4, "cat cat dog bird");

        let Block::Ranking(terms) = &block else {
            unreachable!()
        };
        let cat = terms["cat"][&4];
        let dog = terms["dog"][&4];
        assert!(cat > dog);
        assert!((dog - terms["bird"][&4]).abs() < 1e-12);

        let norm = (cat * cat + 2. * dog * dog).sqrt();
        assert!((norm - 1.).abs() < 1e-9);
    }

    #[test]
    fn single_occurrence_weight() {
        assert_eq!(log_tf(1), 1.);
        assert!((log_tf(10) - 2.).abs() < 1e-12);
    }

    #[test]
    fn offsets_are_in_characters() {
        let tokens = tokens_with_offsets("été  cat\tété");
        assert_eq!(tokens, vec![(0, "été"), (5, "cat"), (9, "été")]);
        assert!(tokens_with_offsets("   ").is_empty());
    }

    #[test]
    fn positional_block() {
        let mut block = Block::new(IndexMode::Positional);
        block.add_document(2, "to be or not to be");
        let Block::Positional(terms) = &block else {
            unreachable!()
        };
        let be = &terms["be"][&2];
        assert_eq!(be.frequency, 2);
        assert_eq!(be.positions, vec![3, 16]);
    }

    #[test]
    fn document_lines() {
        let source = Path::new("tokens.tsv");
        assert_eq!(
            parse_document_line("12\tcat sat", source, 1).unwrap(),
            (12, "cat sat")
        );
        assert!(parse_document_line("12 cat sat", source, 1).is_err());
        assert!(parse_document_line("x\tcat", source, 1).is_err());
    }

    #[test]
    fn sequential_doc_ids() {
        let dir = TempDir::new().unwrap();
        let options = IndexerOptions {
            doc_id_base: Some(100),
            ..Default::default()
        };
        let mut indexer = BlockIndexer::new(
            &dir.path().join("index"),
            &dir.path().join("count.txt"),
            &options,
            Arc::new(FixedGauge::empty()),
        )
        .unwrap();
        indexer
            .index_reader(Cursor::new("7\tcat\n\n3\tcat dog\n"))
            .unwrap();
        let summary = indexer.build().unwrap();

        assert_eq!(summary.documents, 2);
        let content = fs::read_to_string(&summary.segments[0]).unwrap();
        assert_eq!(content, "cat;100:1.00;101:0.71\ndog;101:0.71\n");
    }

    #[test]
    fn invalid_threshold() {
        let dir = TempDir::new().unwrap();
        let options = IndexerOptions {
            threshold: 0.,
            ..Default::default()
        };
        assert!(BlockIndexer::new(
            dir.path(),
            &dir.path().join("count.txt"),
            &options,
            Arc::new(FixedGauge::empty())
        )
        .is_err());
    }
}
