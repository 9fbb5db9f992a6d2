use std::fmt;

use serde::{Deserialize, Serialize};

pub type DocId = u64;
pub type Weight = f64;
pub type BoxResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Separates the term from its postings, and postings from each other
pub const TERM_DELIMITER: char = ';';
/// Separates the document ID from its weight (or frequency)
pub const POSTINGS_DELIMITER: char = ':';
/// Separates the frequency and positions in positional mode
pub const POSITION_DELIMITER: char = ',';

/// Extension of segment and bucket files
pub const INDEX_EXTENSION: &str = "ind";
pub const SEGMENT_PREFIX: &str = "segment";
pub const DICTIONARY_FILE: &str = "dictionary.dict";
pub const DOC_COUNT_FILE: &str = "index_info.txt";
pub const INDEX_CBOR: &str = "information.cbor";

/// What a posting holds
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IndexMode {
    /// Length-normalized log term frequency
    #[default]
    Ranking,
    /// Raw frequency followed by character offsets
    Positional,
}

/// Document ID + normalized term weight
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Posting {
    pub docid: DocId,
    pub weight: Weight,
}

impl fmt::Display for Posting {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({},{})", self.docid, self.weight)
    }
}

/// Document ID + occurrences of the term in that document
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PositionalPosting {
    pub docid: DocId,
    pub frequency: u32,
    /// Character offsets (within the token text) of each occurrence
    pub positions: Vec<usize>,
}
