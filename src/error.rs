//! Error types shared by the indexing, merging and retrieval stages

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing input file, sidecar or directory, or an invalid option value.
    /// The run is aborted.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A line that does not follow the expected format
    #[error("parse error in {}:{line}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Read or write failure (disk full, permission denied...)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error while reading or writing the index information file
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
